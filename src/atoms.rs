//! Process-wide atom table, interned once after connecting.
//!
//! Grounded on 1Password-arboard's `x11rb::atom_manager!` usage in `platform/linux/x11.rs`.

use x11rb::connection::Connection;

use crate::error::Result;
use crate::history::HistoryKind;

x11rb::atom_manager! {
    pub Atoms: AtomCookies {
        CLIPBOARD,
        TARGETS,
        TIMESTAMP,
        INCR,
        ATOM,

        UTF8_STRING,

        PNG_MIME: b"image/png",
        JPEG_MIME: b"image/jpeg",
        BMP_MIME: b"image/bmp",

        // Property on our own window into which peers write the data we asked for.
        XCLIPD_TRANSFER,

        // Selection name used purely as a single-instance lock; never holds data.
        XCLIPD_INSTANCE_LOCK,
    }
}

impl Atoms {
    pub fn intern(conn: &impl Connection) -> Result<Self> {
        Ok(Self::new(conn)?.reply()?)
    }

    /// True for the atoms the Receiver is willing to archive: the media formats, not the
    /// meta-targets (`TARGETS`/`TIMESTAMP`/`INCR`).
    pub fn is_known_media(&self, atom: u32) -> bool {
        atom == self.UTF8_STRING || atom == self.PNG_MIME || atom == self.JPEG_MIME || atom == self.BMP_MIME
    }

    /// Preference order used when negotiating a TARGETS reply: PNG > JPEG > BMP > UTF-8.
    pub fn preference_order(&self) -> [u32; 4] {
        [self.PNG_MIME, self.JPEG_MIME, self.BMP_MIME, self.UTF8_STRING]
    }

    pub fn kind_of(&self, atom: u32) -> Option<HistoryKind> {
        match atom {
            a if a == self.UTF8_STRING => Some(HistoryKind::TextUtf8),
            a if a == self.PNG_MIME => Some(HistoryKind::ImagePng),
            a if a == self.JPEG_MIME => Some(HistoryKind::ImageJpeg),
            a if a == self.BMP_MIME => Some(HistoryKind::ImageBmp),
            _ => None,
        }
    }

    pub fn format_for(&self, kind: HistoryKind) -> Option<u32> {
        match kind {
            HistoryKind::TextUtf8 => Some(self.UTF8_STRING),
            HistoryKind::ImagePng => Some(self.PNG_MIME),
            HistoryKind::ImageJpeg => Some(self.JPEG_MIME),
            HistoryKind::ImageBmp => Some(self.BMP_MIME),
            HistoryKind::Unknown => None,
        }
    }
}
