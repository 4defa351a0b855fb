//! Bounded clipboard history ring: 1000 on-disk records with a single head cursor.
//!
//! Grounded on `original_source/CBC_SysFile.c`/`CBC_SysFile.h`: the `XCBList_*` family of
//! functions, `Convert2AllocatedIndex`'s index math, and `GetFileTypeFromName`'s suffix
//! classification. Concurrency discipline (single mutex, never held across an X call) is
//! supplied by the caller (`event_pump.rs`/`inject.rs`), mirroring §5's rule; this module
//! itself is plain, lock-free logic so it stays testable without any X11 connection.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::CAPACITY;
use crate::error::{HistoryError, HistoryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    TextUtf8,
    ImagePng,
    ImageJpeg,
    ImageBmp,
    Unknown,
}

impl HistoryKind {
    /// Classifies by filename suffix, case-insensitive. Both `.jpg` and `.jpeg` map to
    /// `ImageJpeg`; newly written JPEGs use `.jpg` (resolves the spec's open question).
    pub fn classify(filename: &str) -> Self {
        let ext = match filename.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return HistoryKind::Unknown,
        };
        match ext.as_str() {
            "txt" => HistoryKind::TextUtf8,
            "png" => HistoryKind::ImagePng,
            "jpg" | "jpeg" => HistoryKind::ImageJpeg,
            "bmp" => HistoryKind::ImageBmp,
            _ => HistoryKind::Unknown,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            HistoryKind::TextUtf8 => "txt",
            HistoryKind::ImagePng => "png",
            HistoryKind::ImageJpeg => "jpg",
            HistoryKind::ImageBmp => "bmp",
            HistoryKind::Unknown => "bin",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryItem {
    pub filename: String,
    pub timestamp: u64,
    pub kind: HistoryKind,
}

static FILENAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `YYYYMMDD_HHMMSS_mmm_counter.<ext>` — a timestamp plus a monotonic counter as the
/// disambiguator, so two captures landing in the same millisecond never collide.
pub fn generate_filename(kind: HistoryKind) -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = now.as_secs();
    let millis = now.subsec_millis();
    let counter = FILENAME_COUNTER.fetch_add(1, Ordering::Relaxed);

    let tm = civil_from_unix(secs as i64);
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}_{:03}_{}.{}",
        tm.0, tm.1, tm.2, tm.3, tm.4, tm.5, millis, counter, kind.extension()
    )
}

/// Minimal civil calendar conversion (UTC) so filename generation needs no extra crate.
/// y, mon, day, hour, min, sec.
fn civil_from_unix(unix: i64) -> (i64, u32, u32, u32, u32, u32) {
    let days = unix.div_euclid(86400);
    let secs_of_day = unix.rem_euclid(86400);
    let hour = (secs_of_day / 3600) as u32;
    let min = ((secs_of_day % 3600) / 60) as u32;
    let sec = (secs_of_day % 60) as u32;

    // Howard Hinnant's days_from_civil, inverted.
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as i64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if month <= 2 { y + 1 } else { y };

    (year, month, day, hour, min, sec)
}

fn strip_dir(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((_, name)) => name,
        None => path,
    }
}

pub struct HistoryStore {
    db_dir: PathBuf,
    slots: Vec<Option<HistoryItem>>,
    head: Option<usize>,
    size: usize,
    selected: Option<usize>,
}

impl HistoryStore {
    pub fn new(db_dir: PathBuf) -> Self {
        Self {
            db_dir,
            slots: (0..CAPACITY).map(|_| None).collect(),
            head: None,
            size: 0,
            selected: None,
        }
    }

    fn physical_of(&self, logical: usize) -> Option<usize> {
        if logical >= self.size {
            return None;
        }
        let head = self.head?;
        Some((head + CAPACITY - logical) % CAPACITY)
    }

    fn file_path(&self, filename: &str) -> PathBuf {
        self.db_dir.join(filename)
    }

    /// Rebuilds the ring from disk: enumerates `db_dir`, rejects hidden entries, keeps up
    /// to `CAPACITY` sorted oldest-first by mtime, deletes any surplus (the oldest beyond
    /// capacity). Returns the number of items loaded.
    ///
    /// The original `XCBList_Scan` takes a `bypass_lock` flag to avoid re-entering its own
    /// mutex when called from a context that already holds it. That parameter has no
    /// counterpart here: every caller reaches this store through the single
    /// `Arc<Mutex<HistoryStore>>` in `shared.rs`, which is not re-entrant and is never held
    /// across an X11 call, so there is no call path that could re-enter it.
    pub fn scan(&mut self) -> HistoryResult<usize> {
        let read_dir = fs::read_dir(&self.db_dir).map_err(|_| HistoryError::Io)?;

        let mut entries: Vec<(String, u64)> = Vec::new();
        for entry in read_dir.flatten() {
            let name = entry.file_name();
            let name = match name.to_str() {
                Some(n) => n,
                None => continue,
            };
            if name.starts_with('.') {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            entries.push((name.to_string(), mtime));
        }

        entries.sort_by_key(|(_, mtime)| *mtime);

        if entries.len() > CAPACITY {
            let surplus = entries.len() - CAPACITY;
            for (name, _) in entries.drain(0..surplus) {
                let _ = fs::remove_file(self.file_path(&name));
            }
        }

        self.slots = (0..CAPACITY).map(|_| None).collect();
        self.size = entries.len();
        self.head = if self.size > 0 { Some(self.size - 1) } else { None };
        self.selected = None;

        for (physical, (name, mtime)) in entries.into_iter().enumerate() {
            let kind = HistoryKind::classify(&name);
            self.slots[physical] = Some(HistoryItem { filename: name, timestamp: mtime, kind });
        }

        Ok(self.size)
    }

    fn evict_oldest(&mut self) {
        if self.size == 0 {
            return;
        }
        if let Some(physical) = self.physical_of(self.size - 1) {
            if let Some(item) = self.slots[physical].take() {
                let _ = fs::remove_file(self.file_path(&item.filename));
            }
        }
        self.size -= 1;
    }

    /// Accepts a path, strips any directory prefix, and pushes `{filename, now, kind}`,
    /// evicting the oldest record first if at capacity.
    pub fn push(&mut self, path: &str) -> HistoryResult<()> {
        let filename = strip_dir(path);
        if filename.is_empty() {
            return Err(HistoryError::NotFound);
        }

        if self.size >= CAPACITY {
            self.evict_oldest();
        }

        let head = match self.head {
            Some(h) => (h + 1) % CAPACITY,
            None => 0,
        };
        self.head = Some(head);

        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let kind = HistoryKind::classify(filename);
        self.slots[head] = Some(HistoryItem { filename: filename.to_string(), timestamp: now, kind });
        self.size += 1;
        Ok(())
    }

    /// Only pushes if the file actually exists in `db_dir`; the stored timestamp becomes
    /// the file's mtime rather than "now".
    pub fn push_if_exists(&mut self, path: &str) -> HistoryResult<()> {
        let filename = strip_dir(path).to_string();
        let full_path = self.file_path(&filename);
        let meta = fs::metadata(&full_path).map_err(|_| HistoryError::NotFound)?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        self.push(&filename)?;
        if let Some(head) = self.head {
            if let Some(item) = self.slots[head].as_mut() {
                item.timestamp = mtime;
            }
        }
        Ok(())
    }

    pub fn pop_oldest(&mut self) -> HistoryResult<HistoryItem> {
        if self.size == 0 {
            return Err(HistoryError::NotFound);
        }
        let physical = self.physical_of(self.size - 1).ok_or(HistoryError::NotFound)?;
        let item = self.slots[physical].take().ok_or(HistoryError::NotFound)?;
        let _ = fs::remove_file(self.file_path(&item.filename));
        self.size -= 1;
        Ok(item)
    }

    pub fn get(&self, logical: usize) -> HistoryResult<HistoryItem> {
        let physical = self.physical_of(logical).ok_or(HistoryError::NotFound)?;
        self.slots[physical].clone().ok_or(HistoryError::NotFound)
    }

    pub fn get_latest(&self) -> HistoryResult<HistoryItem> {
        self.get(0)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Reads the file for record `n`. Errors (without mutating the store) if it's missing
    /// or exceeds `max_len` — no partial reads.
    pub fn read_binary(&self, logical: usize, max_len: usize) -> HistoryResult<Vec<u8>> {
        let item = self.get(logical)?;
        let full_path = self.file_path(&item.filename);
        let meta = fs::metadata(&full_path).map_err(|_| HistoryError::NotFound)?;
        if meta.len() as usize > max_len {
            return Err(HistoryError::Overflow);
        }
        fs::read(&full_path).map_err(|_| HistoryError::Io)
    }

    pub fn set_selected(&mut self, logical: usize) -> HistoryResult<()> {
        if logical >= self.size {
            return Err(HistoryError::NotFound);
        }
        self.selected = Some(logical);
        Ok(())
    }

    /// Returns 0 as a safe default if the cursor has been invalidated by eviction.
    pub fn get_selected(&self) -> usize {
        match self.selected {
            Some(n) if n < self.size => n,
            _ => 0,
        }
    }

    pub fn get_selected_item(&self) -> HistoryResult<HistoryItem> {
        self.get(self.get_selected())
    }

    /// Deletes every file and resets the ring; size becomes 0.
    pub fn clear_all(&mut self) -> HistoryResult<()> {
        let db_dir = self.db_dir.clone();
        for slot in self.slots.iter_mut() {
            if let Some(item) = slot.take() {
                let _ = fs::remove_file(db_dir.join(&item.filename));
            }
        }
        self.head = None;
        self.size = 0;
        self.selected = None;
        Ok(())
    }

    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) {
        fs::write(dir.join(name), bytes).unwrap();
    }

    #[test]
    fn push_and_get_latest() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.txt", b"hello");
        let mut store = HistoryStore::new(dir.path().to_path_buf());
        store.push("a.txt").unwrap();
        let item = store.get_latest().unwrap();
        assert_eq!(item.filename, "a.txt");
        assert_eq!(item.kind, HistoryKind::TextUtf8);
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn capacity_overflow_evicts_oldest() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::new(dir.path().to_path_buf());
        for i in 0..CAPACITY {
            let name = format!("item_{i}.txt");
            write_file(dir.path(), &name, b"x");
            store.push(&name).unwrap();
        }
        assert_eq!(store.size(), CAPACITY);

        write_file(dir.path(), "overflow.txt", b"x");
        store.push("overflow.txt").unwrap();

        assert_eq!(store.size(), CAPACITY);
        assert!(!dir.path().join("item_0.txt").exists());
        assert_eq!(store.get_latest().unwrap().filename, "overflow.txt");
    }

    #[test]
    fn get_zero_is_most_recently_pushed() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::new(dir.path().to_path_buf());
        write_file(dir.path(), "first.txt", b"x");
        write_file(dir.path(), "second.txt", b"x");
        store.push("first.txt").unwrap();
        store.push("second.txt").unwrap();
        assert_eq!(store.get(0).unwrap().filename, "second.txt");
        assert_eq!(store.get(1).unwrap().filename, "first.txt");
    }

    #[test]
    fn clear_all_empties_store_and_directory() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::new(dir.path().to_path_buf());
        write_file(dir.path(), "a.txt", b"x");
        store.push("a.txt").unwrap();
        store.clear_all().unwrap();
        assert_eq!(store.size(), 0);
        let remaining: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(remaining.is_empty());
    }

    #[test]
    fn read_binary_rejects_oversized_file() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "big.txt", b"0123456789");
        let mut store = HistoryStore::new(dir.path().to_path_buf());
        store.push("big.txt").unwrap();
        assert_eq!(store.read_binary(0, 5), Err(HistoryError::Overflow));
        assert_eq!(store.read_binary(0, 100).unwrap(), b"0123456789");
    }

    #[test]
    fn selected_defaults_to_zero_after_invalidation() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::new(dir.path().to_path_buf());
        write_file(dir.path(), "a.txt", b"x");
        store.push("a.txt").unwrap();
        store.set_selected(0).unwrap();
        store.clear_all().unwrap();
        assert_eq!(store.get_selected(), 0);
    }

    #[test]
    fn scan_sorts_oldest_first_and_purges_surplus() {
        let dir = tempdir().unwrap();
        for i in 0..3 {
            write_file(dir.path(), &format!("f{i}.txt"), b"x");
        }
        let mut store = HistoryStore::new(dir.path().to_path_buf());
        let n = store.scan().unwrap();
        assert_eq!(n, 3);
        assert_eq!(store.size(), 3);
    }

    #[test]
    fn classify_both_jpg_and_jpeg_as_image_jpeg() {
        assert_eq!(HistoryKind::classify("a.jpg"), HistoryKind::ImageJpeg);
        assert_eq!(HistoryKind::classify("a.JPEG"), HistoryKind::ImageJpeg);
        assert_eq!(HistoryKind::classify("a.bin"), HistoryKind::Unknown);
    }

    #[test]
    fn generated_filenames_are_unique() {
        let a = generate_filename(HistoryKind::TextUtf8);
        let b = generate_filename(HistoryKind::TextUtf8);
        assert_ne!(a, b);
        assert!(a.ends_with(".txt"));
    }
}
