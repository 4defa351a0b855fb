//! The listener window and connection shared by every thread that talks to the X server.
//!
//! Grounded on 1Password-arboard's `XContext::new` (`platform/linux/x11.rs`): a spawned
//! connect-with-timeout dance, then a single 1x1 override window used purely as a selection
//! owner and property-transfer target.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, CreateWindowAux, EventMask, WindowClass};
use x11rb::rust_connection::RustConnection;
use x11rb::{COPY_DEPTH_FROM_PARENT, COPY_FROM_PARENT};

use crate::atoms::Atoms;
use crate::error::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(2000);

pub struct XContext {
    pub conn: RustConnection,
    pub win_id: u32,
    pub screen_root: u32,
    pub atoms: Atoms,
}

impl XContext {
    pub fn connect() -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            tx.send(RustConnection::connect(None)).ok();
        });
        let connected = rx
            .recv_timeout(CONNECT_TIMEOUT)
            .map_err(|_| Error::ConnectionFailed("timed out connecting to the X server".into()))?;
        let (conn, screen_num) = connected?;

        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| Error::ConnectionFailed("no screen found".into()))?;
        let win_id = conn.generate_id()?;

        let event_mask = EventMask::PROPERTY_CHANGE | EventMask::STRUCTURE_NOTIFY;
        conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            win_id,
            screen.root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::COPY_FROM_PARENT,
            COPY_FROM_PARENT,
            &CreateWindowAux::new().event_mask(event_mask),
        )?;
        conn.flush()?;

        let screen_root = screen.root;
        let atoms = Atoms::intern(&conn)?;

        Ok(Self { conn, win_id, screen_root, atoms })
    }
}
