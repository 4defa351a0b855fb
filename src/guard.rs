//! Single-instance guard (SPEC_FULL.md §4.H).
//!
//! Grounded on 1Password-arboard's `is_owner`/`get_selection_owner`/`set_selection_owner`
//! calls in `platform/linux/x11.rs`. Unlike the CLIPBOARD selection, `XCLIPD_INSTANCE_LOCK`
//! never carries data; it is claimed purely to detect a second daemon instance.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::ConnectionExt as _;
use x11rb::COPY_FROM_PARENT;

use crate::atoms::Atoms;
use crate::error::{Error, Result};

/// Claims the instance lock, or returns [`Error::AnotherInstanceRunning`] if another window
/// already owns it.
pub fn claim(conn: &impl Connection, atoms: &Atoms, win_id: u32) -> Result<()> {
    let owner = conn.get_selection_owner(atoms.XCLIPD_INSTANCE_LOCK)?.reply()?.owner;
    if owner != 0 && owner != win_id {
        return Err(Error::AnotherInstanceRunning);
    }

    conn.set_selection_owner(win_id, atoms.XCLIPD_INSTANCE_LOCK, COPY_FROM_PARENT as u32)?;
    conn.flush()?;

    let confirmed = conn.get_selection_owner(atoms.XCLIPD_INSTANCE_LOCK)?.reply()?.owner;
    if confirmed != win_id {
        return Err(Error::AnotherInstanceRunning);
    }
    Ok(())
}
