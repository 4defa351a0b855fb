//! Inject Worker (SPEC_FULL.md §4.G): loads the selected history item and hands it to the
//! Provider.
//!
//! Grounded on arboard's ownership-claim pattern in `Clipboard::set_text`/`write()`
//! (`platform/linux/x11.rs`) for "publish payload, then set-selection-owner" ordering. The
//! semaphore-wait shape is grounded on `original_source/ClipboardCapture.c`'s
//! `SignalRuntime`/semaphore-post convention, translated per SPEC_FULL §9 into a
//! `parking_lot::Condvar`-backed channel rather than a raw OS semaphore.

use std::sync::atomic::Ordering;

use log::{info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::ConnectionExt as _;
use x11rb::CURRENT_TIME;

use crate::config::INJECT_BUDGET;
use crate::shared::Shared;

/// Runs on its own thread until `shared.inject` is posted with the shutdown flag set.
pub fn run(shared: Shared) {
    shared.ready.wait();

    loop {
        let should_continue = shared.inject.wait();
        if !should_continue || shared.is_shutting_down() {
            info!("inject worker exiting");
            return;
        }

        if let Err(e) = inject_once(&shared) {
            warn!("inject failed: {e}");
        }
    }
}

fn inject_once(shared: &Shared) -> Result<(), String> {
    let (bytes, kind) = {
        let history = shared.history.lock();
        let item = history.get_selected_item().map_err(|e| e.to_string())?;
        let bytes = history.read_binary(history.get_selected(), INJECT_BUDGET).map_err(|e| e.to_string())?;
        (bytes, item.kind)
    };

    let receiver_locked = shared.receiver_busy.load(Ordering::Acquire);
    let claimed = {
        let mut provider = shared.provider.lock();
        provider.claim_ownership(bytes, kind, receiver_locked)
    };

    if !claimed {
        warn!("inject discarded: a receive transaction is in flight");
        return Ok(());
    }

    shared
        .x
        .conn
        .set_selection_owner(shared.x.win_id, shared.x.atoms.CLIPBOARD, CURRENT_TIME)
        .map_err(|e| e.to_string())?;
    shared.x.conn.flush().map_err(|e| e.to_string())?;
    Ok(())
}
