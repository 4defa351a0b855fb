//! Shutdown Coordinator (SPEC_FULL.md §4.I).
//!
//! Grounded on arboard's thread-join-on-last-owner-drop pattern (`impl Drop for Clipboard`,
//! `platform/linux/x11.rs`), adapted from "join on drop" to "join on explicit shutdown
//! signal" since this is a daemon with an explicit lifetime, not a library handle.

use std::thread::JoinHandle;

use log::{error, info};

pub struct Coordinator {
    pub event_pump: JoinHandle<()>,
    pub inject: JoinHandle<()>,
    pub signals: JoinHandle<()>,
}

impl Coordinator {
    /// Blocks until the signal thread observes SIGINT/SIGTERM and has already woken the
    /// other two threads (§4.I steps 1-3); then joins all three in turn (step 5).
    pub fn wait_for_shutdown(self) {
        if let Err(e) = self.signals.join() {
            error!("signal thread panicked: {e:?}");
        }
        if let Err(e) = self.inject.join() {
            error!("inject worker panicked: {e:?}");
        }
        if let Err(e) = self.event_pump.join() {
            error!("event pump panicked: {e:?}");
        }
        info!("shutdown complete");
    }
}
