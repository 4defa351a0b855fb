//! Cross-thread handles bundled once in `main` and cloned into each worker (SPEC_FULL.md §5).
//!
//! Grounded on arboard's `Arc<Inner>` sharing pattern (`platform/linux/x11.rs`) generalized
//! to this daemon's extra threads (Inject Worker, Signal thread, UI thread), and on the
//! `Condvar`-based `Selection::data_changed` wait/notify pair for the inject semaphore and
//! startup latch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::history::HistoryStore;
use crate::provider::Provider;
use crate::xcontext::XContext;

/// Why the Inject Worker woke up.
#[derive(Default)]
struct InjectSignal {
    pending: bool,
    shutdown: bool,
}

/// A one-shot wake source, park/post style — grounded on arboard's `Selection::data_changed`
/// `Mutex<()>` + `Condvar` pairing.
#[derive(Default)]
pub struct Latch {
    state: Mutex<bool>,
    cv: Condvar,
}

impl Latch {
    pub fn open(&self) {
        let mut guard = self.state.lock();
        *guard = true;
        self.cv.notify_all();
    }

    pub fn wait(&self) {
        let mut guard = self.state.lock();
        while !*guard {
            self.cv.wait(&mut guard);
        }
    }
}

pub struct InjectChannel {
    state: Mutex<InjectSignal>,
    cv: Condvar,
}

impl Default for InjectChannel {
    fn default() -> Self {
        Self { state: Mutex::new(InjectSignal::default()), cv: Condvar::new() }
    }
}

impl InjectChannel {
    pub fn post(&self) {
        let mut guard = self.state.lock();
        guard.pending = true;
        self.cv.notify_all();
    }

    pub fn post_shutdown(&self) {
        let mut guard = self.state.lock();
        guard.shutdown = true;
        guard.pending = true;
        self.cv.notify_all();
    }

    /// Blocks until posted; returns `false` when the wake was for shutdown.
    pub fn wait(&self) -> bool {
        let mut guard = self.state.lock();
        while !guard.pending {
            self.cv.wait(&mut guard);
        }
        guard.pending = false;
        !guard.shutdown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupState {
    Hidden,
    ReqShow,
    Shown,
    ReqHide,
}

#[derive(Clone)]
pub struct Shared {
    pub x: Arc<XContext>,
    pub history: Arc<Mutex<HistoryStore>>,
    pub provider: Arc<Mutex<Provider>>,
    pub receiver_busy: Arc<AtomicBool>,
    pub shutdown: Arc<AtomicBool>,
    pub inject: Arc<InjectChannel>,
    pub popup: Arc<Mutex<PopupState>>,
    pub ready: Arc<Latch>,
}

impl Shared {
    pub fn new(x: XContext, history: HistoryStore) -> Self {
        Self {
            x: Arc::new(x),
            history: Arc::new(Mutex::new(history)),
            provider: Arc::new(Mutex::new(Provider::new())),
            receiver_busy: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            inject: Arc::new(InjectChannel::default()),
            popup: Arc::new(Mutex::new(PopupState::Hidden)),
            ready: Arc::new(Latch::default()),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
