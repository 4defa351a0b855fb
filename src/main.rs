//! xclipd: a background clipboard history daemon for X11 (SPEC_FULL.md §1-§2).
//!
//! Entry point grounded on 1Password-arboard's `Clipboard::new()`/thread-spawn shape
//! (`platform/linux/x11.rs`), generalized from "one worker thread serving requests" to this
//! daemon's four threads: Event Pump, Inject Worker, Signal thread, and the main/UI thread.

mod atoms;
mod config;
mod error;
mod event_pump;
mod guard;
mod history;
mod inject;
mod menu;
mod provider;
mod receiver;
mod shared;
mod shutdown;
mod signals;
mod transfer_buffer;
mod xcontext;

use std::process::ExitCode;
use std::thread;

use log::{error, info, warn};

use config::Config;
use history::HistoryStore;
use menu::MenuChoice;
use shared::{PopupState, Shared};
use shutdown::Coordinator;
use xcontext::XContext;

fn main() -> ExitCode {
    env_logger::Builder::from_default_env().filter_level(log::LevelFilter::Info).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> error::Result<()> {
    let config = Config::load()?;
    config.ensure_dirs()?;

    let x = XContext::connect()?;
    guard::claim(&x.conn, &x.atoms, x.win_id)?;

    let mut history = HistoryStore::new(config.db_dir.clone());
    if let Err(e) = history.scan() {
        warn!("initial history scan failed: {e}");
    }
    info!("loaded {} history item(s) from {}", history.size(), config.db_dir.display());

    let shared = Shared::new(x, history);

    let event_pump_handle = {
        let shared = shared.clone();
        thread::spawn(move || event_pump::run(shared))
    };
    let inject_handle = {
        let shared = shared.clone();
        thread::spawn(move || inject::run(shared))
    };
    let signals_handle = {
        let shared = shared.clone();
        thread::spawn(move || signals::run(shared))
    };

    ui_loop(&shared, &config);

    Coordinator { event_pump: event_pump_handle, inject: inject_handle, signals: signals_handle }.wait_for_shutdown();
    Ok(())
}

/// §5's "UI caller thread": idles, polling the popup flag and invoking rofi synchronously.
fn ui_loop(shared: &Shared, config: &Config) {
    loop {
        if shared.is_shutting_down() {
            return;
        }

        let wants_show = {
            let mut popup = shared.popup.lock();
            if *popup == PopupState::ReqShow {
                *popup = PopupState::Shown;
                true
            } else {
                false
            }
        };

        if wants_show {
            if let Err(e) = show_menu(shared, config) {
                warn!("menu invocation failed: {e}");
            }
            let mut popup = shared.popup.lock();
            if *popup == PopupState::Shown {
                *popup = PopupState::Hidden;
            }
        }

        thread::sleep(std::time::Duration::from_millis(100));
    }
}

fn show_menu(shared: &Shared, config: &Config) -> error::Result<()> {
    let items = {
        let history = shared.history.lock();
        (0..history.size()).map(|i| history.get(i)).collect::<Result<Vec<_>, _>>()
    };
    let items = items.map_err(|_| error::Error::Unsupported("history store is inconsistent"))?;

    menu::render(&config.menu_file, &config.db_dir, &items)?;

    match menu::run(&config.menu_file, "clipboard", items.len())? {
        MenuChoice::Inject(index) => {
            shared.history.lock().set_selected(index).ok();
            shared.inject.post();
        }
        MenuChoice::ClearAll => {
            if let Err(e) = shared.history.lock().clear_all() {
                warn!("clear-all failed: {e}");
            }
        }
        MenuChoice::Cancelled => {}
    }
    Ok(())
}
