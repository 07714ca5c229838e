//! Daemon wiring: settings, UI looper, window backend, adapter, signals, control socket

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread;
use tracing::{error, info, warn};

use crate::ipc::ControlServer;
use crate::ipc::server::{ControlContext, spawn_ipc_listener};
use crate::overlay::{AdapterMessage, LoggingDeviceListener, OverlayDisplayAdapter};
use crate::settings::SettingsStore;
use crate::ui_handler::UiLooper;
use crate::window::OverlayWindowFactory;
use crate::window::headless::HeadlessWindowFactory;
use crate::window::x11::X11WindowFactory;

#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub settings_path: PathBuf,
    /// Skip X11 and keep windows in memory only
    pub headless: bool,
}

fn select_factory(headless: bool) -> Arc<dyn OverlayWindowFactory> {
    if headless {
        info!("Running headless, overlay windows are not presented");
        return Arc::new(HeadlessWindowFactory::new());
    }
    match X11WindowFactory::connect() {
        Ok(factory) => Arc::new(factory),
        Err(e) => {
            warn!(error = ?e, "X11 unavailable, falling back to headless overlay windows");
            Arc::new(HeadlessWindowFactory::new())
        }
    }
}

/// SIGHUP re-reads the setting; SIGINT and SIGTERM stop the daemon
fn spawn_signal_listener(store: Arc<SettingsStore>, mailbox: Sender<AdapterMessage>) -> Result<()> {
    use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGHUP, SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                match signal {
                    SIGHUP => {
                        info!("SIGHUP received, re-reading overlay display setting");
                        store.notify_change();
                    }
                    _ => {
                        info!(signal, "Termination signal received, shutting down");
                        let _ = mailbox.send(AdapterMessage::Shutdown);
                        return;
                    }
                }
            }
        })
        .context("Failed to spawn signal thread")?;
    Ok(())
}

pub fn run(options: DaemonOptions) -> Result<()> {
    let store = Arc::new(SettingsStore::open(options.settings_path));
    info!(path = %store.path().display(), "Using overlay display settings file");

    let looper = UiLooper::spawn("overlay-ui")?;
    let factory = select_factory(options.headless);
    let (adapter, mailbox) =
        OverlayDisplayAdapter::new(looper.handler(), factory, store.clone(), Arc::new(LoggingDeviceListener));

    spawn_signal_listener(store.clone(), adapter.mailbox_sender())?;

    match ControlServer::bind() {
        Ok(server) => {
            let ctx = ControlContext {
                store,
                adapter: adapter.clone(),
                mailbox: adapter.mailbox_sender(),
            };
            spawn_ipc_listener(server, ctx)?;
        }
        Err(e) => error!(error = ?e, "Control socket unavailable, continuing without IPC"),
    }

    adapter.register();
    mailbox.run(&adapter);

    // Let queued dismissals reach the windows before exiting
    looper.quit();
    info!("Overlay display daemon stopped");
    Ok(())
}
