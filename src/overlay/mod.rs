//! Overlay display adapter
//!
//! Keeps the set of overlay display handles in sync with the
//! `overlay_display_devices` setting. Everything here runs in the registry
//! domain under one coarse lock (the sync root); window work is handed to the
//! UI looper and window notifications come back through the [`AdapterMailbox`].

pub mod device;
pub mod events;
pub mod gravity;
pub mod handle;
pub mod parser;

pub use events::{AdapterMessage, DisplayDeviceEvent, DisplayDeviceListener, HandleId, LoggingDeviceListener};

use std::fmt::Write as _;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::constants::{device as naming, dump, limits};
use crate::settings::SettingsSource;
use crate::ui_handler::UiHandler;
use crate::window::{OverlayWindow, OverlayWindowFactory, WindowEvent};
use device::DisplayDeviceInfo;
use gravity::choose_overlay_gravity;
use handle::{HandleContext, OverlayDisplayHandle};
use parser::parse_overlay_setting;

/// State guarded by the sync root
pub struct AdapterState {
    current_setting: String,
    overlays: Vec<OverlayDisplayHandle>,
    next_handle_id: HandleId,
    listener: Arc<dyn DisplayDeviceListener>,
}

impl AdapterState {
    #[cfg(test)]
    pub fn current_setting(&self) -> &str {
        &self.current_setting
    }

    #[cfg(test)]
    pub fn overlays(&self) -> &[OverlayDisplayHandle] {
        &self.overlays
    }

    pub fn handle(&self, id: HandleId) -> Option<&OverlayDisplayHandle> {
        self.overlays.iter().find(|h| h.id() == id)
    }

    pub fn handle_mut(&mut self, id: HandleId) -> Option<&mut OverlayDisplayHandle> {
        self.overlays.iter_mut().find(|h| h.id() == id)
    }

    fn dismiss_all(&mut self) {
        if self.overlays.is_empty() {
            return;
        }
        info!(count = self.overlays.len(), "Dismissing all overlay display devices");
        let listener = self.listener.clone();
        for overlay in self.overlays.iter_mut() {
            overlay.dismiss_locked(listener.as_ref());
        }
        self.overlays.clear();
    }
}

/// Lock the sync root; a panic elsewhere never takes the adapter down with it
pub fn lock_sync_root(sync_root: &Mutex<AdapterState>) -> MutexGuard<'_, AdapterState> {
    sync_root.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cheap to clone; every clone shares the same sync root
#[derive(Clone)]
pub struct OverlayDisplayAdapter {
    sync_root: Arc<Mutex<AdapterState>>,
    ui: UiHandler,
    factory: Arc<dyn OverlayWindowFactory>,
    settings: Arc<dyn SettingsSource>,
    mailbox: Sender<AdapterMessage>,
}

/// Receiving end of the registry-domain queue
pub struct AdapterMailbox {
    rx: Receiver<AdapterMessage>,
}

impl OverlayDisplayAdapter {
    pub fn new(
        ui: UiHandler,
        factory: Arc<dyn OverlayWindowFactory>,
        settings: Arc<dyn SettingsSource>,
        listener: Arc<dyn DisplayDeviceListener>,
    ) -> (Self, AdapterMailbox) {
        let (tx, rx) = mpsc::channel();
        let sync_root = Arc::new(Mutex::new(AdapterState {
            current_setting: String::new(),
            overlays: Vec::new(),
            next_handle_id: 1,
            listener,
        }));
        let adapter = Self {
            sync_root,
            ui,
            factory,
            settings,
            mailbox: tx,
        };
        (adapter, AdapterMailbox { rx })
    }

    pub fn mailbox_sender(&self) -> Sender<AdapterMessage> {
        self.mailbox.clone()
    }

    /// Watch the setting and queue the initial update
    pub fn register(&self) {
        let tx = self.mailbox.clone();
        self.settings.register_observer(Box::new(move || {
            let _ = tx.send(AdapterMessage::SettingsChanged);
        }));
        let _ = self.mailbox.send(AdapterMessage::SettingsChanged);
        info!("Overlay display adapter registered");
    }

    /// Re-read the setting and apply it
    pub fn update_overlay_display_devices(&self) {
        let value = match self.settings.overlay_display_devices() {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                warn!(error = ?e, "Failed to read overlay display setting, treating as empty");
                String::new()
            }
        };
        self.apply_configuration(&value);
    }

    /// Replace every overlay with the ones described by `value`.
    /// Identical strings are a no-op. Returns the number of overlays afterwards.
    pub fn apply_configuration(&self, value: &str) -> usize {
        let mut state = self.lock();
        if value == state.current_setting {
            debug!(setting = %value, "Overlay display setting unchanged");
            return state.overlays.len();
        }
        state.current_setting = value.to_string();
        state.dismiss_all();

        let parsed = parse_overlay_setting(value);
        for warning in &parsed.warnings {
            warn!("{warning}");
        }

        for spec in parsed.specs.into_iter().take(limits::MAX_OVERLAY_DISPLAYS) {
            let name = naming::display_name(spec.number);
            let gravity = choose_overlay_gravity(spec.number);
            info!(
                number = spec.number,
                name = %name,
                modes = %crate::types::format_modes(&spec.modes),
                secure = spec.secure,
                "Showing overlay display device"
            );
            let id = state.next_handle_id;
            state.next_handle_id += 1;
            let handle = OverlayDisplayHandle::new(
                id,
                name,
                spec.modes,
                gravity,
                spec.secure,
                spec.number,
                self.handle_context(),
            );
            state.overlays.push(handle);
        }
        state.overlays.len()
    }

    /// Tear everything down; a later apply rebuilds even for the same string
    pub fn unregister(&self) {
        let mut state = self.lock();
        state.dismiss_all();
        state.current_setting.clear();
        info!("Overlay display adapter unregistered");
    }

    /// Mode request from the device manager for the device with `unique_id`
    pub fn request_display_mode(&self, unique_id: &str, mode_id: i32) -> bool {
        let mut state = self.lock();
        let listener = state.listener.clone();
        let handle = state
            .overlays
            .iter_mut()
            .find(|h| h.device().is_some_and(|d| d.unique_id() == unique_id));
        match handle {
            Some(handle) => handle.request_mode_locked(mode_id, listener.as_ref()),
            None => {
                warn!(device = %unique_id, mode_id, "Mode requested for unknown overlay display device");
                false
            }
        }
    }

    /// Info for every registered device, in slot order
    pub fn device_infos(&self) -> Vec<DisplayDeviceInfo> {
        let mut state = self.lock();
        state
            .overlays
            .iter_mut()
            .filter_map(|h| h.device_mut().map(|d| d.info().clone()))
            .collect()
    }

    #[cfg(test)]
    pub fn current_setting(&self) -> String {
        self.lock().current_setting.clone()
    }

    #[cfg(test)]
    pub fn overlay_count(&self) -> usize {
        self.lock().overlays.len()
    }

    /// Run `f` with the sync root held
    #[cfg(test)]
    pub fn with_state<T>(&self, f: impl FnOnce(&AdapterState) -> T) -> T {
        f(&self.lock())
    }

    fn dispatch_window_event(&self, id: HandleId, event: WindowEvent) {
        let mut state = self.lock();
        let listener = state.listener.clone();
        match state.handle_mut(id) {
            Some(handle) => handle.on_window_event_locked(event, listener.as_ref()),
            None => debug!(handle = id, event = ?event, "Window event for a superseded overlay, ignoring"),
        }
    }

    /// Text dump of the adapter and every overlay; window details are
    /// gathered on the UI looper with a bounded wait
    pub fn dump(&self) -> String {
        let mut sections: Vec<(String, Option<Arc<dyn OverlayWindow>>)> = Vec::new();
        let mut out = String::new();
        {
            let state = self.lock();
            let _ = writeln!(out, "mCurrentOverlaySetting={}", state.current_setting);
            let _ = writeln!(out, "mOverlays: size={}", state.overlays.len());
            for overlay in &state.overlays {
                let mut section = String::new();
                overlay.dump_locked(&mut section);
                sections.push((section, overlay.window()));
            }
        }

        for (section, window) in sections {
            out.push_str(&section);
            if let Some(window) = window {
                let description = self
                    .ui
                    .run_with_timeout(move || window.dump(), dump::WINDOW_DUMP_TIMEOUT)
                    .unwrap_or_else(|| "Failed to dump - timed out".to_string());
                let _ = writeln!(out, "    {description}");
            }
        }
        out
    }

    fn handle_context(&self) -> HandleContext {
        HandleContext {
            ui: self.ui.clone(),
            factory: self.factory.clone(),
            sync_root: Arc::downgrade(&self.sync_root),
            mailbox: self.mailbox.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AdapterState> {
        lock_sync_root(&self.sync_root)
    }
}

impl AdapterMailbox {
    /// Handle one message. Returns false on shutdown.
    fn dispatch(&self, adapter: &OverlayDisplayAdapter, message: AdapterMessage) -> bool {
        match message {
            AdapterMessage::Window { handle, event } => adapter.dispatch_window_event(handle, event),
            AdapterMessage::SettingsChanged => adapter.update_overlay_display_devices(),
            AdapterMessage::Shutdown => {
                adapter.unregister();
                return false;
            }
        }
        true
    }

    /// Handle everything already queued without blocking
    #[cfg(test)]
    pub fn dispatch_pending(&self, adapter: &OverlayDisplayAdapter) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.rx.try_recv() {
            handled += 1;
            if !self.dispatch(adapter, message) {
                break;
            }
        }
        handled
    }

    /// Registry-domain loop; returns after a shutdown message
    pub fn run(&self, adapter: &OverlayDisplayAdapter) {
        info!("Overlay display registry loop running");
        while let Ok(message) = self.rx.recv() {
            if !self.dispatch(adapter, message) {
                break;
            }
        }
        info!("Overlay display registry loop stopped");
    }
}
