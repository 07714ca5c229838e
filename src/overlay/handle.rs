//! Lifecycle bridge between one overlay display slot and its window
//!
//! The handle lives in the registry domain and is only touched with the sync
//! root held. Window work (show, resize, dismiss) is posted to the UI looper as
//! keyed items; the window answers by posting [`WindowEvent`]s to the adapter
//! mailbox. Neither side ever waits for the other.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, info, warn};

use super::device::{ModeChangedCallback, OverlayDisplayDevice, WindowReadiness};
use super::events::{AdapterMessage, DisplayDeviceEvent, DisplayDeviceListener, HandleId};
use super::gravity::Gravity;
use super::{AdapterState, lock_sync_root};
use crate::types::{OverlayMode, format_modes};
use crate::ui_handler::{TaskKey, TaskKind, UiHandler};
use crate::window::{OverlayWindow, OverlayWindowFactory, WindowEvent, WindowListener, WindowRequest};

const DEFAULT_MODE_INDEX: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Built, show not yet queued
    Requested,
    /// Show queued or window pending readiness
    Shown,
    /// Window ready and device registered
    Active,
    Dismissed,
}

/// What both domains need to reach a handle's window work
#[derive(Clone)]
pub struct HandleContext {
    pub ui: UiHandler,
    pub factory: Arc<dyn OverlayWindowFactory>,
    pub sync_root: Weak<Mutex<AdapterState>>,
    pub mailbox: Sender<AdapterMessage>,
}

/// Per-handle data shared with UI work items and the device's mode callback.
/// The atomics are only written with the sync root held.
struct HandleShared {
    id: HandleId,
    name: String,
    modes: Arc<[OverlayMode]>,
    gravity: Gravity,
    secure: bool,
    number: u32,
    active_mode: AtomicUsize,
    window_attached: AtomicBool,
}

impl HandleShared {
    fn active_mode(&self) -> usize {
        self.active_mode.load(Ordering::SeqCst)
    }

    fn current_mode(&self) -> OverlayMode {
        self.modes[self.active_mode()]
    }

    fn key(&self, kind: TaskKind) -> TaskKey {
        TaskKey::new(self.id, kind)
    }
}

pub struct OverlayDisplayHandle {
    shared: Arc<HandleShared>,
    ctx: HandleContext,
    window: Option<Arc<dyn OverlayWindow>>,
    device: Option<OverlayDisplayDevice>,
    state: HandleState,
}

impl OverlayDisplayHandle {
    /// Build the handle and queue its window. `modes` must not be empty.
    pub fn new(
        id: HandleId,
        name: String,
        modes: Vec<OverlayMode>,
        gravity: Gravity,
        secure: bool,
        number: u32,
        ctx: HandleContext,
    ) -> Self {
        let mut handle = Self {
            shared: Arc::new(HandleShared {
                id,
                name,
                modes: Arc::from(modes),
                gravity,
                secure,
                number,
                active_mode: AtomicUsize::new(DEFAULT_MODE_INDEX),
                window_attached: AtomicBool::new(false),
            }),
            ctx,
            window: None,
            device: None,
            state: HandleState::Requested,
        };
        handle.show_locked();
        handle
    }

    pub fn id(&self) -> HandleId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn number(&self) -> u32 {
        self.shared.number
    }

    pub fn gravity(&self) -> Gravity {
        self.shared.gravity
    }

    pub fn is_secure(&self) -> bool {
        self.shared.secure
    }

    pub fn modes(&self) -> &[OverlayMode] {
        &self.shared.modes
    }

    pub fn active_mode(&self) -> usize {
        self.shared.active_mode()
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn has_window(&self) -> bool {
        self.window.is_some()
    }

    pub fn window(&self) -> Option<Arc<dyn OverlayWindow>> {
        self.window.clone()
    }

    pub fn device(&self) -> Option<&OverlayDisplayDevice> {
        self.device.as_ref()
    }

    pub fn device_mut(&mut self) -> Option<&mut OverlayDisplayDevice> {
        self.device.as_mut()
    }

    fn show_locked(&mut self) {
        let shared = self.shared.clone();
        let ctx = self.ctx.clone();
        self.ctx.ui.post(self.shared.key(TaskKind::Show), move || run_show(shared, ctx));
        self.state = HandleState::Shown;
    }

    /// Withdraw queued window work, drop the device, and queue the window's dismissal
    pub fn dismiss_locked(&mut self, listener: &dyn DisplayDeviceListener) {
        debug!(
            handle = self.id(),
            state = ?self.state(),
            has_window = self.has_window(),
            "Dismissing overlay display handle"
        );
        let ui = &self.ctx.ui;
        ui.remove_callbacks(self.shared.key(TaskKind::Show));
        ui.remove_callbacks(self.shared.key(TaskKind::Resize));

        if let Some(mut device) = self.device.take() {
            device.destroy();
            listener.on_display_device_event(DisplayDeviceEvent::Removed, &mut device);
        }

        let window = self.window.take();
        self.shared.window_attached.store(false, Ordering::SeqCst);
        ui.post(self.shared.key(TaskKind::Dismiss), move || {
            if let Some(window) = window {
                window.dismiss();
            }
        });
        self.state = HandleState::Dismissed;
        debug!(handle = self.shared.id, name = %self.shared.name, "Overlay display handle dismissed");
    }

    /// Called by the show work item once the window is up
    fn attach_window_locked(&mut self, window: Arc<dyn OverlayWindow>, shown_mode: usize) {
        self.window = Some(window);
        self.shared.window_attached.store(true, Ordering::SeqCst);
        // A mode change that raced the show never queued a resize
        if self.shared.active_mode() != shown_mode {
            schedule_resize(&self.shared, &self.ctx);
        }
    }

    pub fn on_window_event_locked(&mut self, event: WindowEvent, listener: &dyn DisplayDeviceListener) {
        match event {
            WindowEvent::Created {
                surface,
                refresh_rate,
                presentation_deadline_nanos,
                state,
            } => {
                if self.device.is_some() {
                    warn!(handle = self.shared.id, "Window reported ready twice, ignoring");
                    return;
                }
                let readiness = WindowReadiness {
                    surface,
                    refresh_rate,
                    presentation_deadline_nanos,
                    state,
                };
                let mut device = OverlayDisplayDevice::new(
                    &self.shared.name,
                    self.shared.number,
                    self.shared.modes.clone(),
                    self.shared.active_mode(),
                    DEFAULT_MODE_INDEX,
                    self.shared.secure,
                    readiness,
                    self.mode_changed_callback(),
                );
                info!(
                    device = %device.unique_id(),
                    refresh_rate,
                    presentation_deadline_nanos,
                    "Overlay window ready, registering device"
                );
                listener.on_display_device_event(DisplayDeviceEvent::Added, &mut device);
                self.device = Some(device);
                self.state = HandleState::Active;
            }
            WindowEvent::Destroyed => {
                if let Some(mut device) = self.device.take() {
                    device.destroy();
                    listener.on_display_device_event(DisplayDeviceEvent::Removed, &mut device);
                }
                self.window = None;
                self.shared.window_attached.store(false, Ordering::SeqCst);
                self.ctx.ui.remove_callbacks(self.shared.key(TaskKind::Resize));
                self.state = HandleState::Dismissed;
            }
            WindowEvent::StateChanged(state) => {
                if let Some(device) = self.device.as_mut() {
                    device.set_state(state);
                    listener.on_display_device_event(DisplayDeviceEvent::Changed, device);
                }
            }
        }
    }

    /// Mode request from the device manager; ignored while no device exists
    pub fn request_mode_locked(&mut self, mode_id: i32, listener: &dyn DisplayDeviceListener) -> bool {
        match self.device.as_mut() {
            Some(device) => {
                device.request_mode(mode_id, listener);
                true
            }
            None => false,
        }
    }

    fn mode_changed_callback(&self) -> ModeChangedCallback {
        let shared = self.shared.clone();
        let ctx = self.ctx.clone();
        Box::new(move |index| {
            let key = shared.key(TaskKind::Resize);
            ctx.ui.remove_callbacks(key);
            shared.active_mode.store(index, Ordering::SeqCst);
            if shared.window_attached.load(Ordering::SeqCst) {
                schedule_resize(&shared, &ctx);
            }
        })
    }

    pub fn dump_locked(&self, out: &mut String) {
        let _ = writeln!(out, "  {}:", self.name());
        let _ = writeln!(out, "    mModes={}", format_modes(self.modes()));
        let _ = writeln!(out, "    mActiveMode={}", self.active_mode());
        let _ = writeln!(out, "    mGravity={}", self.gravity());
        let _ = writeln!(out, "    mSecure={}", self.is_secure());
        let _ = writeln!(out, "    mNumber={}", self.number());
    }
}

/// Replace any queued resize with one for the current mode
fn schedule_resize(shared: &Arc<HandleShared>, ctx: &HandleContext) {
    let key = shared.key(TaskKind::Resize);
    ctx.ui.remove_callbacks(key);
    let shared = shared.clone();
    let sync_root = ctx.sync_root.clone();
    ctx.ui.post(key, move || run_resize(shared, sync_root));
}

fn run_show(shared: Arc<HandleShared>, ctx: HandleContext) {
    let shown_mode = shared.active_mode();
    let mode = shared.modes[shown_mode];
    let request = WindowRequest {
        name: shared.name.clone(),
        width: mode.width,
        height: mode.height,
        density_dpi: mode.density_dpi,
        gravity: shared.gravity,
        secure: shared.secure,
    };
    let listener = WindowListener::new(shared.id, ctx.mailbox.clone());

    let window = match ctx.factory.create(request, listener) {
        Ok(window) => window,
        Err(e) => {
            error!(name = %shared.name, error = ?e, "Failed to create overlay window");
            return;
        }
    };
    if let Err(e) = window.show() {
        error!(name = %shared.name, error = ?e, "Failed to show overlay window");
        window.dismiss();
        return;
    }

    let Some(sync_root) = ctx.sync_root.upgrade() else {
        window.dismiss();
        return;
    };
    let attached = {
        let mut state = lock_sync_root(&sync_root);
        match state.handle_mut(shared.id) {
            Some(handle) if handle.state != HandleState::Dismissed => {
                handle.attach_window_locked(window.clone(), shown_mode);
                true
            }
            _ => false,
        }
    };
    if !attached {
        // Torn down while the window was being created
        debug!(handle = shared.id, name = %shared.name, "Handle gone before window attached, dismissing");
        window.dismiss();
    }
}

fn run_resize(shared: Arc<HandleShared>, sync_root: Weak<Mutex<AdapterState>>) {
    let Some(sync_root) = sync_root.upgrade() else {
        return;
    };
    let (window, mode) = {
        let state = lock_sync_root(&sync_root);
        let Some(window) = state.handle(shared.id).and_then(|h| h.window.clone()) else {
            return;
        };
        (window, shared.current_mode())
    };
    window.resize(mode.width, mode.height, mode.density_dpi);
}
