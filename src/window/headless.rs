//! Headless presentation backend
//!
//! Windows exist only in memory. Showing one reports readiness immediately with
//! the default timing; dismissing it reports destruction. The factory only holds
//! weak references, so a window is freed once its handle lets go of it.

use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info};

use super::{OverlayWindow, OverlayWindowFactory, WindowListener, WindowRequest};
use crate::constants::timing;
use crate::types::DisplayState;

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessGeometry {
    pub width: i32,
    pub height: i32,
    pub density_dpi: i32,
}

#[derive(Debug)]
struct WindowState {
    geometry: HeadlessGeometry,
    shown: bool,
    dismissed: bool,
    display_state: DisplayState,
}

pub struct HeadlessWindow {
    request: WindowRequest,
    surface: u64,
    listener: WindowListener,
    state: Mutex<WindowState>,
}

impl HeadlessWindow {
    fn lock(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
impl HeadlessWindow {
    pub fn request(&self) -> &WindowRequest {
        &self.request
    }

    pub fn geometry(&self) -> HeadlessGeometry {
        self.lock().geometry
    }

    pub fn is_shown(&self) -> bool {
        self.lock().shown
    }

    pub fn is_dismissed(&self) -> bool {
        self.lock().dismissed
    }

    /// Simulate a power state change (e.g. the window being hidden)
    pub fn set_display_state(&self, display_state: DisplayState) {
        {
            let mut state = self.lock();
            if !state.shown || state.dismissed || state.display_state == display_state {
                return;
            }
            state.display_state = display_state;
        }
        self.listener.on_state_changed(display_state);
    }
}

impl OverlayWindow for HeadlessWindow {
    fn show(&self) -> Result<()> {
        {
            let mut state = self.lock();
            if state.shown || state.dismissed {
                return Ok(());
            }
            state.shown = true;
            state.display_state = DisplayState::On;
        }
        info!(name = %self.request.name, surface = self.surface, "Headless overlay window shown");
        self.listener.on_window_created(
            Some(self.surface),
            timing::DEFAULT_REFRESH_RATE,
            timing::DEFAULT_PRESENTATION_DEADLINE_NANOS,
            DisplayState::On,
        );
        Ok(())
    }

    fn dismiss(&self) {
        let was_shown = {
            let mut state = self.lock();
            if state.dismissed {
                return;
            }
            state.dismissed = true;
            state.display_state = DisplayState::Off;
            state.shown
        };
        info!(name = %self.request.name, surface = self.surface, "Headless overlay window dismissed");
        if was_shown {
            self.listener.on_window_destroyed();
        }
    }

    fn resize(&self, width: i32, height: i32, density_dpi: i32) {
        debug!(name = %self.request.name, width, height, density_dpi, "Resizing headless overlay window");
        self.lock().geometry = HeadlessGeometry { width, height, density_dpi };
    }

    fn dump(&self) -> String {
        let state = self.lock();
        format!(
            "HeadlessWindow: surface={}, size={}x{}, densityDpi={}, gravity={}, secure={}, shown={}, state={:?}",
            self.surface,
            state.geometry.width,
            state.geometry.height,
            state.geometry.density_dpi,
            self.request.gravity,
            self.request.secure,
            state.shown && !state.dismissed,
            state.display_state,
        )
    }
}

#[derive(Default)]
pub struct HeadlessWindowFactory {
    windows: Mutex<Vec<Weak<HeadlessWindow>>>,
}

impl HeadlessWindowFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl HeadlessWindowFactory {
    /// Windows still referenced by someone, oldest first
    pub fn windows(&self) -> Vec<Arc<HeadlessWindow>> {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Windows shown and not yet dismissed
    pub fn live_windows(&self) -> Vec<Arc<HeadlessWindow>> {
        self.windows()
            .into_iter()
            .filter(|w| w.is_shown() && !w.is_dismissed())
            .collect()
    }

    /// Registry entries, dead or alive
    pub fn tracked(&self) -> usize {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl OverlayWindowFactory for HeadlessWindowFactory {
    fn create(&self, request: WindowRequest, listener: WindowListener) -> Result<Arc<dyn OverlayWindow>> {
        let window = Arc::new(HeadlessWindow {
            surface: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(WindowState {
                geometry: HeadlessGeometry {
                    width: request.width,
                    height: request.height,
                    density_dpi: request.density_dpi,
                },
                shown: false,
                dismissed: false,
                display_state: DisplayState::Unknown,
            }),
            request,
            listener,
        });
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.retain(|w| w.strong_count() > 0);
        windows.push(Arc::downgrade(&window));
        drop(windows);
        Ok(window)
    }
}
