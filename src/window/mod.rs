//! Presentation window collaborator
//!
//! The adapter never renders anything. It asks a factory for a window on the
//! UI looper and afterwards only reacts to the three readiness/state/destroy
//! notifications a window reports through its [`WindowListener`].

pub mod headless;
pub mod x11;

use anyhow::Result;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use tracing::debug;

use crate::overlay::gravity::Gravity;
use crate::overlay::{AdapterMessage, HandleId};
use crate::types::DisplayState;

/// Everything a backend needs to create one overlay window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRequest {
    pub name: String,
    pub width: i32,
    pub height: i32,
    pub density_dpi: i32,
    pub gravity: Gravity,
    pub secure: bool,
}

/// Immutable records a window posts back to the registry domain
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    Created {
        /// Backing surface identifier, if the backend has one
        surface: Option<u64>,
        refresh_rate: f32,
        presentation_deadline_nanos: i64,
        state: DisplayState,
    },
    Destroyed,
    StateChanged(DisplayState),
}

/// A live overlay window. All methods are called on the UI looper.
pub trait OverlayWindow: Send + Sync {
    fn show(&self) -> Result<()>;
    fn dismiss(&self);
    fn resize(&self, width: i32, height: i32, density_dpi: i32);
    fn dump(&self) -> String;
}

pub trait OverlayWindowFactory: Send + Sync {
    fn create(&self, request: WindowRequest, listener: WindowListener) -> Result<Arc<dyn OverlayWindow>>;
}

/// Posts window notifications for one handle into the adapter mailbox
#[derive(Debug, Clone)]
pub struct WindowListener {
    handle: HandleId,
    tx: Sender<AdapterMessage>,
}

impl WindowListener {
    pub fn new(handle: HandleId, tx: Sender<AdapterMessage>) -> Self {
        Self { handle, tx }
    }

    pub fn on_window_created(
        &self,
        surface: Option<u64>,
        refresh_rate: f32,
        presentation_deadline_nanos: i64,
        state: DisplayState,
    ) {
        self.post(WindowEvent::Created {
            surface,
            refresh_rate,
            presentation_deadline_nanos,
            state,
        });
    }

    pub fn on_window_destroyed(&self) {
        self.post(WindowEvent::Destroyed);
    }

    pub fn on_state_changed(&self, state: DisplayState) {
        self.post(WindowEvent::StateChanged(state));
    }

    fn post(&self, event: WindowEvent) {
        let message = AdapterMessage::Window { handle: self.handle, event };
        if self.tx.send(message).is_err() {
            debug!(handle = self.handle, "Adapter mailbox closed, dropping window event");
        }
    }
}
