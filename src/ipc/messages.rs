//! Control socket message types

use serde::{Deserialize, Serialize};

use crate::overlay::device::DisplayDeviceInfo;

/// Requests sent from the CLI to the daemon
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    /// Write (or clear, with `None`) the overlay display setting
    SetOverlayDisplays(Option<String>),

    /// Read the stored overlay display setting
    GetOverlayDisplays,

    /// Switch a registered device to another of its modes
    RequestMode { unique_id: String, mode_id: i32 },

    /// Info of every registered device
    ListDevices,

    /// Adapter state dump
    Dump,

    /// Health check
    Ping,

    /// Request graceful shutdown
    Shutdown,
}

/// Responses sent from the daemon to the CLI
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ControlResponse {
    /// Acknowledgment that request was processed
    Ready,

    /// Stored setting (response to GetOverlayDisplays)
    OverlayDisplays(Option<String>),

    /// Response to ListDevices
    Devices(Vec<DisplayDeviceInfo>),

    /// Response to Dump
    Dump(String),

    /// Health check response
    Pong,

    /// Error occurred
    Error(String),
}
