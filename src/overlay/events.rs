use tracing::info;

use super::device::OverlayDisplayDevice;
use crate::window::WindowEvent;

/// Identifies one handle for the lifetime of the adapter; never reused
pub type HandleId = u64;

/// Work delivered to the registry domain
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterMessage {
    Window { handle: HandleId, event: WindowEvent },
    /// Re-read the setting and apply it
    SettingsChanged,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayDeviceEvent {
    Added,
    Changed,
    Removed,
}

/// Device manager side of the adapter. Called with the sync root held.
pub trait DisplayDeviceListener: Send + Sync {
    fn on_display_device_event(&self, event: DisplayDeviceEvent, device: &mut OverlayDisplayDevice);
}

/// Listener used by the daemon: announces devices in the log
#[derive(Debug, Default)]
pub struct LoggingDeviceListener;

impl DisplayDeviceListener for LoggingDeviceListener {
    fn on_display_device_event(&self, event: DisplayDeviceEvent, device: &mut OverlayDisplayDevice) {
        let stable_id = device.has_stable_unique_id();
        let destroyed = device.is_destroyed();
        let state = device.state();
        let active_mode = device.active_mode();
        let mode_count = device.modes().len();
        let info = device.info();
        info!(
            event = ?event,
            device = %info.unique_id,
            name = %info.name,
            width = info.width,
            height = info.height,
            density_dpi = info.density_dpi,
            mode_id = info.mode_id,
            active_mode,
            mode_count,
            state = ?state,
            flags = ?info.flags,
            stable_id,
            destroyed,
            "Overlay display device event"
        );
    }
}
