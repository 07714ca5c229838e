//! Registered overlay display device
//!
//! A device exists between the window reporting readiness and the window (or
//! the adapter) tearing it down. All access happens with the adapter's sync
//! root held.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::events::{DisplayDeviceEvent, DisplayDeviceListener};
use crate::constants::device::{NANOS_PER_SECOND, UNIQUE_ID_PREFIX};
use crate::types::{DisplayState, OverlayMode};

static NEXT_MODE_ID: AtomicI32 = AtomicI32::new(1);
static NEXT_DISPLAY_TOKEN: AtomicU64 = AtomicU64::new(1);

/// A mode as published to the device manager. Ids are process-wide and never 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayMode {
    pub mode_id: i32,
    pub physical_width: i32,
    pub physical_height: i32,
    pub refresh_rate: f32,
}

impl DisplayMode {
    fn create(width: i32, height: i32, refresh_rate: f32) -> Self {
        Self {
            mode_id: NEXT_MODE_ID.fetch_add(1, Ordering::Relaxed),
            physical_width: width,
            physical_height: height,
            refresh_rate,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    /// Bit positions match the platform's display-device flag word
    pub struct DeviceFlags: u32 {
        const SECURE = 1 << 2;
        const PRESENTATION = 1 << 6;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayType {
    Overlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TouchType {
    None,
}

/// Snapshot of a device's public description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayDeviceInfo {
    pub name: String,
    pub unique_id: String,
    pub width: i32,
    pub height: i32,
    pub mode_id: i32,
    pub default_mode_id: i32,
    pub supported_modes: Vec<DisplayMode>,
    pub density_dpi: i32,
    pub x_dpi: f32,
    pub y_dpi: f32,
    pub presentation_deadline_nanos: i64,
    pub flags: DeviceFlags,
    pub display_type: DisplayType,
    pub touch: TouchType,
    pub state: DisplayState,
}

/// Opaque handle to the compositor-side display
#[derive(Debug, PartialEq, Eq)]
pub struct DisplayToken(u64);

impl DisplayToken {
    fn create(name: &str, secure: bool) -> Self {
        let token = DisplayToken(NEXT_DISPLAY_TOKEN.fetch_add(1, Ordering::Relaxed));
        debug!(name = %name, secure, token = token.0, "Created display token");
        token
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Called with the new mode index after a mode request changed the active mode
pub type ModeChangedCallback = Box<dyn Fn(usize) + Send>;

/// Readiness data reported by the window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowReadiness {
    pub surface: Option<u64>,
    pub refresh_rate: f32,
    pub presentation_deadline_nanos: i64,
    pub state: DisplayState,
}

pub struct OverlayDisplayDevice {
    name: String,
    unique_id: String,
    display_token: Option<DisplayToken>,
    refresh_rate: f32,
    presentation_deadline_nanos: i64,
    secure: bool,
    raw_modes: Arc<[OverlayMode]>,
    modes: Vec<DisplayMode>,
    active_mode: usize,
    default_mode: usize,
    state: DisplayState,
    surface: Option<u64>,
    info: Option<DisplayDeviceInfo>,
    on_mode_changed: ModeChangedCallback,
}

impl std::fmt::Debug for OverlayDisplayDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayDisplayDevice")
            .field("name", &self.name)
            .field("unique_id", &self.unique_id)
            .field("active_mode", &self.active_mode)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl OverlayDisplayDevice {
    /// `raw_modes` must not be empty and `active_mode` must index it
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        number: u32,
        raw_modes: Arc<[OverlayMode]>,
        active_mode: usize,
        default_mode: usize,
        secure: bool,
        readiness: WindowReadiness,
        on_mode_changed: ModeChangedCallback,
    ) -> Self {
        let modes = raw_modes
            .iter()
            .map(|m| DisplayMode::create(m.width, m.height, readiness.refresh_rate))
            .collect();
        Self {
            name: name.to_string(),
            unique_id: format!("{UNIQUE_ID_PREFIX}{number}"),
            display_token: Some(DisplayToken::create(name, secure)),
            refresh_rate: readiness.refresh_rate,
            presentation_deadline_nanos: readiness.presentation_deadline_nanos,
            secure,
            raw_modes,
            modes,
            active_mode,
            default_mode,
            state: readiness.state,
            surface: readiness.surface,
            info: None,
            on_mode_changed,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// The unique id is derived from the slot, not from the hardware
    pub fn has_stable_unique_id(&self) -> bool {
        false
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    pub fn active_mode(&self) -> usize {
        self.active_mode
    }

    pub fn modes(&self) -> &[DisplayMode] {
        &self.modes
    }

    pub fn is_destroyed(&self) -> bool {
        self.display_token.is_none()
    }

    pub fn set_state(&mut self, state: DisplayState) {
        self.state = state;
        self.info = None;
    }

    /// Switch to the mode with `id`; 0 or an unknown id selects the default mode.
    /// Emits `Changed` and runs the mode-changed callback only when the active mode moves.
    pub fn request_mode(&mut self, id: i32, listener: &dyn DisplayDeviceListener) {
        let index = if id == 0 {
            Some(self.default_mode)
        } else {
            self.modes.iter().position(|mode| mode.mode_id == id)
        };
        let index = index.unwrap_or_else(|| {
            warn!(device = %self.unique_id, mode_id = id, "Unable to locate mode, reverting to default");
            self.default_mode
        });

        if index == self.active_mode {
            return;
        }

        info!(device = %self.unique_id, from = self.active_mode, to = index, "Active overlay mode changed");
        self.active_mode = index;
        self.info = None;
        listener.on_display_device_event(DisplayDeviceEvent::Changed, self);
        (self.on_mode_changed)(index);
    }

    /// Cached description, recomputed after any state or mode change
    pub fn info(&mut self) -> &DisplayDeviceInfo {
        let info = match self.info.take() {
            Some(info) => info,
            None => self.compute_info(),
        };
        self.info.insert(info)
    }

    fn compute_info(&self) -> DisplayDeviceInfo {
        let mode = self.modes[self.active_mode];
        let raw_mode = self.raw_modes[self.active_mode];

        let frame_nanos = if self.refresh_rate > 0.0 {
            NANOS_PER_SECOND / (self.refresh_rate as i64).max(1)
        } else {
            0
        };

        let mut flags = DeviceFlags::PRESENTATION;
        if self.secure {
            flags |= DeviceFlags::SECURE;
        }

        DisplayDeviceInfo {
            name: self.name.clone(),
            unique_id: self.unique_id.clone(),
            width: mode.physical_width,
            height: mode.physical_height,
            mode_id: mode.mode_id,
            default_mode_id: self.modes[self.default_mode].mode_id,
            supported_modes: self.modes.clone(),
            density_dpi: raw_mode.density_dpi,
            x_dpi: raw_mode.density_dpi as f32,
            y_dpi: raw_mode.density_dpi as f32,
            // display's deadline + 1 frame
            presentation_deadline_nanos: self.presentation_deadline_nanos + frame_nanos,
            flags,
            display_type: DisplayType::Overlay,
            touch: TouchType::None,
            state: self.state,
        }
    }

    /// Release the backing surface, then the display token. Safe to repeat.
    pub fn destroy(&mut self) {
        self.surface = None;
        if let Some(token) = self.display_token.take() {
            debug!(device = %self.unique_id, token = token.id(), "Destroyed display token");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(DisplayDeviceEvent, String)>>,
    }

    impl DisplayDeviceListener for Recorder {
        fn on_display_device_event(&self, event: DisplayDeviceEvent, device: &mut OverlayDisplayDevice) {
            self.events.lock().unwrap().push((event, device.unique_id().to_string()));
        }
    }

    fn readiness() -> WindowReadiness {
        WindowReadiness {
            surface: Some(9),
            refresh_rate: 60.0,
            presentation_deadline_nanos: 10_000_000,
            state: DisplayState::On,
        }
    }

    fn device(secure: bool, callback: ModeChangedCallback) -> OverlayDisplayDevice {
        let modes: Arc<[OverlayMode]> = Arc::from(vec![
            OverlayMode::new(800, 600, 160),
            OverlayMode::new(1280, 720, 213),
            OverlayMode::new(1920, 1080, 320),
        ]);
        OverlayDisplayDevice::new("Overlay #2", 2, modes, 0, 0, secure, readiness(), callback)
    }

    fn counting_callback() -> (ModeChangedCallback, Arc<Mutex<Vec<usize>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (Box::new(move |index| sink.lock().unwrap().push(index)), seen)
    }

    #[test]
    fn test_info_describes_active_mode() {
        let mut device = device(true, Box::new(|_| {}));
        let info = device.info().clone();
        assert_eq!(info.name, "Overlay #2");
        assert_eq!(info.unique_id, "overlay:2");
        assert_eq!((info.width, info.height), (800, 600));
        assert_eq!(info.density_dpi, 160);
        assert_eq!(info.x_dpi, 160.0);
        assert_eq!(info.y_dpi, 160.0);
        assert_eq!(info.supported_modes.len(), 3);
        assert_eq!(info.default_mode_id, info.supported_modes[0].mode_id);
        assert_eq!(info.mode_id, info.supported_modes[0].mode_id);
        assert_eq!(info.presentation_deadline_nanos, 10_000_000 + 16_666_666);
        assert_eq!(info.flags, DeviceFlags::PRESENTATION | DeviceFlags::SECURE);
        assert_eq!(info.state, DisplayState::On);
        assert!(!device.has_stable_unique_id());
    }

    #[test]
    fn test_insecure_device_only_presentation_flag() {
        let mut device = device(false, Box::new(|_| {}));
        assert_eq!(device.info().flags, DeviceFlags::PRESENTATION);
    }

    #[test]
    fn test_flag_bits_match_platform_values() {
        let mut secure = device(true, Box::new(|_| {}));
        assert_eq!(secure.info().flags.bits(), 0x44);
        let mut plain = device(false, Box::new(|_| {}));
        assert_eq!(plain.info().flags.bits(), 0x40);
    }

    #[test]
    fn test_mode_ids_are_nonzero_and_distinct() {
        let device = device(false, Box::new(|_| {}));
        let ids: Vec<i32> = device.modes().iter().map(|m| m.mode_id).collect();
        assert!(ids.iter().all(|id| *id != 0));
        assert!(ids[0] != ids[1] && ids[1] != ids[2] && ids[0] != ids[2]);
    }

    #[test]
    fn test_request_mode_by_id_switches_and_notifies() {
        let (callback, seen) = counting_callback();
        let mut device = device(false, callback);
        let recorder = Recorder::default();
        let target = device.modes()[2].mode_id;

        device.request_mode(target, &recorder);

        assert_eq!(device.active_mode(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![2]);
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![(DisplayDeviceEvent::Changed, "overlay:2".to_string())]
        );
        let info = device.info();
        assert_eq!((info.width, info.height, info.density_dpi), (1920, 1080, 320));
    }

    #[test]
    fn test_request_mode_zero_selects_default() {
        let (callback, seen) = counting_callback();
        let mut device = device(false, callback);
        let recorder = Recorder::default();
        device.request_mode(device.modes()[1].mode_id, &recorder);
        device.request_mode(0, &recorder);
        assert_eq!(device.active_mode(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_unknown_mode_falls_back_to_default() {
        let (callback, seen) = counting_callback();
        let mut device = device(false, callback);
        let recorder = Recorder::default();
        device.request_mode(device.modes()[1].mode_id, &recorder);
        device.request_mode(-12345, &recorder);
        assert_eq!(device.active_mode(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_request_current_mode_is_silent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut device = device(false, Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let recorder = Recorder::default();
        device.request_mode(0, &recorder);
        device.request_mode(777_777, &recorder);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(recorder.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_set_state_invalidates_cached_info() {
        let mut device = device(false, Box::new(|_| {}));
        assert_eq!(device.info().state, DisplayState::On);
        device.set_state(DisplayState::Off);
        assert_eq!(device.info().state, DisplayState::Off);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut device = device(false, Box::new(|_| {}));
        assert!(!device.is_destroyed());
        device.destroy();
        device.destroy();
        assert!(device.is_destroyed());
    }

    #[test]
    fn test_zero_refresh_rate_adds_no_frame() {
        let modes: Arc<[OverlayMode]> = Arc::from(vec![OverlayMode::new(800, 600, 160)]);
        let readiness = WindowReadiness { refresh_rate: 0.0, ..readiness() };
        let mut device =
            OverlayDisplayDevice::new("Overlay #1", 1, modes, 0, 0, false, readiness, Box::new(|_| {}));
        assert_eq!(device.info().presentation_deadline_nanos, 10_000_000);
    }
}
