//! Application-wide constants
//!
//! Limits, names and paths shared by the parser, the adapter and the
//! presentation backends.

/// Overlay display mode limits
pub mod limits {
    /// Smallest accepted mode width in pixels
    pub const MIN_WIDTH: i32 = 100;

    /// Smallest accepted mode height in pixels
    pub const MIN_HEIGHT: i32 = 100;

    /// Largest accepted mode width in pixels
    pub const MAX_WIDTH: i32 = 4096;

    /// Largest accepted mode height in pixels
    pub const MAX_HEIGHT: i32 = 4096;

    /// Low-density bucket (ldpi)
    pub const DENSITY_LOW: i32 = 120;

    /// Extra-extra-extra-high density bucket (xxxhdpi)
    pub const DENSITY_XXXHIGH: i32 = 640;

    /// Number of overlay display slots
    pub const MAX_OVERLAY_DISPLAYS: usize = 4;
}

/// Configuration string grammar
pub mod grammar {
    /// Separates display specs
    pub const DISPLAY_SEPARATOR: char = ';';

    /// Separates the mode list from flags, and flags from each other
    pub const FLAG_SEPARATOR: char = ',';

    /// Separates modes within a mode list
    pub const MODE_SEPARATOR: char = '|';

    /// Flag marking a display as secure
    pub const SECURE_FLAG: &str = "secure";
}

/// Device naming
pub mod device {
    /// Prefix of the unique id, followed by the slot number
    pub const UNIQUE_ID_PREFIX: &str = "overlay:";

    /// Display name for a slot number
    pub fn display_name(number: u32) -> String {
        format!("Overlay #{number}")
    }

    pub const NANOS_PER_SECOND: i64 = 1_000_000_000;
}

/// Diagnostics
pub mod dump {
    use std::time::Duration;

    /// Bounded wait for a window to describe itself on the UI looper
    pub const WINDOW_DUMP_TIMEOUT: Duration = Duration::from_millis(200);
}

/// Simulated presentation timing (headless backend and X11 fallback)
pub mod timing {
    /// Refresh rate reported when the backend cannot query one
    pub const DEFAULT_REFRESH_RATE: f32 = 60.0;

    /// Presentation deadline reported alongside the default refresh rate
    pub const DEFAULT_PRESENTATION_DEADLINE_NANOS: i64 = 16_666_666;
}

/// X11 presentation backend
pub mod x11 {
    /// Override redirect flag for unmanaged windows
    pub const OVERRIDE_REDIRECT: u32 = 1;

    /// Fraction of the mode size used for the initial window size
    pub const INITIAL_SCALE: f32 = 0.5;

    /// Distance kept from the screen edge in pixels
    pub const EDGE_MARGIN: i16 = 8;

    /// Background fill for overlay windows (dark grey)
    pub const BACKGROUND_PIXEL: u32 = 0x0020_2020;

    /// WM_CLASS instance and class, NUL separated
    pub const WM_CLASS: &[u8] = b"overlay-displays\0overlay-displays\0";
}

/// File and socket locations
pub mod paths {
    /// Directory name under the XDG config/runtime directories
    pub const APP_DIR: &str = "overlay-displays";

    /// Settings file name
    pub const SETTINGS_FILENAME: &str = "settings.json";

    /// Control socket file name
    pub const SOCKET_FILENAME: &str = "control.sock";
}
