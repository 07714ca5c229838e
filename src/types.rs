use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::limits;

/// One resolution + density pair an overlay display can run at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayMode {
    pub width: i32,
    pub height: i32,
    pub density_dpi: i32,
}

impl OverlayMode {
    pub fn new(width: i32, height: i32, density_dpi: i32) -> Self {
        Self { width, height, density_dpi }
    }

    /// Whether the mode lies inside the supported size and density bounds
    pub fn is_in_range(&self) -> bool {
        (limits::MIN_WIDTH..=limits::MAX_WIDTH).contains(&self.width)
            && (limits::MIN_HEIGHT..=limits::MAX_HEIGHT).contains(&self.height)
            && (limits::DENSITY_LOW..=limits::DENSITY_XXXHIGH).contains(&self.density_dpi)
    }
}

impl fmt::Display for OverlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{width={}, height={}, densityDpi={}}}",
            self.width, self.height, self.density_dpi
        )
    }
}

/// Formats a mode list as `[{...}, {...}]`
pub fn format_modes(modes: &[OverlayMode]) -> String {
    let inner: Vec<String> = modes.iter().map(ToString::to_string).collect();
    format!("[{}]", inner.join(", "))
}

/// Power state reported by the presentation window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplayState {
    #[default]
    Unknown,
    Off,
    On,
    Doze,
    DozeSuspend,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_bounds_are_inclusive() {
        assert!(OverlayMode::new(100, 100, 120).is_in_range());
        assert!(OverlayMode::new(4096, 4096, 640).is_in_range());
        assert!(!OverlayMode::new(99, 600, 160).is_in_range());
        assert!(!OverlayMode::new(800, 4097, 160).is_in_range());
        assert!(!OverlayMode::new(800, 600, 119).is_in_range());
        assert!(!OverlayMode::new(800, 600, 641).is_in_range());
    }

    #[test]
    fn test_mode_list_formatting() {
        let modes = [OverlayMode::new(800, 600, 160), OverlayMode::new(1024, 768, 240)];
        assert_eq!(
            format_modes(&modes),
            "[{width=800, height=600, densityDpi=160}, {width=1024, height=768, densityDpi=240}]"
        );
        assert_eq!(format_modes(&[]), "[]");
    }
}
