use serde::{Deserialize, Serialize};
use std::fmt;

/// Screen corner an overlay window is pinned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gravity {
    TopLeft,
    BottomRight,
    TopRight,
    BottomLeft,
}

/// Slot 1 top-left, 2 bottom-right, 3 top-right, everything else bottom-left
pub fn choose_overlay_gravity(number: u32) -> Gravity {
    match number {
        1 => Gravity::TopLeft,
        2 => Gravity::BottomRight,
        3 => Gravity::TopRight,
        _ => Gravity::BottomLeft,
    }
}

impl Gravity {
    /// Top-left origin of a `window` sized box pinned to this corner of `screen`,
    /// keeping `margin` pixels from the edges and never going negative
    pub fn anchor(&self, screen: (u16, u16), window: (u16, u16), margin: i16) -> (i16, i16) {
        let far_x = (screen.0 as i32 - window.0 as i32 - margin as i32).max(0) as i16;
        let far_y = (screen.1 as i32 - window.1 as i32 - margin as i32).max(0) as i16;
        match self {
            Gravity::TopLeft => (margin, margin),
            Gravity::BottomRight => (far_x, far_y),
            Gravity::TopRight => (far_x, margin),
            Gravity::BottomLeft => (margin, far_y),
        }
    }
}

impl fmt::Display for Gravity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Gravity::TopLeft => "TOP|LEFT",
            Gravity::BottomRight => "BOTTOM|RIGHT",
            Gravity::TopRight => "TOP|RIGHT",
            Gravity::BottomLeft => "BOTTOM|LEFT",
        };
        f.write_str(name)
    }
}
