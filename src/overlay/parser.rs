//! Parser for the `overlay_display_devices` setting
//!
//! Grammar: display specs separated by `;`, each `mode[|mode...][,flag...]`,
//! where a mode is `WIDTHxHEIGHT/DPI`. Parsing never fails; rejected input
//! is reported through [`ParseWarning`]s and the caller decides how to log them.

use std::fmt;

use crate::constants::{grammar, limits};
use crate::types::OverlayMode;

/// One display that survived parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySpec {
    pub modes: Vec<OverlayMode>,
    pub secure: bool,
    /// 1-based slot, counting only surviving specs
    pub number: u32,
}

/// Input that was dropped while parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    /// A fifth display was specified; it and everything after it were ignored
    TooManyDisplays { setting: String },
    /// A well-formed mode outside the supported bounds
    ModeOutOfRange { mode: String },
    /// A display spec that does not match the grammar or has no valid mode
    Malformed { setting: String },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::TooManyDisplays { setting } => {
                write!(f, "Too many overlay display devices specified: {setting}")
            }
            ParseWarning::ModeOutOfRange { mode } => {
                write!(f, "Ignoring out-of-range overlay display mode: {mode}")
            }
            ParseWarning::Malformed { setting } => {
                write!(f, "Malformed overlay display devices setting: {setting}")
            }
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedSetting {
    pub specs: Vec<DisplaySpec>,
    pub warnings: Vec<ParseWarning>,
}

/// Parse the whole setting string
pub fn parse_overlay_setting(value: &str) -> ParsedSetting {
    let mut parsed = ParsedSetting::default();

    // Trailing empty parts are dropped; interior ones are malformed
    let mut parts: Vec<&str> = value.split(grammar::DISPLAY_SEPARATOR).collect();
    while parts.last().is_some_and(|part| part.is_empty()) {
        parts.pop();
    }

    for part in parts {
        let Some((mode_list, flags)) = split_display(part) else {
            parsed.warnings.push(ParseWarning::Malformed { setting: value.to_string() });
            continue;
        };

        if parsed.specs.len() >= limits::MAX_OVERLAY_DISPLAYS {
            parsed.warnings.push(ParseWarning::TooManyDisplays { setting: value.to_string() });
            break;
        }

        let mut modes = Vec::new();
        for mode in mode_list.split(grammar::MODE_SEPARATOR) {
            match parse_mode(mode) {
                ModeParse::Valid(parsed_mode) => modes.push(parsed_mode),
                ModeParse::OutOfRange => parsed
                    .warnings
                    .push(ParseWarning::ModeOutOfRange { mode: mode.to_string() }),
                ModeParse::Unparsable => {}
            }
        }

        if modes.is_empty() {
            parsed.warnings.push(ParseWarning::Malformed { setting: value.to_string() });
            continue;
        }

        let number = parsed.specs.len() as u32 + 1;
        let secure = flags.iter().any(|flag| *flag == grammar::SECURE_FLAG);
        parsed.specs.push(DisplaySpec { modes, secure, number });
    }

    parsed
}

/// Split `modes,flag,flag` into its parts. Flags must be lowercase words.
fn split_display(part: &str) -> Option<(&str, Vec<&str>)> {
    let mut pieces = part.split(grammar::FLAG_SEPARATOR);
    let mode_list = pieces.next().filter(|m| !m.is_empty())?;
    let flags: Vec<&str> = pieces.collect();
    let flags_ok = flags
        .iter()
        .all(|flag| !flag.is_empty() && flag.bytes().all(|b| b.is_ascii_lowercase()));
    flags_ok.then_some((mode_list, flags))
}

#[derive(Debug, PartialEq, Eq)]
enum ModeParse {
    Valid(OverlayMode),
    OutOfRange,
    Unparsable,
}

fn parse_mode(mode: &str) -> ModeParse {
    let Some((width, rest)) = mode.split_once('x') else {
        return ModeParse::Unparsable;
    };
    let Some((height, density)) = rest.split_once('/') else {
        return ModeParse::Unparsable;
    };

    match (parse_number(width), parse_number(height), parse_number(density)) {
        (Some(width), Some(height), Some(density_dpi)) => {
            let mode = OverlayMode::new(width, height, density_dpi);
            if mode.is_in_range() {
                ModeParse::Valid(mode)
            } else {
                ModeParse::OutOfRange
            }
        }
        // Bad digits or i32 overflow: dropped without a warning
        _ => ModeParse::Unparsable,
    }
}

fn parse_number(digits: &str) -> Option<i32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(width: i32, height: i32, density_dpi: i32) -> OverlayMode {
        OverlayMode::new(width, height, density_dpi)
    }

    #[test]
    fn test_two_displays_second_secure() {
        let parsed = parse_overlay_setting("800x600/160;1024x768/240,secure");
        assert!(parsed.warnings.is_empty());
        assert_eq!(
            parsed.specs,
            vec![
                DisplaySpec { modes: vec![mode(800, 600, 160)], secure: false, number: 1 },
                DisplaySpec { modes: vec![mode(1024, 768, 240)], secure: true, number: 2 },
            ]
        );
    }

    #[test]
    fn test_empty_setting_has_no_displays() {
        let parsed = parse_overlay_setting("");
        assert!(parsed.specs.is_empty());
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_width_below_minimum_drops_display() {
        let parsed = parse_overlay_setting("50x50/160");
        assert!(parsed.specs.is_empty());
        assert_eq!(
            parsed.warnings,
            vec![
                ParseWarning::ModeOutOfRange { mode: "50x50/160".to_string() },
                ParseWarning::Malformed { setting: "50x50/160".to_string() },
            ]
        );
    }

    #[test]
    fn test_fifth_display_rejected() {
        let setting = "800x600/160;800x600/160;800x600/160;800x600/160;800x600/160";
        let parsed = parse_overlay_setting(setting);
        assert_eq!(parsed.specs.len(), 4);
        assert_eq!(
            parsed.specs.iter().map(|s| s.number).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(
            parsed.warnings,
            vec![ParseWarning::TooManyDisplays { setting: setting.to_string() }]
        );
        assert!(parsed.warnings[0].to_string().starts_with("Too many"));
    }

    #[test]
    fn test_multiple_modes_keep_order_and_skip_bad_ones() {
        let parsed = parse_overlay_setting("1920x1080/320|garbage|720x480/142|99x99/160");
        assert_eq!(parsed.specs.len(), 1);
        assert_eq!(parsed.specs[0].modes, vec![mode(1920, 1080, 320), mode(720, 480, 142)]);
        assert_eq!(
            parsed.warnings,
            vec![ParseWarning::ModeOutOfRange { mode: "99x99/160".to_string() }]
        );
    }

    #[test]
    fn test_dropped_display_does_not_consume_slot() {
        let parsed = parse_overlay_setting("10x10/160;640x480/160");
        assert_eq!(parsed.specs.len(), 1);
        assert_eq!(parsed.specs[0].number, 1);
    }

    #[test]
    fn test_numeric_overflow_is_silent() {
        let parsed = parse_overlay_setting("99999999999x600/160|800x600/160");
        assert_eq!(parsed.specs[0].modes, vec![mode(800, 600, 160)]);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_unknown_flags_ignored() {
        let parsed = parse_overlay_setting("800x600/160,future,secure");
        assert!(parsed.specs[0].secure);

        let parsed = parse_overlay_setting("800x600/160,future");
        assert!(!parsed.specs[0].secure);
    }

    #[test]
    fn test_flags_must_be_lowercase_words() {
        let parsed = parse_overlay_setting("800x600/160,Secure");
        assert!(parsed.specs.is_empty());
        assert!(matches!(parsed.warnings[..], [ParseWarning::Malformed { .. }]));

        let parsed = parse_overlay_setting(",secure");
        assert!(parsed.specs.is_empty());
    }

    #[test]
    fn test_bounds_property_over_grid() {
        for width in [99, 100, 4096, 4097] {
            for density in [119, 120, 640, 641] {
                let setting = format!("{width}x{width}/{density}");
                let kept = !parse_overlay_setting(&setting).specs.is_empty();
                let expected = (100..=4096).contains(&width) && (120..=640).contains(&density);
                assert_eq!(kept, expected, "setting {setting}");
            }
        }
    }

    #[test]
    fn test_trailing_separator_is_not_malformed() {
        let parsed = parse_overlay_setting("800x600/160;");
        assert_eq!(parsed.specs.len(), 1);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_interior_empty_part_is_malformed() {
        let setting = "800x600/160;;640x480/160";
        let parsed = parse_overlay_setting(setting);
        assert_eq!(parsed.specs.len(), 2);
        assert_eq!(parsed.specs[1].number, 2);
        assert_eq!(parsed.warnings, vec![ParseWarning::Malformed { setting: setting.to_string() }]);

        let parsed = parse_overlay_setting(";800x600/160;;");
        assert_eq!(parsed.specs.len(), 1);
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_signs_and_spaces_are_not_digits() {
        assert_eq!(parse_mode("+800x600/160"), ModeParse::Unparsable);
        assert_eq!(parse_mode("800x 600/160"), ModeParse::Unparsable);
        assert_eq!(parse_mode("800x600/"), ModeParse::Unparsable);
    }
}
