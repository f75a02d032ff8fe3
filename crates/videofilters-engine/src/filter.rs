//! CSS `filter` property codec.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Numeric state of every filter function the popup controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub blur: f64,
    pub brightness: f64,
    pub contrast: f64,
    pub grayscale: f64,
    pub hue_rotate: f64,
    pub invert: f64,
    pub opacity: f64,
    pub saturate: f64,
    pub sepia: f64,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            blur: 0.0,
            brightness: 1.0,
            contrast: 1.0,
            grayscale: 0.0,
            hue_rotate: 0.0,
            invert: 0.0,
            opacity: 1.0,
            saturate: 1.0,
            sepia: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterField {
    Blur,
    Brightness,
    Contrast,
    Saturate,
    Invert,
    Sepia,
    Opacity,
    Grayscale,
    HueRotate,
}

impl FilterField {
    /// Serialization order of `to_css`.
    pub const ALL: [FilterField; 9] = [
        FilterField::Blur,
        FilterField::Brightness,
        FilterField::Contrast,
        FilterField::Saturate,
        FilterField::Invert,
        FilterField::Sepia,
        FilterField::Opacity,
        FilterField::Grayscale,
        FilterField::HueRotate,
    ];

    /// Settings key (`hueRotate`, ...).
    pub fn key(self) -> &'static str {
        match self {
            FilterField::Blur => "blur",
            FilterField::Brightness => "brightness",
            FilterField::Contrast => "contrast",
            FilterField::Saturate => "saturate",
            FilterField::Invert => "invert",
            FilterField::Sepia => "sepia",
            FilterField::Opacity => "opacity",
            FilterField::Grayscale => "grayscale",
            FilterField::HueRotate => "hueRotate",
        }
    }

    /// CSS function name (`hue-rotate`, ...).
    pub fn css_name(self) -> &'static str {
        match self {
            FilterField::HueRotate => "hue-rotate",
            other => other.key(),
        }
    }

    fn unit(self) -> &'static str {
        match self {
            FilterField::Blur => "px",
            FilterField::HueRotate => "deg",
            _ => "",
        }
    }

    /// Accepts either the settings key or the CSS name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.key().eq_ignore_ascii_case(name) || f.css_name().eq_ignore_ascii_case(name))
    }
}

fn filter_fn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-zA-Z-]+)\(([^)]*)\)").expect("valid filter function regex"))
}

fn opacity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)opacity\([^)]*\)").expect("valid opacity regex"))
}

fn parse_arg(arg: &str) -> Option<f64> {
    let arg = arg.trim();
    if let Some(pct) = arg.strip_suffix('%') {
        return pct.trim().parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v / 100.0);
    }
    let arg = arg
        .strip_suffix("px")
        .or_else(|| arg.strip_suffix("deg"))
        .unwrap_or(arg);
    arg.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

impl FilterState {
    /// Parse an inline `filter` value. Functions that are absent or whose
    /// argument does not parse keep their default.
    pub fn parse(css: &str) -> Self {
        let mut pf = Self::default();
        let mut seen = Vec::new();
        for cap in filter_fn_re().captures_iter(css) {
            let Some(field) = FilterField::ALL
                .into_iter()
                .find(|f| f.css_name().eq_ignore_ascii_case(&cap[1]))
            else {
                continue;
            };
            // first occurrence wins
            if seen.contains(&field) {
                continue;
            }
            seen.push(field);
            if let Some(v) = parse_arg(&cap[2]) {
                pf.set(field, v);
            }
        }
        pf
    }

    pub fn to_css(&self) -> String {
        FilterField::ALL
            .iter()
            .map(|f| format!("{}({}{})", f.css_name(), self.get(*f), f.unit()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn get(&self, field: FilterField) -> f64 {
        match field {
            FilterField::Blur => self.blur,
            FilterField::Brightness => self.brightness,
            FilterField::Contrast => self.contrast,
            FilterField::Saturate => self.saturate,
            FilterField::Invert => self.invert,
            FilterField::Sepia => self.sepia,
            FilterField::Opacity => self.opacity,
            FilterField::Grayscale => self.grayscale,
            FilterField::HueRotate => self.hue_rotate,
        }
    }

    pub fn set(&mut self, field: FilterField, v: f64) {
        let slot = match field {
            FilterField::Blur => &mut self.blur,
            FilterField::Brightness => &mut self.brightness,
            FilterField::Contrast => &mut self.contrast,
            FilterField::Saturate => &mut self.saturate,
            FilterField::Invert => &mut self.invert,
            FilterField::Sepia => &mut self.sepia,
            FilterField::Opacity => &mut self.opacity,
            FilterField::Grayscale => &mut self.grayscale,
            FilterField::HueRotate => &mut self.hue_rotate,
        };
        *slot = v;
    }
}

/// Rewrite every `opacity(...)` component to `opacity(1)`.
pub fn with_opaque(css: &str) -> String {
    opacity_re().replace_all(css, "opacity(1)").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_serializes_in_fixed_order() {
        assert_eq!(
            FilterState::default().to_css(),
            "blur(0px) brightness(1) contrast(1) saturate(1) invert(0) sepia(0) opacity(1) grayscale(0) hue-rotate(0deg)"
        );
    }

    #[test]
    fn parse_handles_units_and_percentages() {
        let pf = FilterState::parse("brightness(150%) blur(4px) hue-rotate(90deg) sepia(0.25)");
        assert_eq!(pf.brightness, 1.5);
        assert_eq!(pf.blur, 4.0);
        assert_eq!(pf.hue_rotate, 90.0);
        assert_eq!(pf.sepia, 0.25);
        assert_eq!(pf.contrast, 1.0);
        assert_eq!(pf.opacity, 1.0);
    }

    #[test]
    fn empty_and_garbage_fall_back_to_defaults() {
        assert_eq!(FilterState::parse(""), FilterState::default());
        assert_eq!(FilterState::parse("none"), FilterState::default());
        let pf = FilterState::parse("contrast(abc) drop-shadow(1px 1px red) invert(1)");
        assert_eq!(pf.contrast, 1.0);
        assert_eq!(pf.invert, 1.0);
    }

    #[test]
    fn non_finite_arguments_keep_defaults() {
        let pf = FilterState::parse("brightness(inf%) contrast(NaN%) blur(infpx) saturate(-inf)");
        assert_eq!(pf, FilterState::default());
        assert!(pf.to_css().contains("brightness(1)"));
    }

    #[test]
    fn fractional_values_are_kept() {
        let pf = FilterState::parse("blur(2.5px) hue-rotate(12.5deg)");
        assert_eq!(pf.blur, 2.5);
        assert_eq!(pf.hue_rotate, 12.5);
    }

    #[test]
    fn serialize_parse_serialize_is_stable() {
        let samples = [
            FilterState::default(),
            FilterState {
                blur: 3.0,
                brightness: 1.35,
                contrast: 0.05,
                grayscale: 1.0,
                hue_rotate: 271.0,
                invert: 0.4,
                opacity: 0.0,
                saturate: 2.95,
                sepia: 0.15,
            },
            FilterState {
                blur: 16.0,
                brightness: 3.0,
                contrast: 3.0,
                grayscale: 0.55,
                hue_rotate: 360.0,
                invert: 1.0,
                opacity: 0.7,
                saturate: 0.0,
                sepia: 1.0,
            },
        ];
        for pf in samples {
            let once = pf.to_css();
            assert_eq!(FilterState::parse(&once).to_css(), once);
            assert_eq!(FilterState::parse(&once), pf);
        }
    }

    #[test]
    fn opacity_is_forced_to_one() {
        let css = "blur(0px) opacity(0.25) grayscale(0)";
        assert_eq!(with_opaque(css), "blur(0px) opacity(1) grayscale(0)");
        assert_eq!(with_opaque("OPACITY(30%)"), "opacity(1)");
        assert_eq!(with_opaque("blur(1px)"), "blur(1px)");
    }

    #[test]
    fn field_lookup_by_key_or_css_name() {
        assert_eq!(FilterField::from_name("hueRotate"), Some(FilterField::HueRotate));
        assert_eq!(FilterField::from_name("hue-rotate"), Some(FilterField::HueRotate));
        assert_eq!(FilterField::from_name("Blur"), Some(FilterField::Blur));
        assert_eq!(FilterField::from_name("saturation"), None);
    }
}
