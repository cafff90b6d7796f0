use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GifwError;

/// RGBA color of a feature style.
///
/// Serialized as a CSS hex string (`#RRGGBBAA`). Parsing accepts `#RGB`, `#RRGGBB`, `#RRGGBBAA`
/// and the CSS `rgb()`/`rgba()` notation the style configurator produces.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

impl Color {
    /// `#00000000`
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    /// `#FFFFFFFF`
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    /// `#FF0000FF`
    pub const RED: Color = Color::rgba(255, 0, 0, 255);
    /// Default color of annotations and measurements.
    pub const ACCENT: Color = Color::rgba(0x33, 0x88, 0xFF, 255);

    /// Color from its channels.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// CSS `rgba()` expression with the alpha rounded to two decimals.
    pub fn to_css(&self) -> String {
        let alpha = (self.a as f64 / 255.0 * 100.0).round() / 100.0;
        format!("rgba({}, {}, {}, {alpha})", self.r, self.g, self.b)
    }

    /// KML color string. KML orders the channels `aabbggrr`.
    pub fn to_kml(&self) -> String {
        format!("{:02x}{:02x}{:02x}{:02x}", self.a, self.b, self.g, self.r)
    }

    /// Copy of the color with the alpha set from an opacity percentage.
    pub fn with_opacity(&self, opacity: u8) -> Self {
        let alpha = (opacity.min(100) as f64 / 100.0 * 255.0).round() as u8;
        Self { a: alpha, ..*self }
    }

    /// Opacity in percent.
    pub fn opacity(&self) -> u8 {
        (self.a as f64 / 255.0 * 100.0).round() as u8
    }

    /// Alpha is zero.
    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }

    fn parse_hex(digits: &str) -> Option<Self> {
        if !digits.is_ascii() {
            return None;
        }

        let channel = |i: usize| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok();
        match digits.len() {
            3 => {
                let short = |i: usize| u8::from_str_radix(digits.get(i..i + 1)?, 16).ok();
                Some(Self::rgba(short(0)? * 17, short(1)? * 17, short(2)? * 17, 255))
            }
            6 => Some(Self::rgba(channel(0)?, channel(2)?, channel(4)?, 255)),
            8 => Some(Self::rgba(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }

    fn parse_css(args: &str) -> Option<Self> {
        let parts: Vec<&str> = args.split(',').map(str::trim).collect();
        let alpha = match parts.len() {
            3 => 255,
            4 => {
                let alpha: f64 = parts[3].parse().ok()?;
                if !(0.0..=1.0).contains(&alpha) {
                    return None;
                }
                (alpha * 255.0).round() as u8
            }
            _ => return None,
        };

        Some(Self::rgba(
            parts[0].parse().ok()?,
            parts[1].parse().ok()?,
            parts[2].parse().ok()?,
            alpha,
        ))
    }
}

impl FromStr for Color {
    type Err = GifwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = if let Some(digits) = s.strip_prefix('#') {
            Self::parse_hex(digits)
        } else if let Some(args) = s
            .strip_prefix("rgba(")
            .or_else(|| s.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            Self::parse_css(args)
        } else {
            None
        };

        parsed.ok_or_else(|| GifwError::Decoding(format!("invalid color: {s}")))
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
    }
}

impl TryFrom<String> for Color {
    type Error = GifwError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(val: Color) -> Self {
        val.to_string()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn hex_notations() {
        assert_eq!("#f0a".parse::<Color>().unwrap(), Color::rgba(255, 0, 170, 255));
        assert_eq!("#3388FF".parse::<Color>().unwrap(), Color::ACCENT);
        let color: Color = "#FF1000AA".parse().unwrap();
        assert_eq!(color.to_string(), "#FF1000AA");
        assert_matches!("f0a".parse::<Color>(), Err(GifwError::Decoding(_)));
        assert_matches!("#f0a1".parse::<Color>(), Err(GifwError::Decoding(_)));
    }

    #[test]
    fn css_notations() {
        assert_eq!(
            "rgb(17, 34, 51)".parse::<Color>().unwrap(),
            Color::rgba(17, 34, 51, 255)
        );
        assert_eq!(
            "rgba(17,34,51,0.5)".parse::<Color>().unwrap(),
            Color::rgba(17, 34, 51, 128)
        );
        assert!("rgba(17, 34, 51, 2)".parse::<Color>().is_err());
        assert!("rgb(300, 0, 0)".parse::<Color>().is_err());
    }

    #[test]
    fn opacity_and_kml() {
        let color = Color::rgba(0x11, 0x22, 0x33, 255).with_opacity(50);
        assert_eq!(color.opacity(), 50);
        assert_eq!(color.to_kml(), "80332211");
        assert_eq!(color.to_css(), "rgba(17, 34, 51, 0.5)");
    }

    #[test]
    fn deserializes_from_style_json() {
        let color: Color = serde_json::from_str(r##""rgba(51, 136, 255, 1)""##).unwrap();
        assert_eq!(color, Color::ACCENT);
        assert_eq!(serde_json::to_string(&color).unwrap(), r##""#3388FFFF""##);
        assert!(serde_json::from_str::<Color>(r#""blue""#).is_err());
    }
}
