//! RGB colors for the indicator ring.

use std::fmt;

/// An RGB triple as written to the indicator driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(0xFF, 0xFF, 0xFF);
    pub const GREEN: Color = Color::rgb(0x20, 0xFF, 0x20);
    pub const RED: Color = Color::rgb(0xFF, 0x20, 0x20);
    /// All channels off.
    pub const BLACK: Color = Color::rgb(0x00, 0x00, 0x00);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    /// Protocol name for one of the four payload colors, if it is one.
    pub fn name(&self) -> Option<&'static str> {
        match *self {
            Color::WHITE => Some("white"),
            Color::GREEN => Some("green"),
            Color::RED => Some("red"),
            Color::BLACK => Some("black"),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_color(*self))
    }
}

/// Parse a color string.
///
/// Accepts:
/// - Named: `"white"`, `"green"`, `"red"`, `"black"` / `"off"`
/// - Hex: `"#20FF20"`, `"20ff20"`
pub fn parse_color(s: &str) -> crate::error::Result<Color> {
    let s = s.trim();

    match s.to_lowercase().as_str() {
        "white" => return Ok(Color::WHITE),
        "green" => return Ok(Color::GREEN),
        "red" => return Ok(Color::RED),
        "black" | "off" => return Ok(Color::BLACK),
        _ => {}
    }

    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 {
        return Err(crate::GltchError::Color(format!(
            "Invalid color: {s} (use #RRGGBB or a color name)"
        )));
    }
    let val = u32::from_str_radix(hex, 16)
        .map_err(|_| crate::GltchError::Color(format!("Invalid hex color: {s}")))?;
    Ok(Color::rgb(
        ((val >> 16) & 0xFF) as u8,
        ((val >> 8) & 0xFF) as u8,
        (val & 0xFF) as u8,
    ))
}

/// Format a color as `#RRGGBB`.
pub fn format_color(c: Color) -> String {
    format!("#{:02X}{:02X}{:02X}", c.r, c.g, c.b)
}
