//! The fixed 8-color dot palette (3 bits per dot).
//!
//! Colors are spread around the hue wheel for maximum perceptual distance on a dark
//! background. Anchors are always pure white and are not part of the palette.

use std::fmt;

/// An RGB color value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// CSS hex string, e.g. `#ff4444`.
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

pub const ANCHOR_COLOR: Color = Color::new(0xFF, 0xFF, 0xFF);

/// Palette indexed by dot value.
pub const PALETTE: [Color; 8] = [
    Color::new(0xFF, 0x44, 0x44), // 000 red
    Color::new(0xFF, 0x8C, 0x00), // 001 orange
    Color::new(0xFF, 0xD7, 0x00), // 010 gold
    Color::new(0x44, 0xFF, 0x44), // 011 green
    Color::new(0x00, 0xCE, 0xD1), // 100 cyan
    Color::new(0x44, 0x88, 0xFF), // 101 blue
    Color::new(0xAA, 0x44, 0xFF), // 110 purple
    Color::new(0xFF, 0x44, 0xFF), // 111 magenta
];
