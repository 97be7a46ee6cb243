//! RGBA colors.

use serde::{Deserialize, Serialize};

/// A color in RGBA format (0-255 per channel).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Return the same color with a different alpha value.
    pub const fn with_alpha(self, a: u8) -> Self {
        Self {
            r: self.r,
            g: self.g,
            b: self.b,
            a,
        }
    }

    /// Channels scaled into `0.0..=1.0`, in shader uniform order.
    pub fn to_normalized(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }

    /// Byte layout used by RGBA8 textures and framebuffer readback.
    pub const fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub const fn from_bytes(b: [u8; 4]) -> Self {
        Self::rgba(b[0], b[1], b[2], b[3])
    }

    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);

    /// Background a freshly pushed render buffer is cleared to. Fully
    /// transparent, so uncovered areas vanish when composited; the magenta
    /// channels make them easy to spot in a raw readback.
    pub const MAGIC: Self = Self::rgba(255, 0, 255, 0);
}
