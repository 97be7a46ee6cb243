//! Render buffer formats and blit flags.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Pixel layout requested for a render buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferFormat {
    /// 16-bit 5-5-5. Not representable by the GPU backends.
    Rgb555,
    /// 32-bit RGBA.
    Rgba8888,
    /// Planar YUV, used by movie playback surfaces.
    Yv12,
    /// Same layout as the display, opaque.
    Display,
    /// Same layout as the display, with alpha.
    DisplayAlpha,
}

impl BufferFormat {
    /// Whether the GPU backends can back a buffer of this format.
    pub const fn is_supported(self) -> bool {
        !matches!(self, BufferFormat::Rgb555)
    }
}

impl fmt::Display for BufferFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BufferFormat::Rgb555 => "RGB555",
            BufferFormat::Rgba8888 => "RGBA8888",
            BufferFormat::Yv12 => "YV12",
            BufferFormat::Display => "DISPLAY",
            BufferFormat::DisplayAlpha => "DISPLAY_ALPHA",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Per-blit rendering options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlitFlags: u32 {
        /// Draw at half opacity.
        const HALFTRANS = 0x0000_0002;
        /// Mirror horizontally.
        const MIRRORX = 0x0000_0010;
        /// Mirror vertically.
        const MIRRORY = 0x0000_0020;
        /// Skip the shadow color entirely.
        const NOSHADOW = 0x0000_1000;
        /// Draw the shadow color translucent.
        const TRANSSHADOW = 0x0000_2000;
        /// Greyscale post-process (paletted sprites only).
        const GREY = 0x0008_0000;
        /// Sepia post-process (paletted sprites only).
        const SEPIA = 0x0200_0000;
    }
}

/// How the shadow palette entry is drawn. Uploaded as `u_shadowMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowMode {
    None = 0,
    Normal = 1,
    Translucent = 2,
}

impl BlitFlags {
    /// Alpha multiplier applied on top of the sprite's own alpha.
    pub fn alpha_modifier(self) -> f32 {
        if self.contains(BlitFlags::HALFTRANS) {
            0.5
        } else {
            1.0
        }
    }

    /// `NOSHADOW` wins over `TRANSSHADOW` when both are set.
    pub fn shadow_mode(self) -> ShadowMode {
        if self.contains(BlitFlags::NOSHADOW) {
            ShadowMode::None
        } else if self.contains(BlitFlags::TRANSSHADOW) {
            ShadowMode::Translucent
        } else {
            ShadowMode::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rgb555_is_unsupported() {
        assert!(!BufferFormat::Rgb555.is_supported());
        for f in [
            BufferFormat::Rgba8888,
            BufferFormat::Yv12,
            BufferFormat::Display,
            BufferFormat::DisplayAlpha,
        ] {
            assert!(f.is_supported(), "{f} should be supported");
        }
    }

    #[test]
    fn format_display_names() {
        assert_eq!(BufferFormat::Rgb555.to_string(), "RGB555");
        assert_eq!(BufferFormat::DisplayAlpha.to_string(), "DISPLAY_ALPHA");
    }

    #[test]
    fn alpha_modifier_half_when_halftrans() {
        assert_eq!(BlitFlags::HALFTRANS.alpha_modifier(), 0.5);
        assert_eq!(
            (BlitFlags::HALFTRANS | BlitFlags::MIRRORX).alpha_modifier(),
            0.5
        );
    }

    #[test]
    fn alpha_modifier_default_is_one() {
        assert_eq!(BlitFlags::empty().alpha_modifier(), 1.0);
        assert_eq!(BlitFlags::GREY.alpha_modifier(), 1.0);
    }

    #[test]
    fn shadow_mode_tri_state() {
        assert_eq!(BlitFlags::empty().shadow_mode(), ShadowMode::Normal);
        assert_eq!(BlitFlags::NOSHADOW.shadow_mode(), ShadowMode::None);
        assert_eq!(
            BlitFlags::TRANSSHADOW.shadow_mode(),
            ShadowMode::Translucent
        );
        assert_eq!(
            (BlitFlags::NOSHADOW | BlitFlags::TRANSSHADOW).shadow_mode(),
            ShadowMode::None
        );
    }

    #[test]
    fn shadow_mode_uniform_values() {
        assert_eq!(ShadowMode::None as i32, 0);
        assert_eq!(ShadowMode::Normal as i32, 1);
        assert_eq!(ShadowMode::Translucent as i32, 2);
    }
}
