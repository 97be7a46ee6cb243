//! Sprites and their GPU textures.
//!
//! A [`Sprite`] holds decoded pixel data and lazily uploads it the first
//! time it is drawn. Direct-color pixels are converted to RGBA8 using the
//! sprite's channel masks; paletted pixels are uploaded as raw indices and
//! resolved in the shader through a shared palette texture, so the color
//! key is honored at draw time rather than baked into the upload.

use std::rc::Rc;

use crate::backend::{GpuBackend, TextureDesc, TextureId};
use crate::color::Color;
use crate::error::{Result, VideoError};
use crate::geometry::Size;
use crate::palette::{Palette, PaletteTextureManager};

/// Bit masks locating each channel inside a little-endian direct-color
/// pixel. A zero alpha mask means the pixels are opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelMasks {
    pub r: u32,
    pub g: u32,
    pub b: u32,
    pub a: u32,
}

impl ChannelMasks {
    /// Bytes in R, G, B, A order.
    pub const RGBA8888: Self = Self::new(0x0000_00FF, 0x0000_FF00, 0x00FF_0000, 0xFF00_0000);
    /// Bytes in R, G, B order.
    pub const RGB888: Self = Self::new(0x0000_00FF, 0x0000_FF00, 0x00FF_0000, 0);
    /// Four bytes per pixel with the fourth ignored (framebuffer readback).
    pub const RGBX8888: Self = Self::new(0x0000_00FF, 0x0000_FF00, 0x00FF_0000, 0);
    pub const RGB565: Self = Self::new(0xF800, 0x07E0, 0x001F, 0);

    pub const fn new(r: u32, g: u32, b: u32, a: u32) -> Self {
        Self { r, g, b, a }
    }

    fn decode(&self, pixel: u32) -> Color {
        Color::rgba(
            channel(pixel, self.r, 0),
            channel(pixel, self.g, 0),
            channel(pixel, self.b, 0),
            channel(pixel, self.a, 255),
        )
    }
}

/// Extract the bits under `mask` and widen them to 8 bits.
fn channel(pixel: u32, mask: u32, absent: u8) -> u8 {
    if mask == 0 {
        return absent;
    }
    let shift = mask.trailing_zeros();
    let bits = (mask >> shift).count_ones();
    let value = (pixel & mask) >> shift;
    if bits >= 8 {
        (value >> (bits - 8)) as u8
    } else {
        (value * 255 / ((1 << bits) - 1)) as u8
    }
}

#[derive(Debug, Clone)]
enum PixelData {
    Direct {
        bpp: u8,
        masks: ChannelMasks,
        bytes: Vec<u8>,
    },
    Paletted {
        indices: Vec<u8>,
        palette: Rc<Palette>,
    },
}

/// Decoded pixels plus the GPU textures made from them.
///
/// GPU handles are owned by the sprite and released through
/// `VideoDriver::free_sprite`.
#[derive(Debug)]
pub struct Sprite {
    width: i32,
    height: i32,
    /// Hotspot. `blit_sprite` places the sprite's top-left at the target
    /// position minus this offset.
    pub x_pos: i32,
    pub y_pos: i32,
    data: PixelData,
    color_key: Option<u8>,
    texture: Option<TextureId>,
    mask_texture: Option<TextureId>,
    palette_texture: Option<TextureId>,
    /// Manager epoch the palette reference was taken in.
    palette_epoch: u64,
}

fn check_size(width: i32, height: i32) -> Result<usize> {
    if width <= 0 || height <= 0 {
        return Err(VideoError::InvalidSprite(format!(
            "bad dimensions {width}x{height}"
        )));
    }
    Ok(width as usize * height as usize)
}

impl Sprite {
    /// A direct-color sprite of 16, 24, or 32 bits per pixel.
    pub fn direct(
        width: i32,
        height: i32,
        bpp: u8,
        masks: ChannelMasks,
        bytes: Vec<u8>,
    ) -> Result<Self> {
        if !matches!(bpp, 16 | 24 | 32) {
            return Err(VideoError::InvalidSprite(format!(
                "unsupported direct-color depth {bpp}"
            )));
        }
        let expected = check_size(width, height)? * (bpp as usize / 8);
        if bytes.len() != expected {
            return Err(VideoError::InvalidSprite(format!(
                "expected {expected} bytes of pixel data, got {}",
                bytes.len()
            )));
        }
        Ok(Self::with_data(
            width,
            height,
            PixelData::Direct { bpp, masks, bytes },
        ))
    }

    /// An 8-bit paletted sprite.
    pub fn paletted(width: i32, height: i32, indices: Vec<u8>, palette: Rc<Palette>) -> Result<Self> {
        let expected = check_size(width, height)?;
        if indices.len() != expected {
            return Err(VideoError::InvalidSprite(format!(
                "expected {expected} palette indices, got {}",
                indices.len()
            )));
        }
        Ok(Self::with_data(
            width,
            height,
            PixelData::Paletted { indices, palette },
        ))
    }

    fn with_data(width: i32, height: i32, data: PixelData) -> Self {
        Self {
            width,
            height,
            x_pos: 0,
            y_pos: 0,
            data,
            color_key: None,
            texture: None,
            mask_texture: None,
            palette_texture: None,
            palette_epoch: 0,
        }
    }

    pub fn with_hotspot(mut self, x: i32, y: i32) -> Self {
        self.x_pos = x;
        self.y_pos = y;
        self
    }

    pub fn with_color_key(mut self, key: Option<u8>) -> Self {
        self.color_key = key;
        self
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn bpp(&self) -> u8 {
        match &self.data {
            PixelData::Direct { bpp, .. } => *bpp,
            PixelData::Paletted { .. } => 8,
        }
    }

    pub fn is_paletted(&self) -> bool {
        matches!(self.data, PixelData::Paletted { .. })
    }

    /// Palette index drawn fully transparent.
    pub fn color_key(&self) -> Option<u8> {
        self.color_key
    }

    pub fn palette(&self) -> Option<&Rc<Palette>> {
        match &self.data {
            PixelData::Paletted { palette, .. } => Some(palette),
            PixelData::Direct { .. } => None,
        }
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    pub fn palette_texture(&self) -> Option<TextureId> {
        self.palette_texture
    }

    pub fn mask_texture(&self) -> Option<TextureId> {
        self.mask_texture
    }

    /// Whether any GPU resource is currently held.
    pub fn has_gpu_resources(&self) -> bool {
        self.texture.is_some() || self.mask_texture.is_some() || self.palette_texture.is_some()
    }

    /// Palette indices of a paletted sprite.
    pub fn indices(&self) -> Option<&[u8]> {
        match &self.data {
            PixelData::Paletted { indices, .. } => Some(indices),
            PixelData::Direct { .. } => None,
        }
    }

    /// Color of one pixel. Color-keyed palette entries read as transparent.
    pub fn pixel(&self, x: i32, y: i32) -> Option<Color> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) as usize;
        Some(match &self.data {
            PixelData::Direct { bpp, masks, bytes } => {
                let stride = *bpp as usize / 8;
                masks.decode(read_le(&bytes[i * stride..(i + 1) * stride]))
            }
            PixelData::Paletted { indices, palette } => {
                if self.color_key == Some(indices[i]) {
                    Color::TRANSPARENT
                } else {
                    palette.get(indices[i])
                }
            }
        })
    }

    /// All pixels as top-down RGBA8.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size().area() * 4);
        for y in 0..self.height {
            for x in 0..self.width {
                let c = self.pixel(x, y).unwrap_or(Color::TRANSPARENT);
                out.extend_from_slice(&c.to_bytes());
            }
        }
        out
    }

    fn desc(&self, paletted: bool) -> TextureDesc {
        if paletted {
            TextureDesc::red(self.width as u32, self.height as u32)
        } else {
            TextureDesc::rgba(self.width as u32, self.height as u32)
        }
    }

    /// The color (or index) texture, uploaded on first use.
    pub(crate) fn ensure_texture(&mut self, gpu: &mut dyn GpuBackend) -> Result<TextureId> {
        if let Some(texture) = self.texture {
            return Ok(texture);
        }
        let texture = match &self.data {
            PixelData::Direct { .. } => gpu.create_texture(&self.desc(false), &self.to_rgba())?,
            PixelData::Paletted { indices, .. } => gpu.create_texture(&self.desc(true), indices)?,
        };
        self.texture = Some(texture);
        Ok(texture)
    }

    fn holds_palette(&self, palettes: &PaletteTextureManager) -> bool {
        self.palette_texture.is_some() && self.palette_epoch == palettes.epoch()
    }

    /// The shared palette texture of a paletted sprite.
    pub(crate) fn ensure_palette_texture(
        &mut self,
        gpu: &mut dyn GpuBackend,
        palettes: &mut PaletteTextureManager,
    ) -> Result<Option<TextureId>> {
        if self.holds_palette(palettes) {
            return Ok(self.palette_texture);
        }
        // A handle from before `release_all` is gone along with its reference.
        self.palette_texture = None;
        let PixelData::Paletted { palette, .. } = &self.data else {
            return Ok(None);
        };
        let texture = palettes.acquire(gpu, palette)?;
        self.palette_texture = Some(texture);
        self.palette_epoch = palettes.epoch();
        Ok(self.palette_texture)
    }

    /// Single-channel coverage texture for using this sprite as a mask.
    pub(crate) fn ensure_mask_texture(&mut self, gpu: &mut dyn GpuBackend) -> Result<TextureId> {
        if let Some(texture) = self.mask_texture {
            return Ok(texture);
        }
        let coverage: Vec<u8> = match &self.data {
            PixelData::Direct { .. } => (0..self.height)
                .flat_map(|y| (0..self.width).map(move |x| (x, y)))
                .map(|(x, y)| self.pixel(x, y).map_or(0, |c| c.a))
                .collect(),
            PixelData::Paletted { indices, .. } => indices
                .iter()
                .map(|&i| if self.color_key == Some(i) { 0 } else { 255 })
                .collect(),
        };
        let texture = gpu.create_texture(&self.desc(true), &coverage)?;
        self.mask_texture = Some(texture);
        Ok(texture)
    }

    /// Swap in a new palette. The old palette reference is returned to the
    /// manager; the new one is acquired on the next draw.
    pub(crate) fn replace_palette(
        &mut self,
        gpu: &mut dyn GpuBackend,
        palettes: &mut PaletteTextureManager,
        new_palette: Rc<Palette>,
    ) -> Result<()> {
        let PixelData::Paletted { palette, .. } = &mut self.data else {
            return Err(VideoError::InvalidSprite(
                "direct-color sprites have no palette".into(),
            ));
        };
        if self.palette_texture.is_some() && self.palette_epoch == palettes.epoch() {
            palettes.release(gpu, palette);
        }
        self.palette_texture = None;
        *palette = new_palette;
        Ok(())
    }

    /// Delete owned textures and drop the palette reference.
    pub(crate) fn release(&mut self, gpu: &mut dyn GpuBackend, palettes: &mut PaletteTextureManager) {
        for texture in [self.texture.take(), self.mask_texture.take()]
            .into_iter()
            .flatten()
        {
            gpu.delete_texture(texture);
        }
        if self.holds_palette(palettes)
            && let PixelData::Paletted { palette, .. } = &self.data
        {
            palettes.release(gpu, palette);
        }
        self.palette_texture = None;
    }
}

fn read_le(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .rev()
        .fold(0u32, |acc, &b| (acc << 8) | b as u32)
}
