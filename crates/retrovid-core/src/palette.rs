//! Palettes and their shared GPU textures.
//!
//! Many sprites share a palette (every frame of an animation, every
//! creature of one type). The manager keeps one 256x1 RGBA texture per
//! distinct palette and counts the sprites using it.

use std::collections::HashMap;

use crate::backend::{GpuBackend, TextureDesc, TextureId};
use crate::color::Color;
use crate::error::Result;

pub const PALETTE_SIZE: usize = 256;

/// 256 colors indexed by a sprite's 8-bit pixels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Palette {
    colors: [Color; PALETTE_SIZE],
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: [Color::BLACK; PALETTE_SIZE],
        }
    }
}

impl Palette {
    /// Build from up to 256 colors; missing entries are opaque black.
    pub fn new(colors: &[Color]) -> Self {
        let mut palette = Self::default();
        for (slot, c) in palette.colors.iter_mut().zip(colors) {
            *slot = *c;
        }
        palette
    }

    /// A ramp from black to `tint`, handy for tests and demos.
    pub fn gradient(tint: Color) -> Self {
        let mut palette = Self::default();
        for (i, slot) in palette.colors.iter_mut().enumerate() {
            let scale = |c: u8| (c as usize * i / (PALETTE_SIZE - 1)) as u8;
            *slot = Color::rgb(scale(tint.r), scale(tint.g), scale(tint.b));
        }
        palette
    }

    pub fn colors(&self) -> &[Color; PALETTE_SIZE] {
        &self.colors
    }

    pub fn get(&self, index: u8) -> Color {
        self.colors[index as usize]
    }

    pub fn set(&mut self, index: u8, color: Color) {
        self.colors[index as usize] = color;
    }

    /// Texel bytes for the 256x1 RGBA palette texture.
    pub fn to_texture_bytes(&self) -> Vec<u8> {
        self.colors.iter().flat_map(|c| c.to_bytes()).collect()
    }
}

#[derive(Debug)]
struct Entry {
    texture: TextureId,
    refs: usize,
}

/// Reference-counted palette textures keyed by palette contents.
#[derive(Debug, Default)]
pub struct PaletteTextureManager {
    entries: HashMap<Palette, Entry>,
    epoch: u64,
}

impl PaletteTextureManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Texture for `palette`, uploading it on first use. Each call takes
    /// one reference that must be returned with [`release`](Self::release).
    pub fn acquire(&mut self, gpu: &mut dyn GpuBackend, palette: &Palette) -> Result<TextureId> {
        if let Some(entry) = self.entries.get_mut(palette) {
            entry.refs += 1;
            return Ok(entry.texture);
        }
        let desc = TextureDesc::rgba(PALETTE_SIZE as u32, 1);
        let texture = gpu.create_texture(&desc, &palette.to_texture_bytes())?;
        self.entries
            .insert(palette.clone(), Entry { texture, refs: 1 });
        Ok(texture)
    }

    /// Drop one reference. Returns `true` when the texture was freed.
    pub fn release(&mut self, gpu: &mut dyn GpuBackend, palette: &Palette) -> bool {
        let Some(entry) = self.entries.get_mut(palette) else {
            log::warn!("Released a palette texture that was never acquired");
            return false;
        };
        entry.refs -= 1;
        if entry.refs > 0 {
            return false;
        }
        if let Some(entry) = self.entries.remove(palette) {
            gpu.delete_texture(entry.texture);
        }
        true
    }

    pub fn ref_count(&self, palette: &Palette) -> usize {
        self.entries.get(palette).map_or(0, |e| e.refs)
    }

    pub fn texture_count(&self) -> usize {
        self.entries.len()
    }

    /// Bumped by every [`release_all`](Self::release_all); references taken
    /// in an earlier epoch are void.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Free every texture regardless of outstanding references.
    pub fn release_all(&mut self, gpu: &mut dyn GpuBackend) {
        for (_, entry) in self.entries.drain() {
            gpu.delete_texture(entry.texture);
        }
        self.epoch += 1;
    }
}
