//! Render buffers and their state machine.
//!
//! Every buffer draws into the same physical back buffer, anchored at the
//! native origin with a buffer-sized viewport. Before another buffer takes
//! over, the pixels are copied into a CPU backing store (`Backup`). At
//! composition time the store is uploaded as a texture (`Texturized`) and
//! drawn at the buffer's place on screen, then dropped again (`New`).
//!
//! ```text
//!  New --enable--> Active --backup--> Backup --prepare--> Texturized
//!   ^                ^                  |                     |
//!   |                +-----enable-------+----------<----------+
//!   +-------------------------clear-------------------------+
//! ```

use glam::{Mat4, Vec3};

use crate::backend::{
    GpuBackend, Primitive, ProgramId, RowOrder, SPRITE_LAYOUT, TextureDesc, TextureId,
    UniformValue,
};
use crate::color::Color;
use crate::error::{Result, VideoError};
use crate::geometry::{Region, Size};
use crate::shader::TEXTURE_UNIT;
use crate::video::BufferFormat;

/// Lifecycle of a [`RenderBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Nothing captured, no texture.
    New,
    /// The current draw target.
    Active,
    /// Pixels captured into the backing store.
    Backup,
    /// Backing store uploaded; ready for composition.
    Texturized,
}

/// Refuse formats the GPU backends can't hold.
pub fn check_format(format: BufferFormat) -> Result<()> {
    if format.is_supported() {
        Ok(())
    } else {
        log::error!("16bit mode is not supported!");
        Err(VideoError::UnsupportedFormat(format))
    }
}

/// Maps `(0, 0)..(w, h)` with y pointing down onto clip space.
pub fn ortho(size: Size) -> Mat4 {
    let (w, h) = (size.w as f32, size.h as f32);
    Mat4::from_cols_array(&[
        2.0 / w, 0.0, 0.0, 0.0, //
        0.0, -2.0 / h, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        -1.0, 1.0, 0.0, 1.0,
    ])
}

/// Corner positions of `r` in triangle-strip order: top-left, top-right,
/// bottom-left, bottom-right.
pub fn quad_positions(r: Region) -> [f32; 8] {
    let (x, y) = (r.x as f32, r.y as f32);
    let (x2, y2) = ((r.x + r.w) as f32, (r.y + r.h) as f32);
    [x, y, x2, y, x, y2, x2, y2]
}

/// Interleave strip positions with texture coordinates for `SPRITE_LAYOUT`.
pub fn interleave(positions: &[f32; 8], tex: &[f32; 8]) -> [f32; 16] {
    let mut out = [0.0; 16];
    for v in 0..4 {
        out[v * 4] = positions[v * 2];
        out[v * 4 + 1] = positions[v * 2 + 1];
        out[v * 4 + 2] = tex[v * 2];
        out[v * 4 + 3] = tex[v * 2 + 1];
    }
    out
}

/// Texture coordinates for sampling a whole captured buffer, matching the
/// row order its backing store was read in.
fn store_tex_coords(order: RowOrder) -> [f32; 8] {
    match order {
        RowOrder::BottomUp => [0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
        RowOrder::TopDown => [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
    }
}

/// An offscreen render target.
#[derive(Debug)]
pub struct RenderBuffer {
    rect: Region,
    parent: Region,
    format: BufferFormat,
    program: ProgramId,
    pixels: Vec<u8>,
    texture: Option<TextureId>,
    matrix: Mat4,
    state: BufferState,
    drawn: bool,
}

impl RenderBuffer {
    /// `rect` is relative to `parent`; `program` composites the buffer.
    pub fn new(
        rect: Region,
        parent: Region,
        format: BufferFormat,
        program: ProgramId,
    ) -> Result<Self> {
        check_format(format)?;
        if rect.is_empty() {
            return Err(VideoError::InvalidBuffer(format!(
                "empty buffer rectangle {}x{}",
                rect.w, rect.h
            )));
        }
        log::debug!(
            "New {format} render buffer {}x{} at ({}, {})",
            rect.w,
            rect.h,
            rect.x,
            rect.y
        );
        Ok(Self {
            rect,
            parent,
            format,
            program,
            pixels: vec![0; rect.size().area() * 4],
            texture: None,
            matrix: ortho(rect.size()),
            state: BufferState::New,
            drawn: false,
        })
    }

    pub fn rect(&self) -> Region {
        self.rect
    }

    pub fn parent(&self) -> Region {
        self.parent
    }

    pub fn format(&self) -> BufferFormat {
        self.format
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    /// The texture handle; present exactly while `Texturized`.
    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    /// RGBA8 backing store, rows in the backend's native order.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Projection for drawing in buffer-local coordinates.
    pub fn matrix(&self) -> &Mat4 {
        &self.matrix
    }

    fn local_bounds(&self) -> Region {
        Region::from_size(self.rect.size())
    }

    /// Note that something was drawn since the last clear.
    pub fn mark_drawn(&mut self) {
        self.drawn = true;
    }

    /// Make this buffer the draw target. Captured contents are put back on
    /// the surface first so drawing continues on top of them.
    pub fn enable(&mut self, gpu: &mut dyn GpuBackend) -> Result<()> {
        if self.state == BufferState::Active {
            return Ok(());
        }
        gpu.set_viewport(self.rect.size());
        if matches!(self.state, BufferState::Backup | BufferState::Texturized) {
            self.restore(gpu)?;
        }
        self.state = BufferState::Active;
        Ok(())
    }

    fn restore(&mut self, gpu: &mut dyn GpuBackend) -> Result<()> {
        let existing = self.texture.take();
        if !self.drawn {
            if let Some(texture) = existing {
                gpu.delete_texture(texture);
            }
            gpu.clear(Some(self.local_bounds()), Color::MAGIC);
            return Ok(());
        }
        let texture = match existing {
            Some(texture) => texture,
            None => self.upload(gpu)?,
        };
        gpu.set_blending(false);
        let drawn = self.draw_store(gpu, texture, self.matrix, self.local_bounds());
        gpu.set_blending(true);
        gpu.delete_texture(texture);
        drawn
    }

    /// Capture the surface into the backing store. Only valid while
    /// `Active`; other states are left untouched.
    pub fn backup(&mut self, gpu: &mut dyn GpuBackend) -> Result<()> {
        if self.state != BufferState::Active {
            log::warn!("Ignoring backup of a {:?} render buffer", self.state);
            return Ok(());
        }
        let pixels = gpu.read_pixels(self.local_bounds())?;
        if pixels.len() != self.pixels.len() {
            return Err(VideoError::Backend(format!(
                "read back {} bytes for a {}x{} buffer",
                pixels.len(),
                self.rect.w,
                self.rect.h
            )));
        }
        self.pixels = pixels;
        self.state = BufferState::Backup;
        Ok(())
    }

    fn upload(&self, gpu: &mut dyn GpuBackend) -> Result<TextureId> {
        let desc = TextureDesc::rgba(self.rect.w as u32, self.rect.h as u32);
        gpu.create_texture(&desc, &self.pixels)
    }

    /// Bring the buffer to `Texturized`, capturing first if still `Active`.
    /// A `New` buffer has nothing to show and stays `New`.
    pub fn prepare_to_render(&mut self, gpu: &mut dyn GpuBackend) -> Result<()> {
        match self.state {
            BufferState::Active => {
                self.backup(gpu)?;
                self.texturize(gpu)
            }
            BufferState::Backup => self.texturize(gpu),
            BufferState::New | BufferState::Texturized => Ok(()),
        }
    }

    fn texturize(&mut self, gpu: &mut dyn GpuBackend) -> Result<()> {
        if let Some(stale) = self.texture.take() {
            gpu.delete_texture(stale);
        }
        self.texture = Some(self.upload(gpu)?);
        self.state = BufferState::Texturized;
        Ok(())
    }

    /// Draw the texture at the buffer's place on a `screen`-sized viewport.
    /// Returns `false` without drawing unless `Texturized`.
    pub fn render_on_display(&self, gpu: &mut dyn GpuBackend, screen: Size) -> Result<bool> {
        let (BufferState::Texturized, Some(texture)) = (self.state, self.texture) else {
            return Ok(false);
        };
        let matrix = ortho(screen)
            * Mat4::from_translation(Vec3::new(self.parent.x as f32, self.parent.y as f32, 0.0));
        self.draw_store(gpu, texture, matrix, self.rect)?;
        Ok(true)
    }

    fn draw_store(
        &self,
        gpu: &mut dyn GpuBackend,
        texture: TextureId,
        matrix: Mat4,
        dst: Region,
    ) -> Result<()> {
        gpu.use_program(self.program);
        gpu.set_uniform(self.program, "u_matrix", UniformValue::Mat4(matrix.to_cols_array()));
        gpu.set_uniform(self.program, "u_alphaModifier", UniformValue::Float(1.0));
        gpu.set_uniform(
            self.program,
            "u_tint",
            UniformValue::Vec4(Color::WHITE.to_normalized()),
        );
        gpu.bind_texture(TEXTURE_UNIT, Some(texture));
        let vertices = interleave(
            &quad_positions(dst),
            &store_tex_coords(gpu.readback_order()),
        );
        gpu.draw_arrays(Primitive::TriangleStrip, SPRITE_LAYOUT, &vertices)
    }

    /// Drop any texture and return to `New`, whatever the current state.
    pub fn clear(&mut self, gpu: &mut dyn GpuBackend) {
        if let Some(texture) = self.texture.take() {
            gpu.delete_texture(texture);
        }
        self.state = BufferState::New;
        self.drawn = false;
    }

    /// Write top-down RGBA rows into the backing store at `region`
    /// (buffer-local). Lands in `Backup` so the next preparation uploads
    /// the new contents.
    pub fn copy_pixels(
        &mut self,
        gpu: &mut dyn GpuBackend,
        region: Region,
        rgba: &[u8],
    ) -> Result<()> {
        if region.is_empty() || self.local_bounds().intersect(&region) != Some(region) {
            return Err(VideoError::InvalidBuffer(format!(
                "copy region {region:?} outside {}x{} buffer",
                self.rect.w, self.rect.h
            )));
        }
        if rgba.len() != region.size().area() * 4 {
            return Err(VideoError::InvalidBuffer(format!(
                "expected {} bytes of pixels, got {}",
                region.size().area() * 4,
                rgba.len()
            )));
        }
        if self.state == BufferState::Active {
            self.backup(gpu)?;
        }
        if let Some(texture) = self.texture.take() {
            gpu.delete_texture(texture);
        }

        let order = gpu.readback_order();
        let stride = self.rect.w as usize * 4;
        let row_len = region.w as usize * 4;
        for (row, src) in rgba.chunks_exact(row_len).enumerate() {
            let y = region.y + row as i32;
            let store_y = match order {
                RowOrder::TopDown => y,
                RowOrder::BottomUp => self.rect.h - 1 - y,
            } as usize;
            let start = store_y * stride + region.x as usize * 4;
            self.pixels[start..start + row_len].copy_from_slice(src);
        }
        self.drawn = true;
        self.state = BufferState::Backup;
        Ok(())
    }

    /// Free the GPU texture before the buffer goes away.
    pub fn release(&mut self, gpu: &mut dyn GpuBackend) {
        self.clear(gpu);
        log::debug!("Released render buffer {}x{}", self.rect.w, self.rect.h);
    }
}
