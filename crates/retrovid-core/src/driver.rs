//! The drawing and compositing driver.
//!
//! [`VideoDriver`] owns every render buffer, the stack of buffers being
//! drawn into, the shader registry, and the palette textures. Callers draw
//! into whatever buffer is on top of the stack; once per frame
//! [`swap_buffers`](VideoDriver::swap_buffers) composites a chosen set of
//! buffers onto the display and presents it.

use std::rc::Rc;

use crate::backend::{
    GpuBackend, PRIMITIVE_LAYOUT, Primitive, RowOrder, SPRITE_LAYOUT, UniformValue,
    WindowControl,
};
use crate::buffer::{self, BufferState, RenderBuffer, interleave, quad_positions};
use crate::color::Color;
use crate::config::VideoConfig;
use crate::error::{Result, VideoError};
use crate::geometry::{Point, Region, Size};
use crate::palette::{Palette, PaletteTextureManager};
use crate::shader::{MASK_UNIT, PALETTE_UNIT, ShaderKind, ShaderRegistry, TEXTURE_UNIT};
use crate::sprite::{ChannelMasks, Sprite};
use crate::video::{BlitFlags, BufferFormat};

/// Handle to a render buffer owned by a [`VideoDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(usize);

/// Normalized texture coordinates of `src` inside a `sprite`-sized texture,
/// in strip order, with mirroring applied.
pub fn texture_coords(src: Region, sprite: Size, flags: BlitFlags) -> [f32; 8] {
    let (w, h) = (sprite.w as f32, sprite.h as f32);
    let x = src.x as f32 / w;
    let y = src.y as f32 / h;
    let x2 = src.right() as f32 / w;
    let y2 = src.bottom() as f32 / h;
    let mut coords = [x, y, x2, y, x, y2, x2, y2];
    if flags.contains(BlitFlags::MIRRORX) {
        coords.swap(0, 2);
        coords.swap(4, 6);
    }
    if flags.contains(BlitFlags::MIRRORY) {
        coords.swap(1, 5);
        coords.swap(3, 7);
    }
    coords
}

/// Program used to blit a sprite. Greyscale and sepia apply to paletted
/// sprites only.
pub fn sprite_program(paletted: bool, flags: BlitFlags) -> ShaderKind {
    if !paletted {
        ShaderKind::SpriteRgba
    } else if flags.contains(BlitFlags::GREY) {
        ShaderKind::SpritePalGray
    } else if flags.contains(BlitFlags::SEPIA) {
        ShaderKind::SpritePalSepia
    } else {
        ShaderKind::SpritePal
    }
}

/// Clip `dst` to `bounds` and return the matching `(src, dst)` pair, with
/// `src` relative to the sprite. Mirrored axes trim from the opposite side.
pub fn clip_blit(dst: Region, bounds: Region, flags: BlitFlags) -> Option<(Region, Region)> {
    let clipped = dst.intersect(&bounds)?;
    let left = clipped.x - dst.x;
    let right = dst.right() - clipped.right();
    let top = clipped.y - dst.y;
    let bottom = dst.bottom() - clipped.bottom();
    let sx = if flags.contains(BlitFlags::MIRRORX) {
        right
    } else {
        left
    };
    let sy = if flags.contains(BlitFlags::MIRRORY) {
        bottom
    } else {
        top
    };
    Some((Region::new(sx, sy, clipped.w, clipped.h), clipped))
}

fn slot(buffers: &mut [Option<RenderBuffer>], id: BufferId) -> Result<&mut RenderBuffer> {
    buffers
        .get_mut(id.0)
        .and_then(Option::as_mut)
        .ok_or_else(|| VideoError::InvalidBuffer(format!("unknown buffer {}", id.0)))
}

/// Backend-agnostic video driver.
pub struct VideoDriver<B: GpuBackend> {
    backend: B,
    screen: Size,
    shaders: ShaderRegistry,
    palettes: PaletteTextureManager,
    buffers: Vec<Option<RenderBuffer>>,
    stack: Vec<BufferId>,
    display: BufferId,
}

impl<B: GpuBackend> VideoDriver<B> {
    /// Take over `backend`, create the display buffer covering its whole
    /// drawable, and make it the bottom of the drawing stack.
    pub fn new(backend: B, config: &VideoConfig) -> Result<Self> {
        let screen = backend.drawable_size();
        if screen.w <= 0 || screen.h <= 0 {
            return Err(VideoError::Backend(format!(
                "drawable has no area ({}x{})",
                screen.w, screen.h
            )));
        }
        let mut driver = Self {
            backend,
            screen,
            shaders: ShaderRegistry::new(config.shader_dir.clone()),
            palettes: PaletteTextureManager::new(),
            buffers: Vec::new(),
            stack: Vec::new(),
            display: BufferId(0),
        };
        let display = driver.create_buffer(Region::from_size(screen), BufferFormat::DisplayAlpha)?;
        driver.display = display;
        driver.push_drawing_buffer(display)?;
        log::info!("Created {}x{} display", screen.w, screen.h);
        Ok(driver)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn screen_size(&self) -> Size {
        self.screen
    }

    pub fn shaders(&self) -> &ShaderRegistry {
        &self.shaders
    }

    pub fn palettes(&self) -> &PaletteTextureManager {
        &self.palettes
    }

    /// The bottom buffer, created with the driver.
    pub fn display_buffer(&self) -> BufferId {
        self.display
    }

    /// The buffer draws currently go to.
    pub fn current_buffer(&self) -> BufferId {
        self.stack.last().copied().unwrap_or(self.display)
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn buffer(&self, id: BufferId) -> Option<&RenderBuffer> {
        self.buffers.get(id.0).and_then(Option::as_ref)
    }

    /// Create a buffer. `rect` is relative to its parent: the screen, or
    /// the current buffer when something is already pushed over the
    /// display. The stored parent region is in screen coordinates.
    pub fn create_buffer(&mut self, rect: Region, format: BufferFormat) -> Result<BufferId> {
        buffer::check_format(format)?;
        let parent = if self.stack.len() > 1 {
            let id = self.current_buffer();
            let top = slot(&mut self.buffers, id)?;
            let origin = top.parent().origin();
            top.rect().offset(origin.x, origin.y)
        } else {
            Region::from_size(self.screen)
        };
        let program = self
            .shaders
            .get_or_compile(&mut self.backend, ShaderKind::SpriteBackbuffer)?;
        let buf = RenderBuffer::new(rect, parent, format, program)?;

        let id = match self.buffers.iter().position(Option::is_none) {
            Some(free) => {
                self.buffers[free] = Some(buf);
                BufferId(free)
            }
            None => {
                self.buffers.push(Some(buf));
                BufferId(self.buffers.len() - 1)
            }
        };
        log::debug!("Created render buffer {} ({}x{})", id.0, rect.w, rect.h);
        Ok(id)
    }

    /// Release a buffer and its texture. Buffers on the stack are refused.
    pub fn destroy_buffer(&mut self, id: BufferId) -> Result<()> {
        if self.stack.contains(&id) {
            return Err(VideoError::InvalidBuffer(format!(
                "buffer {} is still on the drawing stack",
                id.0
            )));
        }
        slot(&mut self.buffers, id)?.release(&mut self.backend);
        self.buffers[id.0] = None;
        Ok(())
    }

    /// Make `id` the draw target. The buffer below is captured first, and
    /// the new target starts out cleared to [`Color::MAGIC`].
    pub fn push_drawing_buffer(&mut self, id: BufferId) -> Result<()> {
        if self.stack.contains(&id) {
            return Err(VideoError::InvalidBuffer(format!(
                "buffer {} is already on the drawing stack",
                id.0
            )));
        }
        slot(&mut self.buffers, id)?;
        if let Some(&top) = self.stack.last() {
            slot(&mut self.buffers, top)?.backup(&mut self.backend)?;
        }
        self.stack.push(id);

        let buf = slot(&mut self.buffers, id)?;
        if buf.state() != BufferState::New {
            buf.clear(&mut self.backend);
        }
        buf.enable(&mut self.backend)?;
        let area = Region::from_size(buf.rect().size());
        self.backend.clear(Some(area), Color::MAGIC);
        Ok(())
    }

    /// Capture and remove the top buffer, handing drawing back to the one
    /// beneath. The display buffer is never popped; `None` then.
    pub fn pop_drawing_buffer(&mut self) -> Result<Option<BufferId>> {
        if self.stack.len() <= 1 {
            return Ok(None);
        }
        let top = self.current_buffer();
        slot(&mut self.buffers, top)?.backup(&mut self.backend)?;
        self.stack.pop();
        let below = self.current_buffer();
        let buf = slot(&mut self.buffers, below)?;
        let fresh = buf.state() == BufferState::New;
        buf.enable(&mut self.backend)?;
        if fresh {
            // Nothing captured to restore; drop the popped buffer's scratch.
            let area = Region::from_size(buf.rect().size());
            self.backend.clear(Some(area), Color::MAGIC);
        }
        Ok(Some(top))
    }

    /// Point the viewport back at the top buffer after a composition pass.
    fn retarget(&mut self) -> Result<()> {
        let top = self.current_buffer();
        let buf = slot(&mut self.buffers, top)?;
        if buf.state() == BufferState::Active {
            self.backend.set_viewport(buf.rect().size());
            Ok(())
        } else {
            buf.enable(&mut self.backend)
        }
    }

    /// Composite just the top buffer onto the display.
    pub fn flush(&mut self) -> Result<()> {
        let screen = self.screen;
        let top = self.current_buffer();
        let buf = slot(&mut self.buffers, top)?;
        buf.prepare_to_render(&mut self.backend)?;
        self.backend.set_viewport(screen);
        buf.render_on_display(&mut self.backend, screen)?;
        buf.clear(&mut self.backend);
        self.retarget()
    }

    /// Composite `ids` onto the display in order and present the frame.
    ///
    /// Every buffer is captured before any is drawn: they all share the
    /// physical back buffer, so compositing one would overwrite pixels
    /// another has not captured yet.
    pub fn swap_buffers(&mut self, ids: &[BufferId]) -> Result<()> {
        for &id in ids {
            slot(&mut self.buffers, id)?.prepare_to_render(&mut self.backend)?;
        }

        let screen = self.screen;
        self.backend.set_viewport(screen);
        self.backend.clear(None, Color::TRANSPARENT);
        for &id in ids {
            let buf = slot(&mut self.buffers, id)?;
            if !buf.render_on_display(&mut self.backend, screen)? {
                log::debug!("Buffer {} had nothing to show", id.0);
            }
            buf.clear(&mut self.backend);
        }

        self.backend.present()?;
        self.backend.clear(None, Color::TRANSPARENT);
        self.retarget()
    }

    /// Upload top-down RGBA pixels into a buffer's `region`, e.g. a movie
    /// frame. Takes effect at the next composition.
    pub fn copy_pixels(&mut self, id: BufferId, region: Region, rgba: &[u8]) -> Result<()> {
        slot(&mut self.buffers, id)?.copy_pixels(&mut self.backend, region, rgba)?;
        if id == self.current_buffer() {
            slot(&mut self.buffers, id)?.enable(&mut self.backend)?;
        }
        Ok(())
    }

    fn draw_primitives(
        &mut self,
        primitive: Primitive,
        color: Color,
        vertices: &[f32],
    ) -> Result<()> {
        if vertices.is_empty() {
            return Ok(());
        }
        let program = self
            .shaders
            .get_or_compile(&mut self.backend, ShaderKind::Primitive)?;
        let target = self.current_buffer();
        let buf = slot(&mut self.buffers, target)?;
        buf.mark_drawn();
        let matrix = buf.matrix().to_cols_array();

        self.backend.use_program(program);
        self.backend
            .set_uniform(program, "matrix", UniformValue::Mat4(matrix));
        self.backend
            .set_uniform(program, "color", UniformValue::Vec4(color.to_normalized()));
        self.backend
            .draw_arrays(primitive, PRIMITIVE_LAYOUT, vertices)
    }

    /// Filled or outlined rectangle in buffer-local coordinates.
    pub fn draw_rect(&mut self, rect: Region, color: Color, fill: bool) -> Result<()> {
        if rect.is_empty() {
            return Ok(());
        }
        let (x, y) = (rect.x as f32, rect.y as f32);
        let (x2, y2) = (rect.right() as f32, rect.bottom() as f32);
        if fill {
            self.draw_primitives(Primitive::TriangleStrip, color, &quad_positions(rect))
        } else {
            self.draw_primitives(Primitive::LineLoop, color, &[x, y, x2, y, x2, y2, x, y2])
        }
    }

    pub fn draw_line(&mut self, from: Point, to: Point, color: Color) -> Result<()> {
        self.draw_lines(&[from, to], color)
    }

    /// Independent segments: points are taken in pairs.
    pub fn draw_lines(&mut self, points: &[Point], color: Color) -> Result<()> {
        let pairs = points.len() / 2 * 2;
        let vertices = flatten(&points[..pairs]);
        self.draw_primitives(Primitive::Lines, color, &vertices)
    }

    pub fn draw_point(&mut self, p: Point, color: Color) -> Result<()> {
        self.draw_points(&[p], color)
    }

    pub fn draw_points(&mut self, points: &[Point], color: Color) -> Result<()> {
        self.draw_primitives(Primitive::Points, color, &flatten(points))
    }

    /// Draw the `src` part of `sprite` into `dst` of the current buffer,
    /// with no clipping. An optional `mask` sprite limits coverage.
    pub fn blit_sprite_clipped(
        &mut self,
        sprite: &mut Sprite,
        mask: Option<&mut Sprite>,
        src: Region,
        dst: Region,
        flags: BlitFlags,
        tint: Option<Color>,
    ) -> Result<()> {
        let kind = sprite_program(sprite.is_paletted(), flags);
        let program = self.shaders.get_or_compile(&mut self.backend, kind)?;

        // Upload everything before binding; uploads disturb bindings.
        let texture = sprite.ensure_texture(&mut self.backend)?;
        let palette = sprite.ensure_palette_texture(&mut self.backend, &mut self.palettes)?;
        let mask = match mask {
            Some(m) => Some(m.ensure_mask_texture(&mut self.backend)?),
            None => None,
        };

        let target = self.current_buffer();
        let buf = slot(&mut self.buffers, target)?;
        buf.mark_drawn();
        let matrix = buf.matrix().to_cols_array();

        let gpu = &mut self.backend;
        gpu.use_program(program);
        gpu.bind_texture(TEXTURE_UNIT, Some(texture));
        if let Some(palette) = palette {
            gpu.bind_texture(PALETTE_UNIT, Some(palette));
        }
        gpu.bind_texture(MASK_UNIT, mask);
        gpu.set_uniform(program, "u_hasMask", UniformValue::Int(i32::from(mask.is_some())));

        gpu.set_uniform(program, "u_matrix", UniformValue::Mat4(matrix));
        let tint = tint.unwrap_or(Color::WHITE);
        gpu.set_uniform(program, "u_tint", UniformValue::Vec4(tint.to_normalized()));
        gpu.set_uniform(
            program,
            "u_alphaModifier",
            UniformValue::Float(flags.alpha_modifier()),
        );
        gpu.set_uniform(
            program,
            "u_shadowMode",
            UniformValue::Int(flags.shadow_mode() as i32),
        );
        if kind.is_paletted() {
            let key = sprite.color_key().map_or(-1, i32::from);
            gpu.set_uniform(program, "u_colorKey", UniformValue::Int(key));
        }

        let vertices = interleave(
            &quad_positions(dst),
            &texture_coords(src, sprite.size(), flags),
        );
        gpu.draw_arrays(Primitive::TriangleStrip, SPRITE_LAYOUT, &vertices)
    }

    /// Draw `sprite` with its hotspot at `pos`, clipped to the current
    /// buffer. Fully clipped blits draw nothing.
    pub fn blit_sprite(
        &mut self,
        sprite: &mut Sprite,
        pos: Point,
        flags: BlitFlags,
        tint: Option<Color>,
    ) -> Result<()> {
        let bounds = match self.buffer(self.current_buffer()) {
            Some(buf) => Region::from_size(buf.rect().size()),
            None => return Ok(()),
        };
        let dst = Region::new(
            pos.x - sprite.x_pos,
            pos.y - sprite.y_pos,
            sprite.width(),
            sprite.height(),
        );
        let Some((src, dst)) = clip_blit(dst, bounds, flags) else {
            return Ok(());
        };
        self.blit_sprite_clipped(sprite, None, src, dst, flags, tint)
    }

    /// Read back part of the back buffer as a top-down RGBA sprite. A zero
    /// width or height extends to the screen edge.
    pub fn get_screenshot(&mut self, region: Region) -> Result<Sprite> {
        let w = if region.w != 0 {
            region.w
        } else {
            self.screen.w - region.x
        };
        let h = if region.h != 0 {
            region.h
        } else {
            self.screen.h - region.y
        };
        let resolved = Region::new(region.x, region.y, w, h);
        if resolved.is_empty() {
            return Err(VideoError::InvalidBuffer(format!(
                "empty screenshot region {resolved:?}"
            )));
        }

        let order = self.backend.readback_order();
        let native = match order {
            RowOrder::TopDown => resolved,
            RowOrder::BottomUp => Region::new(resolved.x, self.screen.h - resolved.bottom(), w, h),
        };
        let mut pixels = self.backend.read_pixels(native)?;
        if order == RowOrder::BottomUp {
            let stride = w as usize * 4;
            pixels = pixels
                .chunks_exact(stride)
                .rev()
                .flatten()
                .copied()
                .collect();
        }
        Sprite::direct(w, h, 32, ChannelMasks::RGBX8888, pixels)
    }

    /// Direct-color sprite of 16, 24, or 32 bits per pixel.
    pub fn create_sprite(
        &self,
        width: i32,
        height: i32,
        bpp: u8,
        masks: ChannelMasks,
        pixels: Vec<u8>,
    ) -> Result<Sprite> {
        Sprite::direct(width, height, bpp, masks, pixels)
    }

    /// Paletted sprite. Only 8 bits per pixel is supported, and a palette
    /// is required.
    pub fn create_paletted_sprite(
        &self,
        width: i32,
        height: i32,
        bpp: u8,
        pixels: Vec<u8>,
        palette: Option<Rc<Palette>>,
        color_key: Option<u8>,
    ) -> Result<Sprite> {
        let Some(palette) = palette else {
            return Err(VideoError::InvalidSprite(
                "paletted sprite without a palette".into(),
            ));
        };
        if bpp != 8 {
            return Err(VideoError::InvalidSprite(format!(
                "unsupported paletted depth {bpp}"
            )));
        }
        Ok(Sprite::paletted(width, height, pixels, palette)?.with_color_key(color_key))
    }

    pub fn create_sprite8(
        &self,
        width: i32,
        height: i32,
        pixels: Vec<u8>,
        palette: Rc<Palette>,
        color_key: Option<u8>,
    ) -> Result<Sprite> {
        self.create_paletted_sprite(width, height, 8, pixels, Some(palette), color_key)
    }

    /// Swap a paletted sprite's palette.
    pub fn set_sprite_palette(&mut self, sprite: &mut Sprite, palette: Rc<Palette>) -> Result<()> {
        sprite.replace_palette(&mut self.backend, &mut self.palettes, palette)
    }

    /// Release a sprite's textures and its palette reference.
    pub fn free_sprite(&mut self, mut sprite: Sprite) {
        sprite.release(&mut self.backend, &mut self.palettes);
    }

    /// Free every buffer texture, palette texture, and program. The driver
    /// stays usable; resources are recreated on demand.
    pub fn release_resources(&mut self) {
        for buf in self.buffers.iter_mut().flatten() {
            buf.release(&mut self.backend);
        }
        self.palettes.release_all(&mut self.backend);
        self.shaders.release_all(&mut self.backend);
        if let Err(e) = self.retarget() {
            log::warn!("Could not re-enable the top buffer after release: {e}");
        }
    }
}

impl<B: GpuBackend + WindowControl> VideoDriver<B> {
    pub fn set_fullscreen_mode(&mut self, fullscreen: bool) -> bool {
        self.backend.set_fullscreen(fullscreen)
    }

    pub fn toggle_fullscreen_mode(&mut self) -> bool {
        let fullscreen = !self.backend.is_fullscreen();
        self.backend.set_fullscreen(fullscreen)
    }

    pub fn is_fullscreen(&self) -> bool {
        self.backend.is_fullscreen()
    }

    pub fn toggle_grab_input(&mut self) -> bool {
        self.backend.toggle_grab_input()
    }

    pub fn set_gamma(&mut self, brightness: i32, contrast: i32) {
        self.backend.set_gamma(brightness, contrast);
    }

    pub fn start_text_input(&mut self) {
        self.backend.start_text_input();
    }

    pub fn stop_text_input(&mut self) {
        self.backend.stop_text_input();
    }

    pub fn in_text_input(&self) -> bool {
        self.backend.in_text_input()
    }

    pub fn touch_input_enabled(&self) -> bool {
        self.backend.touch_input_enabled()
    }
}

impl<B: GpuBackend> Drop for VideoDriver<B> {
    fn drop(&mut self) {
        self.release_resources();
    }
}

fn flatten(points: &[Point]) -> Vec<f32> {
    points
        .iter()
        .flat_map(|p| [p.x as f32, p.y as f32])
        .collect()
}
