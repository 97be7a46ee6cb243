//! Backend trait definitions.
//!
//! Every graphics backend implements [`GpuBackend`]. It is deliberately
//! small: texture upload, program binding, uniforms, and draw-call
//! submission. The render buffer state machine, the buffer stack, and the
//! frame ordering rules live in the core and never call platform APIs
//! directly.
//!
//! [`WindowControl`] covers the thin host-window wrappers (fullscreen,
//! input grab, gamma, text input). Headless backends may implement it with
//! no-ops.

use crate::color::Color;
use crate::error::Result;
use crate::geometry::{Region, Size};
use crate::shader::ShaderSource;

/// Opaque handle to a texture owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Opaque handle to a linked shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u64);

/// Texel layout of an uploaded texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// Four bytes per texel.
    Rgba8,
    /// One byte per texel (palette indices, masks). Sampled as `.r`.
    Red8,
}

impl TextureFormat {
    pub const fn bytes_per_texel(self) -> usize {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::Red8 => 1,
        }
    }
}

/// Everything needed to allocate a texture. Filtering is always nearest
/// and wrapping always clamp-to-edge; pixel art must stay pixel-exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl TextureDesc {
    pub const fn rgba(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::Rgba8,
        }
    }

    pub const fn red(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::Red8,
        }
    }

    /// Expected length of the pixel slice passed to `create_texture`.
    pub const fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_texel()
    }
}

/// How `draw_arrays` assembles vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Points,
    Lines,
    LineLoop,
    TriangleStrip,
}

/// One interleaved float attribute of a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttrib {
    pub name: &'static str,
    pub components: usize,
}

impl VertexAttrib {
    pub const fn new(name: &'static str, components: usize) -> Self {
        Self { name, components }
    }
}

/// Floats per vertex for an interleaved layout.
pub fn vertex_stride(attribs: &[VertexAttrib]) -> usize {
    attribs.iter().map(|a| a.components).sum()
}

/// Layout used by the primitive program: `position` only.
pub const PRIMITIVE_LAYOUT: &[VertexAttrib] = &[VertexAttrib::new("position", 2)];

/// Layout used by every sprite program: position then texture coordinate.
pub const SPRITE_LAYOUT: &[VertexAttrib] = &[
    VertexAttrib::new("a_position", 2),
    VertexAttrib::new("a_texCoord", 2),
];

/// A value for a named uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec4([f32; 4]),
    /// Column-major 4x4 matrix.
    Mat4([f32; 16]),
}

/// Vertical orientation of the backend's native surface coordinates.
///
/// Viewports, scissor rectangles, and `read_pixels` regions are all given
/// in native coordinates, anchored at the same corner, so a buffer-sized
/// region at `(0, 0)` always covers what was drawn with a buffer-sized
/// viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    /// Origin at the top-left; rows are returned top row first.
    TopDown,
    /// Origin at the bottom-left; rows are returned bottom row first
    /// (OpenGL convention).
    BottomUp,
}

/// Rendering backend vtable.
///
/// All calls happen on the thread that owns the graphics context. Every
/// call completes before returning.
pub trait GpuBackend {
    /// Size of the drawable surface in pixels.
    fn drawable_size(&self) -> Size;

    /// Orientation of native coordinates and of
    /// [`read_pixels`](GpuBackend::read_pixels) output.
    fn readback_order(&self) -> RowOrder {
        RowOrder::BottomUp
    }

    /// Compile and link a vertex/fragment program pair.
    fn compile_program(&mut self, source: &ShaderSource) -> Result<ProgramId>;

    /// Release a program returned by `compile_program`.
    fn delete_program(&mut self, program: ProgramId);

    /// Make `program` current for subsequent uniforms and draws.
    fn use_program(&mut self, program: ProgramId);

    /// Set a uniform on `program` by name. Unknown names are ignored.
    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue);

    /// Allocate a texture and upload `pixels` (`desc.byte_len()` bytes).
    fn create_texture(&mut self, desc: &TextureDesc, pixels: &[u8]) -> Result<TextureId>;

    /// Release a texture. Unknown handles are ignored.
    fn delete_texture(&mut self, texture: TextureId);

    /// Bind `texture` to a texture unit, or unbind the unit with `None`.
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>);

    /// Set the viewport to `(0, 0, size.w, size.h)`.
    fn set_viewport(&mut self, size: Size);

    /// Toggle source-over alpha blending for draws (enabled by default).
    fn set_blending(&mut self, enabled: bool);

    /// Clear the draw surface to `color`, restricted to `scissor` if given.
    fn clear(&mut self, scissor: Option<Region>, color: Color);

    /// Read back RGBA8 pixels of the draw surface, rows in
    /// [`readback_order`](GpuBackend::readback_order).
    fn read_pixels(&mut self, region: Region) -> Result<Vec<u8>>;

    /// Submit interleaved vertex data with the current program.
    fn draw_arrays(
        &mut self,
        primitive: Primitive,
        layout: &[VertexAttrib],
        vertices: &[f32],
    ) -> Result<()>;

    /// Present the finished frame.
    fn present(&mut self) -> Result<()>;
}

/// Host window controls.
pub trait WindowControl {
    /// Switch fullscreen on or off. Returns whether the switch took effect.
    fn set_fullscreen(&mut self, fullscreen: bool) -> bool;

    fn is_fullscreen(&self) -> bool;

    /// Flip input grab. Returns whether the grab state changed.
    fn toggle_grab_input(&mut self) -> bool;

    /// Apply a brightness in tenths (10 = unchanged). Contrast is advisory.
    fn set_gamma(&mut self, brightness: i32, contrast: i32);

    fn start_text_input(&mut self);

    fn stop_text_input(&mut self);

    fn in_text_input(&self) -> bool;

    fn touch_input_enabled(&self) -> bool;
}
