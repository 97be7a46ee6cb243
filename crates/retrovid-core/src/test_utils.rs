//! Shared test utilities for retrovid-core tests.
//!
//! Provides a [`RecordingBackend`] that records every backend call for
//! assertion and fakes a framebuffer whose pixels encode their own native
//! coordinates.

#![allow(dead_code)]

use std::collections::HashSet;

use crate::backend::{
    GpuBackend, Primitive, ProgramId, RowOrder, TextureDesc, TextureId, UniformValue,
    VertexAttrib, WindowControl,
};
use crate::color::Color;
use crate::error::{Result, VideoError};
use crate::geometry::{Region, Size};
use crate::shader::{ShaderKind, ShaderSource};

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CompileProgram(ShaderKind),
    DeleteProgram(ProgramId),
    UseProgram(ProgramId),
    SetUniform {
        program: ProgramId,
        name: String,
        value: UniformValue,
    },
    CreateTexture {
        id: TextureId,
        desc: TextureDesc,
    },
    DeleteTexture(TextureId),
    BindTexture {
        unit: u32,
        texture: Option<TextureId>,
    },
    SetViewport(Size),
    SetBlending(bool),
    Clear {
        scissor: Option<Region>,
        color: Color,
    },
    ReadPixels(Region),
    DrawArrays {
        primitive: Primitive,
        vertices: Vec<f32>,
    },
    Present,
}

/// A backend that records all calls for test assertions.
pub struct RecordingBackend {
    pub calls: Vec<GpuCall>,
    pub size: Size,
    pub order: RowOrder,
    /// Make `compile_program` fail for this kind.
    pub fail_compile: Option<ShaderKind>,
    pub live_textures: HashSet<TextureId>,
    pub fullscreen: bool,
    pub grabbed: bool,
    pub text_input: bool,
    pub gamma: (i32, i32),
    programs: Vec<(ProgramId, ShaderKind)>,
    next_id: u64,
}

impl RecordingBackend {
    pub fn new(w: i32, h: i32) -> Self {
        Self {
            calls: Vec::new(),
            size: Size::new(w, h),
            order: RowOrder::BottomUp,
            fail_compile: None,
            live_textures: HashSet::new(),
            fullscreen: false,
            grabbed: false,
            text_input: false,
            gamma: (10, 0),
            programs: Vec::new(),
            next_id: 1,
        }
    }

    pub fn top_down(mut self) -> Self {
        self.order = RowOrder::TopDown;
        self
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn count(&self, pred: impl Fn(&GpuCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    /// Index of the first call matching `pred`.
    pub fn position(&self, pred: impl Fn(&GpuCall) -> bool) -> Option<usize> {
        self.calls.iter().position(pred)
    }

    pub fn compile_count(&self) -> usize {
        self.count(|c| matches!(c, GpuCall::CompileProgram(_)))
    }

    pub fn texture_creations(&self) -> usize {
        self.count(|c| matches!(c, GpuCall::CreateTexture { .. }))
    }

    pub fn draw_count(&self) -> usize {
        self.count(|c| matches!(c, GpuCall::DrawArrays { .. }))
    }

    /// Which kind a recorded program id was compiled as.
    pub fn kind_of(&self, program: ProgramId) -> Option<ShaderKind> {
        self.programs
            .iter()
            .find(|(id, _)| *id == program)
            .map(|(_, kind)| *kind)
    }

    /// Program active at each draw, in draw order.
    pub fn draw_programs(&self) -> Vec<Option<ShaderKind>> {
        let mut current = None;
        let mut out = Vec::new();
        for call in &self.calls {
            match call {
                GpuCall::UseProgram(p) => current = self.kind_of(*p),
                GpuCall::DrawArrays { .. } => out.push(current),
                _ => {}
            }
        }
        out
    }

    /// Vertex data of every draw, in order.
    pub fn draws(&self) -> Vec<(Primitive, &[f32])> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                GpuCall::DrawArrays {
                    primitive,
                    vertices,
                } => Some((*primitive, vertices.as_slice())),
                _ => None,
            })
            .collect()
    }

    /// Values set for uniform `name`, in order.
    pub fn uniform_values(&self, name: &str) -> Vec<UniformValue> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                GpuCall::SetUniform { name: n, value, .. } if n == name => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Texture bound to `unit` by the last bind before the last draw.
    pub fn binding_at_last_draw(&self, unit: u32) -> Option<Option<TextureId>> {
        let last_draw = self
            .calls
            .iter()
            .rposition(|c| matches!(c, GpuCall::DrawArrays { .. }))?;
        self.calls[..last_draw].iter().rev().find_map(|c| match c {
            GpuCall::BindTexture { unit: u, texture } if *u == unit => Some(*texture),
            _ => None,
        })
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl GpuBackend for RecordingBackend {
    fn drawable_size(&self) -> Size {
        self.size
    }

    fn readback_order(&self) -> RowOrder {
        self.order
    }

    fn compile_program(&mut self, source: &ShaderSource) -> Result<ProgramId> {
        self.calls.push(GpuCall::CompileProgram(source.kind));
        if self.fail_compile == Some(source.kind) {
            return Err(VideoError::Backend(format!(
                "{}: syntax error",
                source.fragment.display()
            )));
        }
        let id = ProgramId(self.next());
        self.programs.push((id, source.kind));
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.calls.push(GpuCall::DeleteProgram(program));
    }

    fn use_program(&mut self, program: ProgramId) {
        self.calls.push(GpuCall::UseProgram(program));
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue) {
        self.calls.push(GpuCall::SetUniform {
            program,
            name: name.to_string(),
            value,
        });
    }

    fn create_texture(&mut self, desc: &TextureDesc, pixels: &[u8]) -> Result<TextureId> {
        assert_eq!(pixels.len(), desc.byte_len(), "texture upload size mismatch");
        let id = TextureId(self.next());
        self.live_textures.insert(id);
        self.calls.push(GpuCall::CreateTexture { id, desc: *desc });
        Ok(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.live_textures.remove(&texture);
        self.calls.push(GpuCall::DeleteTexture(texture));
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        self.calls.push(GpuCall::BindTexture { unit, texture });
    }

    fn set_viewport(&mut self, size: Size) {
        self.calls.push(GpuCall::SetViewport(size));
    }

    fn set_blending(&mut self, enabled: bool) {
        self.calls.push(GpuCall::SetBlending(enabled));
    }

    fn clear(&mut self, scissor: Option<Region>, color: Color) {
        self.calls.push(GpuCall::Clear { scissor, color });
    }

    /// Each pixel reads back as `[x, y, 0xAB, 0xFF]` in native coordinates,
    /// rows in native order.
    fn read_pixels(&mut self, region: Region) -> Result<Vec<u8>> {
        self.calls.push(GpuCall::ReadPixels(region));
        let mut out = Vec::with_capacity(region.size().area() * 4);
        for y in region.y..region.bottom() {
            for x in region.x..region.right() {
                out.extend_from_slice(&[x as u8, y as u8, 0xAB, 0xFF]);
            }
        }
        Ok(out)
    }

    fn draw_arrays(
        &mut self,
        primitive: Primitive,
        _layout: &[VertexAttrib],
        vertices: &[f32],
    ) -> Result<()> {
        self.calls.push(GpuCall::DrawArrays {
            primitive,
            vertices: vertices.to_vec(),
        });
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.calls.push(GpuCall::Present);
        Ok(())
    }
}

impl WindowControl for RecordingBackend {
    fn set_fullscreen(&mut self, fullscreen: bool) -> bool {
        self.fullscreen = fullscreen;
        true
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn toggle_grab_input(&mut self) -> bool {
        self.grabbed = !self.grabbed;
        true
    }

    fn set_gamma(&mut self, brightness: i32, contrast: i32) {
        self.gamma = (brightness, contrast);
    }

    fn start_text_input(&mut self) {
        self.text_input = true;
    }

    fn stop_text_input(&mut self) {
        self.text_input = false;
    }

    fn in_text_input(&self) -> bool {
        self.text_input
    }

    fn touch_input_enabled(&self) -> bool {
        false
    }
}
