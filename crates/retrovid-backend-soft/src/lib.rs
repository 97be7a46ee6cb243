//! Software backend for retrovid.
//!
//! Implements [`GpuBackend`] on a CPU framebuffer: the six shader programs
//! are emulated per fragment and primitives are rasterized in software.
//! Used for headless rendering (screenshots, CI) and as a pixel-exact
//! reference when testing the core end to end.

mod renderer;
mod shade;

use std::collections::HashMap;

use retrovid_core::backend::{
    GpuBackend, Primitive, ProgramId, RowOrder, TextureDesc, TextureId, UniformValue,
    VertexAttrib, WindowControl, vertex_stride,
};
use retrovid_core::color::Color;
use retrovid_core::error::{Result, VideoError};
use retrovid_core::geometry::{Point, Region, Size};
use retrovid_core::shader::ShaderSource;

pub use renderer::Surface;
pub use shade::SHADOW_INDEX;

use shade::{Program, Texture, transform};

/// Headless CPU implementation of the backend vtable.
///
/// Native coordinates are top-down. The draw surface plays the role of the
/// GL back buffer; [`present`](GpuBackend::present) copies it to the
/// front frame returned by [`frame`](SoftBackend::frame).
pub struct SoftBackend {
    surface: Surface,
    frame: Surface,
    frames_presented: u64,
    viewport: Size,
    blending: bool,
    programs: HashMap<u64, Program>,
    textures: HashMap<u64, Texture>,
    current: Option<u64>,
    units: [Option<u64>; 3],
    next_id: u64,
    fullscreen: bool,
    grabbed: bool,
    text_input: bool,
    brightness: i32,
}

impl SoftBackend {
    pub fn new(width: i32, height: i32) -> Self {
        log::info!("Software backend initialized: {width}x{height}");
        Self {
            surface: Surface::new(width, height),
            frame: Surface::new(width, height),
            frames_presented: 0,
            viewport: Size::new(width, height),
            blending: true,
            programs: HashMap::new(),
            textures: HashMap::new(),
            current: None,
            units: [None; 3],
            next_id: 1,
            fullscreen: false,
            grabbed: false,
            text_input: false,
            brightness: 10,
        }
    }

    /// The draw surface (back buffer).
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// The last presented frame.
    pub fn frame(&self) -> &Surface {
        &self.frame
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Last brightness passed to `set_gamma`, in tenths.
    pub fn brightness(&self) -> i32 {
        self.brightness
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn clip(&self) -> Region {
        let view = Region::from_size(self.viewport);
        view.intersect(&self.surface.bounds())
            .unwrap_or(Region::new(0, 0, 0, 0))
    }

    /// Clip space to native pixel coordinates of the current viewport.
    fn to_window(&self, ndc: [f32; 2]) -> [f32; 2] {
        [
            (ndc[0] + 1.0) * 0.5 * self.viewport.w as f32,
            (1.0 - ndc[1]) * 0.5 * self.viewport.h as f32,
        ]
    }
}

/// Pixel holding a rasterized position. The bias absorbs float error from
/// the round trip through clip space.
fn pixel_of(p: [f32; 2]) -> (i32, i32) {
    ((p[0] + 1e-3).floor() as i32, (p[1] + 1e-3).floor() as i32)
}

impl GpuBackend for SoftBackend {
    fn drawable_size(&self) -> Size {
        Size::new(self.surface.width(), self.surface.height())
    }

    fn readback_order(&self) -> RowOrder {
        RowOrder::TopDown
    }

    fn compile_program(&mut self, source: &ShaderSource) -> Result<ProgramId> {
        let id = self.next();
        self.programs.insert(id, Program::new(source.kind));
        log::debug!("Software program {id} for {}", source.kind);
        Ok(ProgramId(id))
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program.0);
        if self.current == Some(program.0) {
            self.current = None;
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        if self.programs.contains_key(&program.0) {
            self.current = Some(program.0);
        } else {
            log::warn!("use_program: unknown program {}", program.0);
        }
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue) {
        if let Some(p) = self.programs.get_mut(&program.0) {
            p.set(name, value);
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc, pixels: &[u8]) -> Result<TextureId> {
        if pixels.len() != desc.byte_len() || desc.width == 0 || desc.height == 0 {
            return Err(VideoError::Backend(format!(
                "texture upload of {} bytes for {}x{} {:?}",
                pixels.len(),
                desc.width,
                desc.height,
                desc.format
            )));
        }
        let id = self.next();
        self.textures.insert(
            id,
            Texture {
                desc: *desc,
                data: pixels.to_vec(),
            },
        );
        Ok(TextureId(id))
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture.0);
        for unit in &mut self.units {
            if *unit == Some(texture.0) {
                *unit = None;
            }
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        match self.units.get_mut(unit as usize) {
            Some(slot) => *slot = texture.map(|t| t.0),
            None => log::warn!("bind_texture: unit {unit} out of range"),
        }
    }

    fn set_viewport(&mut self, size: Size) {
        self.viewport = size;
    }

    fn set_blending(&mut self, enabled: bool) {
        self.blending = enabled;
    }

    fn clear(&mut self, scissor: Option<Region>, color: Color) {
        self.surface.fill(scissor, color.to_bytes());
    }

    fn read_pixels(&mut self, region: Region) -> Result<Vec<u8>> {
        Ok(self.surface.read(region))
    }

    fn draw_arrays(
        &mut self,
        primitive: Primitive,
        layout: &[VertexAttrib],
        vertices: &[f32],
    ) -> Result<()> {
        let program = self
            .current
            .and_then(|id| self.programs.get(&id))
            .ok_or_else(|| VideoError::Backend("draw with no program bound".into()))?;
        let stride = vertex_stride(layout);
        if stride == 0 || vertices.len() % stride != 0 {
            return Err(VideoError::Backend(format!(
                "{} floats do not fit a stride of {stride}",
                vertices.len()
            )));
        }
        let uv_offset = layout
            .iter()
            .position(|a| a.name == "a_texCoord")
            .map(|i| layout[..i].iter().map(|a| a.components).sum::<usize>());

        let matrix = program.matrix();
        let stage = program.stage();
        let verts: Vec<([f32; 2], [f32; 2])> = vertices
            .chunks_exact(stride)
            .map(|v| {
                let pos = self.to_window(transform(&matrix, [v[0], v[1]]));
                let uv = uv_offset.map_or([0.0; 2], |o| [v[o], v[o + 1]]);
                (pos, uv)
            })
            .collect();

        let units = self.units.map(|u| u.and_then(|id| self.textures.get(&id)));
        let clip = self.clip();
        let blend = self.blending;

        // A pixel is shaded at most once per draw, even where triangles or
        // line segments share it.
        let mut fragments: Vec<(i32, i32, [f32; 2])> = Vec::new();
        let mut seen = vec![false; clip.size().area()];
        let mut emit = |x: i32, y: i32, uv: [f32; 2]| {
            if !clip.contains(Point::new(x, y)) {
                return;
            }
            let i = (y - clip.y) as usize * clip.w as usize + (x - clip.x) as usize;
            if !seen[i] {
                seen[i] = true;
                fragments.push((x, y, uv));
            }
        };

        match primitive {
            Primitive::TriangleStrip => {
                for tri in verts.windows(3) {
                    let pos = [tri[0].0, tri[1].0, tri[2].0];
                    renderer::triangle(pos, clip, |x, y, w| {
                        let uv = [
                            tri[0].1[0] * w[0] + tri[1].1[0] * w[1] + tri[2].1[0] * w[2],
                            tri[0].1[1] * w[0] + tri[1].1[1] * w[1] + tri[2].1[1] * w[2],
                        ];
                        emit(x, y, uv);
                    });
                }
            }
            Primitive::Lines => {
                for seg in verts.chunks_exact(2) {
                    let uv = seg[0].1;
                    renderer::line(pixel_of(seg[0].0), pixel_of(seg[1].0), |x, y| {
                        emit(x, y, uv)
                    });
                }
            }
            Primitive::LineLoop => {
                for (i, v) in verts.iter().enumerate() {
                    let next = &verts[(i + 1) % verts.len()];
                    renderer::line(pixel_of(v.0), pixel_of(next.0), |x, y| emit(x, y, v.1));
                }
            }
            Primitive::Points => {
                for v in &verts {
                    let (x, y) = pixel_of(v.0);
                    emit(x, y, v.1);
                }
            }
        }

        let shaded: Vec<(i32, i32, [f32; 4])> = fragments
            .into_iter()
            .filter_map(|(x, y, uv)| stage.shade(units, uv).map(|c| (x, y, c)))
            .collect();
        for (x, y, color) in shaded {
            self.surface.put(x, y, color, blend);
        }
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.frame = self.surface.clone();
        self.frames_presented += 1;
        Ok(())
    }
}

impl WindowControl for SoftBackend {
    fn set_fullscreen(&mut self, fullscreen: bool) -> bool {
        let changed = self.fullscreen != fullscreen;
        self.fullscreen = fullscreen;
        changed
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn toggle_grab_input(&mut self) -> bool {
        self.grabbed = !self.grabbed;
        true
    }

    fn set_gamma(&mut self, brightness: i32, _contrast: i32) {
        self.brightness = brightness;
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
