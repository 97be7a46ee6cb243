//! SDL2 + OpenGL backend for retrovid.
//!
//! Opens an SDL2 window with a GL 2.0 (or GLES 2.0) context, loads the
//! function pointers through `glow`, and implements [`GpuBackend`] and
//! [`WindowControl`] on top of it. The core drives everything; this crate
//! only translates vtable calls into GL calls.

mod program;

use std::collections::HashMap;

use glow::HasContext;
use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::video::{FullscreenType, GLContext, GLProfile, Window};
use sdl2::{EventPump, Sdl, VideoSubsystem};

use retrovid_core::backend::{
    GpuBackend, Primitive, ProgramId, RowOrder, TextureDesc, TextureFormat, TextureId,
    UniformValue, VertexAttrib, WindowControl, vertex_stride,
};
use retrovid_core::color::Color;
use retrovid_core::config::{GlApi, VideoConfig};
use retrovid_core::error::{Result, VideoError};
use retrovid_core::geometry::{Region, Size};
use retrovid_core::shader::ShaderSource;

pub use program::{glsl_header, with_header};

/// Window events the demo binaries care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Quit,
    ToggleFullscreen,
    ToggleGrab,
    Screenshot,
    Text(String),
}

/// SDL2 window plus a GL context driven through `glow`.
///
/// `gl` and every GL object in the maps are only valid while `_gl_context`
/// is alive. `Drop` deletes the objects first; the context and window are
/// released afterwards in field order.
pub struct SdlGlBackend {
    gl: glow::Context,
    api: GlApi,
    programs: HashMap<u64, glow::Program>,
    textures: HashMap<u64, glow::Texture>,
    next_id: u64,
    current_program: Option<glow::Program>,
    vbo: glow::Buffer,
    fullscreen: bool,
    event_pump: EventPump,
    _gl_context: GLContext,
    window: Window,
    video: VideoSubsystem,
    _sdl: Sdl,
}

impl SdlGlBackend {
    /// Create the window and GL context described by `config`.
    pub fn new(config: &VideoConfig) -> Result<Self> {
        let sdl = sdl2::init().map_err(VideoError::Backend)?;
        let video = sdl.video().map_err(VideoError::Backend)?;

        let gl_attr = video.gl_attr();
        match config.gl_api {
            GlApi::Gl => gl_attr.set_context_profile(GLProfile::Compatibility),
            GlApi::Gles => gl_attr.set_context_profile(GLProfile::GLES),
        }
        gl_attr.set_context_version(2, 0);
        gl_attr.set_double_buffer(true);

        let mut builder = video.window(
            &config.window_title,
            config.screen_width,
            config.screen_height,
        );
        builder.opengl().position_centered();
        if config.fullscreen {
            builder.fullscreen_desktop();
        }
        let window = builder
            .build()
            .map_err(|e| VideoError::Backend(e.to_string()))?;

        let gl_context = window.gl_create_context().map_err(VideoError::Backend)?;
        window
            .gl_make_current(&gl_context)
            .map_err(VideoError::Backend)?;
        let interval = if config.vsync { 1 } else { 0 };
        if let Err(e) = video.gl_set_swap_interval(interval) {
            log::warn!("Can't set swap interval {interval}: {e}");
        }

        // SAFETY: the context created above is current on this thread.
        let gl = unsafe {
            glow::Context::from_loader_function(|s| video.gl_get_proc_address(s) as *const _)
        };
        // SAFETY: as above.
        let vbo = unsafe {
            gl.enable(glow::BLEND);
            gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            gl.create_buffer().map_err(VideoError::Backend)?
        };

        let event_pump = sdl.event_pump().map_err(VideoError::Backend)?;

        let (w, h) = window.drawable_size();
        log::info!(
            "SDL2 GL backend initialized: {w}x{h} ({:?}, vsync {})",
            config.gl_api,
            config.vsync
        );

        let mut backend = Self {
            gl,
            api: config.gl_api,
            programs: HashMap::new(),
            textures: HashMap::new(),
            next_id: 1,
            current_program: None,
            vbo,
            fullscreen: config.fullscreen,
            event_pump,
            _gl_context: gl_context,
            window,
            video,
            _sdl: sdl,
        };
        backend.set_gamma(config.gamma_brightness, 0);
        Ok(backend)
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn bind_program(&mut self, program: glow::Program) {
        if self.current_program != Some(program) {
            // SAFETY: context current; `program` is a live program.
            unsafe { self.gl.use_program(Some(program)) };
            self.current_program = Some(program);
        }
    }

    /// Drain pending SDL events.
    pub fn poll_events(&mut self) -> Vec<HostEvent> {
        self.event_pump.poll_iter().filter_map(map_sdl_event).collect()
    }
}

/// Map an SDL2 event to a host event.
fn map_sdl_event(event: Event) -> Option<HostEvent> {
    match event {
        Event::Quit { .. } => Some(HostEvent::Quit),
        Event::KeyDown {
            keycode: Some(key),
            repeat: false,
            ..
        } => map_key(key),
        Event::TextInput { text, .. } => Some(HostEvent::Text(text)),
        _ => None,
    }
}

fn map_key(key: Keycode) -> Option<HostEvent> {
    match key {
        Keycode::Escape => Some(HostEvent::Quit),
        Keycode::F11 => Some(HostEvent::ToggleFullscreen),
        Keycode::F10 => Some(HostEvent::ToggleGrab),
        Keycode::F12 => Some(HostEvent::Screenshot),
        _ => None,
    }
}

fn gl_primitive(primitive: Primitive) -> u32 {
    match primitive {
        Primitive::Points => glow::POINTS,
        Primitive::Lines => glow::LINES,
        Primitive::LineLoop => glow::LINE_LOOP,
        Primitive::TriangleStrip => glow::TRIANGLE_STRIP,
    }
}

/// GLES 2.0 has no single-channel `RED` format; luminance samples the
/// same byte into `.r` on both APIs.
fn gl_format(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::Rgba8 => glow::RGBA,
        TextureFormat::Red8 => glow::LUMINANCE,
    }
}

impl GpuBackend for SdlGlBackend {
    fn drawable_size(&self) -> Size {
        let (w, h) = self.window.drawable_size();
        Size::new(w as i32, h as i32)
    }

    fn readback_order(&self) -> RowOrder {
        RowOrder::BottomUp
    }

    fn compile_program(&mut self, source: &ShaderSource) -> Result<ProgramId> {
        let program = program::build_program(&self.gl, self.api, source)?;
        let id = self.next();
        self.programs.insert(id, program);
        log::debug!("Linked GL program {id} for {}", source.kind);
        Ok(ProgramId(id))
    }

    fn delete_program(&mut self, program: ProgramId) {
        if let Some(p) = self.programs.remove(&program.0) {
            if self.current_program == Some(p) {
                self.current_program = None;
            }
            // SAFETY: context current; `p` came from `build_program`.
            unsafe { self.gl.delete_program(p) };
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        match self.programs.get(&program.0).copied() {
            Some(p) => self.bind_program(p),
            None => log::warn!("use_program: unknown program {}", program.0),
        }
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue) {
        let Some(p) = self.programs.get(&program.0).copied() else {
            return;
        };
        // GL 2.0 uniforms always target the bound program.
        self.bind_program(p);
        // SAFETY: context current; `p` is bound.
        unsafe {
            let Some(loc) = self.gl.get_uniform_location(p, name) else {
                return;
            };
            match value {
                UniformValue::Int(v) => self.gl.uniform_1_i32(Some(&loc), v),
                UniformValue::Float(v) => self.gl.uniform_1_f32(Some(&loc), v),
                UniformValue::Vec4([r, g, b, a]) => self.gl.uniform_4_f32(Some(&loc), r, g, b, a),
                UniformValue::Mat4(m) => self.gl.uniform_matrix_4_f32_slice(Some(&loc), false, &m),
            }
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc, pixels: &[u8]) -> Result<TextureId> {
        if pixels.len() != desc.byte_len() {
            return Err(VideoError::Backend(format!(
                "texture upload of {} bytes for {}x{} {:?}",
                pixels.len(),
                desc.width,
                desc.height,
                desc.format
            )));
        }
        let format = gl_format(desc.format);
        // SAFETY: context current; `pixels` length checked above.
        let texture = unsafe {
            let texture = self.gl.create_texture().map_err(VideoError::Backend)?;
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            for (param, value) in [
                (glow::TEXTURE_MIN_FILTER, glow::NEAREST),
                (glow::TEXTURE_MAG_FILTER, glow::NEAREST),
                (glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE),
                (glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE),
            ] {
                self.gl.tex_parameter_i32(glow::TEXTURE_2D, param, value as i32);
            }
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                format as i32,
                desc.width as i32,
                desc.height as i32,
                0,
                format,
                glow::UNSIGNED_BYTE,
                Some(pixels),
            );
            texture
        };
        let id = self.next();
        self.textures.insert(id, texture);
        Ok(TextureId(id))
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(t) = self.textures.remove(&texture.0) {
            // SAFETY: context current; `t` came from `create_texture`.
            unsafe { self.gl.delete_texture(t) };
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        let gl_texture = texture.and_then(|t| {
            let found = self.textures.get(&t.0).copied();
            if found.is_none() {
                log::warn!("bind_texture: unknown texture {}", t.0);
            }
            found
        });
        // SAFETY: context current.
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, gl_texture);
            self.gl.active_texture(glow::TEXTURE0);
        }
    }

    fn set_viewport(&mut self, size: Size) {
        // SAFETY: context current.
        unsafe { self.gl.viewport(0, 0, size.w, size.h) };
    }

    fn set_blending(&mut self, enabled: bool) {
        // SAFETY: context current.
        unsafe {
            if enabled {
                self.gl.enable(glow::BLEND);
            } else {
                self.gl.disable(glow::BLEND);
            }
        }
    }

    fn clear(&mut self, scissor: Option<Region>, color: Color) {
        let [r, g, b, a] = color.to_normalized();
        // SAFETY: context current.
        unsafe {
            if let Some(s) = scissor {
                self.gl.enable(glow::SCISSOR_TEST);
                self.gl.scissor(s.x, s.y, s.w, s.h);
            }
            self.gl.clear_color(r, g, b, a);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
            if scissor.is_some() {
                self.gl.disable(glow::SCISSOR_TEST);
            }
        }
    }

    fn read_pixels(&mut self, region: Region) -> Result<Vec<u8>> {
        let mut pixels = vec![0u8; region.size().area() * 4];
        // SAFETY: context current; `pixels` holds w*h RGBA texels and the
        // pack alignment is 1.
        unsafe {
            self.gl.read_pixels(
                region.x,
                region.y,
                region.w,
                region.h,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(&mut pixels),
            );
        }
        Ok(pixels)
    }

    fn draw_arrays(
        &mut self,
        primitive: Primitive,
        layout: &[VertexAttrib],
        vertices: &[f32],
    ) -> Result<()> {
        let Some(program) = self.current_program else {
            return Err(VideoError::Backend("draw with no program bound".into()));
        };
        let stride = vertex_stride(layout);
        if stride == 0 || vertices.len() % stride != 0 {
            return Err(VideoError::Backend(format!(
                "{} floats do not fit a stride of {stride}",
                vertices.len()
            )));
        }
        let bytes: Vec<u8> = vertices.iter().flat_map(|v| v.to_ne_bytes()).collect();
        let count = (vertices.len() / stride) as i32;

        // SAFETY: context current; the buffer holds `count` vertices of
        // `stride` floats and every pointer stays inside it.
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
            self.gl
                .buffer_data_u8_slice(glow::ARRAY_BUFFER, &bytes, glow::STREAM_DRAW);
            let mut enabled = Vec::with_capacity(layout.len());
            let mut offset = 0;
            for attrib in layout {
                if let Some(loc) = self.gl.get_attrib_location(program, attrib.name) {
                    self.gl.enable_vertex_attrib_array(loc);
                    self.gl.vertex_attrib_pointer_f32(
                        loc,
                        attrib.components as i32,
                        glow::FLOAT,
                        false,
                        (stride * 4) as i32,
                        (offset * 4) as i32,
                    );
                    enabled.push(loc);
                }
                offset += attrib.components;
            }
            self.gl.draw_arrays(gl_primitive(primitive), 0, count);
            for loc in enabled {
                self.gl.disable_vertex_attrib_array(loc);
            }
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.window.gl_swap_window();
        Ok(())
    }
}

impl WindowControl for SdlGlBackend {
    fn set_fullscreen(&mut self, fullscreen: bool) -> bool {
        if fullscreen == self.fullscreen {
            return false;
        }
        let mode = if fullscreen {
            FullscreenType::Desktop
        } else {
            FullscreenType::Off
        };
        match self.window.set_fullscreen(mode) {
            Ok(()) => {
                self.fullscreen = fullscreen;
                true
            }
            Err(e) => {
                log::warn!("Can't switch fullscreen to {fullscreen}: {e}");
                false
            }
        }
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn toggle_grab_input(&mut self) -> bool {
        let grab = !self.window.grab();
        self.window.set_grab(grab);
        self.window.grab() == grab
    }

    fn set_gamma(&mut self, brightness: i32, _contrast: i32) {
        if let Err(e) = self.window.set_brightness(f64::from(brightness) / 10.0) {
            log::debug!("Window brightness not supported: {e}");
        }
    }

    fn start_text_input(&mut self) {
        self.video.text_input().start();
    }

    fn stop_text_input(&mut self) {
        self.video.text_input().stop();
    }

    fn in_text_input(&self) -> bool {
        self.video.text_input().is_active()
    }

    fn touch_input_enabled(&self) -> bool {
        sdl2::touch::num_touch_devices() > 0
    }
}

impl Drop for SdlGlBackend {
    fn drop(&mut self) {
        // SAFETY: `_gl_context` outlives this body; every handle below was
        // created on it.
        unsafe {
            for (_, t) in self.textures.drain() {
                self.gl.delete_texture(t);
            }
            for (_, p) in self.programs.drain() {
                self.gl.delete_program(p);
            }
            self.gl.delete_buffer(self.vbo);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_event_maps() {
        assert_eq!(
            map_sdl_event(Event::Quit { timestamp: 0 }),
            Some(HostEvent::Quit)
        );
    }

    #[test]
    fn function_keys_map() {
        assert_eq!(map_key(Keycode::Escape), Some(HostEvent::Quit));
        assert_eq!(map_key(Keycode::F11), Some(HostEvent::ToggleFullscreen));
        assert_eq!(map_key(Keycode::F10), Some(HostEvent::ToggleGrab));
        assert_eq!(map_key(Keycode::F12), Some(HostEvent::Screenshot));
        assert_eq!(map_key(Keycode::A), None);
    }

    #[test]
    fn primitive_modes() {
        assert_eq!(gl_primitive(Primitive::Points), glow::POINTS);
        assert_eq!(gl_primitive(Primitive::LineLoop), glow::LINE_LOOP);
        assert_eq!(gl_primitive(Primitive::TriangleStrip), glow::TRIANGLE_STRIP);
    }

    #[test]
    fn single_channel_textures_use_luminance() {
        assert_eq!(gl_format(TextureFormat::Red8), glow::LUMINANCE);
        assert_eq!(gl_format(TextureFormat::Rgba8), glow::RGBA);
    }
}
