//! Shader program registry.
//!
//! Six program kinds cover everything the driver draws. Programs are
//! compiled the first time they are needed and kept until the registry is
//! released, so a failed compile is retried on the next request rather than
//! cached as a failure.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::backend::{GpuBackend, ProgramId, UniformValue};
use crate::error::{Result, VideoError};

/// Texture unit the sprite (or buffer) texture is bound to.
pub const TEXTURE_UNIT: u32 = 0;
/// Texture unit the 256x1 palette texture is bound to.
pub const PALETTE_UNIT: u32 = 1;
/// Texture unit the optional stencil mask is bound to.
pub const MASK_UNIT: u32 = 2;

/// The fixed set of programs the driver uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Direct-color sprites.
    SpriteRgba,
    /// Compositing a render buffer onto the display.
    SpriteBackbuffer,
    /// Paletted sprites.
    SpritePal,
    /// Paletted sprites, greyscale.
    SpritePalGray,
    /// Paletted sprites, sepia.
    SpritePalSepia,
    /// Flat-color rects, lines and points.
    Primitive,
}

impl ShaderKind {
    pub const ALL: [ShaderKind; 6] = [
        ShaderKind::SpriteRgba,
        ShaderKind::SpriteBackbuffer,
        ShaderKind::SpritePal,
        ShaderKind::SpritePalGray,
        ShaderKind::SpritePalSepia,
        ShaderKind::Primitive,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn vertex_file(self) -> &'static str {
        match self {
            ShaderKind::Primitive => "Primitive.glslv",
            _ => "Sprite.glslv",
        }
    }

    pub const fn fragment_file(self) -> &'static str {
        match self {
            ShaderKind::SpriteRgba => "Sprite32.glslf",
            ShaderKind::SpriteBackbuffer => "SpriteBB.glslf",
            ShaderKind::SpritePal => "SpritePal.glslf",
            ShaderKind::SpritePalGray => "SpritePalGrayed.glslf",
            ShaderKind::SpritePalSepia => "SpritePalSepia.glslf",
            ShaderKind::Primitive => "Primitive.glslf",
        }
    }

    /// Whether the program samples a palette on [`PALETTE_UNIT`].
    pub const fn is_paletted(self) -> bool {
        matches!(
            self,
            ShaderKind::SpritePal | ShaderKind::SpritePalGray | ShaderKind::SpritePalSepia
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            ShaderKind::SpriteRgba => "SpriteRgba",
            ShaderKind::SpriteBackbuffer => "SpriteBackbuffer",
            ShaderKind::SpritePal => "SpritePal",
            ShaderKind::SpritePalGray => "SpritePalGray",
            ShaderKind::SpritePalSepia => "SpritePalSepia",
            ShaderKind::Primitive => "Primitive",
        }
    }
}

impl fmt::Display for ShaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a program's sources live on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub kind: ShaderKind,
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl ShaderSource {
    pub fn in_dir(dir: &Path, kind: ShaderKind) -> Self {
        Self {
            kind,
            vertex: dir.join(kind.vertex_file()),
            fragment: dir.join(kind.fragment_file()),
        }
    }
}

/// Lazily compiled program per [`ShaderKind`].
#[derive(Debug)]
pub struct ShaderRegistry {
    dir: PathBuf,
    programs: [Option<ProgramId>; 6],
}

impl ShaderRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            programs: [None; 6],
        }
    }

    pub fn shader_dir(&self) -> &Path {
        &self.dir
    }

    /// The compiled program for `kind`, if it has been built.
    pub fn get(&self, kind: ShaderKind) -> Option<ProgramId> {
        self.programs[kind.index()]
    }

    pub fn compiled_count(&self) -> usize {
        self.programs.iter().flatten().count()
    }

    /// Return the program for `kind`, compiling it on first use.
    ///
    /// A freshly linked program gets its sampler uniforms pointed at the
    /// fixed texture units. Failures are logged and returned; nothing is
    /// cached, so the caller's draw is skipped and the next request retries.
    pub fn get_or_compile(
        &mut self,
        gpu: &mut dyn GpuBackend,
        kind: ShaderKind,
    ) -> Result<ProgramId> {
        if let Some(program) = self.programs[kind.index()] {
            return Ok(program);
        }

        let source = ShaderSource::in_dir(&self.dir, kind);
        let program = gpu.compile_program(&source).map_err(|e| {
            log::error!("Can't build shader program {kind}: {e}");
            match e {
                VideoError::ShaderCompile { .. } => e,
                other => VideoError::ShaderCompile {
                    kind: kind.to_string(),
                    message: other.to_string(),
                },
            }
        })?;

        gpu.use_program(program);
        gpu.set_uniform(program, "s_texture", UniformValue::Int(TEXTURE_UNIT as i32));
        gpu.set_uniform(program, "s_palette", UniformValue::Int(PALETTE_UNIT as i32));
        gpu.set_uniform(program, "s_mask", UniformValue::Int(MASK_UNIT as i32));

        log::debug!(
            "Compiled shader program {kind} from {}",
            source.fragment.display()
        );
        self.programs[kind.index()] = Some(program);
        Ok(program)
    }

    /// Delete every compiled program.
    pub fn release_all(&mut self, gpu: &mut dyn GpuBackend) {
        for program in self.programs.iter_mut().filter_map(Option::take) {
            gpu.delete_program(program);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{GpuCall, RecordingBackend};

    #[test]
    fn file_names_per_kind() {
        assert_eq!(ShaderKind::Primitive.vertex_file(), "Primitive.glslv");
        assert_eq!(ShaderKind::SpritePal.vertex_file(), "Sprite.glslv");
        assert_eq!(ShaderKind::SpriteBackbuffer.fragment_file(), "SpriteBB.glslf");
        assert_eq!(
            ShaderKind::SpritePalGray.fragment_file(),
            "SpritePalGrayed.glslf"
        );
    }

    #[test]
    fn indices_are_dense() {
        for (i, kind) in ShaderKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn source_paths_join_dir() {
        let src = ShaderSource::in_dir(Path::new("/data/shaders"), ShaderKind::SpriteRgba);
        assert_eq!(src.vertex, PathBuf::from("/data/shaders/Sprite.glslv"));
        assert_eq!(src.fragment, PathBuf::from("/data/shaders/Sprite32.glslf"));
    }

    #[test]
    fn compiles_once_per_kind() {
        let mut gpu = RecordingBackend::new(64, 64);
        let mut reg = ShaderRegistry::new("shaders");
        let a = reg.get_or_compile(&mut gpu, ShaderKind::Primitive).unwrap();
        let b = reg.get_or_compile(&mut gpu, ShaderKind::Primitive).unwrap();
        assert_eq!(a, b);
        assert_eq!(gpu.compile_count(), 1);
        assert_eq!(reg.compiled_count(), 1);
    }

    #[test]
    fn sampler_units_assigned_after_link() {
        let mut gpu = RecordingBackend::new(64, 64);
        let mut reg = ShaderRegistry::new("shaders");
        let p = reg.get_or_compile(&mut gpu, ShaderKind::SpritePal).unwrap();
        for (name, unit) in [("s_texture", 0), ("s_palette", 1), ("s_mask", 2)] {
            assert!(gpu.calls.contains(&GpuCall::SetUniform {
                program: p,
                name: name.into(),
                value: UniformValue::Int(unit),
            }));
        }
    }

    #[test]
    fn failed_compile_is_not_cached() {
        let mut gpu = RecordingBackend::new(64, 64);
        gpu.fail_compile = Some(ShaderKind::SpriteRgba);
        let mut reg = ShaderRegistry::new("shaders");

        let err = reg
            .get_or_compile(&mut gpu, ShaderKind::SpriteRgba)
            .unwrap_err();
        assert!(matches!(err, VideoError::ShaderCompile { .. }));
        assert_eq!(reg.get(ShaderKind::SpriteRgba), None);

        gpu.fail_compile = None;
        assert!(reg.get_or_compile(&mut gpu, ShaderKind::SpriteRgba).is_ok());
        assert_eq!(gpu.compile_count(), 2);
    }

    #[test]
    fn release_all_deletes_programs() {
        let mut gpu = RecordingBackend::new(64, 64);
        let mut reg = ShaderRegistry::new("shaders");
        for kind in ShaderKind::ALL {
            reg.get_or_compile(&mut gpu, kind).unwrap();
        }
        assert_eq!(reg.compiled_count(), 6);
        reg.release_all(&mut gpu);
        assert_eq!(reg.compiled_count(), 0);
        let deleted = gpu
            .calls
            .iter()
            .filter(|c| matches!(c, GpuCall::DeleteProgram(_)))
            .count();
        assert_eq!(deleted, 6);
    }
}
