//! CPU versions of the six shader programs.
//!
//! Each program kind has a fixed fragment function reading the same
//! uniforms and texture units as its GLSL counterpart. `None` means the
//! fragment was discarded.

use std::collections::HashMap;

use retrovid_core::backend::{TextureDesc, TextureFormat, UniformValue};
use retrovid_core::shader::ShaderKind;

use crate::renderer::to_unit;

/// Palette entry drawn as the sprite's shadow.
pub const SHADOW_INDEX: i32 = 1;

const GREY_WEIGHTS: [f32; 3] = [0.30, 0.59, 0.11];
const SEPIA_TONE: [f32; 3] = [1.0, 0.85, 0.6];

#[derive(Debug)]
pub struct Texture {
    pub desc: TextureDesc,
    pub data: Vec<u8>,
}

impl Texture {
    /// Nearest-neighbour, clamp-to-edge fetch. Single-channel textures
    /// return their byte in `.r`.
    pub fn sample(&self, uv: [f32; 2]) -> [u8; 4] {
        let w = self.desc.width as i32;
        let h = self.desc.height as i32;
        let x = ((uv[0] * w as f32).floor() as i32).clamp(0, w - 1) as usize;
        let y = ((uv[1] * h as f32).floor() as i32).clamp(0, h - 1) as usize;
        let i = y * w as usize + x;
        match self.desc.format {
            TextureFormat::Rgba8 => {
                let mut px = [0; 4];
                px.copy_from_slice(&self.data[i * 4..i * 4 + 4]);
                px
            }
            TextureFormat::Red8 => [self.data[i], 0, 0, 255],
        }
    }
}

/// A "linked" program: its kind plus the uniforms set on it so far.
#[derive(Debug)]
pub struct Program {
    pub kind: ShaderKind,
    uniforms: HashMap<String, UniformValue>,
}

impl Program {
    pub fn new(kind: ShaderKind) -> Self {
        Self {
            kind,
            uniforms: HashMap::new(),
        }
    }

    pub fn set(&mut self, name: &str, value: UniformValue) {
        self.uniforms.insert(name.to_string(), value);
    }

    fn int(&self, name: &str, default: i32) -> i32 {
        match self.uniforms.get(name) {
            Some(UniformValue::Int(v)) => *v,
            _ => default,
        }
    }

    fn float(&self, name: &str, default: f32) -> f32 {
        match self.uniforms.get(name) {
            Some(UniformValue::Float(v)) => *v,
            _ => default,
        }
    }

    fn vec4(&self, name: &str, default: [f32; 4]) -> [f32; 4] {
        match self.uniforms.get(name) {
            Some(UniformValue::Vec4(v)) => *v,
            _ => default,
        }
    }

    /// Matrix uniform name used by the vertex stage.
    pub fn matrix(&self) -> [f32; 16] {
        let name = match self.kind {
            ShaderKind::Primitive => "matrix",
            _ => "u_matrix",
        };
        match self.uniforms.get(name) {
            Some(UniformValue::Mat4(m)) => *m,
            _ => IDENTITY,
        }
    }

    /// Resolve the uniforms a fragment needs, once per draw.
    pub fn stage(&self) -> Stage {
        Stage {
            kind: self.kind,
            color: self.vec4("color", [0.0, 0.0, 0.0, 1.0]),
            tint: self.vec4("u_tint", [1.0; 4]),
            alpha_mod: self.float("u_alphaModifier", 1.0),
            has_mask: self.int("u_hasMask", 0) != 0,
            color_key: self.int("u_colorKey", -1),
            shadow_mode: self.int("u_shadowMode", 1),
        }
    }

    /// Shade a single fragment. `units` holds whatever is bound to texture
    /// units 0, 1, and 2.
    pub fn fragment(&self, units: [Option<&Texture>; 3], uv: [f32; 2]) -> Option<[f32; 4]> {
        self.stage().shade(units, uv)
    }
}

/// Uniform values of a program frozen for one draw call.
#[derive(Debug, Clone, Copy)]
pub struct Stage {
    kind: ShaderKind,
    color: [f32; 4],
    tint: [f32; 4],
    alpha_mod: f32,
    has_mask: bool,
    color_key: i32,
    shadow_mode: i32,
}

impl Stage {
    pub fn shade(&self, units: [Option<&Texture>; 3], uv: [f32; 2]) -> Option<[f32; 4]> {
        let fetch = |unit: usize, uv: [f32; 2]| {
            units[unit].map_or([0, 0, 0, 255], |t| t.sample(uv))
        };
        let tint = self.tint;
        let coverage = if self.has_mask {
            to_unit(fetch(2, uv)[0])
        } else {
            1.0
        };

        match self.kind {
            ShaderKind::Primitive => Some(self.color),
            ShaderKind::SpriteRgba | ShaderKind::SpriteBackbuffer => {
                let c = fetch(0, uv);
                let coverage = if self.kind == ShaderKind::SpriteRgba {
                    coverage
                } else {
                    1.0
                };
                Some([
                    to_unit(c[0]) * tint[0],
                    to_unit(c[1]) * tint[1],
                    to_unit(c[2]) * tint[2],
                    to_unit(c[3]) * tint[3] * self.alpha_mod * coverage,
                ])
            }
            ShaderKind::SpritePal | ShaderKind::SpritePalGray | ShaderKind::SpritePalSepia => {
                let index = i32::from(fetch(0, uv)[0]);
                if index == self.color_key {
                    return None;
                }
                let mut alpha = coverage;
                if index == SHADOW_INDEX {
                    match self.shadow_mode {
                        0 => return None,
                        2 => alpha *= 0.5,
                        _ => {}
                    }
                }
                let c = fetch(1, [(index as f32 + 0.5) / 256.0, 0.5]);
                let mut rgb = [to_unit(c[0]), to_unit(c[1]), to_unit(c[2])];
                if self.kind != ShaderKind::SpritePal {
                    let grey = rgb.iter().zip(GREY_WEIGHTS).map(|(c, w)| c * w).sum::<f32>();
                    rgb = [grey; 3];
                    if self.kind == ShaderKind::SpritePalSepia {
                        for (c, t) in rgb.iter_mut().zip(SEPIA_TONE) {
                            *c *= t;
                        }
                    }
                }
                Some([
                    rgb[0] * tint[0],
                    rgb[1] * tint[1],
                    rgb[2] * tint[2],
                    to_unit(c[3]) * alpha * tint[3] * self.alpha_mod,
                ])
            }
        }
    }
}

const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Apply a column-major matrix to `(x, y, 0, 1)` and return clip-space
/// `x, y` after the perspective divide.
pub fn transform(m: &[f32; 16], p: [f32; 2]) -> [f32; 2] {
    let x = m[0] * p[0] + m[4] * p[1] + m[12];
    let y = m[1] * p[0] + m[5] * p[1] + m[13];
    let w = m[3] * p[0] + m[7] * p[1] + m[15];
    if w == 0.0 { [x, y] } else { [x / w, y / w] }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba_texture(w: u32, h: u32, data: Vec<u8>) -> Texture {
        Texture {
            desc: TextureDesc::rgba(w, h),
            data,
        }
    }

    fn palette_texture(entries: &[(usize, [u8; 4])]) -> Texture {
        let mut data = vec![0u8; 1024];
        for (i, c) in entries {
            data[i * 4..i * 4 + 4].copy_from_slice(c);
        }
        rgba_texture(256, 1, data)
    }

    fn index_texture(index: u8) -> Texture {
        Texture {
            desc: TextureDesc::red(1, 1),
            data: vec![index],
        }
    }

    #[test]
    fn nearest_sampling_clamps() {
        let t = rgba_texture(2, 1, vec![1, 1, 1, 1, 2, 2, 2, 2]);
        assert_eq!(t.sample([0.25, 0.5]), [1, 1, 1, 1]);
        assert_eq!(t.sample([0.75, 0.5]), [2, 2, 2, 2]);
        assert_eq!(t.sample([1.0, 0.5]), [2, 2, 2, 2]);
        assert_eq!(t.sample([-0.5, 0.5]), [1, 1, 1, 1]);
    }

    #[test]
    fn primitive_outputs_color_uniform() {
        let mut p = Program::new(ShaderKind::Primitive);
        p.set("color", UniformValue::Vec4([1.0, 0.0, 0.5, 1.0]));
        assert_eq!(p.fragment([None; 3], [0.0; 2]), Some([1.0, 0.0, 0.5, 1.0]));
    }

    #[test]
    fn rgba_sprite_applies_tint_and_alpha_modifier() {
        let tex = rgba_texture(1, 1, vec![255, 255, 255, 255]);
        let mut p = Program::new(ShaderKind::SpriteRgba);
        p.set("u_tint", UniformValue::Vec4([1.0, 0.5, 0.0, 1.0]));
        p.set("u_alphaModifier", UniformValue::Float(0.5));
        let out = p.fragment([Some(&tex), None, None], [0.5; 2]).unwrap();
        assert_eq!(out, [1.0, 0.5, 0.0, 0.5]);
    }

    #[test]
    fn mask_scales_alpha_only_when_flagged() {
        let tex = rgba_texture(1, 1, vec![255, 0, 0, 255]);
        let mask = index_texture(0);
        let mut p = Program::new(ShaderKind::SpriteRgba);
        let units = [Some(&tex), None, Some(&mask)];
        assert_eq!(p.fragment(units, [0.5; 2]).unwrap()[3], 1.0);
        p.set("u_hasMask", UniformValue::Int(1));
        assert_eq!(p.fragment(units, [0.5; 2]).unwrap()[3], 0.0);
    }

    #[test]
    fn palette_lookup() {
        let idx = index_texture(7);
        let pal = palette_texture(&[(7, [255, 0, 255, 255])]);
        let p = Program::new(ShaderKind::SpritePal);
        let out = p.fragment([Some(&idx), Some(&pal), None], [0.5; 2]).unwrap();
        assert_eq!(out, [1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn color_key_discards() {
        let idx = index_texture(0);
        let pal = palette_texture(&[]);
        let mut p = Program::new(ShaderKind::SpritePal);
        p.set("u_colorKey", UniformValue::Int(0));
        assert_eq!(p.fragment([Some(&idx), Some(&pal), None], [0.5; 2]), None);
    }

    #[test]
    fn shadow_modes() {
        let idx = index_texture(1);
        let pal = palette_texture(&[(1, [0, 0, 0, 255])]);
        let units = [Some(&idx), Some(&pal), None];
        let mut p = Program::new(ShaderKind::SpritePal);

        p.set("u_shadowMode", UniformValue::Int(1));
        assert_eq!(p.fragment(units, [0.5; 2]).unwrap()[3], 1.0);
        p.set("u_shadowMode", UniformValue::Int(2));
        assert_eq!(p.fragment(units, [0.5; 2]).unwrap()[3], 0.5);
        p.set("u_shadowMode", UniformValue::Int(0));
        assert_eq!(p.fragment(units, [0.5; 2]), None);
    }

    #[test]
    fn grey_and_sepia() {
        let idx = index_texture(3);
        let pal = palette_texture(&[(3, [255, 255, 255, 255])]);
        let units = [Some(&idx), Some(&pal), None];

        let grey = Program::new(ShaderKind::SpritePalGray)
            .fragment(units, [0.5; 2])
            .unwrap();
        assert!(grey[..3].iter().all(|c| (c - 1.0).abs() < 1e-5));

        let sepia = Program::new(ShaderKind::SpritePalSepia)
            .fragment(units, [0.5; 2])
            .unwrap();
        assert!((sepia[0] - 1.0).abs() < 1e-5);
        assert!((sepia[1] - 0.85).abs() < 1e-5);
        assert!((sepia[2] - 0.6).abs() < 1e-5);
    }

    #[test]
    fn unbound_unit_samples_opaque_black() {
        let p = Program::new(ShaderKind::SpriteBackbuffer);
        assert_eq!(p.fragment([None; 3], [0.5; 2]), Some([0.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn transform_applies_translation() {
        let mut m = IDENTITY;
        m[12] = 3.0;
        m[13] = -1.0;
        assert_eq!(transform(&m, [1.0, 2.0]), [4.0, 1.0]);
    }
}
