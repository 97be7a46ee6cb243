//! GLSL program building.
//!
//! Shader files on disk carry no `#version` line; the header for the
//! requested API is prepended here so the same sources serve desktop GL 2.0
//! and GLES 2.0.

use glow::HasContext;

use retrovid_core::config::GlApi;
use retrovid_core::error::{Result, VideoError};
use retrovid_core::shader::ShaderSource;

/// Preamble prepended to every shader for `api`.
pub fn glsl_header(api: GlApi) -> &'static str {
    match api {
        GlApi::Gl => "#version 110\n",
        GlApi::Gles => "#version 100\nprecision mediump float;\n",
    }
}

/// Full source text for one stage, with any stray `#version` line removed.
pub fn with_header(api: GlApi, body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 48);
    out.push_str(glsl_header(api));
    for line in body.lines() {
        if line.trim_start().starts_with("#version") {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn read_stage(path: &std::path::Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        VideoError::Backend(format!("can't read shader {}: {e}", path.display()))
    })
}

fn compile_stage(
    gl: &glow::Context,
    stage: u32,
    source: &str,
    label: &str,
) -> std::result::Result<glow::Shader, String> {
    // SAFETY: called with the context current on this thread.
    unsafe {
        let shader = gl.create_shader(stage)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(format!("{label}: {log}"));
        }
        Ok(shader)
    }
}

/// Compile both stages of `source` and link them.
pub fn build_program(gl: &glow::Context, api: GlApi, source: &ShaderSource) -> Result<glow::Program> {
    let vertex = with_header(api, &read_stage(&source.vertex)?);
    let fragment = with_header(api, &read_stage(&source.fragment)?);
    let fail = |message: String| VideoError::ShaderCompile {
        kind: source.kind.to_string(),
        message,
    };

    let vs = compile_stage(
        gl,
        glow::VERTEX_SHADER,
        &vertex,
        &source.vertex.display().to_string(),
    )
    .map_err(fail)?;
    let fs = match compile_stage(
        gl,
        glow::FRAGMENT_SHADER,
        &fragment,
        &source.fragment.display().to_string(),
    ) {
        Ok(fs) => fs,
        Err(e) => {
            // SAFETY: context current; `vs` was created above.
            unsafe { gl.delete_shader(vs) };
            return Err(fail(e));
        }
    };

    // SAFETY: context current; both shaders compiled successfully.
    unsafe {
        let program = match gl.create_program() {
            Ok(p) => p,
            Err(e) => {
                gl.delete_shader(vs);
                gl.delete_shader(fs);
                return Err(fail(e));
            }
        };
        gl.attach_shader(program, vs);
        gl.attach_shader(program, fs);
        gl.link_program(program);
        let linked = gl.get_program_link_status(program);
        gl.detach_shader(program, vs);
        gl.detach_shader(program, fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);
        if !linked {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            return Err(fail(format!("link: {log}")));
        }
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrovid_core::shader::ShaderKind;

    #[test]
    fn desktop_header() {
        let src = with_header(GlApi::Gl, "void main() {}\n");
        assert!(src.starts_with("#version 110\n"));
        assert!(!src.contains("precision"));
    }

    #[test]
    fn es_header_sets_float_precision() {
        let src = with_header(GlApi::Gles, "void main() {}");
        assert!(src.starts_with("#version 100\nprecision mediump float;\n"));
        assert!(src.ends_with("void main() {}\n"));
    }

    #[test]
    fn existing_version_line_is_replaced() {
        let src = with_header(GlApi::Gles, "#version 330 core\nvoid main() {}\n");
        assert_eq!(src.matches("#version").count(), 1);
        assert!(!src.contains("330"));
    }

    #[test]
    fn shipped_shaders_exist_for_every_kind() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders");
        for kind in ShaderKind::ALL {
            let source = ShaderSource::in_dir(&dir, kind);
            let vs = read_stage(&source.vertex).unwrap();
            let fs = read_stage(&source.fragment).unwrap();
            assert!(vs.contains("void main"), "{kind} vertex");
            assert!(fs.contains("gl_FragColor"), "{kind} fragment");
        }
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_stage(&dir.path().join("Nope.glslv")).unwrap_err();
        assert!(err.to_string().contains("Nope.glslv"));
    }
}
