//! Error types for retrovid.

use std::io;

use crate::video::BufferFormat;

/// Errors produced by the retrovid video core and its backends.
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("unsupported buffer format: {0}")]
    UnsupportedFormat(BufferFormat),

    #[error("can't build shader program {kind}: {message}")]
    ShaderCompile { kind: String, message: String },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("invalid sprite: {0}")]
    InvalidSprite(String),

    #[error("invalid buffer: {0}")]
    InvalidBuffer(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, VideoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display() {
        let e = VideoError::UnsupportedFormat(BufferFormat::Rgb555);
        assert_eq!(format!("{e}"), "unsupported buffer format: RGB555");
    }

    #[test]
    fn shader_compile_display() {
        let e = VideoError::ShaderCompile {
            kind: "Primitive".into(),
            message: "syntax error".into(),
        };
        assert_eq!(
            format!("{e}"),
            "can't build shader program Primitive: syntax error"
        );
    }

    #[test]
    fn backend_error_display() {
        let e = VideoError::Backend("context lost".into());
        assert_eq!(format!("{e}"), "backend error: context lost");
    }

    #[test]
    fn invalid_sprite_display() {
        let e = VideoError::InvalidSprite("no palette".into());
        assert_eq!(format!("{e}"), "invalid sprite: no palette");
    }

    #[test]
    fn invalid_buffer_display() {
        let e = VideoError::InvalidBuffer("unknown id 3".into());
        assert_eq!(format!("{e}"), "invalid buffer: unknown id 3");
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let e: VideoError = io_err.into();
        let msg = format!("{e}");
        assert!(msg.contains("I/O error"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn toml_error_from_conversion() {
        let toml_err = toml::from_str::<toml::Value>("this is [[[not valid toml").unwrap_err();
        let e: VideoError = toml_err.into();
        assert!(format!("{e}").contains("TOML parse error"));
    }

    #[test]
    fn result_alias_err() {
        let r: Result<i32> = Err(VideoError::Config("oops".into()));
        assert!(r.is_err());
    }
}
