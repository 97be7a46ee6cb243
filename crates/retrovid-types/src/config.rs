//! Video configuration loaded from TOML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VideoError};
use crate::geometry::Size;

/// Which OpenGL flavour the SDL backend requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlApi {
    /// Desktop OpenGL 2.0.
    #[default]
    Gl,
    /// OpenGL ES 2.0.
    Gles,
}

/// Display and renderer settings.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub screen_width: u32,
    pub screen_height: u32,
    pub window_title: String,
    pub fullscreen: bool,
    /// Directory holding the six vertex/fragment program pairs.
    pub shader_dir: PathBuf,
    pub gl_api: GlApi,
    pub vsync: bool,
    /// Window brightness in tenths (10 = unchanged).
    pub gamma_brightness: i32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            screen_width: 800,
            screen_height: 600,
            window_title: "retrovid".to_string(),
            fullscreen: false,
            shader_dir: PathBuf::from("shaders"),
            gl_api: GlApi::Gl,
            vsync: true,
            gamma_brightness: 10,
        }
    }
}

impl VideoConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: VideoConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded video config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.screen_width == 0 || self.screen_height == 0 {
            return Err(VideoError::Config(format!(
                "screen size must be non-zero, got {}x{}",
                self.screen_width, self.screen_height
            )));
        }
        if self.screen_width > i32::MAX as u32 || self.screen_height > i32::MAX as u32 {
            return Err(VideoError::Config("screen size out of range".into()));
        }
        Ok(())
    }

    pub fn screen_size(&self) -> Size {
        Size::new(self.screen_width as i32, self.screen_height as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let c = VideoConfig::from_toml_str("").unwrap();
        assert_eq!(c, VideoConfig::default());
    }

    #[test]
    fn partial_override() {
        let c = VideoConfig::from_toml_str(
            r#"
            screen_width = 640
            screen_height = 480
            gl_api = "gles"
            "#,
        )
        .unwrap();
        assert_eq!(c.screen_size(), Size::new(640, 480));
        assert_eq!(c.gl_api, GlApi::Gles);
        assert_eq!(c.window_title, "retrovid");
        assert!(c.vsync);
    }

    #[test]
    fn zero_width_rejected() {
        let err = VideoConfig::from_toml_str("screen_width = 0").unwrap_err();
        assert!(matches!(err, VideoError::Config(_)));
    }

    #[test]
    fn bad_gl_api_is_parse_error() {
        let err = VideoConfig::from_toml_str("gl_api = \"vulkan\"").unwrap_err();
        assert!(matches!(err, VideoError::TomlParse(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.toml");
        std::fs::write(
            &path,
            "window_title = \"Baldur\"\nshader_dir = \"/opt/shaders\"\nfullscreen = true\n",
        )
        .unwrap();
        let c = VideoConfig::load(&path).unwrap();
        assert_eq!(c.window_title, "Baldur");
        assert_eq!(c.shader_dir, PathBuf::from("/opt/shaders"));
        assert!(c.fullscreen);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = VideoConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, VideoError::Io(_)));
    }

    #[test]
    fn serialize_roundtrip_through_toml() {
        let c = VideoConfig {
            screen_width: 1024,
            gamma_brightness: 7,
            ..VideoConfig::default()
        };
        let text = toml::to_string(&c).unwrap();
        assert_eq!(VideoConfig::from_toml_str(&text).unwrap(), c);
    }
}
