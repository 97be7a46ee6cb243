//! Foundation types for retrovid.
//!
//! This crate contains the backend-agnostic types shared by every retrovid
//! crate: colors, integer geometry, render buffer formats, blit flags,
//! configuration, and error types.

pub mod color;
pub mod config;
pub mod error;
pub mod geometry;
pub mod video;

pub use color::Color;
pub use config::{GlApi, VideoConfig};
pub use error::{Result, VideoError};
pub use geometry::{Point, Region, Size};
pub use video::{BlitFlags, BufferFormat, ShadowMode};
