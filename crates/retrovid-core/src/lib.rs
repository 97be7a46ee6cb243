//! retrovid video core.
//!
//! Backend-agnostic rendering layer: a stack of offscreen render buffers
//! with deferred texture materialization, a lazily compiled shader program
//! registry, shared palette textures, and the sprite/primitive drawing
//! contract built on top of them. Backends only provide the small
//! [`backend::GpuBackend`] vtable; all state machine and ordering logic
//! lives here.

// Re-exports from retrovid-types (foundation types).
pub use retrovid_types::color;
pub use retrovid_types::config;
pub use retrovid_types::error;
pub use retrovid_types::geometry;
pub use retrovid_types::video;

pub mod backend;
pub mod buffer;
pub mod driver;
pub mod palette;
pub mod shader;
pub mod sprite;

#[cfg(test)]
pub(crate) mod test_utils;

pub use backend::{GpuBackend, WindowControl};
pub use buffer::{BufferState, RenderBuffer};
pub use driver::{BufferId, VideoDriver};
pub use palette::{Palette, PaletteTextureManager};
pub use shader::{ShaderKind, ShaderRegistry};
pub use sprite::{ChannelMasks, Sprite};
