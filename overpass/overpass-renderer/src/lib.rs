//! Overpass renderer: an overlay pass injected into the host's post-process chain, and
//! full-screen draws into caller-owned render targets.

pub mod config;
pub mod context;
pub mod full_screen;
pub mod geometry;
pub mod overlay_pass;
pub mod params;
pub mod shaders;

pub use config::{OverpassConfig, TransformPolicy};
pub use context::GraphicsContext;
pub use full_screen::{draw_to_render_target_render_thread, DrawError};
pub use geometry::{FrameResource, GeometryBuffer, GeometryKind, GeometryResource};
pub use overlay_pass::{OverlayPass, SkipReason};
pub use params::{equals, not_equals, CompiledDrawParameters, DrawParameters};
pub use shaders::{ShaderKind, ShaderMap};
