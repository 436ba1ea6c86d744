//! Overpass bridge: wires the renderer into a host through render-api.

pub mod draw_request;
mod extension;
pub mod logging;
mod plugin;
pub mod render_thread;

pub use draw_request::DrawRequestQueue;
pub use extension::OverlayViewExtension;
pub use logging::{init_logging, LoggingConfig};
pub use plugin::OverpassPlugin;
pub use render_thread::{BridgeError, RenderCommandQueue, RenderCommandSender, RenderThread};
