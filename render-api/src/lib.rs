//! Host-side render API shared by the renderer and its bridge.
//! Views, the per-frame render graph, post-process pass slots, the scene view extension
//! registry and the render command stream all live here so plugins only depend on this crate.

mod clock;
mod command;
mod extension;
pub mod graph;
pub mod math;
mod post_process;
mod target;
mod view;

pub use clock::{FixedClock, GameClock, MonotonicClock};
pub use command::{RenderCommand, RenderCommandStream, RhiCommandListImmediate, StreamClosed};
pub use extension::{ExtensionRegistry, SceneViewExtension};
pub use graph::{GraphError, GraphResources, GraphTextureId, PassKind, RenderGraph, RenderGraphNode};
pub use post_process::{
    AfterPassCallback, FrameCallbacks, PassCallbackList, PostProcessMaterialInputs, PostProcessSequence,
    PostProcessingPass, ScreenPassRenderTarget, ScreenPassTexture,
};
pub use target::{RenderTargetResource, Scene, TextureRenderTarget};
pub use view::{IntRect, SceneView, ViewMatrices};

pub use overpass_rhi as rhi;
