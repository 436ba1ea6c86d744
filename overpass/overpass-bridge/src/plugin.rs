//! Overpass plugin: owns the graphics context and render thread, registers the overlay extension.

use std::sync::Arc;

use overpass_renderer::{GraphicsContext, OverlayPass, OverpassConfig};
use overpass_rhi::Device;
use render_api::{ExtensionRegistry, GameClock, RenderCommandStream};

use crate::draw_request::DrawRequestQueue;
use crate::extension::OverlayViewExtension;
use crate::render_thread::{BridgeError, RenderThread};

pub struct OverpassPlugin {
    context: Arc<GraphicsContext>,
    render_thread: RenderThread,
    draw_requests: DrawRequestQueue,
}

impl OverpassPlugin {
    /// Start the render thread and register the overlay with `registry`.
    pub fn startup(
        device: Arc<dyn Device>,
        config: OverpassConfig,
        clock: Arc<dyn GameClock>,
        registry: &mut ExtensionRegistry,
    ) -> Result<Self, BridgeError> {
        let context = Arc::new(GraphicsContext::new(Arc::clone(&device), config));
        if let Err(err) = context.initialize() {
            // Not fatal: the overlay skips drawing while geometry is unavailable.
            log::error!("overpass geometry: {err}");
        }
        let render_thread = RenderThread::spawn(device)?;
        let overlay = Arc::new(OverlayPass::new(Arc::clone(&context), Arc::clone(&clock)));
        registry.register(Arc::new(OverlayViewExtension::new(overlay)));
        let stream: Arc<dyn RenderCommandStream> = Arc::new(render_thread.sender());
        let draw_requests = DrawRequestQueue::new(Arc::clone(&context), clock, stream);
        log::info!("overpass started at {:?}", context.feature_level());
        Ok(Self { context, render_thread, draw_requests })
    }

    /// Start on the first available wgpu adapter.
    #[cfg(feature = "wgpu")]
    pub fn startup_wgpu(
        config: OverpassConfig,
        clock: Arc<dyn GameClock>,
        registry: &mut ExtensionRegistry,
    ) -> Result<Self, BridgeError> {
        let device = pollster::block_on(overpass_rhi::wgpu_backend::WgpuDevice::request_headless())?;
        Self::startup(Arc::new(device), config, clock, registry)
    }

    pub fn context(&self) -> &Arc<GraphicsContext> {
        &self.context
    }

    pub fn draw_requests(&self) -> &DrawRequestQueue {
        &self.draw_requests
    }

    /// Stream for posting render commands, e.g. target releases.
    pub fn render_stream(&self) -> &dyn RenderCommandStream {
        &self.render_thread
    }

    /// Unregister the extension, run every queued command, then free device resources.
    pub fn shutdown(self, registry: &mut ExtensionRegistry) -> Result<(), BridgeError> {
        registry.unregister(OverlayViewExtension::NAME);
        let Self { context, render_thread, draw_requests } = self;
        drop(draw_requests);
        render_thread.shutdown()?;
        context.teardown();
        log::info!("overpass shut down");
        Ok(())
    }
}
