//! Fire-and-forget draw requests from any thread into a render target.

use std::sync::Arc;

use overpass_renderer::{draw_to_render_target_render_thread, CompiledDrawParameters, DrawParameters, GraphicsContext};
use render_api::{GameClock, RenderCommandStream, RhiCommandListImmediate, Scene, TextureRenderTarget};

/// Log target for caller-facing precondition warnings.
pub const MESSAGE_LOG_TARGET: &str = "blueprint";

/// Game-thread entry for deferred full-screen draws. Requests are validated, compiled and
/// posted to the render command stream; nothing is drawn on the calling thread.
pub struct DrawRequestQueue {
    context: Arc<GraphicsContext>,
    clock: Arc<dyn GameClock>,
    stream: Arc<dyn RenderCommandStream>,
}

impl DrawRequestQueue {
    pub fn new(context: Arc<GraphicsContext>, clock: Arc<dyn GameClock>, stream: Arc<dyn RenderCommandStream>) -> Self {
        Self { context, clock, stream }
    }

    /// Snapshot `params` and post a full-screen draw into `target`. Returns immediately.
    ///
    /// A missing target or a scene below the configured feature level is logged and nothing
    /// is posted. Requests from one thread execute in the order they were made.
    pub fn request_draw(&self, scene: &Scene, params: &DrawParameters, target: Option<&TextureRenderTarget>) {
        let Some(target) = target else {
            log::warn!(target: MESSAGE_LOG_TARGET, "DrawToRenderTarget: Output render target is required.");
            return;
        };
        let feature_level = scene.feature_level();
        let minimum = self.context.config().minimum_feature_level;
        if feature_level < minimum {
            log::warn!(
                target: MESSAGE_LOG_TARGET,
                "DrawToRenderTarget: Requires feature level {minimum:?} which is unavailable."
            );
            return;
        }

        let resource = target.game_thread_render_target_resource();
        let compiled = CompiledDrawParameters::new(params, (resource.size_x(), resource.size_y()), feature_level);
        let context = Arc::clone(&self.context);
        let clock = Arc::clone(&self.clock);
        let posted = self.stream.enqueue(
            "DrawToRenderTarget",
            Box::new(move |rhi_cmd_list: &mut RhiCommandListImmediate| {
                let system_time = clock.game_time();
                if let Err(err) =
                    draw_to_render_target_render_thread(rhi_cmd_list, &context, &compiled, &resource, system_time)
                {
                    let (w, h) = compiled.target_size();
                    log::warn!("DrawToRenderTarget {w}x{h} skipped: {err}");
                }
            }),
        );
        if let Err(err) = posted {
            log::warn!(target: MESSAGE_LOG_TARGET, "{err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_thread::RenderCommandQueue;
    use overpass_renderer::params::FullScreenParams;
    use overpass_renderer::OverpassConfig;
    use overpass_rhi::headless::HeadlessDevice;
    use overpass_rhi::{FeatureLevel, TextureFormat};
    use render_api::FixedClock;

    fn setup(level: FeatureLevel) -> (Arc<HeadlessDevice>, Arc<RenderCommandQueue>, DrawRequestQueue) {
        let device = Arc::new(HeadlessDevice::new(level));
        let queue = Arc::new(RenderCommandQueue::new(device.clone()));
        let context = Arc::new(GraphicsContext::new(device.clone(), OverpassConfig::default()));
        let requests = DrawRequestQueue::new(context, Arc::new(FixedClock::new(1.0)), queue.clone());
        (device, queue, requests)
    }

    #[test]
    fn null_target_posts_nothing() {
        let (_, queue, requests) = setup(FeatureLevel::Sm5);
        requests.request_draw(&Scene::new(FeatureLevel::Sm5), &DrawParameters::default(), None);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn low_feature_level_posts_nothing() {
        let (device, queue, requests) = setup(FeatureLevel::Sm5);
        let target = TextureRenderTarget::new(device.clone(), "Target", 4, 4, TextureFormat::Rgba8Unorm).unwrap();
        requests.request_draw(&Scene::new(FeatureLevel::Es31), &DrawParameters::default(), Some(&target));
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn later_parameter_edits_do_not_reach_posted_request() {
        let (device, queue, requests) = setup(FeatureLevel::Sm5);
        let target = TextureRenderTarget::new(device.clone(), "Target", 4, 4, TextureFormat::Rgba8Unorm).unwrap();
        let mut params = DrawParameters::new([3.0, 4.0], 1.0);
        requests.request_draw(&Scene::new(FeatureLevel::Sm5), &params, Some(&target));
        params.scale = [9.0, 9.0];
        drop(target);
        assert_eq!(queue.drain(), 1);
        let submitted = device.take_submitted();
        let draw = submitted.last().unwrap();
        let block = draw
            .commands()
            .iter()
            .find_map(|c| match c {
                overpass_rhi::Command::SetShaderParameters { data, .. } => Some(data.clone()),
                _ => None,
            })
            .unwrap();
        let block: FullScreenParams = bytemuck::pod_read_unaligned(&block);
        assert_eq!(block.scale, [3.0, 4.0]);
        assert_eq!(block.system_time, 1.0);
        // The queued draw held the last reference to the dropped target.
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn accepted_low_level_request_draws_nothing_without_a_permutation() {
        let device = Arc::new(HeadlessDevice::new(FeatureLevel::Sm5));
        let queue = Arc::new(RenderCommandQueue::new(device.clone()));
        let config = OverpassConfig { minimum_feature_level: FeatureLevel::Es31, ..Default::default() };
        let context = Arc::new(GraphicsContext::new(device.clone(), config));
        let requests = DrawRequestQueue::new(context, Arc::new(FixedClock::new(1.0)), queue.clone());
        let target = TextureRenderTarget::new(device.clone(), "Target", 4, 4, TextureFormat::Rgba8Unorm).unwrap();
        device.take_submitted();

        requests.request_draw(&Scene::new(FeatureLevel::Es31), &DrawParameters::default(), Some(&target));
        assert_eq!(queue.drain(), 1);
        assert!(device.take_submitted().iter().all(|list| list.draw_count() == 0));
    }
}
