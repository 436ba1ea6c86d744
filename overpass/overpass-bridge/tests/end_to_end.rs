use std::sync::Arc;

use approx::assert_relative_eq;
use overpass_bridge::{OverlayViewExtension, OverpassPlugin, RenderCommandQueue};
use overpass_renderer::params::{FullScreenParams, OverlayPsParams};
use overpass_renderer::{DrawParameters, GeometryKind, OverpassConfig};
use overpass_rhi::headless::HeadlessDevice;
use overpass_rhi::{
    Command, CommandList, Device, FeatureLevel, ResourceAccess, ShaderStage, TextureDescriptor, TextureFormat,
    TextureUsage,
};
use render_api::{
    ExtensionRegistry, FixedClock, IntRect, PostProcessSequence, PostProcessingPass, RenderGraph, Scene, SceneView,
    ScreenPassTexture, TextureRenderTarget, ViewMatrices,
};

fn pixel_blocks(lists: &[CommandList]) -> Vec<Vec<u8>> {
    lists
        .iter()
        .flat_map(|l| l.commands())
        .filter_map(|c| match c {
            Command::SetShaderParameters { stage: ShaderStage::Pixel, data } => Some(data.clone()),
            _ => None,
        })
        .collect()
}

fn start(device: &Arc<HeadlessDevice>, config: OverpassConfig) -> (OverpassPlugin, ExtensionRegistry) {
    let mut registry = ExtensionRegistry::new();
    let plugin = OverpassPlugin::startup(device.clone(), config, Arc::new(FixedClock::new(2.0)), &mut registry)
        .expect("plugin starts");
    (plugin, registry)
}

#[test]
fn draw_request_reaches_target_with_expected_block() {
    let device = Arc::new(HeadlessDevice::new(FeatureLevel::Sm5));
    let (plugin, mut registry) = start(&device, OverpassConfig::default());
    let target = TextureRenderTarget::new(device.clone(), "Output", 64, 64, TextureFormat::Rgba8Unorm).unwrap();
    let texture = target.game_thread_render_target_resource().render_target_texture();

    plugin.draw_requests().request_draw(
        &Scene::new(FeatureLevel::Sm5),
        &DrawParameters::new([1.0, 2.0], 5.0),
        Some(&target),
    );
    plugin.shutdown(&mut registry).unwrap();

    let blocks = pixel_blocks(&device.submitted());
    assert_eq!(blocks.len(), 1);
    let block: FullScreenParams = bytemuck::pod_read_unaligned(&blocks[0]);
    assert_eq!(block.pixel_uv_size, [1.0 / 64.0, 1.0 / 64.0]);
    assert_eq!(block.scale, [1.0, 2.0]);
    assert_relative_eq!(block.system_time, 2.0);
    assert_eq!(device.texture_access(texture), Some(ResourceAccess::ShaderRead));
}

#[test]
fn requests_against_one_target_run_in_post_order() {
    let device = Arc::new(HeadlessDevice::new(FeatureLevel::Sm5));
    let (plugin, mut registry) = start(&device, OverpassConfig::default());
    let target = TextureRenderTarget::new(device.clone(), "Output", 16, 16, TextureFormat::Rgba8Unorm).unwrap();
    let scene = Scene::new(FeatureLevel::Sm5);
    for i in 0..10 {
        plugin.draw_requests().request_draw(&scene, &DrawParameters::new([i as f32, 0.0], 0.0), Some(&target));
    }
    target.release_resource(plugin.render_stream()).unwrap();
    plugin.shutdown(&mut registry).unwrap();

    let scales: Vec<f32> = pixel_blocks(&device.submitted())
        .iter()
        .map(|b| bytemuck::pod_read_unaligned::<FullScreenParams>(b).scale[0])
        .collect();
    assert_eq!(scales, (0..10).map(|i| i as f32).collect::<Vec<_>>());
    // The release was queued after every draw.
    assert_eq!(device.live_textures(), 0);
}

#[test]
fn null_target_posts_no_render_command() {
    let device = Arc::new(HeadlessDevice::new(FeatureLevel::Sm5));
    let queue = Arc::new(RenderCommandQueue::new(device.clone()));
    let context = Arc::new(overpass_renderer::GraphicsContext::new(device.clone(), OverpassConfig::default()));
    let requests = overpass_bridge::DrawRequestQueue::new(context, Arc::new(FixedClock::new(0.0)), queue.clone());
    requests.request_draw(&Scene::new(FeatureLevel::Sm5), &DrawParameters::default(), None);
    assert_eq!(queue.pending(), 0);
    assert_eq!(queue.drain(), 0);
    assert!(device.submitted().is_empty());
}

fn scene_color(device: &HeadlessDevice, graph: &mut RenderGraph) -> ScreenPassTexture {
    let handle = device
        .create_texture(&TextureDescriptor {
            label: "SceneColor",
            width: 64,
            height: 64,
            format: TextureFormat::Rgba16Float,
            usage: TextureUsage::SHADER_RESOURCE
                | TextureUsage::RENDER_TARGETABLE
                | TextureUsage::COPY_SRC
                | TextureUsage::COPY_DST,
        })
        .unwrap();
    let mut init = CommandList::new("init");
    init.transition(handle, ResourceAccess::Unknown, ResourceAccess::ShaderRead);
    device.submit(init).unwrap();
    let texture = graph.register_external_texture("SceneColor", handle, ResourceAccess::ShaderRead).unwrap();
    ScreenPassTexture { texture, view_rect: IntRect::from_size(64, 64) }
}

#[test]
fn overlay_runs_after_tonemap_and_chains_its_output() {
    let device = Arc::new(HeadlessDevice::new(FeatureLevel::Sm5));
    let (plugin, mut registry) = start(&device, OverpassConfig::default());
    let view = SceneView::new(IntRect::from_size(64, 64), ViewMatrices::default(), FeatureLevel::Sm5);
    let sequence = PostProcessSequence::default();

    let callbacks = sequence.gather(&registry);
    assert_eq!(callbacks.callback_count(), 1);
    assert_eq!(callbacks.callbacks_for(PostProcessingPass::Tonemap).map(|l| l.len()), Some(1));

    let mut graph = RenderGraph::new(device.clone(), "frame");
    let input = scene_color(&device, &mut graph);
    let output = callbacks.execute(&mut graph, &view, input, None);
    assert_ne!(output.texture, input.texture);
    graph.extract_texture(output.texture, ResourceAccess::ShaderRead).unwrap();
    graph.execute().unwrap();

    let blocks = pixel_blocks(&device.take_submitted());
    assert_eq!(blocks.len(), 1);
    let block: OverlayPsParams = bytemuck::pod_read_unaligned(&blocks[0]);
    assert_relative_eq!(block.offset[0], 2.0);
    assert_relative_eq!(block.offset[1], 2.68);
    assert_relative_eq!(block.offset[2], 0.94);
    assert_eq!(block.offset[3], 0.0);

    plugin.shutdown(&mut registry).unwrap();
    assert!(registry.is_empty());
}

#[test]
fn disabled_slot_gets_no_subscription() {
    let device = Arc::new(HeadlessDevice::new(FeatureLevel::Sm5));
    let (plugin, mut registry) = start(&device, OverpassConfig::with_geometry(GeometryKind::Triangle));
    let mut sequence = PostProcessSequence::default();
    sequence.set_enabled(PostProcessingPass::Tonemap, false);
    assert_eq!(sequence.gather(&registry).callback_count(), 0);

    // Re-enabled next frame, subscribed again.
    sequence.set_enabled(PostProcessingPass::Tonemap, true);
    assert_eq!(sequence.gather(&registry).callback_count(), 1);
    assert_eq!(registry.iter().next().map(|e| e.name()), Some(OverlayViewExtension::NAME));
    plugin.shutdown(&mut registry).unwrap();
}

#[test]
fn terminal_override_receives_the_overlay() {
    let device = Arc::new(HeadlessDevice::new(FeatureLevel::Sm5));
    let (plugin, mut registry) = start(&device, OverpassConfig::default());
    let view = SceneView::new(IntRect::from_size(64, 64), ViewMatrices::default(), FeatureLevel::Sm5);
    let callbacks = PostProcessSequence::default().gather(&registry);

    let mut graph = RenderGraph::new(device.clone(), "frame");
    let input = scene_color(&device, &mut graph);
    let final_output = render_api::ScreenPassRenderTarget::create_from_input(
        &mut graph,
        &input,
        overpass_rhi::LoadOp::DontCare,
        "ViewFamilyOutput",
    )
    .unwrap();
    let output = callbacks.execute(&mut graph, &view, input, Some(final_output));
    assert_eq!(output.texture, final_output.texture);
    graph.execute().unwrap();
    plugin.shutdown(&mut registry).unwrap();
}

#[test]
fn dropped_target_is_freed_after_its_queued_draw() {
    let device = Arc::new(HeadlessDevice::new(FeatureLevel::Sm5));
    let (plugin, mut registry) = start(&device, OverpassConfig::default());
    let target = TextureRenderTarget::new(device.clone(), "Output", 32, 32, TextureFormat::Rgba8Unorm).unwrap();
    plugin.draw_requests().request_draw(&Scene::new(FeatureLevel::Sm5), &DrawParameters::default(), Some(&target));
    drop(target);
    plugin.shutdown(&mut registry).unwrap();

    assert_eq!(pixel_blocks(&device.submitted()).len(), 1);
    assert_eq!(device.live_textures(), 0);
}

#[test]
fn terminal_override_in_another_format_receives_the_overlay() {
    let device = Arc::new(HeadlessDevice::new(FeatureLevel::Sm5));
    let (plugin, mut registry) = start(&device, OverpassConfig::default());
    let view = SceneView::new(IntRect::from_size(64, 64), ViewMatrices::default(), FeatureLevel::Sm5);
    let callbacks = PostProcessSequence::default().gather(&registry);

    let mut graph = RenderGraph::new(device.clone(), "frame");
    let input = scene_color(&device, &mut graph);
    let back_buffer = graph
        .create_texture(TextureDescriptor {
            label: "BackBuffer",
            width: 64,
            height: 64,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::SHADER_RESOURCE | TextureUsage::RENDER_TARGETABLE,
        })
        .unwrap();
    let final_output = render_api::ScreenPassRenderTarget {
        texture: back_buffer,
        view_rect: IntRect::from_size(64, 64),
        load_action: overpass_rhi::LoadOp::DontCare,
    };
    let output = callbacks.execute(&mut graph, &view, input, Some(final_output));
    assert_eq!(output.texture, back_buffer);
    graph.execute().unwrap();

    let submitted = device.take_submitted();
    let draws: usize = submitted.iter().map(|l| l.draw_count()).sum();
    // Scene color drawn in, then the overlay over it.
    assert_eq!(draws, 2);
    assert!(submitted.iter().flat_map(|l| l.commands()).all(|c| !matches!(c, Command::CopyTexture { .. })));
    plugin.shutdown(&mut registry).unwrap();
}
