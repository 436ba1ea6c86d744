//! Host loop on the headless device: a camera orbiting the overlay cube, the post-process
//! chain run every frame, and one deferred draw request per frame.

use std::error::Error;
use std::sync::Arc;

use overpass_bridge::{init_logging, LoggingConfig, OverpassPlugin};
use overpass_renderer::geometry::CUBE_CENTER;
use overpass_renderer::{DrawParameters, OverpassConfig};
use overpass_rhi::headless::HeadlessDevice;
use overpass_rhi::{CommandList, Device, FeatureLevel, ResourceAccess, TextureDescriptor, TextureFormat, TextureUsage};
use render_api::math;
use render_api::{
    ExtensionRegistry, FixedClock, IntRect, PostProcessSequence, RenderGraph, Scene, SceneView, ScreenPassTexture,
    TextureRenderTarget, ViewMatrices,
};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 180;
const FRAMES: u32 = 4;

fn main() -> Result<(), Box<dyn Error>> {
    init_logging(LoggingConfig { env_filter: Some("debug".into()), ..Default::default() });

    let device = Arc::new(HeadlessDevice::new(FeatureLevel::Sm5));
    let clock = Arc::new(FixedClock::new(0.0));
    let mut registry = ExtensionRegistry::new();
    let config = OverpassConfig { log_pass_matrices: true, ..Default::default() };
    let plugin = OverpassPlugin::startup(device.clone(), config, clock.clone(), &mut registry)?;

    let scene_color = device.create_texture(&TextureDescriptor {
        label: "SceneColor",
        width: WIDTH,
        height: HEIGHT,
        format: TextureFormat::Rgba16Float,
        usage: TextureUsage::SHADER_RESOURCE
            | TextureUsage::RENDER_TARGETABLE
            | TextureUsage::COPY_SRC
            | TextureUsage::COPY_DST,
    })?;
    let mut init = CommandList::new("init");
    init.transition(scene_color, ResourceAccess::Unknown, ResourceAccess::ShaderRead);
    device.submit(init)?;

    let target = TextureRenderTarget::new(device.clone(), "DebugOutput", 64, 64, TextureFormat::Rgba8Unorm)?;
    let scene = Scene::new(FeatureLevel::Sm5);
    let sequence = PostProcessSequence::default();
    let (mut lists, mut draws) = (0usize, 0usize);

    for frame in 0..FRAMES {
        let t = frame as f32 * 0.5;
        clock.set(t);
        let angle = t * 0.8;
        let eye = [CUBE_CENTER[0] + 600.0 * angle.cos(), CUBE_CENTER[1] + 600.0 * angle.sin(), CUBE_CENTER[2] + 200.0];
        let view_matrices = ViewMatrices::new(
            math::look_at_rh(eye, CUBE_CENTER, [0.0, 0.0, 1.0]),
            math::perspective_rh(60f32.to_radians(), WIDTH as f32 / HEIGHT as f32, 1.0, 10_000.0),
        );
        let view = SceneView::new(IntRect::from_size(WIDTH, HEIGHT), view_matrices, FeatureLevel::Sm5);

        let callbacks = sequence.gather(&registry);
        let mut graph = RenderGraph::new(device.clone(), "DebugFrame");
        let texture = graph.register_external_texture("SceneColor", scene_color, ResourceAccess::ShaderRead)?;
        let input = ScreenPassTexture { texture, view_rect: view.view_rect };
        let output = callbacks.execute(&mut graph, &view, input, None);
        log::info!("frame {frame}: passes {:?}, redirected {}", graph.execution_order()?, output.texture != input.texture);
        graph.execute()?;

        // Drain every frame so the device's history stays bounded.
        let submitted = device.take_submitted();
        lists += submitted.len();
        draws += submitted.iter().map(CommandList::draw_count).sum::<usize>();

        plugin.draw_requests().request_draw(&scene, &DrawParameters::new([1.0, 0.5 + t], t), Some(&target));
    }

    target.release_resource(plugin.render_stream())?;
    plugin.shutdown(&mut registry)?;

    let submitted = device.take_submitted();
    lists += submitted.len();
    draws += submitted.iter().map(CommandList::draw_count).sum::<usize>();
    log::info!("headless_frame: {lists} command lists, {draws} draws");
    Ok(())
}
