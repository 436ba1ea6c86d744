//! One deferred full-screen draw on a real wgpu adapter.

use std::error::Error;
use std::sync::Arc;

use overpass_bridge::{init_logging, LoggingConfig, OverpassPlugin};
use overpass_renderer::{DrawParameters, OverpassConfig};
use overpass_rhi::{Device, TextureFormat};
use render_api::{ExtensionRegistry, MonotonicClock, Scene, TextureRenderTarget};

fn main() -> Result<(), Box<dyn Error>> {
    init_logging(LoggingConfig::default());

    let mut registry = ExtensionRegistry::new();
    let plugin =
        OverpassPlugin::startup_wgpu(OverpassConfig::default(), Arc::new(MonotonicClock::default()), &mut registry)?;
    let device = Arc::clone(plugin.context().device());
    let scene = Scene::new(device.feature_level());

    let target = TextureRenderTarget::new(device.clone(), "DrawToTarget", 256, 256, TextureFormat::Rgba8Unorm)?;
    plugin.draw_requests().request_draw(&scene, &DrawParameters::new([2.0, 2.0], 1.0), Some(&target));
    plugin.draw_requests().request_draw(&scene, &DrawParameters::new([4.0, 1.0], 1.0), Some(&target));
    target.release_resource(plugin.render_stream())?;

    plugin.shutdown(&mut registry)?;
    log::info!("draw_to_target: two draws into 256x256 done");
    Ok(())
}
