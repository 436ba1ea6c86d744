//! Process-lifetime GPU state: the device, compiled shaders and static geometry.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use overpass_rhi::{Device, FeatureLevel, RhiError, ShaderHandle};

use crate::config::OverpassConfig;
use crate::geometry::{FrameResource, GeometryBuffer, GeometryKind, GeometryResource};
use crate::shaders::{ShaderKind, ShaderMap};

/// Shared by the overlay pass, draw requests and the plugin. Lookups take internal locks,
/// so one context serves the game and render threads at once.
pub struct GraphicsContext {
    device: Arc<dyn Device>,
    config: OverpassConfig,
    shaders: ShaderMap,
    triangle: Mutex<GeometryResource>,
    cube: Mutex<GeometryResource>,
}

impl GraphicsContext {
    pub fn new(device: Arc<dyn Device>, config: OverpassConfig) -> Self {
        Self {
            device,
            config,
            shaders: ShaderMap::new(),
            triangle: Mutex::new(GeometryResource::new(GeometryKind::Triangle)),
            cube: Mutex::new(GeometryResource::new(GeometryKind::Cube)),
        }
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn config(&self) -> &OverpassConfig {
        &self.config
    }

    pub fn feature_level(&self) -> FeatureLevel {
        self.device.feature_level()
    }

    fn resource(&self, kind: GeometryKind) -> MutexGuard<'_, GeometryResource> {
        let slot = match kind {
            GeometryKind::Triangle => &self.triangle,
            GeometryKind::Cube => &self.cube,
        };
        slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the configured geometry eagerly. Optional: [`GraphicsContext::geometry`] initializes lazily.
    pub fn initialize(&self) -> Result<(), RhiError> {
        self.resource(self.config.geometry).init(self.device.as_ref())
    }

    /// Geometry handles, initializing on first use. None once creation has failed.
    pub fn geometry(&self, kind: GeometryKind) -> Option<GeometryBuffer> {
        let mut resource = self.resource(kind);
        if resource.has_failed() {
            return None;
        }
        if let Err(err) = resource.init(self.device.as_ref()) {
            log::error!("{}: {err}", kind.label());
            return None;
        }
        resource.buffer().filter(GeometryBuffer::is_valid)
    }

    pub fn shader(&self, kind: ShaderKind) -> Option<ShaderHandle> {
        self.shaders.get(self.device.as_ref(), kind)
    }

    /// The permutation of `kind` for `level`. None when the shader has no permutation at
    /// that level, even if the device itself supports more.
    pub fn shader_for_level(&self, kind: ShaderKind, level: FeatureLevel) -> Option<ShaderHandle> {
        if !kind.should_compile(level) {
            log::debug!("{kind:?} has no permutation for {level:?}");
            return None;
        }
        self.shader(kind)
    }

    /// Release every device resource. The context can be initialized again afterwards.
    pub fn teardown(&self) {
        self.resource(GeometryKind::Triangle).release(self.device.as_ref());
        self.resource(GeometryKind::Cube).release(self.device.as_ref());
        self.shaders.release(self.device.as_ref());
        log::debug!("graphics context torn down");
    }
}

impl std::fmt::Debug for GraphicsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsContext")
            .field("device", &self.device)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overpass_rhi::headless::HeadlessDevice;

    #[test]
    fn geometry_is_shared_across_lookups() {
        let device = Arc::new(HeadlessDevice::default());
        let context = GraphicsContext::new(device.clone(), OverpassConfig::default());
        let a = context.geometry(GeometryKind::Cube).unwrap();
        let b = context.geometry(GeometryKind::Cube).unwrap();
        assert_eq!(a, b);
        assert_eq!(device.buffer_creations(), 2);
    }

    #[test]
    fn shader_lookup_honors_requested_level() {
        let device = Arc::new(HeadlessDevice::new(FeatureLevel::Sm5));
        let context = GraphicsContext::new(device.clone(), OverpassConfig::default());
        assert!(context.shader_for_level(ShaderKind::FullScreenPs, FeatureLevel::Es31).is_none());
        assert!(context.shader_for_level(ShaderKind::FullScreenPs, FeatureLevel::Sm5).is_some());
        assert!(context.shader_for_level(ShaderKind::OverlayPs, FeatureLevel::Es31).is_some());
    }

    #[test]
    fn teardown_releases_everything() {
        let device = Arc::new(HeadlessDevice::default());
        let context = GraphicsContext::new(device.clone(), OverpassConfig::default());
        context.initialize().unwrap();
        context.geometry(GeometryKind::Triangle).unwrap();
        context.shader(ShaderKind::OverlayPs).unwrap();
        context.teardown();
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_vertex_layouts(), 0);
        assert_eq!(device.live_shaders(), 0);
    }
}
