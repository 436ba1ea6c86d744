//! Render targets owned by the game side and drawn into from the render thread.

use std::sync::Arc;

use overpass_rhi::{
    CommandList, Device, FeatureLevel, ResourceAccess, RhiError, TextureDescriptor, TextureFormat, TextureHandle,
    TextureUsage,
};

use crate::command::{RenderCommandStream, RhiCommandListImmediate, StreamClosed};

/// Render-thread side of a texture render target. Shared by reference count so queued
/// commands keep it alive after the caller lets go of the owning object. The texture is
/// released when the last reference drops.
#[derive(Debug)]
pub struct RenderTargetResource {
    device: Arc<dyn Device>,
    texture: TextureHandle,
    size_x: u32,
    size_y: u32,
    format: TextureFormat,
}

impl RenderTargetResource {
    pub fn render_target_texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn size_x(&self) -> u32 {
        self.size_x
    }

    pub fn size_y(&self) -> u32 {
        self.size_y
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }
}

impl Drop for RenderTargetResource {
    fn drop(&mut self) {
        log::trace!("releasing render target texture {}", self.texture.id());
        self.device.release_texture(self.texture);
    }
}

/// Caller-side render target object. Its texture rests in [`ResourceAccess::ShaderRead`].
///
/// Dropping it without [`release_resource`](Self::release_resource) still frees the texture,
/// once every queued command holding the resource has run.
#[derive(Debug)]
pub struct TextureRenderTarget {
    name: &'static str,
    resource: Arc<RenderTargetResource>,
}

impl TextureRenderTarget {
    pub fn new(
        device: Arc<dyn Device>,
        name: &'static str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<Self, RhiError> {
        let texture = device.create_texture(&TextureDescriptor {
            label: name,
            width,
            height,
            format,
            usage: TextureUsage::SHADER_RESOURCE | TextureUsage::RENDER_TARGETABLE | TextureUsage::COPY_SRC,
        })?;
        let mut init = CommandList::new(name);
        init.transition(texture, ResourceAccess::Unknown, ResourceAccess::ShaderRead);
        if let Err(err) = device.submit(init) {
            device.release_texture(texture);
            return Err(err);
        }
        let resource = RenderTargetResource { device, texture, size_x: width, size_y: height, format };
        Ok(Self { name, resource: Arc::new(resource) })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn game_thread_render_target_resource(&self) -> Arc<RenderTargetResource> {
        Arc::clone(&self.resource)
    }

    /// Release the texture on the render thread, after every command already queued against it.
    pub fn release_resource(self, stream: &dyn RenderCommandStream) -> Result<(), StreamClosed> {
        let resource = self.resource;
        stream.enqueue(
            "ReleaseTextureRenderTarget",
            Box::new(move |_: &mut RhiCommandListImmediate| drop(resource)),
        )
    }
}

/// The host scene a draw request belongs to.
#[derive(Debug, Clone, Copy)]
pub struct Scene {
    feature_level: FeatureLevel,
}

impl Scene {
    pub fn new(feature_level: FeatureLevel) -> Self {
        Self { feature_level }
    }

    pub fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overpass_rhi::headless::HeadlessDevice;

    #[test]
    fn dropping_the_target_frees_its_texture() {
        let device = Arc::new(HeadlessDevice::default());
        let target = TextureRenderTarget::new(device.clone(), "Target", 8, 8, TextureFormat::Rgba8Unorm).unwrap();
        assert_eq!(device.live_textures(), 1);
        drop(target);
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn held_resource_outlives_the_target() {
        let device = Arc::new(HeadlessDevice::default());
        let target = TextureRenderTarget::new(device.clone(), "Target", 8, 8, TextureFormat::Rgba8Unorm).unwrap();
        let resource = target.game_thread_render_target_resource();
        drop(target);
        assert_eq!(device.live_textures(), 1);
        assert_eq!(device.texture_access(resource.render_target_texture()), Some(ResourceAccess::ShaderRead));
        drop(resource);
        assert_eq!(device.live_textures(), 0);
    }
}
