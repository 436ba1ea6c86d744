//! Shader map: each shader is compiled on first use for the device's feature level.
//! A shader whose minimum level is not met, or whose creation failed, stays unavailable.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use overpass_rhi::{Device, FeatureLevel, ShaderDescriptor, ShaderHandle, ShaderStage};

const OVERLAY_SHADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/overlay.wgsl"));
const FULL_SCREEN_SHADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/full_screen.wgsl"));
const COPY_SHADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/copy.wgsl"));

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    OverlayTriangleVs,
    OverlayCubeVs,
    OverlayPs,
    FullScreenVs,
    FullScreenPs,
    /// Texture-to-texture copy through a draw, for targets a plain copy cannot reach.
    CopyVs,
    CopyPs,
}

impl ShaderKind {
    pub const ALL: [ShaderKind; 7] = [
        ShaderKind::OverlayTriangleVs,
        ShaderKind::OverlayCubeVs,
        ShaderKind::OverlayPs,
        ShaderKind::FullScreenVs,
        ShaderKind::FullScreenPs,
        ShaderKind::CopyVs,
        ShaderKind::CopyPs,
    ];

    pub fn descriptor(&self) -> ShaderDescriptor {
        let (label, source, entry_point, stage) = match self {
            ShaderKind::OverlayTriangleVs => ("overlay_triangle_vs", OVERLAY_SHADER, "vs_triangle", ShaderStage::Vertex),
            ShaderKind::OverlayCubeVs => ("overlay_cube_vs", OVERLAY_SHADER, "vs_cube", ShaderStage::Vertex),
            ShaderKind::OverlayPs => ("overlay_ps", OVERLAY_SHADER, "ps_main", ShaderStage::Pixel),
            ShaderKind::FullScreenVs => ("full_screen_vs", FULL_SCREEN_SHADER, "vs_main", ShaderStage::Vertex),
            ShaderKind::FullScreenPs => ("full_screen_ps", FULL_SCREEN_SHADER, "ps_main", ShaderStage::Pixel),
            ShaderKind::CopyVs => ("copy_vs", COPY_SHADER, "vs_main", ShaderStage::Vertex),
            ShaderKind::CopyPs => ("copy_ps", COPY_SHADER, "ps_main", ShaderStage::Pixel),
        };
        ShaderDescriptor { label, source, entry_point, stage }
    }

    /// Lowest feature level this permutation is compiled for.
    pub fn minimum_feature_level(&self) -> FeatureLevel {
        match self {
            ShaderKind::FullScreenVs | ShaderKind::FullScreenPs => FeatureLevel::Sm5,
            _ => FeatureLevel::Es31,
        }
    }

    pub fn should_compile(&self, level: FeatureLevel) -> bool {
        level >= self.minimum_feature_level()
    }
}

#[derive(Debug, Default)]
pub struct ShaderMap {
    /// None records a permutation that is unavailable on this device.
    shaders: Mutex<HashMap<ShaderKind, Option<ShaderHandle>>>,
}

impl ShaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn shaders(&self) -> MutexGuard<'_, HashMap<ShaderKind, Option<ShaderHandle>>> {
        self.shaders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, device: &dyn Device, kind: ShaderKind) -> Option<ShaderHandle> {
        *self.shaders().entry(kind).or_insert_with(|| Self::compile(device, kind))
    }

    fn compile(device: &dyn Device, kind: ShaderKind) -> Option<ShaderHandle> {
        let level = device.feature_level();
        if !kind.should_compile(level) {
            log::debug!("{kind:?} not compiled for {level:?}");
            return None;
        }
        match device.create_shader(&kind.descriptor()) {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::error!("{kind:?}: {err}");
                None
            }
        }
    }

    /// Release every compiled shader; later lookups compile again.
    pub fn release(&self, device: &dyn Device) {
        for handle in self.shaders().drain().filter_map(|(_, handle)| handle) {
            device.release_shader(handle);
        }
    }
}
