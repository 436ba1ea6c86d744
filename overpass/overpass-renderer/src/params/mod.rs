//! Parameter blocks. Field order and sizes match the uniform structs in `shaders/*.wgsl`.
//! All builders are pure: time is an input, sampled once by the caller.

use bytemuck::{Pod, Zeroable};
use overpass_rhi::FeatureLevel;
use render_api::math::Mat4;

/// Caller-facing draw parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DrawParameters {
    pub scale: [f32; 2],
    pub blah: f32,
}

impl DrawParameters {
    pub fn new(scale: [f32; 2], blah: f32) -> Self {
        Self { scale, blah }
    }
}

/// Field-wise equality.
pub fn equals(a: &DrawParameters, b: &DrawParameters) -> bool {
    a == b
}

pub fn not_equals(a: &DrawParameters, b: &DrawParameters) -> bool {
    !equals(a, b)
}

/// Render-thread copy of a draw request, resolved against its target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompiledDrawParameters {
    original: DrawParameters,
    target_size: (u32, u32),
    feature_level: FeatureLevel,
}

impl CompiledDrawParameters {
    pub fn new(original: &DrawParameters, target_size: (u32, u32), feature_level: FeatureLevel) -> Self {
        Self { original: *original, target_size, feature_level }
    }

    pub fn original(&self) -> &DrawParameters {
        &self.original
    }

    pub fn target_size(&self) -> (u32, u32) {
        self.target_size
    }

    pub fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct OverlayVsParams {
    pub transform: Mat4,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct OverlayPsParams {
    pub offset: [f32; 4],
}

/// Shared by both full-screen stages.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FullScreenParams {
    pub pixel_uv_size: [f32; 2],
    pub scale: [f32; 2],
    pub system_time: f32,
    pub _pad: [f32; 3],
}

pub fn overlay_vertex_params(transform: &Mat4) -> OverlayVsParams {
    OverlayVsParams { transform: *transform }
}

pub fn overlay_pixel_params(game_time: f32, multipliers: [f32; 3]) -> OverlayPsParams {
    OverlayPsParams {
        offset: [game_time * multipliers[0], game_time * multipliers[1], game_time * multipliers[2], 0.0],
    }
}

pub fn full_screen_params(
    compiled: &CompiledDrawParameters,
    target_resolution: (u32, u32),
    system_time: f32,
) -> FullScreenParams {
    let (width, height) = target_resolution;
    FullScreenParams {
        pixel_uv_size: [1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32],
        scale: compiled.original().scale,
        system_time,
        _pad: [0.0; 3],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TIME_MULTIPLIERS;
    use approx::assert_relative_eq;

    #[test]
    fn equality_is_field_wise() {
        let a = DrawParameters::new([1.0, 2.0], 5.0);
        assert!(equals(&a, &DrawParameters::new([1.0, 2.0], 5.0)));
        assert!(!not_equals(&a, &a));
        assert!(not_equals(&a, &DrawParameters { blah: 6.0, ..a }));
        assert!(not_equals(&a, &DrawParameters { scale: [1.0, 3.0], ..a }));
        assert!(not_equals(&a, &DrawParameters { scale: [0.0, 2.0], ..a }));
    }

    #[test]
    fn pixel_offset_scales_time() {
        let ps = overlay_pixel_params(2.0, DEFAULT_TIME_MULTIPLIERS);
        assert_relative_eq!(ps.offset[0], 2.0);
        assert_relative_eq!(ps.offset[1], 2.68);
        assert_relative_eq!(ps.offset[2], 0.94);
        assert_eq!(ps.offset[3], 0.0);
    }

    #[test]
    fn full_screen_block_is_deterministic() {
        let compiled = CompiledDrawParameters::new(&DrawParameters::new([1.0, 2.0], 5.0), (64, 64), FeatureLevel::Sm5);
        let a = full_screen_params(&compiled, (64, 32), 2.0);
        let b = full_screen_params(&compiled, (64, 32), 2.0);
        assert_eq!(bytemuck::bytes_of(&a), bytemuck::bytes_of(&b));
        assert_eq!(a.pixel_uv_size, [1.0 / 64.0, 1.0 / 32.0]);
        assert_eq!(a.scale, [1.0, 2.0]);
        assert_eq!(a.system_time, 2.0);
    }

    #[test]
    fn blocks_have_shader_sizes() {
        assert_eq!(std::mem::size_of::<OverlayVsParams>(), 64);
        assert_eq!(std::mem::size_of::<OverlayPsParams>(), 16);
        assert_eq!(std::mem::size_of::<FullScreenParams>(), 32);
    }
}
