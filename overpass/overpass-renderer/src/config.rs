//! Overpass configuration: which slot to follow, what to draw, how to transform it.

use overpass_rhi::FeatureLevel;
use render_api::PostProcessingPass;

use crate::geometry::GeometryKind;

/// How the overlay's vertices reach clip space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TransformPolicy {
    /// Vertices are already in clip space; the transform is identity.
    ClipSpace,
    /// Vertices are in world space; the transform is the view's world to clip matrix.
    #[default]
    WorldToClip,
}

impl TransformPolicy {
    /// The policy a geometry kind is authored for.
    pub fn for_geometry(kind: GeometryKind) -> Self {
        match kind {
            GeometryKind::Triangle => TransformPolicy::ClipSpace,
            GeometryKind::Cube => TransformPolicy::WorldToClip,
        }
    }
}

/// Fragment time multipliers for the overlay's offset block.
pub const DEFAULT_TIME_MULTIPLIERS: [f32; 3] = [1.0, 1.34, 0.47];

/// Overpass renderer and bridge configuration.
#[derive(Clone, Debug)]
pub struct OverpassConfig {
    /// Post-process slot the overlay runs after.
    pub target_pass: PostProcessingPass,
    /// Fixed shape drawn by the overlay.
    pub geometry: GeometryKind,
    pub transform: TransformPolicy,
    /// Scales applied to game time for the x, y and z of the offset block.
    pub time_multipliers: [f32; 3],
    /// Full-screen draw requests below this level are refused.
    pub minimum_feature_level: FeatureLevel,
    /// Log the view matrices and the cube center every overlay invocation (debug level).
    pub log_pass_matrices: bool,
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            target_pass: PostProcessingPass::Tonemap,
            geometry: GeometryKind::Cube,
            transform: TransformPolicy::WorldToClip,
            time_multipliers: DEFAULT_TIME_MULTIPLIERS,
            minimum_feature_level: FeatureLevel::Sm5,
            log_pass_matrices: false,
        }
    }
}

impl OverpassConfig {
    /// Config for drawing `geometry` with the transform it is authored for.
    pub fn with_geometry(geometry: GeometryKind) -> Self {
        Self { geometry, transform: TransformPolicy::for_geometry(geometry), ..Self::default() }
    }
}
