use overpass_rhi::{FeatureLevel, LoadOp};

use crate::math::{self, Mat4};

/// Integer pixel rectangle, `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntRect {
    pub min: (i32, i32),
    pub max: (i32, i32),
}

impl IntRect {
    pub fn new(min: (i32, i32), max: (i32, i32)) -> Self {
        Self { min, max }
    }

    pub fn from_size(width: u32, height: u32) -> Self {
        Self { min: (0, 0), max: (width as i32, height as i32) }
    }

    pub fn width(&self) -> i32 {
        self.max.0 - self.min.0
    }

    pub fn height(&self) -> i32 {
        self.max.1 - self.min.1
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewMatrices {
    view: Mat4,
    projection: Mat4,
}

impl Default for ViewMatrices {
    fn default() -> Self {
        Self { view: math::IDENTITY, projection: math::IDENTITY }
    }
}

impl ViewMatrices {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self { view, projection }
    }

    pub fn view_matrix(&self) -> &Mat4 {
        &self.view
    }

    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection
    }

    /// World to clip: `projection * view`.
    pub fn view_projection_matrix(&self) -> Mat4 {
        math::mul(&self.projection, &self.view)
    }
}

/// The host's description of the view being rendered this frame.
#[derive(Debug, Clone)]
pub struct SceneView {
    pub view_rect: IntRect,
    pub view_matrices: ViewMatrices,
    pub feature_level: FeatureLevel,
    overwrite_load_action: LoadOp,
}

impl SceneView {
    pub fn new(view_rect: IntRect, view_matrices: ViewMatrices, feature_level: FeatureLevel) -> Self {
        Self { view_rect, view_matrices, feature_level, overwrite_load_action: LoadOp::DontCare }
    }

    pub fn with_overwrite_load_action(mut self, load: LoadOp) -> Self {
        self.overwrite_load_action = load;
        self
    }

    /// Load action a pass should use when it is about to overwrite a whole target.
    pub fn overwrite_load_action(&self) -> LoadOp {
        self.overwrite_load_action
    }
}
