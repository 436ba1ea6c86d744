use std::sync::Arc;

use overpass_renderer::OverlayPass;
use render_api::{
    PassCallbackList, PostProcessMaterialInputs, PostProcessingPass, RenderGraph, SceneView, SceneViewExtension,
};

/// Hooks the overlay pass into the host's post-process chain.
pub struct OverlayViewExtension {
    pass: Arc<OverlayPass>,
}

impl OverlayViewExtension {
    pub const NAME: &'static str = "OverlayViewExtension";

    pub fn new(pass: Arc<OverlayPass>) -> Self {
        Self { pass }
    }

    pub fn pass(&self) -> &Arc<OverlayPass> {
        &self.pass
    }
}

impl SceneViewExtension for OverlayViewExtension {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn subscribe_to_post_processing_pass(
        &self,
        pass: PostProcessingPass,
        callbacks: &mut PassCallbackList,
        is_pass_enabled: bool,
    ) {
        if !self.pass.wants_pass(pass, is_pass_enabled) {
            return;
        }
        let overlay = Arc::clone(&self.pass);
        callbacks.push(Arc::new(
            move |graph: &mut RenderGraph, view: &SceneView, inputs: &PostProcessMaterialInputs| {
                overlay.render(graph, view, inputs)
            },
        ));
    }
}
