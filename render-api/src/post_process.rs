//! Post-process pass slots and the callbacks extensions hang off them.

use std::sync::Arc;

use overpass_rhi::{LoadOp, TextureDescriptor, TextureUsage};

use crate::extension::ExtensionRegistry;
use crate::graph::{GraphError, GraphTextureId, RenderGraph};
use crate::view::{IntRect, SceneView};

/// Named slots in the host's post-process chain, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostProcessingPass {
    MotionBlur,
    Tonemap,
    Fxaa,
    VisualizeDepthOfField,
}

impl PostProcessingPass {
    pub const ALL: [PostProcessingPass; 4] = [
        PostProcessingPass::MotionBlur,
        PostProcessingPass::Tonemap,
        PostProcessingPass::Fxaa,
        PostProcessingPass::VisualizeDepthOfField,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PostProcessingPass::MotionBlur => "MotionBlur",
            PostProcessingPass::Tonemap => "Tonemap",
            PostProcessingPass::Fxaa => "FXAA",
            PostProcessingPass::VisualizeDepthOfField => "VisualizeDepthOfField",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name().eq_ignore_ascii_case(name))
    }
}

/// A graph texture plus the sub-rectangle holding valid pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPassTexture {
    pub texture: GraphTextureId,
    pub view_rect: IntRect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPassRenderTarget {
    pub texture: GraphTextureId,
    pub view_rect: IntRect,
    pub load_action: LoadOp,
}

impl ScreenPassRenderTarget {
    /// New graph texture shaped like `input`, usable as draw target, shader resource and copy destination.
    pub fn create_from_input(
        graph: &mut RenderGraph,
        input: &ScreenPassTexture,
        load_action: LoadOp,
        name: &'static str,
    ) -> Result<Self, GraphError> {
        let source = graph.texture_desc(input.texture).ok_or(GraphError::UnknownTexture(input.texture))?;
        let desc = TextureDescriptor {
            label: name,
            usage: source.usage
                | TextureUsage::SHADER_RESOURCE
                | TextureUsage::RENDER_TARGETABLE
                | TextureUsage::COPY_SRC
                | TextureUsage::COPY_DST,
            ..source.clone()
        };
        let texture = graph.create_texture(desc)?;
        Ok(Self { texture, view_rect: input.view_rect, load_action })
    }

    pub fn as_screen_pass_texture(&self) -> ScreenPassTexture {
        ScreenPassTexture { texture: self.texture, view_rect: self.view_rect }
    }
}

/// What a post-process callback receives: the current scene color and, for the last
/// callback of the chain, the target the host wants the result written into.
#[derive(Debug, Clone, Copy)]
pub struct PostProcessMaterialInputs {
    pub scene_color: ScreenPassTexture,
    pub override_output: Option<ScreenPassRenderTarget>,
}

impl PostProcessMaterialInputs {
    pub fn new(scene_color: ScreenPassTexture) -> Self {
        Self { scene_color, override_output: None }
    }
}

pub type AfterPassCallback =
    Arc<dyn Fn(&mut RenderGraph, &SceneView, &PostProcessMaterialInputs) -> ScreenPassTexture + Send + Sync>;

/// Append-only list of callbacks subscribed to one pass slot.
#[derive(Default, Clone)]
pub struct PassCallbackList {
    callbacks: Vec<AfterPassCallback>,
}

impl PassCallbackList {
    pub fn push(&mut self, callback: AfterPassCallback) {
        self.callbacks.push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AfterPassCallback> {
        self.callbacks.iter()
    }
}

impl std::fmt::Debug for PassCallbackList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassCallbackList").field("len", &self.callbacks.len()).finish()
    }
}

/// The host's post-process chain: which slots exist this frame and whether each is enabled.
#[derive(Debug, Clone)]
pub struct PostProcessSequence {
    slots: Vec<(PostProcessingPass, bool)>,
}

impl Default for PostProcessSequence {
    fn default() -> Self {
        Self { slots: PostProcessingPass::ALL.iter().map(|&p| (p, true)).collect() }
    }
}

impl PostProcessSequence {
    pub fn new(slots: Vec<(PostProcessingPass, bool)>) -> Self {
        Self { slots }
    }

    pub fn set_enabled(&mut self, pass: PostProcessingPass, enabled: bool) {
        for slot in self.slots.iter_mut().filter(|(p, _)| *p == pass) {
            slot.1 = enabled;
        }
    }

    pub fn is_enabled(&self, pass: PostProcessingPass) -> bool {
        self.slots.iter().any(|&(p, enabled)| p == pass && enabled)
    }

    /// Ask every active extension which slots it wants this frame. Called once per frame,
    /// so subscriptions follow changes to the enabled flags.
    pub fn gather(&self, registry: &ExtensionRegistry) -> FrameCallbacks {
        let mut per_slot = Vec::with_capacity(self.slots.len());
        for &(pass, enabled) in &self.slots {
            let mut callbacks = PassCallbackList::default();
            for extension in registry.iter().filter(|e| e.is_active_this_frame()) {
                extension.subscribe_to_post_processing_pass(pass, &mut callbacks, enabled);
            }
            if !callbacks.is_empty() {
                log::debug!("{} callback(s) subscribed after {}", callbacks.len(), pass.name());
            }
            per_slot.push((pass, enabled, callbacks));
        }
        FrameCallbacks { per_slot }
    }
}

/// Callbacks gathered for one frame, ready to run against that frame's graph.
#[derive(Debug)]
pub struct FrameCallbacks {
    per_slot: Vec<(PostProcessingPass, bool, PassCallbackList)>,
}

impl FrameCallbacks {
    pub fn callbacks_for(&self, pass: PostProcessingPass) -> Option<&PassCallbackList> {
        self.per_slot.iter().find(|(p, _, _)| *p == pass).map(|(_, _, list)| list)
    }

    pub fn callback_count(&self) -> usize {
        self.per_slot.iter().filter(|(_, enabled, _)| *enabled).map(|(_, _, list)| list.len()).sum()
    }

    /// Run the callbacks of enabled slots in order, each output feeding the next one's scene color.
    /// Only the very last callback of the chain receives `final_output` as its override.
    pub fn execute(
        &self,
        graph: &mut RenderGraph,
        view: &SceneView,
        scene_color: ScreenPassTexture,
        final_output: Option<ScreenPassRenderTarget>,
    ) -> ScreenPassTexture {
        let chain: Vec<&AfterPassCallback> = self
            .per_slot
            .iter()
            .filter(|(_, enabled, _)| *enabled)
            .flat_map(|(_, _, list)| list.iter())
            .collect();
        let last = chain.len().saturating_sub(1);
        let mut current = scene_color;
        for (index, callback) in chain.into_iter().enumerate() {
            let inputs = PostProcessMaterialInputs {
                scene_color: current,
                override_output: if index == last { final_output } else { None },
            };
            current = callback(graph, view, &inputs);
        }
        current
    }
}
