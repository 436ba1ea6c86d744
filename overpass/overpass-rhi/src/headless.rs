//! Headless device: no GPU. Keeps every resource descriptor, tracks texture access
//! states, and records submitted command lists after checking their transitions.
//! Used by tests and by the debug tools for dry runs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{
    BufferDescriptor, BufferHandle, Command, CommandList, Device, FeatureLevel, ResourceAccess,
    ResourceId, RhiError, ShaderDescriptor, ShaderHandle, TextureDescriptor, TextureHandle,
    TextureUsage, VertexLayoutDescriptor, VertexLayoutHandle,
};

#[derive(Default)]
struct HeadlessState {
    buffers: HashMap<ResourceId, (BufferDescriptor, Vec<u8>)>,
    layouts: HashMap<ResourceId, VertexLayoutDescriptor>,
    textures: HashMap<ResourceId, (TextureDescriptor, ResourceAccess)>,
    shaders: HashMap<ResourceId, ShaderDescriptor>,
    submitted: VecDeque<CommandList>,
    /// Oldest lists are dropped once more than this many are kept. None keeps all.
    history_limit: Option<usize>,
    failing_labels: HashSet<&'static str>,
    buffer_creations: usize,
}

#[derive(Debug)]
pub struct HeadlessDevice {
    feature_level: FeatureLevel,
    next_id: AtomicU64,
    state: Mutex<HeadlessState>,
}

impl std::fmt::Debug for HeadlessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessState")
            .field("buffers", &self.buffers.len())
            .field("textures", &self.textures.len())
            .field("submitted", &self.submitted.len())
            .finish()
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(FeatureLevel::Sm5)
    }
}

impl HeadlessDevice {
    pub fn new(feature_level: FeatureLevel) -> Self {
        Self {
            feature_level,
            next_id: AtomicU64::new(1),
            state: Mutex::new(HeadlessState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate_id(&self) -> ResourceId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn check_label(&self, state: &HeadlessState, label: &'static str) -> Result<(), RhiError> {
        if state.failing_labels.contains(label) {
            return Err(RhiError::ResourceCreation {
                label,
                reason: "allocation failure injected".to_string(),
            });
        }
        Ok(())
    }

    /// Make every later creation of a resource with this label fail.
    pub fn fail_creation_of(&self, label: &'static str) {
        self.state().failing_labels.insert(label);
    }

    /// Keep at most `limit` submitted lists; older ones are discarded. Long-running loops
    /// either set this or drain with [`take_submitted`](Self::take_submitted).
    pub fn set_history_limit(&self, limit: Option<usize>) {
        let mut state = self.state();
        state.history_limit = limit;
        Self::trim_history(&mut state);
    }

    fn trim_history(state: &mut HeadlessState) {
        if let Some(limit) = state.history_limit {
            while state.submitted.len() > limit {
                state.submitted.pop_front();
            }
        }
    }

    /// Command lists accepted so far, in submission order. Every list is kept until
    /// taken unless a history limit is set.
    pub fn submitted(&self) -> Vec<CommandList> {
        self.state().submitted.iter().cloned().collect()
    }

    pub fn take_submitted(&self) -> Vec<CommandList> {
        std::mem::take(&mut self.state().submitted).into()
    }

    pub fn live_buffers(&self) -> usize {
        self.state().buffers.len()
    }

    pub fn live_vertex_layouts(&self) -> usize {
        self.state().layouts.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state().textures.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.state().shaders.len()
    }

    /// Total number of buffers ever created, including released ones.
    pub fn buffer_creations(&self) -> usize {
        self.state().buffer_creations
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state().buffers.get(&buffer.id()).map(|(_, bytes)| bytes.clone())
    }

    pub fn texture_access(&self, texture: TextureHandle) -> Option<ResourceAccess> {
        self.state().textures.get(&texture.id()).map(|(_, access)| *access)
    }

    fn replay(state: &HeadlessState, commands: &CommandList) -> Result<HashMap<ResourceId, ResourceAccess>, RhiError> {
        let fail = |reason: String| RhiError::InvalidCommandList { label: commands.label(), reason };
        let mut access: HashMap<ResourceId, ResourceAccess> =
            state.textures.iter().map(|(id, (_, a))| (*id, *a)).collect();
        for command in commands.commands() {
            match command {
                Command::Transition { texture, from, to } => {
                    let current = access
                        .get_mut(&texture.id())
                        .ok_or(RhiError::UnknownResource(texture.id()))?;
                    if *from != *current && *from != ResourceAccess::Unknown {
                        return Err(fail(format!(
                            "transition of texture {} from {from:?} but it is in {current:?}",
                            texture.id()
                        )));
                    }
                    *current = *to;
                }
                Command::CopyTexture { src, dst } => {
                    for (texture, needed) in [(src, ResourceAccess::CopySrc), (dst, ResourceAccess::CopyDst)] {
                        let current = access.get(&texture.id()).ok_or(RhiError::UnknownResource(texture.id()))?;
                        if *current != needed {
                            return Err(fail(format!("copy with texture {} in {current:?}", texture.id())));
                        }
                    }
                }
                Command::BeginRenderPass(info) => {
                    let id = info.color_target.id();
                    let (desc, _) = state.textures.get(&id).ok_or(RhiError::UnknownResource(id))?;
                    if !desc.usage.intersects(TextureUsage::RENDER_TARGETABLE | TextureUsage::RESOLVE_TARGETABLE) {
                        return Err(fail(format!("render pass '{}' targets a non-renderable texture", info.label)));
                    }
                    if access.get(&id) != Some(&ResourceAccess::RenderTarget) {
                        return Err(fail(format!(
                            "render pass '{}' begun with target in {:?}",
                            info.label,
                            access.get(&id)
                        )));
                    }
                }
                Command::SetGraphicsPipelineState(pso) => {
                    for shader in [pso.vertex_shader, pso.pixel_shader] {
                        if !state.shaders.contains_key(&shader.id()) {
                            return Err(RhiError::UnknownResource(shader.id()));
                        }
                    }
                    if let Some(layout) = pso.vertex_layout {
                        if !state.layouts.contains_key(&layout.id()) {
                            return Err(RhiError::UnknownResource(layout.id()));
                        }
                    }
                }
                Command::SetPixelTexture(texture) => {
                    let id = texture.id();
                    let (desc, _) = state.textures.get(&id).ok_or(RhiError::UnknownResource(id))?;
                    if !desc.usage.contains(TextureUsage::SHADER_RESOURCE) {
                        return Err(fail(format!("texture {id} sampled without shader-resource usage")));
                    }
                    if access.get(&id) != Some(&ResourceAccess::ShaderRead) {
                        return Err(fail(format!("texture {id} sampled while in {:?}", access.get(&id))));
                    }
                }
                Command::SetStreamSource { buffer, .. } | Command::DrawIndexedPrimitive { index_buffer: buffer, .. } => {
                    if !state.buffers.contains_key(&buffer.id()) {
                        return Err(RhiError::UnknownResource(buffer.id()));
                    }
                }
                Command::SetViewport(_)
                | Command::SetShaderParameters { .. }
                | Command::DrawPrimitive { .. }
                | Command::EndRenderPass => {}
            }
        }
        Ok(access)
    }
}

impl Device for HeadlessDevice {
    fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }

    fn create_buffer(&self, desc: &BufferDescriptor, contents: &[u8]) -> Result<BufferHandle, RhiError> {
        let mut state = self.state();
        self.check_label(&state, desc.label)?;
        let id = self.allocate_id();
        state.buffers.insert(id, (desc.clone(), contents.to_vec()));
        state.buffer_creations += 1;
        Ok(BufferHandle(id))
    }

    fn create_vertex_layout(&self, desc: &VertexLayoutDescriptor) -> Result<VertexLayoutHandle, RhiError> {
        let mut state = self.state();
        self.check_label(&state, desc.label)?;
        let id = self.allocate_id();
        state.layouts.insert(id, desc.clone());
        Ok(VertexLayoutHandle(id))
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> Result<TextureHandle, RhiError> {
        let mut state = self.state();
        self.check_label(&state, desc.label)?;
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::ResourceCreation {
                label: desc.label,
                reason: "width and height must be > 0".to_string(),
            });
        }
        let id = self.allocate_id();
        state.textures.insert(id, (desc.clone(), ResourceAccess::Unknown));
        Ok(TextureHandle(id))
    }

    fn create_shader(&self, desc: &ShaderDescriptor) -> Result<ShaderHandle, RhiError> {
        let mut state = self.state();
        self.check_label(&state, desc.label)?;
        let id = self.allocate_id();
        state.shaders.insert(id, desc.clone());
        Ok(ShaderHandle(id))
    }

    fn texture_descriptor(&self, texture: TextureHandle) -> Option<TextureDescriptor> {
        self.state().textures.get(&texture.id()).map(|(desc, _)| desc.clone())
    }

    fn release_buffer(&self, buffer: BufferHandle) {
        self.state().buffers.remove(&buffer.id());
    }

    fn release_vertex_layout(&self, layout: VertexLayoutHandle) {
        self.state().layouts.remove(&layout.id());
    }

    fn release_texture(&self, texture: TextureHandle) {
        self.state().textures.remove(&texture.id());
    }

    fn release_shader(&self, shader: ShaderHandle) {
        self.state().shaders.remove(&shader.id());
    }

    fn submit(&self, commands: CommandList) -> Result<(), RhiError> {
        commands.validate()?;
        let mut state = self.state();
        let access = Self::replay(&state, &commands)?;
        for (id, new_access) in access {
            if let Some((_, tracked)) = state.textures.get_mut(&id) {
                *tracked = new_access;
            }
        }
        log::trace!("headless submit '{}': {} commands", commands.label(), commands.commands().len());
        state.submitted.push_back(commands);
        Self::trim_history(&mut state);
        Ok(())
    }
}
