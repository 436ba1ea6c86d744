//! Per-frame render graph: passes declare the textures they touch and the access they need,
//! the graph orders them, inserts the access transitions and records one command list.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use overpass_rhi::{CommandList, Device, ResourceAccess, RhiError, TextureDescriptor, TextureHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphTextureId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Raster,
    Copy,
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("render graph has a cycle")]
    Cycle,
    #[error("unknown graph texture {0:?}")]
    UnknownTexture(GraphTextureId),
    #[error("texture {0:?} is not known to the device")]
    UnregisteredTexture(TextureHandle),
    #[error("pass '{pass}': {reason}")]
    InvalidPass { pass: &'static str, reason: String },
    #[error(transparent)]
    Rhi(#[from] RhiError),
}

pub trait RenderGraphNode: Send {
    fn record(&self, commands: &mut CommandList, resources: &GraphResources<'_>) -> Result<(), GraphError>;
}

impl<F> RenderGraphNode for F
where
    F: Fn(&mut CommandList, &GraphResources<'_>) -> Result<(), GraphError> + Send,
{
    fn record(&self, commands: &mut CommandList, resources: &GraphResources<'_>) -> Result<(), GraphError> {
        self(commands, resources)
    }
}

#[derive(Debug)]
struct GraphTexture {
    name: &'static str,
    handle: TextureHandle,
    desc: TextureDescriptor,
    initial_access: ResourceAccess,
    /// Access the texture must be left in after execution. None for transients nobody keeps.
    final_access: Option<ResourceAccess>,
    transient: bool,
    extracted: bool,
}

/// Texture lookup handed to nodes while recording.
pub struct GraphResources<'a> {
    textures: &'a [GraphTexture],
}

impl GraphResources<'_> {
    pub fn texture(&self, id: GraphTextureId) -> Result<TextureHandle, GraphError> {
        self.textures.get(id.0).map(|t| t.handle).ok_or(GraphError::UnknownTexture(id))
    }

    pub fn descriptor(&self, id: GraphTextureId) -> Result<&TextureDescriptor, GraphError> {
        self.textures.get(id.0).map(|t| &t.desc).ok_or(GraphError::UnknownTexture(id))
    }
}

struct GraphPass {
    name: &'static str,
    kind: PassKind,
    accesses: Vec<(GraphTextureId, ResourceAccess)>,
    node: Box<dyn RenderGraphNode>,
}

/// One frame's passes and textures. Passes are ordered by their declared accesses, and
/// [`RenderGraph::execute`] records them with the transitions between them.
pub struct RenderGraph {
    device: Arc<dyn Device>,
    label: &'static str,
    textures: Vec<GraphTexture>,
    passes: Vec<GraphPass>,
    edges: Vec<(PassId, PassId)>,
}

impl RenderGraph {
    pub fn new(device: Arc<dyn Device>, label: &'static str) -> Self {
        Self { device, label, textures: Vec::new(), passes: Vec::new(), edges: Vec::new() }
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Import a texture owned outside the graph. It is returned to `access` after execution.
    pub fn register_external_texture(
        &mut self,
        name: &'static str,
        handle: TextureHandle,
        access: ResourceAccess,
    ) -> Result<GraphTextureId, GraphError> {
        let desc = self.device.texture_descriptor(handle).ok_or(GraphError::UnregisteredTexture(handle))?;
        Ok(self.push_texture(GraphTexture {
            name,
            handle,
            desc,
            initial_access: access,
            final_access: Some(access),
            transient: false,
            extracted: false,
        }))
    }

    /// Create a texture that lives for this graph only, unless extracted.
    pub fn create_texture(&mut self, desc: TextureDescriptor) -> Result<GraphTextureId, GraphError> {
        let handle = self.device.create_texture(&desc)?;
        log::trace!("graph '{}': transient texture '{}' ({}x{})", self.label, desc.label, desc.width, desc.height);
        Ok(self.push_texture(GraphTexture {
            name: desc.label,
            handle,
            desc,
            initial_access: ResourceAccess::Unknown,
            final_access: None,
            transient: true,
            extracted: false,
        }))
    }

    fn push_texture(&mut self, texture: GraphTexture) -> GraphTextureId {
        let id = GraphTextureId(self.textures.len());
        self.textures.push(texture);
        id
    }

    pub fn texture_desc(&self, id: GraphTextureId) -> Option<&TextureDescriptor> {
        self.textures.get(id.0).map(|t| &t.desc)
    }

    pub fn texture_handle(&self, id: GraphTextureId) -> Option<TextureHandle> {
        self.textures.get(id.0).map(|t| t.handle)
    }

    pub fn texture_name(&self, id: GraphTextureId) -> Option<&'static str> {
        self.textures.get(id.0).map(|t| t.name)
    }

    /// Keep a texture alive past execution, left in `final_access`.
    pub fn extract_texture(
        &mut self,
        id: GraphTextureId,
        final_access: ResourceAccess,
    ) -> Result<TextureHandle, GraphError> {
        let texture = self.textures.get_mut(id.0).ok_or(GraphError::UnknownTexture(id))?;
        texture.extracted = true;
        texture.final_access = Some(final_access);
        Ok(texture.handle)
    }

    pub fn add_pass<F>(
        &mut self,
        name: &'static str,
        kind: PassKind,
        accesses: Vec<(GraphTextureId, ResourceAccess)>,
        node: F,
    ) -> Result<PassId, GraphError>
    where
        F: Fn(&mut CommandList, &GraphResources<'_>) -> Result<(), GraphError> + Send + 'static,
    {
        self.add_node(name, kind, accesses, Box::new(node))
    }

    pub fn add_node(
        &mut self,
        name: &'static str,
        kind: PassKind,
        accesses: Vec<(GraphTextureId, ResourceAccess)>,
        node: Box<dyn RenderGraphNode>,
    ) -> Result<PassId, GraphError> {
        for (i, &(id, access)) in accesses.iter().enumerate() {
            if id.0 >= self.textures.len() {
                return Err(GraphError::UnknownTexture(id));
            }
            if accesses[..i].iter().any(|&(other, a)| other == id && a != access) {
                return Err(GraphError::InvalidPass {
                    pass: name,
                    reason: format!("texture '{}' declared with conflicting accesses", self.textures[id.0].name),
                });
            }
        }
        let id = PassId(self.passes.len());
        self.passes.push(GraphPass { name, kind, accesses, node });
        Ok(id)
    }

    /// Copy `src` into `dst`. Both must be distinct and share dimensions and format.
    pub fn add_copy_pass(
        &mut self,
        name: &'static str,
        src: GraphTextureId,
        dst: GraphTextureId,
    ) -> Result<PassId, GraphError> {
        if src == dst {
            return Err(GraphError::InvalidPass { pass: name, reason: "copy source and destination are the same".into() });
        }
        let (s, d) = match (self.texture_desc(src), self.texture_desc(dst)) {
            (Some(s), Some(d)) => (s, d),
            (None, _) => return Err(GraphError::UnknownTexture(src)),
            (_, None) => return Err(GraphError::UnknownTexture(dst)),
        };
        if (s.width, s.height, s.format) != (d.width, d.height, d.format) {
            return Err(GraphError::InvalidPass {
                pass: name,
                reason: format!("incompatible copy {}x{} {:?} -> {}x{} {:?}", s.width, s.height, s.format, d.width, d.height, d.format),
            });
        }
        self.add_pass(
            name,
            PassKind::Copy,
            vec![(src, ResourceAccess::CopySrc), (dst, ResourceAccess::CopyDst)],
            move |commands, resources| {
                commands.copy_texture(resources.texture(src)?, resources.texture(dst)?);
                Ok(())
            },
        )
    }

    pub fn add_edge(&mut self, before: PassId, after: PassId) {
        self.edges.push((before, after));
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn pass_kind(&self, id: PassId) -> Option<PassKind> {
        self.passes.get(id.0).map(|p| p.kind)
    }

    /// Pass names in the order they will execute.
    pub fn execution_order(&self) -> Result<Vec<&'static str>, GraphError> {
        Ok(self.topological_order()?.into_iter().map(|i| self.passes[i].name).collect())
    }

    /// Kahn's algorithm, smallest pass index first so independent passes keep insertion order.
    /// Passes touching the same texture are ordered by insertion.
    fn topological_order(&self) -> Result<Vec<usize>, GraphError> {
        let n = self.passes.len();
        let mut in_degree = vec![0usize; n];
        let mut out_edges: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut add = |a: usize, b: usize, in_degree: &mut Vec<usize>| {
            if a < n && b < n && a != b && !out_edges[a].contains(&b) {
                out_edges[a].push(b);
                in_degree[b] += 1;
            }
        };
        let mut last_user: Vec<Option<usize>> = vec![None; self.textures.len()];
        for (index, pass) in self.passes.iter().enumerate() {
            for &(id, _) in &pass.accesses {
                if let Some(prev) = last_user[id.0] {
                    add(prev, index, &mut in_degree);
                }
                last_user[id.0] = Some(index);
            }
        }
        for &(PassId(a), PassId(b)) in &self.edges {
            add(a, b, &mut in_degree);
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n).filter(|&i| in_degree[i] == 0).map(Reverse).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(u)) = ready.pop() {
            order.push(u);
            for &v in &out_edges[u] {
                in_degree[v] -= 1;
                if in_degree[v] == 0 {
                    ready.push(Reverse(v));
                }
            }
        }
        if order.len() != n {
            return Err(GraphError::Cycle);
        }
        Ok(order)
    }

    /// Record every pass with the transitions it needs, then return kept textures to their final access.
    pub fn compile(&self) -> Result<CommandList, GraphError> {
        let order = self.topological_order()?;
        let mut commands = CommandList::new(self.label);
        let mut current: Vec<ResourceAccess> = self.textures.iter().map(|t| t.initial_access).collect();
        let resources = GraphResources { textures: &self.textures };
        for index in order {
            let pass = &self.passes[index];
            for &(id, needed) in &pass.accesses {
                if current[id.0] != needed {
                    commands.transition(self.textures[id.0].handle, current[id.0], needed);
                    current[id.0] = needed;
                }
            }
            log::trace!("graph '{}': recording pass '{}'", self.label, pass.name);
            pass.node.record(&mut commands, &resources)?;
        }
        for (texture, access) in self.textures.iter().zip(current) {
            if let Some(final_access) = texture.final_access {
                if access != final_access {
                    commands.transition(texture.handle, access, final_access);
                }
            }
        }
        Ok(commands)
    }

    /// Compile and submit. Transient textures that were not extracted are released afterwards.
    pub fn execute(self) -> Result<(), GraphError> {
        let commands = self.compile()?;
        if !commands.is_empty() {
            self.device.submit(commands)?;
        }
        Ok(())
    }
}

impl Drop for RenderGraph {
    fn drop(&mut self) {
        for texture in &self.textures {
            if texture.transient && !texture.extracted {
                self.device.release_texture(texture.handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overpass_rhi::headless::HeadlessDevice;
    use overpass_rhi::{Command, FeatureLevel, TextureFormat, TextureUsage};

    fn desc(label: &'static str) -> TextureDescriptor {
        TextureDescriptor {
            label,
            width: 8,
            height: 8,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::SHADER_RESOURCE
                | TextureUsage::RENDER_TARGETABLE
                | TextureUsage::COPY_SRC
                | TextureUsage::COPY_DST,
        }
    }

    fn device() -> Arc<HeadlessDevice> {
        Arc::new(HeadlessDevice::new(FeatureLevel::Sm5))
    }

    #[test]
    fn independent_passes_keep_insertion_order() {
        let dev = device();
        let mut graph = RenderGraph::new(dev.clone(), "order");
        for name in ["a", "b", "c"] {
            graph.add_pass(name, PassKind::Raster, vec![], |_, _| Ok(())).unwrap();
        }
        assert_eq!(graph.execution_order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn explicit_edge_reorders_passes() {
        let dev = device();
        let mut graph = RenderGraph::new(dev.clone(), "edges");
        let a = graph.add_pass("a", PassKind::Raster, vec![], |_, _| Ok(())).unwrap();
        let b = graph.add_pass("b", PassKind::Raster, vec![], |_, _| Ok(())).unwrap();
        graph.add_edge(b, a);
        assert_eq!(graph.execution_order().unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn cycle_is_reported() {
        let dev = device();
        let mut graph = RenderGraph::new(dev.clone(), "cycle");
        let t = graph.create_texture(desc("t")).unwrap();
        let a = graph.add_pass("a", PassKind::Raster, vec![(t, ResourceAccess::RenderTarget)], |_, _| Ok(())).unwrap();
        let b = graph.add_pass("b", PassKind::Raster, vec![(t, ResourceAccess::ShaderRead)], |_, _| Ok(())).unwrap();
        graph.add_edge(b, a);
        assert!(matches!(graph.execution_order(), Err(GraphError::Cycle)));
    }

    #[test]
    fn transitions_are_inserted_and_external_access_restored() {
        let dev = device();
        let handle = dev.create_texture(&desc("scene")).unwrap();
        let mut setup = CommandList::new("setup");
        setup.transition(handle, ResourceAccess::Unknown, ResourceAccess::ShaderRead);
        dev.submit(setup).unwrap();

        let mut graph = RenderGraph::new(dev.clone(), "frame");
        let scene = graph.register_external_texture("scene", handle, ResourceAccess::ShaderRead).unwrap();
        let copy = graph.create_texture(desc("copy")).unwrap();
        graph.add_copy_pass("copy", scene, copy).unwrap();
        let commands = graph.compile().unwrap();
        let transitions: Vec<_> = commands
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::Transition { texture, from, to } => Some((*texture == handle, *from, *to)),
                _ => None,
            })
            .collect();
        assert!(transitions.contains(&(true, ResourceAccess::ShaderRead, ResourceAccess::CopySrc)));
        assert!(transitions.contains(&(false, ResourceAccess::Unknown, ResourceAccess::CopyDst)));
        assert_eq!(transitions.last(), Some(&(true, ResourceAccess::CopySrc, ResourceAccess::ShaderRead)));

        graph.execute().unwrap();
        assert_eq!(dev.texture_access(handle), Some(ResourceAccess::ShaderRead));
    }

    #[test]
    fn transients_are_released_unless_extracted() {
        let dev = device();
        let mut graph = RenderGraph::new(dev.clone(), "release");
        let dropped = graph.create_texture(desc("dropped")).unwrap();
        let kept = graph.create_texture(desc("kept")).unwrap();
        graph.add_copy_pass("copy", dropped, kept).unwrap();
        let handle = graph.extract_texture(kept, ResourceAccess::ShaderRead).unwrap();
        graph.execute().unwrap();
        assert_eq!(dev.live_textures(), 1);
        assert_eq!(dev.texture_access(handle), Some(ResourceAccess::ShaderRead));
    }

    #[test]
    fn copy_between_mismatched_textures_is_rejected() {
        let dev = device();
        let mut graph = RenderGraph::new(dev.clone(), "bad copy");
        let a = graph.create_texture(desc("a")).unwrap();
        let b = graph.create_texture(TextureDescriptor { width: 4, ..desc("b") }).unwrap();
        assert!(matches!(graph.add_copy_pass("copy", a, b), Err(GraphError::InvalidPass { .. })));
        assert!(matches!(graph.add_copy_pass("self", a, a), Err(GraphError::InvalidPass { .. })));
    }

    #[test]
    fn conflicting_accesses_in_one_pass_are_rejected() {
        let dev = device();
        let mut graph = RenderGraph::new(dev.clone(), "conflict");
        let t = graph.create_texture(desc("t")).unwrap();
        let result = graph.add_pass(
            "both",
            PassKind::Raster,
            vec![(t, ResourceAccess::ShaderRead), (t, ResourceAccess::RenderTarget)],
            |_, _| Ok(()),
        );
        assert!(result.is_err());
    }
}
