//! Overpass RHI: backend-agnostic Rendering Hardware Interface.
//! Resources are referred to by small copyable handles; GPU work is recorded into a
//! [`CommandList`] and handed to a [`Device`] for submission.

use std::fmt::Debug;

mod command;
pub mod headless;
#[cfg(feature = "wgpu")]
pub mod wgpu_backend;

pub use command::{vertex_count, Command, CommandList, RenderPassInfo, Viewport};

/// Unique identifier for a GPU resource. Zero is never handed out.
pub type ResourceId = u64;

macro_rules! resource_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub ResourceId);

        impl $name {
            pub fn id(&self) -> ResourceId {
                self.0
            }
            pub fn is_valid(&self) -> bool {
                self.0 != 0
            }
        }
    };
}

resource_handle!(
    /// Vertex, index or uniform buffer.
    BufferHandle
);
resource_handle!(
    /// 2D texture usable as shader resource and/or render target.
    TextureHandle
);
resource_handle!(
    /// Vertex declaration: stride and attribute list for one stream.
    VertexLayoutHandle
);
resource_handle!(
    /// One compiled shader stage.
    ShaderHandle
);

#[derive(Debug, thiserror::Error)]
pub enum RhiError {
    #[error("failed to create {label}: {reason}")]
    ResourceCreation { label: &'static str, reason: String },
    #[error("unknown resource {0}")]
    UnknownResource(ResourceId),
    #[error("invalid command list '{label}': {reason}")]
    InvalidCommandList { label: &'static str, reason: String },
    #[error("backend error: {0}")]
    Backend(String),
}

/// Capability tier guaranteed by the active device. Ordered from least to most capable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum FeatureLevel {
    Es31,
    #[default]
    Sm5,
    Sm6,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const COPY_DST = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Orthogonal usage flags on a texture.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const SHADER_RESOURCE = 1 << 0;
        const RENDER_TARGETABLE = 1 << 1;
        const RESOLVE_TARGETABLE = 1 << 2;
        const COPY_SRC = 1 << 3;
        const COPY_DST = 1 << 4;
    }
}

impl TextureUsage {
    /// Readable by a shader and writable as a draw target.
    pub fn supports_read_write_pass(&self) -> bool {
        self.contains(TextureUsage::SHADER_RESOURCE)
            && self.intersects(TextureUsage::RENDER_TARGETABLE | TextureUsage::RESOLVE_TARGETABLE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Bgra8Unorm,
    Rgba16Float,
    Rgba32Float,
}

/// Access state a texture is in. Transitions move a texture between these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceAccess {
    /// Contents undefined; any transition out of it discards.
    Unknown,
    ShaderRead,
    RenderTarget,
    CopySrc,
    CopyDst,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ClearColor {
    pub const BLACK: ClearColor = ClearColor { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    /// Preserve existing contents.
    Load,
    Clear(ClearColor),
    /// Prior contents are not needed; the pass overwrites the whole target.
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    DontCare,
}

#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: &'static str,
    pub usage: BufferUsage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub fn size(&self) -> u32 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayoutDescriptor {
    pub label: &'static str,
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

/// WGSL source plus entry point for one stage.
#[derive(Debug, Clone)]
pub struct ShaderDescriptor {
    pub label: &'static str,
    pub source: &'static str,
    pub entry_point: &'static str,
    pub stage: ShaderStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Opaque,
    AlphaBlend,
}

/// Full graphics pipeline state. Backends cache the compiled pipeline keyed by this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineState {
    /// None when positions are synthesized in the vertex stage.
    pub vertex_layout: Option<VertexLayoutHandle>,
    pub vertex_shader: ShaderHandle,
    pub pixel_shader: ShaderHandle,
    pub primitive: PrimitiveTopology,
    pub blend: BlendMode,
    pub color_format: TextureFormat,
    /// The pixel stage reads one texture, bound with [`CommandList::set_pixel_texture`].
    pub samples_texture: bool,
}

/// Shader parameter blocks are bound at group 0: binding 0 for the vertex stage,
/// binding 1 for the pixel stage.
pub const VERTEX_PARAMETER_BINDING: u32 = 0;
pub const PIXEL_PARAMETER_BINDING: u32 = 1;
/// Pipelines that sample a texture read it from binding 0 of this group.
pub const PIXEL_TEXTURE_GROUP: u32 = 1;

/// The core device trait that all backends must implement.
pub trait Device: Send + Sync + Debug {
    fn feature_level(&self) -> FeatureLevel;

    /// Create a buffer initialized with `contents`.
    fn create_buffer(&self, desc: &BufferDescriptor, contents: &[u8]) -> Result<BufferHandle, RhiError>;

    fn create_vertex_layout(&self, desc: &VertexLayoutDescriptor) -> Result<VertexLayoutHandle, RhiError>;

    /// Create a texture. Its access state starts as [`ResourceAccess::Unknown`].
    fn create_texture(&self, desc: &TextureDescriptor) -> Result<TextureHandle, RhiError>;

    fn create_shader(&self, desc: &ShaderDescriptor) -> Result<ShaderHandle, RhiError>;

    fn texture_descriptor(&self, texture: TextureHandle) -> Option<TextureDescriptor>;

    fn release_buffer(&self, buffer: BufferHandle);
    fn release_vertex_layout(&self, layout: VertexLayoutHandle);
    fn release_texture(&self, texture: TextureHandle);
    fn release_shader(&self, shader: ShaderHandle);

    /// Submit a recorded command list. Validates it first; does not block on GPU completion.
    fn submit(&self, commands: CommandList) -> Result<(), RhiError>;
}
