//! Static geometry: a fixed clip-space triangle or a world-space cube, created once per device.

use overpass_rhi::{
    BufferDescriptor, BufferHandle, BufferUsage, Device, PrimitiveTopology, RhiError, VertexAttribute, VertexFormat,
    VertexLayoutDescriptor, VertexLayoutHandle,
};

/// Something owning device resources with an explicit lifetime.
pub trait FrameResource {
    /// Create backend resources. A no-op when already initialized.
    fn init(&mut self, device: &dyn Device) -> Result<(), RhiError>;
    /// Free backend resources. Safe when never initialized.
    fn release(&mut self, device: &dyn Device);
    fn is_initialized(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    /// 3 vertices, position (xy) + color (rgba), already in clip space.
    Triangle,
    /// 8 corners, position (xyz), in world space around [`CUBE_CENTER`].
    Cube,
}

pub const CUBE_CENTER: [f32; 3] = [3000.0, -1000.0, 70.0];
pub const CUBE_HALF_EXTENT: f32 = 100.0;

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct ColorVertex {
    position: [f32; 2],
    color: [f32; 4],
}

const TRIANGLE_VERTICES: [ColorVertex; 3] = [
    ColorVertex { position: [0.0, 0.75], color: [1.0, 0.0, 0.0, 1.0] },
    ColorVertex { position: [0.75, -0.75], color: [0.0, 1.0, 0.0, 1.0] },
    ColorVertex { position: [-0.75, -0.75], color: [0.0, 0.0, 1.0, 1.0] },
];
const TRIANGLE_INDICES: [u32; 3] = [0, 1, 2];

#[rustfmt::skip]
const CUBE_INDICES: [u32; 36] = [
    0, 1, 2, 2, 3, 0, // -z
    4, 6, 5, 6, 4, 7, // +z
    0, 4, 5, 5, 1, 0, // -y
    3, 2, 6, 6, 7, 3, // +y
    0, 3, 7, 7, 4, 0, // -x
    1, 5, 6, 6, 2, 1, // +x
];

fn cube_vertices() -> [[f32; 3]; 8] {
    let [cx, cy, cz] = CUBE_CENTER;
    let h = CUBE_HALF_EXTENT;
    [
        [cx - h, cy - h, cz - h],
        [cx + h, cy - h, cz - h],
        [cx + h, cy + h, cz - h],
        [cx - h, cy + h, cz - h],
        [cx - h, cy - h, cz + h],
        [cx + h, cy - h, cz + h],
        [cx + h, cy + h, cz + h],
        [cx - h, cy + h, cz + h],
    ]
}

impl GeometryKind {
    pub fn label(&self) -> &'static str {
        match self {
            GeometryKind::Triangle => "overpass_triangle",
            GeometryKind::Cube => "overpass_cube",
        }
    }

    pub fn num_vertices(&self) -> u32 {
        match self {
            GeometryKind::Triangle => TRIANGLE_VERTICES.len() as u32,
            GeometryKind::Cube => 8,
        }
    }

    pub fn num_primitives(&self) -> u32 {
        match self {
            GeometryKind::Triangle => TRIANGLE_INDICES.len() as u32 / 3,
            GeometryKind::Cube => CUBE_INDICES.len() as u32 / 3,
        }
    }

    pub fn vertex_layout(&self) -> VertexLayoutDescriptor {
        match self {
            GeometryKind::Triangle => VertexLayoutDescriptor {
                label: "overpass_triangle_layout",
                stride: std::mem::size_of::<ColorVertex>() as u32,
                attributes: vec![
                    VertexAttribute { location: 0, format: VertexFormat::Float32x2, offset: 0 },
                    VertexAttribute { location: 1, format: VertexFormat::Float32x4, offset: 8 },
                ],
            },
            GeometryKind::Cube => VertexLayoutDescriptor {
                label: "overpass_cube_layout",
                stride: VertexFormat::Float32x3.size(),
                attributes: vec![VertexAttribute { location: 0, format: VertexFormat::Float32x3, offset: 0 }],
            },
        }
    }

    fn vertex_bytes(&self) -> Vec<u8> {
        match self {
            GeometryKind::Triangle => bytemuck::cast_slice(&TRIANGLE_VERTICES).to_vec(),
            GeometryKind::Cube => bytemuck::cast_slice(&cube_vertices()).to_vec(),
        }
    }

    fn index_bytes(&self) -> &'static [u8] {
        match self {
            GeometryKind::Triangle => bytemuck::cast_slice(&TRIANGLE_INDICES),
            GeometryKind::Cube => bytemuck::cast_slice(&CUBE_INDICES),
        }
    }
}

/// Handles of an initialized geometry resource. Immutable until the resource is released.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeometryBuffer {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub vertex_layout: VertexLayoutHandle,
    pub num_vertices: u32,
    pub num_primitives: u32,
    pub primitive: PrimitiveTopology,
}

impl GeometryBuffer {
    pub fn is_valid(&self) -> bool {
        self.vertex_buffer.is_valid() && self.index_buffer.is_valid() && self.vertex_layout.is_valid()
    }
}

#[derive(Debug)]
enum GeometryState {
    Uninitialized,
    Ready(GeometryBuffer),
    /// Creation failed; stays failed until released.
    Failed,
}

#[derive(Debug)]
pub struct GeometryResource {
    kind: GeometryKind,
    state: GeometryState,
}

impl GeometryResource {
    pub fn new(kind: GeometryKind) -> Self {
        Self { kind, state: GeometryState::Uninitialized }
    }

    pub fn kind(&self) -> GeometryKind {
        self.kind
    }

    pub fn buffer(&self) -> Option<GeometryBuffer> {
        match self.state {
            GeometryState::Ready(buffer) => Some(buffer),
            _ => None,
        }
    }

    pub fn has_failed(&self) -> bool {
        matches!(self.state, GeometryState::Failed)
    }

    fn create(&self, device: &dyn Device) -> Result<GeometryBuffer, RhiError> {
        let label = self.kind.label();
        let vertex_buffer = device.create_buffer(
            &BufferDescriptor { label: "overpass_geometry_vertices", usage: BufferUsage::VERTEX },
            &self.kind.vertex_bytes(),
        )?;
        let index_buffer = match device.create_buffer(
            &BufferDescriptor { label: "overpass_geometry_indices", usage: BufferUsage::INDEX },
            self.kind.index_bytes(),
        ) {
            Ok(buffer) => buffer,
            Err(err) => {
                device.release_buffer(vertex_buffer);
                return Err(err);
            }
        };
        let vertex_layout = match device.create_vertex_layout(&self.kind.vertex_layout()) {
            Ok(layout) => layout,
            Err(err) => {
                device.release_buffer(vertex_buffer);
                device.release_buffer(index_buffer);
                return Err(err);
            }
        };
        log::debug!("{label}: {} vertices, {} primitives", self.kind.num_vertices(), self.kind.num_primitives());
        Ok(GeometryBuffer {
            vertex_buffer,
            index_buffer,
            vertex_layout,
            num_vertices: self.kind.num_vertices(),
            num_primitives: self.kind.num_primitives(),
            primitive: PrimitiveTopology::TriangleList,
        })
    }
}

impl FrameResource for GeometryResource {
    fn init(&mut self, device: &dyn Device) -> Result<(), RhiError> {
        match self.state {
            GeometryState::Ready(_) => Ok(()),
            GeometryState::Failed => Err(RhiError::ResourceCreation {
                label: self.kind.label(),
                reason: "previous creation failed; release before retrying".into(),
            }),
            GeometryState::Uninitialized => match self.create(device) {
                Ok(buffer) => {
                    self.state = GeometryState::Ready(buffer);
                    Ok(())
                }
                Err(err) => {
                    self.state = GeometryState::Failed;
                    Err(err)
                }
            },
        }
    }

    fn release(&mut self, device: &dyn Device) {
        if let GeometryState::Ready(buffer) = self.state {
            device.release_buffer(buffer.vertex_buffer);
            device.release_buffer(buffer.index_buffer);
            device.release_vertex_layout(buffer.vertex_layout);
        }
        self.state = GeometryState::Uninitialized;
    }

    fn is_initialized(&self) -> bool {
        matches!(self.state, GeometryState::Ready(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overpass_rhi::headless::HeadlessDevice;

    #[test]
    fn repeated_init_allocates_once() {
        let device = HeadlessDevice::default();
        let mut cube = GeometryResource::new(GeometryKind::Cube);
        for _ in 0..4 {
            cube.init(&device).unwrap();
        }
        assert_eq!(device.buffer_creations(), 2);
        assert_eq!(device.live_buffers(), 2);
        assert_eq!(device.live_vertex_layouts(), 1);
        let buffer = cube.buffer().unwrap();
        assert_eq!(buffer.num_vertices, 8);
        assert_eq!(buffer.num_primitives, 12);
    }

    #[test]
    fn release_without_init_is_harmless() {
        let device = HeadlessDevice::default();
        let mut triangle = GeometryResource::new(GeometryKind::Triangle);
        triangle.release(&device);
        assert!(!triangle.is_initialized());
        triangle.init(&device).unwrap();
        triangle.release(&device);
        triangle.release(&device);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_vertex_layouts(), 0);
    }

    #[test]
    fn failed_creation_leaves_no_partial_resources() {
        let device = HeadlessDevice::default();
        device.fail_creation_of("overpass_geometry_indices");
        let mut cube = GeometryResource::new(GeometryKind::Cube);
        assert!(cube.init(&device).is_err());
        assert!(cube.has_failed());
        assert!(cube.buffer().is_none());
        assert_eq!(device.live_buffers(), 0);
        // No retry until released.
        assert!(cube.init(&device).is_err());
        assert_eq!(device.buffer_creations(), 1);
    }

    #[test]
    fn triangle_layout_matches_vertex_struct() {
        let layout = GeometryKind::Triangle.vertex_layout();
        assert_eq!(layout.stride, 24);
        assert_eq!(GeometryKind::Triangle.vertex_bytes().len(), 72);
        assert_eq!(GeometryKind::Cube.index_bytes().len(), 36 * 4);
    }

    #[test]
    fn cube_corners_surround_center() {
        for corner in cube_vertices() {
            for axis in 0..3 {
                assert_eq!((corner[axis] - CUBE_CENTER[axis]).abs(), CUBE_HALF_EXTENT);
            }
        }
    }
}
