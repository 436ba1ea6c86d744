//! wgpu backend. Resource handles map to wgpu objects held in one table; pipelines are
//! created on first use and cached by [`GraphicsPipelineState`].

mod conversions;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use wgpu::util::DeviceExt;

use crate::command::vertex_count;
use crate::{
    BufferDescriptor, BufferHandle, BufferUsage, Command, CommandList, Device, FeatureLevel,
    GraphicsPipelineState, RenderPassInfo, ResourceId, RhiError, ShaderDescriptor, ShaderHandle,
    ShaderStage, TextureDescriptor, TextureHandle, VertexLayoutDescriptor, VertexLayoutHandle,
    PIXEL_PARAMETER_BINDING, PIXEL_TEXTURE_GROUP, VERTEX_PARAMETER_BINDING,
};

#[derive(Debug, Default)]
struct WgpuResources {
    buffers: HashMap<ResourceId, wgpu::Buffer>,
    layouts: HashMap<ResourceId, VertexLayoutDescriptor>,
    textures: HashMap<ResourceId, (wgpu::Texture, TextureDescriptor)>,
    shaders: HashMap<ResourceId, (wgpu::ShaderModule, ShaderDescriptor)>,
    pipelines: HashMap<GraphicsPipelineState, wgpu::RenderPipeline>,
}

#[derive(Debug)]
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    feature_level: FeatureLevel,
    next_id: AtomicU64,
    parameter_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampling_pipeline_layout: wgpu::PipelineLayout,
    resources: Mutex<WgpuResources>,
}

impl WgpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, feature_level: FeatureLevel) -> Self {
        let uniform_entry = |binding: u32, visibility: wgpu::ShaderStages| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let parameter_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("overpass_parameter_layout"),
            entries: &[
                uniform_entry(VERTEX_PARAMETER_BINDING, wgpu::ShaderStages::VERTEX),
                uniform_entry(PIXEL_PARAMETER_BINDING, wgpu::ShaderStages::FRAGMENT),
            ],
        });
        // Read with textureLoad, so no sampler and any float format works.
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("overpass_texture_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("overpass_pipeline_layout"),
            bind_group_layouts: &[&parameter_layout],
            push_constant_ranges: &[],
        });
        let sampling_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("overpass_sampling_pipeline_layout"),
            bind_group_layouts: &[&parameter_layout, &texture_layout],
            push_constant_ranges: &[],
        });
        Self {
            device,
            queue,
            feature_level,
            next_id: AtomicU64::new(1),
            parameter_layout,
            texture_layout,
            pipeline_layout,
            sampling_pipeline_layout,
            resources: Mutex::new(WgpuResources::default()),
        }
    }

    /// Request an adapter and device without a surface (offscreen rendering only).
    pub async fn request_headless() -> Result<Self, RhiError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok_or_else(|| RhiError::Backend("no adapter".to_string()))?;
        let feature_level = if adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
        {
            FeatureLevel::Sm5
        } else {
            FeatureLevel::Es31
        };
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .map_err(|e| RhiError::Backend(e.to_string()))?;
        log::info!("wgpu device ready: {} ({feature_level:?})", adapter.get_info().name);
        Ok(Self::new(device, queue, feature_level))
    }

    pub fn wgpu_device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn wgpu_queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Register a texture created by the host (e.g. a swapchain-sized color buffer).
    pub fn import_texture(&self, texture: wgpu::Texture, desc: TextureDescriptor) -> TextureHandle {
        let id = self.allocate_id();
        self.resources().textures.insert(id, (texture, desc));
        TextureHandle(id)
    }

    /// Run `f` against the wgpu texture behind `handle`, e.g. to read it back.
    pub fn with_texture<R>(&self, handle: TextureHandle, f: impl FnOnce(&wgpu::Texture) -> R) -> Option<R> {
        self.resources().textures.get(&handle.id()).map(|(texture, _)| f(texture))
    }

    fn resources(&self) -> MutexGuard<'_, WgpuResources> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate_id(&self) -> ResourceId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn ensure_pipeline(&self, res: &mut WgpuResources, state: &GraphicsPipelineState) -> Result<(), RhiError> {
        if res.pipelines.contains_key(state) {
            return Ok(());
        }
        let (vs_module, vs_desc) = res
            .shaders
            .get(&state.vertex_shader.id())
            .ok_or(RhiError::UnknownResource(state.vertex_shader.id()))?;
        let (ps_module, ps_desc) = res
            .shaders
            .get(&state.pixel_shader.id())
            .ok_or(RhiError::UnknownResource(state.pixel_shader.id()))?;
        let layout = match state.vertex_layout {
            Some(handle) => Some(res.layouts.get(&handle.id()).ok_or(RhiError::UnknownResource(handle.id()))?),
            None => None,
        };
        let attributes: Vec<wgpu::VertexAttribute> = layout
            .map(|l| {
                l.attributes
                    .iter()
                    .map(|a| wgpu::VertexAttribute {
                        format: conversions::vertex_format(a.format),
                        offset: a.offset as u64,
                        shader_location: a.location,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let buffer_layouts: Vec<wgpu::VertexBufferLayout> = layout
            .map(|l| wgpu::VertexBufferLayout {
                array_stride: l.stride as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            })
            .into_iter()
            .collect();
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(ps_desc.label),
            layout: Some(if state.samples_texture { &self.sampling_pipeline_layout } else { &self.pipeline_layout }),
            vertex: wgpu::VertexState {
                module: vs_module,
                entry_point: Some(vs_desc.entry_point),
                buffers: &buffer_layouts,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: ps_module,
                entry_point: Some(ps_desc.entry_point),
                targets: &[Some(wgpu::ColorTargetState {
                    format: conversions::texture_format(state.color_format),
                    blend: conversions::blend(state.blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: conversions::topology(state.primitive),
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        log::debug!("created pipeline '{}' + '{}'", vs_desc.label, ps_desc.label);
        res.pipelines.insert(*state, pipeline);
        Ok(())
    }

    fn parameter_bind_group(&self, vertex: &[u8], pixel: &[u8]) -> wgpu::BindGroup {
        let vertex_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("overpass_vertex_parameters"),
            contents: &padded(vertex),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let pixel_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("overpass_pixel_parameters"),
            contents: &padded(pixel),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("overpass_parameters"),
            layout: &self.parameter_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: VERTEX_PARAMETER_BINDING, resource: vertex_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: PIXEL_PARAMETER_BINDING, resource: pixel_buf.as_entire_binding() },
            ],
        })
    }

    fn texture_bind_group(&self, texture: &wgpu::Texture) -> wgpu::BindGroup {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("overpass_pixel_texture"),
            layout: &self.texture_layout,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&view) }],
        })
    }

    fn encode_render_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        res: &WgpuResources,
        info: &RenderPassInfo,
        commands: &[Command],
    ) -> Result<(), RhiError> {
        let (texture, _) = res
            .textures
            .get(&info.color_target.id())
            .ok_or(RhiError::UnknownResource(info.color_target.id()))?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(info.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: conversions::load_op(info.load),
                    store: conversions::store_op(info.store),
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        let mut vertex_params: Vec<u8> = Vec::new();
        let mut pixel_params: Vec<u8> = Vec::new();
        let mut topology = crate::PrimitiveTopology::TriangleList;
        for command in commands {
            match command {
                Command::SetViewport(vp) => {
                    rp.set_viewport(vp.x, vp.y, vp.width, vp.height, vp.min_depth, vp.max_depth);
                }
                Command::SetGraphicsPipelineState(state) => {
                    let pipeline = res.pipelines.get(state).ok_or_else(|| {
                        RhiError::Backend(format!("pipeline for pass '{}' was not prepared", info.label))
                    })?;
                    rp.set_pipeline(pipeline);
                    topology = state.primitive;
                }
                Command::SetShaderParameters { stage, data } => match stage {
                    ShaderStage::Vertex => vertex_params = data.clone(),
                    ShaderStage::Pixel => pixel_params = data.clone(),
                },
                Command::SetPixelTexture(handle) => {
                    let (texture, _) =
                        res.textures.get(&handle.id()).ok_or(RhiError::UnknownResource(handle.id()))?;
                    rp.set_bind_group(PIXEL_TEXTURE_GROUP, &self.texture_bind_group(texture), &[]);
                }
                Command::SetStreamSource { slot, buffer, offset } => {
                    let buf = res.buffers.get(&buffer.id()).ok_or(RhiError::UnknownResource(buffer.id()))?;
                    rp.set_vertex_buffer(*slot, buf.slice(*offset..));
                }
                Command::DrawPrimitive { base_vertex, num_primitives, num_instances } => {
                    let bind_group = self.parameter_bind_group(&vertex_params, &pixel_params);
                    rp.set_bind_group(0, &bind_group, &[]);
                    let count = vertex_count(topology, *num_primitives);
                    rp.draw(*base_vertex..*base_vertex + count, 0..*num_instances);
                }
                Command::DrawIndexedPrimitive {
                    index_buffer,
                    base_vertex_index,
                    first_index,
                    num_primitives,
                    num_instances,
                } => {
                    let ib = res
                        .buffers
                        .get(&index_buffer.id())
                        .ok_or(RhiError::UnknownResource(index_buffer.id()))?;
                    let bind_group = self.parameter_bind_group(&vertex_params, &pixel_params);
                    rp.set_bind_group(0, &bind_group, &[]);
                    rp.set_index_buffer(ib.slice(..), wgpu::IndexFormat::Uint32);
                    let count = vertex_count(topology, *num_primitives);
                    rp.draw_indexed(*first_index..*first_index + count, *base_vertex_index, 0..*num_instances);
                }
                Command::Transition { .. }
                | Command::CopyTexture { .. }
                | Command::BeginRenderPass(_)
                | Command::EndRenderPass => {}
            }
        }
        drop(rp);
        Ok(())
    }
}

/// Uniform bindings must be non-empty and 16-byte sized.
fn padded(data: &[u8]) -> Vec<u8> {
    let len = data.len().max(16).next_multiple_of(16);
    let mut out = data.to_vec();
    out.resize(len, 0);
    out
}

impl Device for WgpuDevice {
    fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }

    fn create_buffer(&self, desc: &BufferDescriptor, contents: &[u8]) -> Result<BufferHandle, RhiError> {
        let mut usage = wgpu::BufferUsages::empty();
        if desc.usage.contains(BufferUsage::VERTEX) {
            usage |= wgpu::BufferUsages::VERTEX;
        }
        if desc.usage.contains(BufferUsage::INDEX) {
            usage |= wgpu::BufferUsages::INDEX;
        }
        if desc.usage.contains(BufferUsage::UNIFORM) {
            usage |= wgpu::BufferUsages::UNIFORM;
        }
        if desc.usage.contains(BufferUsage::COPY_DST) {
            usage |= wgpu::BufferUsages::COPY_DST;
        }
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(desc.label),
            contents,
            usage,
        });
        let id = self.allocate_id();
        self.resources().buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn create_vertex_layout(&self, desc: &VertexLayoutDescriptor) -> Result<VertexLayoutHandle, RhiError> {
        let id = self.allocate_id();
        self.resources().layouts.insert(id, desc.clone());
        Ok(VertexLayoutHandle(id))
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> Result<TextureHandle, RhiError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::ResourceCreation {
                label: desc.label,
                reason: "width and height must be > 0".to_string(),
            });
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d { width: desc.width, height: desc.height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: conversions::texture_format(desc.format),
            usage: conversions::texture_usage(desc.usage),
            view_formats: &[],
        });
        Ok(self.import_texture(texture, desc.clone()))
    }

    fn create_shader(&self, desc: &ShaderDescriptor) -> Result<ShaderHandle, RhiError> {
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.into()),
        });
        let id = self.allocate_id();
        self.resources().shaders.insert(id, (module, desc.clone()));
        Ok(ShaderHandle(id))
    }

    fn texture_descriptor(&self, texture: TextureHandle) -> Option<TextureDescriptor> {
        self.resources().textures.get(&texture.id()).map(|(_, desc)| desc.clone())
    }

    fn release_buffer(&self, buffer: BufferHandle) {
        self.resources().buffers.remove(&buffer.id());
    }

    fn release_vertex_layout(&self, layout: VertexLayoutHandle) {
        let mut res = self.resources();
        res.layouts.remove(&layout.id());
        res.pipelines.retain(|state, _| state.vertex_layout != Some(layout));
    }

    fn release_texture(&self, texture: TextureHandle) {
        self.resources().textures.remove(&texture.id());
    }

    fn release_shader(&self, shader: ShaderHandle) {
        let mut res = self.resources();
        res.shaders.remove(&shader.id());
        res.pipelines
            .retain(|state, _| state.vertex_shader != shader && state.pixel_shader != shader);
    }

    fn submit(&self, commands: CommandList) -> Result<(), RhiError> {
        commands.validate()?;
        let mut res = self.resources();
        for command in commands.commands() {
            if let Command::SetGraphicsPipelineState(state) = command {
                self.ensure_pipeline(&mut res, state)?;
            }
        }
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(commands.label()),
        });
        let list = commands.commands();
        let mut index = 0;
        while index < list.len() {
            match &list[index] {
                // wgpu tracks texture usage itself; transitions only document intent here.
                Command::Transition { texture, from, to } => {
                    log::trace!("transition texture {} {from:?} -> {to:?}", texture.id());
                }
                Command::CopyTexture { src, dst } => {
                    let (src_tex, src_desc) =
                        res.textures.get(&src.id()).ok_or(RhiError::UnknownResource(src.id()))?;
                    let (dst_tex, _) = res.textures.get(&dst.id()).ok_or(RhiError::UnknownResource(dst.id()))?;
                    encoder.copy_texture_to_texture(
                        src_tex.as_image_copy(),
                        dst_tex.as_image_copy(),
                        wgpu::Extent3d { width: src_desc.width, height: src_desc.height, depth_or_array_layers: 1 },
                    );
                }
                Command::BeginRenderPass(info) => {
                    let end = list[index..]
                        .iter()
                        .position(|c| matches!(c, Command::EndRenderPass))
                        .map(|offset| index + offset)
                        .ok_or_else(|| RhiError::InvalidCommandList {
                            label: commands.label(),
                            reason: "render pass not ended".to_string(),
                        })?;
                    self.encode_render_pass(&mut encoder, &res, info, &list[index + 1..end])?;
                    index = end;
                }
                _ => {}
            }
            index += 1;
        }
        drop(res);
        self.queue.submit([encoder.finish()]);
        Ok(())
    }
}
