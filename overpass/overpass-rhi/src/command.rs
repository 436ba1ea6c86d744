//! Recorded command lists. Nothing touches the GPU until a list is submitted to a [`Device`](crate::Device).

use crate::{
    BufferHandle, GraphicsPipelineState, LoadOp, PrimitiveTopology, ResourceAccess, RhiError,
    ShaderStage, StoreOp, TextureHandle,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassInfo {
    pub label: &'static str,
    pub color_target: TextureHandle,
    pub load: LoadOp,
    pub store: StoreOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Transition {
        texture: TextureHandle,
        from: ResourceAccess,
        to: ResourceAccess,
    },
    CopyTexture {
        src: TextureHandle,
        dst: TextureHandle,
    },
    BeginRenderPass(RenderPassInfo),
    SetViewport(Viewport),
    SetGraphicsPipelineState(GraphicsPipelineState),
    /// Raw parameter block bytes for one stage; layout must match the shader's uniform struct.
    SetShaderParameters {
        stage: ShaderStage,
        data: Vec<u8>,
    },
    /// Source texture for pipelines with `samples_texture`. Must be in shader-read access.
    SetPixelTexture(TextureHandle),
    SetStreamSource {
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
    },
    DrawPrimitive {
        base_vertex: u32,
        num_primitives: u32,
        num_instances: u32,
    },
    DrawIndexedPrimitive {
        index_buffer: BufferHandle,
        base_vertex_index: i32,
        first_index: u32,
        num_primitives: u32,
        num_instances: u32,
    },
    EndRenderPass,
}

impl Command {
    pub fn is_draw(&self) -> bool {
        matches!(self, Command::DrawPrimitive { .. } | Command::DrawIndexedPrimitive { .. })
    }
}

/// Number of vertices (or indices) consumed by `num_primitives` primitives.
pub fn vertex_count(topology: PrimitiveTopology, num_primitives: u32) -> u32 {
    match topology {
        PrimitiveTopology::TriangleList => num_primitives * 3,
        PrimitiveTopology::TriangleStrip if num_primitives == 0 => 0,
        PrimitiveTopology::TriangleStrip => num_primitives + 2,
    }
}

/// Ordered list of commands, cheap to build on any thread and moved to the device on submit.
#[derive(Debug, Clone, Default)]
pub struct CommandList {
    label: &'static str,
    commands: Vec<Command>,
}

impl CommandList {
    pub fn new(label: &'static str) -> Self {
        Self { label, commands: Vec::new() }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn draw_count(&self) -> usize {
        self.commands.iter().filter(|c| c.is_draw()).count()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn append(&mut self, other: CommandList) {
        self.commands.extend(other.commands);
    }

    pub fn transition(&mut self, texture: TextureHandle, from: ResourceAccess, to: ResourceAccess) {
        self.push(Command::Transition { texture, from, to });
    }

    pub fn copy_texture(&mut self, src: TextureHandle, dst: TextureHandle) {
        self.push(Command::CopyTexture { src, dst });
    }

    pub fn begin_render_pass(&mut self, info: RenderPassInfo) {
        self.push(Command::BeginRenderPass(info));
    }

    pub fn set_viewport(&mut self, x: f32, y: f32, min_depth: f32, max_x: f32, max_y: f32, max_depth: f32) {
        self.push(Command::SetViewport(Viewport {
            x,
            y,
            width: max_x - x,
            height: max_y - y,
            min_depth,
            max_depth,
        }));
    }

    pub fn set_graphics_pipeline_state(&mut self, state: GraphicsPipelineState) {
        self.push(Command::SetGraphicsPipelineState(state));
    }

    pub fn set_shader_parameters(&mut self, stage: ShaderStage, data: &[u8]) {
        self.push(Command::SetShaderParameters { stage, data: data.to_vec() });
    }

    pub fn set_pixel_texture(&mut self, texture: TextureHandle) {
        self.push(Command::SetPixelTexture(texture));
    }

    pub fn set_stream_source(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        self.push(Command::SetStreamSource { slot, buffer, offset });
    }

    pub fn draw_primitive(&mut self, base_vertex: u32, num_primitives: u32, num_instances: u32) {
        self.push(Command::DrawPrimitive { base_vertex, num_primitives, num_instances });
    }

    pub fn draw_indexed_primitive(
        &mut self,
        index_buffer: BufferHandle,
        base_vertex_index: i32,
        first_index: u32,
        num_primitives: u32,
        num_instances: u32,
    ) {
        self.push(Command::DrawIndexedPrimitive {
            index_buffer,
            base_vertex_index,
            first_index,
            num_primitives,
            num_instances,
        });
    }

    pub fn end_render_pass(&mut self) {
        self.push(Command::EndRenderPass);
    }

    /// Structural validation shared by all backends: passes are balanced and not nested,
    /// draw state is only set inside a pass, every draw has a pipeline and the streams it needs.
    /// A sampled texture is never the pass's own target.
    pub fn validate(&self) -> Result<(), RhiError> {
        let fail = |reason: String| RhiError::InvalidCommandList { label: self.label, reason };
        let mut in_pass = false;
        let mut pipeline: Option<GraphicsPipelineState> = None;
        let mut has_stream = false;
        let mut target: Option<TextureHandle> = None;
        let mut pixel_texture: Option<TextureHandle> = None;
        for (index, command) in self.commands.iter().enumerate() {
            match command {
                Command::BeginRenderPass(info) => {
                    if in_pass {
                        return Err(fail(format!("#{index}: render pass '{}' begun inside another pass", info.label)));
                    }
                    if !info.color_target.is_valid() {
                        return Err(fail(format!("#{index}: render pass '{}' has an invalid target", info.label)));
                    }
                    in_pass = true;
                    pipeline = None;
                    has_stream = false;
                    target = Some(info.color_target);
                    pixel_texture = None;
                }
                Command::EndRenderPass => {
                    if !in_pass {
                        return Err(fail(format!("#{index}: end without begin")));
                    }
                    in_pass = false;
                }
                Command::Transition { .. } | Command::CopyTexture { .. } => {
                    if in_pass {
                        return Err(fail(format!("#{index}: {command:?} inside a render pass")));
                    }
                }
                Command::SetGraphicsPipelineState(state) => {
                    if !in_pass {
                        return Err(fail(format!("#{index}: pipeline state set outside a render pass")));
                    }
                    if !state.vertex_shader.is_valid() || !state.pixel_shader.is_valid() {
                        return Err(fail(format!("#{index}: pipeline state with invalid shader")));
                    }
                    pipeline = Some(*state);
                }
                Command::SetViewport(_) | Command::SetShaderParameters { .. } => {
                    if !in_pass {
                        return Err(fail(format!("#{index}: {command:?} outside a render pass")));
                    }
                }
                Command::SetPixelTexture(texture) => {
                    if !in_pass || !texture.is_valid() {
                        return Err(fail(format!("#{index}: invalid pixel texture")));
                    }
                    if target == Some(*texture) {
                        return Err(fail(format!("#{index}: texture {} sampled by the pass writing it", texture.id())));
                    }
                    pixel_texture = Some(*texture);
                }
                Command::SetStreamSource { buffer, .. } => {
                    if !in_pass || !buffer.is_valid() {
                        return Err(fail(format!("#{index}: invalid stream source")));
                    }
                    has_stream = true;
                }
                Command::DrawPrimitive { .. } | Command::DrawIndexedPrimitive { .. } => {
                    if !in_pass {
                        return Err(fail(format!("#{index}: draw outside a render pass")));
                    }
                    let Some(state) = pipeline else {
                        return Err(fail(format!("#{index}: draw without pipeline state")));
                    };
                    if state.vertex_layout.is_some() && !has_stream {
                        return Err(fail(format!("#{index}: draw without a stream source for the vertex layout")));
                    }
                    if state.samples_texture && pixel_texture.is_none() {
                        return Err(fail(format!("#{index}: draw without the texture its pipeline samples")));
                    }
                    if let Command::DrawIndexedPrimitive { index_buffer, .. } = command {
                        if !index_buffer.is_valid() {
                            return Err(fail(format!("#{index}: invalid index buffer")));
                        }
                    }
                }
            }
        }
        if in_pass {
            return Err(fail("render pass not ended".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlendMode, ShaderHandle, TextureFormat};

    fn state() -> GraphicsPipelineState {
        GraphicsPipelineState {
            vertex_layout: None,
            vertex_shader: ShaderHandle(1),
            pixel_shader: ShaderHandle(2),
            primitive: PrimitiveTopology::TriangleList,
            blend: BlendMode::Opaque,
            color_format: TextureFormat::Rgba8Unorm,
            samples_texture: false,
        }
    }

    fn pass(target: u64) -> RenderPassInfo {
        RenderPassInfo {
            label: "test",
            color_target: TextureHandle(target),
            load: LoadOp::Load,
            store: StoreOp::Store,
        }
    }

    #[test]
    fn balanced_pass_validates() {
        let mut list = CommandList::new("ok");
        list.transition(TextureHandle(3), ResourceAccess::ShaderRead, ResourceAccess::RenderTarget);
        list.begin_render_pass(pass(3));
        list.set_graphics_pipeline_state(state());
        list.draw_primitive(0, 2, 1);
        list.end_render_pass();
        list.validate().expect("valid list");
        assert_eq!(list.draw_count(), 1);
    }

    #[test]
    fn draw_outside_pass_is_rejected() {
        let mut list = CommandList::new("bad");
        list.draw_primitive(0, 1, 1);
        assert!(list.validate().is_err());
    }

    #[test]
    fn unterminated_pass_is_rejected() {
        let mut list = CommandList::new("bad");
        list.begin_render_pass(pass(3));
        assert!(list.validate().is_err());
    }

    #[test]
    fn transition_inside_pass_is_rejected() {
        let mut list = CommandList::new("bad");
        list.begin_render_pass(pass(3));
        list.transition(TextureHandle(3), ResourceAccess::RenderTarget, ResourceAccess::ShaderRead);
        list.end_render_pass();
        assert!(list.validate().is_err());
    }

    #[test]
    fn indexed_draw_needs_stream_for_layout() {
        let mut list = CommandList::new("bad");
        list.begin_render_pass(pass(3));
        list.set_graphics_pipeline_state(GraphicsPipelineState {
            vertex_layout: Some(crate::VertexLayoutHandle(9)),
            ..state()
        });
        list.draw_indexed_primitive(BufferHandle(4), 0, 0, 12, 1);
        list.end_render_pass();
        assert!(list.validate().is_err());
    }

    #[test]
    fn sampling_pipeline_needs_a_texture_other_than_the_target() {
        let sampling = GraphicsPipelineState { samples_texture: true, ..state() };

        let mut missing = CommandList::new("missing");
        missing.begin_render_pass(pass(3));
        missing.set_graphics_pipeline_state(sampling);
        missing.draw_primitive(0, 2, 1);
        missing.end_render_pass();
        assert!(missing.validate().is_err());

        let mut feedback = CommandList::new("feedback");
        feedback.begin_render_pass(pass(3));
        feedback.set_graphics_pipeline_state(sampling);
        feedback.set_pixel_texture(TextureHandle(3));
        feedback.draw_primitive(0, 2, 1);
        feedback.end_render_pass();
        assert!(feedback.validate().is_err());

        let mut ok = CommandList::new("ok");
        ok.begin_render_pass(pass(3));
        ok.set_graphics_pipeline_state(sampling);
        ok.set_pixel_texture(TextureHandle(4));
        ok.draw_primitive(0, 2, 1);
        ok.end_render_pass();
        ok.validate().expect("valid list");
    }

    #[test]
    fn viewport_from_rect_corners() {
        let mut list = CommandList::new("vp");
        list.begin_render_pass(pass(3));
        list.set_viewport(10.0, 20.0, 0.0, 110.0, 70.0, 1.0);
        list.end_render_pass();
        match &list.commands()[1] {
            Command::SetViewport(vp) => {
                assert_eq!(vp.width, 100.0);
                assert_eq!(vp.height, 50.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn strip_and_list_vertex_counts() {
        assert_eq!(vertex_count(PrimitiveTopology::TriangleList, 12), 36);
        assert_eq!(vertex_count(PrimitiveTopology::TriangleStrip, 2), 4);
    }
}
