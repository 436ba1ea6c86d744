//! Overlay pass: draws the fixed geometry over scene color after the configured post-process slot.
//!
//! The pass never writes into the texture it reads. Output goes to the host's override target
//! when one is supplied (terminal pass), otherwise to a new target shaped like the input. Scene
//! color is copied into the output first so the draw can load over it. When the output differs
//! in size or format, or scene color is not a copy source, it is drawn in with a textured pass.

use std::sync::Arc;

use overpass_rhi::{
    BlendMode, GraphicsPipelineState, LoadOp, PrimitiveTopology, RenderPassInfo, ResourceAccess, ShaderHandle,
    ShaderStage, StoreOp, TextureDescriptor, TextureUsage,
};
use render_api::math::{self, Mat4};
use render_api::{
    GameClock, GraphError, PassKind, PostProcessMaterialInputs, PostProcessingPass, RenderGraph, ScreenPassRenderTarget,
    ScreenPassTexture, SceneView,
};

use crate::config::TransformPolicy;
use crate::context::GraphicsContext;
use crate::geometry::{GeometryKind, CUBE_CENTER};
use crate::params::{self, OverlayPsParams, OverlayVsParams};
use crate::shaders::ShaderKind;

pub const OVERRIDE_OUTPUT_NAME: &str = "OverrideSceneColorTexture";

/// Why a frame's overlay was not drawn. Skips are not errors; the input passes through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Scene color cannot be both sampled and rendered to.
    IncapableColorBuffer,
    /// The host's override target cannot be drawn to.
    IncapableOverride,
    ShaderUnavailable(ShaderKind),
    GeometryUnavailable(GeometryKind),
}

/// The injected post-process callback. [`OverlayPass::render`] records its passes into the
/// frame's graph and returns the texture later passes should read.
pub struct OverlayPass {
    context: Arc<GraphicsContext>,
    clock: Arc<dyn GameClock>,
}

impl OverlayPass {
    pub fn new(context: Arc<GraphicsContext>, clock: Arc<dyn GameClock>) -> Self {
        Self { context, clock }
    }

    pub fn context(&self) -> &Arc<GraphicsContext> {
        &self.context
    }

    pub fn target_pass(&self) -> PostProcessingPass {
        self.context.config().target_pass
    }

    /// Subscribe only to the configured slot, and only while it is enabled.
    pub fn wants_pass(&self, pass: PostProcessingPass, is_pass_enabled: bool) -> bool {
        is_pass_enabled && pass == self.target_pass()
    }

    fn vertex_shader_kind(&self) -> ShaderKind {
        match self.context.config().geometry {
            GeometryKind::Triangle => ShaderKind::OverlayTriangleVs,
            GeometryKind::Cube => ShaderKind::OverlayCubeVs,
        }
    }

    /// Transform applied to the overlay's vertices for this view.
    pub fn resolve_transform(&self, view: &SceneView) -> Mat4 {
        match self.context.config().transform {
            TransformPolicy::ClipSpace => math::IDENTITY,
            TransformPolicy::WorldToClip => view.view_matrices.view_projection_matrix(),
        }
    }

    fn log_matrices(&self, view: &SceneView, world_to_clip: &Mat4) {
        let [x, y, z] = CUBE_CENTER;
        let center = [x, y, z, 1.0];
        let in_view = math::transform_vec4(view.view_matrices.view_matrix(), center);
        let clip = math::transform_vec4(world_to_clip, center);
        log::debug!("view to projection: {:?}", view.view_matrices.projection_matrix());
        log::debug!("world to view: {:?}", view.view_matrices.view_matrix());
        log::debug!("cube center view {in_view:?} clip {clip:?}");
        if clip[3] != 0.0 {
            log::debug!("cube center ndc {:?}", [clip[0] / clip[3], clip[1] / clip[3], clip[2] / clip[3]]);
        }
    }

    /// Post-process callback body. Returns the texture downstream passes should read.
    pub fn render(
        &self,
        graph: &mut RenderGraph,
        view: &SceneView,
        inputs: &PostProcessMaterialInputs,
    ) -> ScreenPassTexture {
        let scene_color = inputs.scene_color;
        match self.try_render(graph, view, inputs) {
            Ok(Ok(output)) => output,
            Ok(Err(reason)) => {
                log::trace!("overlay skipped: {reason:?}");
                scene_color
            }
            Err(err) => {
                log::warn!("overlay pass not recorded: {err}");
                scene_color
            }
        }
    }

    /// How the output receives scene color before the overlay loads it.
    fn populate_method(
        &self,
        view: &SceneView,
        scene: &TextureDescriptor,
        output: Option<&TextureDescriptor>,
    ) -> Result<Populate, SkipReason> {
        let copyable = scene.usage.contains(TextureUsage::COPY_SRC)
            && output.map_or(true, |o| {
                o.usage.contains(TextureUsage::COPY_DST)
                    && (o.width, o.height, o.format) == (scene.width, scene.height, scene.format)
            });
        if copyable {
            return Ok(Populate::Copy);
        }
        let level = view.feature_level;
        let vertex_shader = self
            .context
            .shader_for_level(ShaderKind::CopyVs, level)
            .ok_or(SkipReason::ShaderUnavailable(ShaderKind::CopyVs))?;
        let pixel_shader = self
            .context
            .shader_for_level(ShaderKind::CopyPs, level)
            .ok_or(SkipReason::ShaderUnavailable(ShaderKind::CopyPs))?;
        Ok(Populate::Draw { vertex_shader, pixel_shader })
    }

    fn try_render(
        &self,
        graph: &mut RenderGraph,
        view: &SceneView,
        inputs: &PostProcessMaterialInputs,
    ) -> Result<Result<ScreenPassTexture, SkipReason>, GraphError> {
        let scene_color = inputs.scene_color;
        let scene_desc = graph
            .texture_desc(scene_color.texture)
            .ok_or(GraphError::UnknownTexture(scene_color.texture))?
            .clone();
        if !scene_desc.usage.supports_read_write_pass() {
            return Ok(Err(SkipReason::IncapableColorBuffer));
        }
        let override_desc = match inputs.override_output {
            Some(o) if o.texture != scene_color.texture => {
                let desc = graph.texture_desc(o.texture).ok_or(GraphError::UnknownTexture(o.texture))?.clone();
                if !desc.usage.intersects(TextureUsage::RENDER_TARGETABLE | TextureUsage::RESOLVE_TARGETABLE) {
                    return Ok(Err(SkipReason::IncapableOverride));
                }
                Some(desc)
            }
            _ => None,
        };
        let redirect = inputs.override_output.map_or(true, |o| o.texture != scene_color.texture);
        let populate = if redirect {
            match self.populate_method(view, &scene_desc, override_desc.as_ref()) {
                Ok(populate) => populate,
                Err(reason) => return Ok(Err(reason)),
            }
        } else {
            Populate::InPlace
        };

        let level = view.feature_level;
        let vs_kind = self.vertex_shader_kind();
        let Some(vertex_shader) = self.context.shader_for_level(vs_kind, level) else {
            return Ok(Err(SkipReason::ShaderUnavailable(vs_kind)));
        };
        let Some(pixel_shader) = self.context.shader_for_level(ShaderKind::OverlayPs, level) else {
            return Ok(Err(SkipReason::ShaderUnavailable(ShaderKind::OverlayPs)));
        };
        let kind = self.context.config().geometry;
        let Some(geometry) = self.context.geometry(kind) else {
            return Ok(Err(SkipReason::GeometryUnavailable(kind)));
        };

        let output = match inputs.override_output {
            Some(output) => output,
            None => ScreenPassRenderTarget::create_from_input(
                graph,
                &scene_color,
                view.overwrite_load_action(),
                OVERRIDE_OUTPUT_NAME,
            )?,
        };
        let output_desc = graph
            .texture_desc(output.texture)
            .ok_or(GraphError::UnknownTexture(output.texture))?
            .clone();
        match populate {
            Populate::InPlace => {}
            Populate::Copy => {
                graph.add_copy_pass("OverlayCopySceneColor", scene_color.texture, output.texture)?;
            }
            Populate::Draw { vertex_shader, pixel_shader } => {
                add_scene_color_draw(graph, scene_color, &output, &output_desc, vertex_shader, pixel_shader)?;
            }
        }

        let world_to_clip = self.resolve_transform(view);
        if self.context.config().log_pass_matrices {
            self.log_matrices(view, &world_to_clip);
        }
        let vs_params: OverlayVsParams = params::overlay_vertex_params(&world_to_clip);
        let ps_params: OverlayPsParams =
            params::overlay_pixel_params(self.clock.game_time(), self.context.config().time_multipliers);

        let pipeline = GraphicsPipelineState {
            vertex_layout: Some(geometry.vertex_layout),
            vertex_shader,
            pixel_shader,
            primitive: geometry.primitive,
            blend: BlendMode::Opaque,
            color_format: output_desc.format,
            samples_texture: false,
        };
        let rect = output.view_rect;
        let target = output.texture;
        graph.add_pass(
            "OverlayPass",
            PassKind::Raster,
            vec![(target, ResourceAccess::RenderTarget)],
            move |commands, resources| {
                commands.begin_render_pass(RenderPassInfo {
                    label: "OverlayPass",
                    color_target: resources.texture(target)?,
                    load: LoadOp::Load,
                    store: StoreOp::Store,
                });
                commands.set_viewport(
                    rect.min.0 as f32,
                    rect.min.1 as f32,
                    0.0,
                    rect.max.0 as f32,
                    rect.max.1 as f32,
                    1.0,
                );
                commands.set_graphics_pipeline_state(pipeline);
                commands.set_shader_parameters(ShaderStage::Pixel, bytemuck::bytes_of(&ps_params));
                commands.set_shader_parameters(ShaderStage::Vertex, bytemuck::bytes_of(&vs_params));
                commands.set_stream_source(0, geometry.vertex_buffer, 0);
                commands.draw_indexed_primitive(geometry.index_buffer, 0, 0, geometry.num_primitives, 1);
                commands.end_render_pass();
                Ok(())
            },
        )?;
        Ok(Ok(output.as_screen_pass_texture()))
    }
}

enum Populate {
    /// Output is the scene color texture itself.
    InPlace,
    Copy,
    /// Different size or format, or not copyable: draw scene color into the output.
    Draw { vertex_shader: ShaderHandle, pixel_shader: ShaderHandle },
}

/// Fill all of `output` from `scene_color`, whatever its size or format. Uses the output's
/// load action since the whole target is overwritten.
fn add_scene_color_draw(
    graph: &mut RenderGraph,
    scene_color: ScreenPassTexture,
    output: &ScreenPassRenderTarget,
    output_desc: &TextureDescriptor,
    vertex_shader: ShaderHandle,
    pixel_shader: ShaderHandle,
) -> Result<(), GraphError> {
    let source = scene_color.texture;
    let target = output.texture;
    let load = output.load_action;
    let (width, height) = (output_desc.width as f32, output_desc.height as f32);
    let pipeline = GraphicsPipelineState {
        vertex_layout: None,
        vertex_shader,
        pixel_shader,
        primitive: PrimitiveTopology::TriangleList,
        blend: BlendMode::Opaque,
        color_format: output_desc.format,
        samples_texture: true,
    };
    graph.add_pass(
        "OverlayDrawSceneColor",
        PassKind::Raster,
        vec![(source, ResourceAccess::ShaderRead), (target, ResourceAccess::RenderTarget)],
        move |commands, resources| {
            commands.begin_render_pass(RenderPassInfo {
                label: "OverlayDrawSceneColor",
                color_target: resources.texture(target)?,
                load,
                store: StoreOp::Store,
            });
            commands.set_viewport(0.0, 0.0, 0.0, width, height, 1.0);
            commands.set_graphics_pipeline_state(pipeline);
            commands.set_pixel_texture(resources.texture(source)?);
            commands.draw_primitive(0, 2, 1);
            commands.end_render_pass();
            Ok(())
        },
    )?;
    Ok(())
}
