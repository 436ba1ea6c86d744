//! Full-screen draw into a render target, executed on the render thread.

use overpass_rhi::{
    BlendMode, GraphicsPipelineState, LoadOp, PrimitiveTopology, RenderPassInfo, ResourceAccess, ShaderStage, StoreOp,
};
use render_api::{RenderTargetResource, RhiCommandListImmediate};

use crate::context::GraphicsContext;
use crate::params::{self, CompiledDrawParameters};
use crate::shaders::ShaderKind;

#[derive(Debug, thiserror::Error)]
pub enum DrawError {
    #[error("{0:?} is not available at this feature level")]
    ShaderUnavailable(ShaderKind),
}

/// Replace the target's contents with the full-screen shader. The target rests in
/// shader-read access before and after. Shaders are looked up for the feature level the
/// request was made at.
pub fn draw_to_render_target_render_thread(
    rhi_cmd_list: &mut RhiCommandListImmediate,
    context: &GraphicsContext,
    compiled: &CompiledDrawParameters,
    target: &RenderTargetResource,
    system_time: f32,
) -> Result<(), DrawError> {
    let level = compiled.feature_level();
    let vertex_shader = context
        .shader_for_level(ShaderKind::FullScreenVs, level)
        .ok_or(DrawError::ShaderUnavailable(ShaderKind::FullScreenVs))?;
    let pixel_shader = context
        .shader_for_level(ShaderKind::FullScreenPs, level)
        .ok_or(DrawError::ShaderUnavailable(ShaderKind::FullScreenPs))?;

    let texture = target.render_target_texture();
    let resolution = (target.size_x(), target.size_y());
    let block = params::full_screen_params(compiled, resolution, system_time);

    rhi_cmd_list.transition(texture, ResourceAccess::ShaderRead, ResourceAccess::RenderTarget);
    rhi_cmd_list.begin_render_pass(RenderPassInfo {
        label: "Draw",
        color_target: texture,
        load: LoadOp::DontCare,
        store: StoreOp::Store,
    });
    rhi_cmd_list.set_viewport(0.0, 0.0, 0.0, resolution.0 as f32, resolution.1 as f32, 1.0);
    rhi_cmd_list.set_graphics_pipeline_state(GraphicsPipelineState {
        vertex_layout: None,
        vertex_shader,
        pixel_shader,
        primitive: PrimitiveTopology::TriangleList,
        blend: BlendMode::Opaque,
        color_format: target.format(),
        samples_texture: false,
    });
    rhi_cmd_list.set_shader_parameters(ShaderStage::Vertex, bytemuck::bytes_of(&block));
    rhi_cmd_list.set_shader_parameters(ShaderStage::Pixel, bytemuck::bytes_of(&block));
    rhi_cmd_list.draw_primitive(0, 2, 1);
    rhi_cmd_list.end_render_pass();
    rhi_cmd_list.transition(texture, ResourceAccess::RenderTarget, ResourceAccess::ShaderRead);
    Ok(())
}
