/// Render pass, descriptor layout and graphics pipeline creation

use ash::vk;
use ash::vk::Handle;
use vkfilter_engine::engine_err;
use vkfilter_engine::vkfilter::{GraphicsPipelineDesc, PushConstantRange, Result};

use crate::vulkan_device::SOURCE;
use crate::vulkan_format::shader_stages_to_vk;

/// Single color attachment: cleared on load, stored, handed to presentation
pub(crate) fn create_render_pass(device: &ash::Device, format: vk::Format) -> Result<vk::RenderPass> {
    let attachments = [vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)];

    // Layout transition waits for the acquire semaphore (signaled at COLOR_ATTACHMENT_OUTPUT)
    let dependencies = [vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        dependency_flags: vk::DependencyFlags::empty(),
    }];

    let info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    // SAFETY: info only borrows locals
    unsafe { device.create_render_pass(&info, None) }
        .map_err(|e| engine_err!(SOURCE, "Failed to create render pass: {:?}", e))
}

/// One combined image sampler at binding 0, visible to the fragment stage
pub(crate) fn create_descriptor_set_layout(device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
    let bindings = [vk::DescriptorSetLayoutBinding::default()
        .binding(0)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::FRAGMENT)];
    let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

    // SAFETY: info only borrows locals
    unsafe { device.create_descriptor_set_layout(&info, None) }
        .map_err(|e| engine_err!(SOURCE, "Failed to create descriptor set layout: {:?}", e))
}

pub(crate) fn create_pipeline_layout(
    device: &ash::Device,
    set_layout: vk::DescriptorSetLayout,
    push_constants: Option<PushConstantRange>,
) -> Result<vk::PipelineLayout> {
    let set_layouts = [set_layout];
    let ranges: Vec<vk::PushConstantRange> = push_constants
        .iter()
        .map(|range| vk::PushConstantRange {
            stage_flags: shader_stages_to_vk(range.stages),
            offset: 0,
            size: range.size,
        })
        .collect();
    let info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(&set_layouts)
        .push_constant_ranges(&ranges);

    // SAFETY: info only borrows locals
    unsafe { device.create_pipeline_layout(&info, None) }
        .map_err(|e| engine_err!(SOURCE, "Failed to create pipeline layout: {:?}", e))
}

/// Triangle-list pipeline without vertex input
///
/// Positions come from the vertex shader, viewport and scissor are dynamic so
/// the pipeline survives swapchain resizes.
pub(crate) fn create_graphics_pipeline(device: &ash::Device, desc: &GraphicsPipelineDesc) -> Result<vk::Pipeline> {
    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vk::ShaderModule::from_raw(desc.vertex_shader.raw()))
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(vk::ShaderModule::from_raw(desc.fragment_shader.raw()))
            .name(c"main"),
    ];

    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default();
    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Viewport state (dynamic)
    let viewports = [vk::Viewport::default()];
    let scissors = [vk::Rect2D::default()];
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewports(&viewports)
        .scissors(&scissors);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false);
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(std::slice::from_ref(&color_blend_attachment));

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(vk::PipelineLayout::from_raw(desc.layout.raw()))
        .render_pass(vk::RenderPass::from_raw(desc.render_pass.raw()))
        .subpass(0);

    // SAFETY: info only borrows locals, modules and layout are alive
    let pipelines = unsafe { device.create_graphics_pipelines(vk::PipelineCache::null(), &[info], None) }
        .map_err(|(_, e)| engine_err!(SOURCE, "Failed to create graphics pipeline: {:?}", e))?;

    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| engine_err!(SOURCE, "Graphics pipeline creation returned nothing"))
}
