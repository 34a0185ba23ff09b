/// ShaderFilter - a `Filter` driven entirely by a `FilterVariant`

use std::sync::Arc;

use crate::error::{Error, InitResource, Result};
use crate::filter::{DrawParams, Filter, FilterVariant, PushConstantLayout, ResolutionTimeConstants, TransformConstants};
use crate::graphics_device::{
    CommandBuffer, DescriptorPool, DescriptorSet, DescriptorSetLayout, Device, GraphicsDevice,
    GraphicsPipelineDesc, ImageView, Pipeline, PipelineLayout, RenderPass, Sampler, ShaderModule,
};
use crate::shader_source::{spirv_words, ShaderSource};
use crate::{engine_debug, engine_info, engine_trace};

const SOURCE: &str = "vkfilter::ShaderFilter";

/// Textured draw with one combined image sampler and optional push constants
pub struct ShaderFilter {
    variant: FilterVariant,
    shaders: Arc<dyn ShaderSource>,

    device: Device,
    vertex_module: ShaderModule,
    fragment_module: ShaderModule,
    set_layout: DescriptorSetLayout,
    pipeline_layout: PipelineLayout,
    pipeline: Pipeline,
    descriptor_pool: DescriptorPool,
    descriptor_set: DescriptorSet,
    sampler: Sampler,
    /// View the descriptor set currently points at
    bound_view: ImageView,
}

impl ShaderFilter {
    pub fn new(variant: FilterVariant, shaders: Arc<dyn ShaderSource>) -> Self {
        Self {
            variant,
            shaders,
            device: Device::NULL,
            vertex_module: ShaderModule::NULL,
            fragment_module: ShaderModule::NULL,
            set_layout: DescriptorSetLayout::NULL,
            pipeline_layout: PipelineLayout::NULL,
            pipeline: Pipeline::NULL,
            descriptor_pool: DescriptorPool::NULL,
            descriptor_set: DescriptorSet::NULL,
            sampler: Sampler::NULL,
            bound_view: ImageView::NULL,
        }
    }

    pub fn variant(&self) -> &FilterVariant {
        &self.variant
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    fn load_module(&self, gd: &mut dyn GraphicsDevice, name: &str) -> Result<ShaderModule> {
        let bytes = self.shaders.load(name)?;
        let words = spirv_words(&bytes)
            .map_err(|e| Error::init(InitResource::ShaderModule, format!("{}: {}", name, e)))?;
        gd.create_shader_module(self.device, &words)
            .map_err(|e| e.during_init(InitResource::ShaderModule))
    }

    fn build(&mut self, gd: &mut dyn GraphicsDevice, render_pass: RenderPass) -> Result<()> {
        let device = self.device;

        self.vertex_module = self.load_module(gd, &self.variant.vertex_shader)?;
        self.fragment_module = self.load_module(gd, &self.variant.fragment_shader)?;

        self.set_layout = gd
            .create_descriptor_set_layout(device)
            .map_err(|e| e.during_init(InitResource::DescriptorSetLayout))?;

        self.pipeline_layout = gd
            .create_pipeline_layout(device, self.set_layout, self.variant.push_constants.range())
            .map_err(|e| e.during_init(InitResource::PipelineLayout))?;

        self.pipeline = gd
            .create_graphics_pipeline(
                device,
                &GraphicsPipelineDesc {
                    render_pass,
                    layout: self.pipeline_layout,
                    vertex_shader: self.vertex_module,
                    fragment_shader: self.fragment_module,
                },
            )
            .map_err(|e| e.during_init(InitResource::Pipeline))?;

        self.descriptor_pool = gd
            .create_descriptor_pool(device, 1)
            .map_err(|e| e.during_init(InitResource::DescriptorPool))?;

        self.sampler = gd
            .create_sampler(device)
            .map_err(|e| e.during_init(InitResource::Sampler))?;

        self.descriptor_set = gd
            .allocate_descriptor_set(device, self.descriptor_pool, self.set_layout)
            .map_err(|e| e.during_init(InitResource::DescriptorSet))?;

        Ok(())
    }

    fn push_constants(&self, gd: &mut dyn GraphicsDevice, command_buffer: CommandBuffer, params: &DrawParams) {
        let Some(range) = self.variant.push_constants.range() else {
            return;
        };
        match self.variant.push_constants {
            PushConstantLayout::Transform => {
                let constants = TransformConstants {
                    transform: self.variant.effective_transform(params.transform).to_cols_array(),
                };
                gd.cmd_push_constants(
                    command_buffer,
                    self.pipeline_layout,
                    range.stages,
                    bytemuck::bytes_of(&constants),
                );
            }
            PushConstantLayout::ResolutionTime => {
                let constants = ResolutionTimeConstants {
                    width: params.resolution.width as f32,
                    height: params.resolution.height as f32,
                    elapsed_seconds: params.elapsed_seconds,
                    padding: 0.0,
                };
                gd.cmd_push_constants(
                    command_buffer,
                    self.pipeline_layout,
                    range.stages,
                    bytemuck::bytes_of(&constants),
                );
            }
            PushConstantLayout::None => {}
        }
    }
}

impl Filter for ShaderFilter {
    fn name(&self) -> &str {
        &self.variant.name
    }

    fn init(&mut self, gd: &mut dyn GraphicsDevice, device: Device, render_pass: RenderPass) -> Result<()> {
        if self.is_initialized() {
            self.release(gd);
        }
        self.device = device;

        if let Err(e) = self.build(gd, render_pass) {
            self.release(gd);
            return Err(e);
        }

        engine_info!(SOURCE, "Filter '{}' initialized", self.variant.name);
        Ok(())
    }

    fn draw(
        &mut self,
        gd: &mut dyn GraphicsDevice,
        command_buffer: CommandBuffer,
        params: &DrawParams,
    ) -> Result<()> {
        if !self.is_initialized() {
            crate::engine_bail!(SOURCE, "filter '{}' drawn before init", self.variant.name);
        }

        if params.texture_view != self.bound_view {
            gd.update_descriptor_set(self.device, self.descriptor_set, params.texture_view, self.sampler);
            self.bound_view = params.texture_view;
            engine_trace!(SOURCE, "Descriptor set rebound to view #{}", params.texture_view.raw());
        }

        gd.cmd_bind_pipeline(command_buffer, self.pipeline);
        self.push_constants(gd, command_buffer, params);
        gd.cmd_bind_descriptor_set(command_buffer, self.pipeline_layout, self.descriptor_set);
        gd.cmd_draw(command_buffer, self.variant.geometry.vertex_count());
        Ok(())
    }

    fn release(&mut self, gd: &mut dyn GraphicsDevice) {
        if self.device.is_null() {
            return;
        }
        let device = self.device;

        if !self.sampler.is_null() {
            gd.destroy_sampler(device, self.sampler);
        }
        // The pool frees its set
        if !self.descriptor_pool.is_null() {
            gd.destroy_descriptor_pool(device, self.descriptor_pool);
        }
        if !self.pipeline.is_null() {
            gd.destroy_pipeline(device, self.pipeline);
        }
        if !self.pipeline_layout.is_null() {
            gd.destroy_pipeline_layout(device, self.pipeline_layout);
        }
        if !self.set_layout.is_null() {
            gd.destroy_descriptor_set_layout(device, self.set_layout);
        }
        if !self.fragment_module.is_null() {
            gd.destroy_shader_module(device, self.fragment_module);
        }
        if !self.vertex_module.is_null() {
            gd.destroy_shader_module(device, self.vertex_module);
        }

        self.descriptor_set = DescriptorSet::NULL;
        self.descriptor_pool = DescriptorPool::NULL;
        self.sampler = Sampler::NULL;
        self.pipeline = Pipeline::NULL;
        self.pipeline_layout = PipelineLayout::NULL;
        self.set_layout = DescriptorSetLayout::NULL;
        self.fragment_module = ShaderModule::NULL;
        self.vertex_module = ShaderModule::NULL;
        self.bound_view = ImageView::NULL;
        self.device = Device::NULL;

        engine_debug!(SOURCE, "Filter '{}' released", self.variant.name);
    }

    fn is_initialized(&self) -> bool {
        !self.pipeline.is_null() && !self.descriptor_set.is_null()
    }
}

#[cfg(test)]
#[path = "shader_filter_tests.rs"]
mod tests;
