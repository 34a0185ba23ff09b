/// CommandRecorder - one command buffer per swapchain image, re-recorded every frame

use glam::Mat4;

use crate::error::{InitResource, Result};
use crate::filter::{DrawParams, Filter};
use crate::graphics_device::{
    CommandBuffer, CommandPool, Device, Extent2D, Framebuffer, GraphicsDevice, ImageView,
    RenderPass,
};
use crate::{engine_debug, engine_trace};

const SOURCE: &str = "vkfilter::CommandRecorder";

/// Per-frame data handed to the filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    /// View of the input texture (null: clear only)
    pub texture_view: ImageView,
    pub transform: Mat4,
    pub elapsed_seconds: f32,
    pub clear_color: [f32; 4],
}

impl Default for FrameInputs {
    fn default() -> Self {
        Self {
            texture_view: ImageView::NULL,
            transform: Mat4::IDENTITY,
            elapsed_seconds: 0.0,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Command buffers allocated from the context's pool, indexed by swapchain image
#[derive(Debug)]
pub struct CommandRecorder {
    pool: CommandPool,
    buffers: Vec<CommandBuffer>,
}

impl CommandRecorder {
    pub fn allocate(
        gd: &mut dyn GraphicsDevice,
        device: Device,
        pool: CommandPool,
        count: usize,
    ) -> Result<Self> {
        let buffers = gd
            .allocate_command_buffers(device, pool, count as u32)
            .map_err(|e| e.during_init(InitResource::CommandBuffer))?;
        engine_debug!(SOURCE, "{} command buffers allocated", buffers.len());
        Ok(Self { pool, buffers })
    }

    /// Free the current buffers and allocate `count` new ones
    pub fn reallocate(&mut self, gd: &mut dyn GraphicsDevice, device: Device, count: usize) -> Result<()> {
        self.free(gd, device);
        self.buffers = gd
            .allocate_command_buffers(device, self.pool, count as u32)
            .map_err(|e| e.during_init(InitResource::CommandBuffer))?;
        engine_debug!(SOURCE, "Command buffers reallocated ({})", self.buffers.len());
        Ok(())
    }

    /// Record the frame for `image_index`
    ///
    /// The render pass is always begun and ended. The filter is only invoked
    /// when one is present and the input texture view is valid; otherwise the
    /// frame just clears to the background color.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &mut self,
        gd: &mut dyn GraphicsDevice,
        image_index: u32,
        render_pass: RenderPass,
        framebuffer: Framebuffer,
        extent: Extent2D,
        filter: Option<&mut dyn Filter>,
        inputs: &FrameInputs,
    ) -> Result<CommandBuffer> {
        let command_buffer = *self.buffers.get(image_index as usize).ok_or_else(|| {
            crate::engine_err!(SOURCE, "no command buffer for image {}", image_index)
        })?;

        gd.reset_command_buffer(command_buffer)?;
        gd.begin_command_buffer(command_buffer)?;
        gd.cmd_begin_render_pass(command_buffer, render_pass, framebuffer, extent, inputs.clear_color);
        gd.cmd_set_viewport_scissor(command_buffer, extent);

        let drawn = match filter {
            Some(filter) if !inputs.texture_view.is_null() => filter.draw(
                gd,
                command_buffer,
                &DrawParams {
                    texture_view: inputs.texture_view,
                    transform: inputs.transform,
                    resolution: extent,
                    elapsed_seconds: inputs.elapsed_seconds,
                },
            ),
            _ => {
                engine_trace!(SOURCE, "No filter or input texture, clearing only");
                Ok(())
            }
        };

        gd.cmd_end_render_pass(command_buffer);
        gd.end_command_buffer(command_buffer)?;
        drawn?;
        Ok(command_buffer)
    }

    pub fn free(&mut self, gd: &mut dyn GraphicsDevice, device: Device) {
        if !self.buffers.is_empty() {
            gd.free_command_buffers(device, self.pool, &self.buffers);
            self.buffers.clear();
            engine_debug!(SOURCE, "Command buffers freed");
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn buffers(&self) -> &[CommandBuffer] {
        &self.buffers
    }
}

#[cfg(test)]
#[path = "command_recorder_tests.rs"]
mod tests;
