/*!
# vkfilter Engine - Vulkan Backend

Vulkan implementation of the vkfilter `GraphicsDevice` seam.

Uses Ash for the Vulkan bindings, ash-window for surface creation and
gpu-allocator for the input texture memory.

```no_run
use vkfilter_engine::vkfilter::{Engine, EngineConfig, FilterVariant, FileShaderSource, RenderService, ShaderFilter};
use vkfilter_engine_vulkan::VulkanDevice;
# fn run(window: &winit::window::Window) -> vkfilter_engine::vkfilter::Result<()> {
let device = VulkanDevice::from_window(window)?;
let shaders = std::sync::Arc::new(FileShaderSource::new("shaders"));
let filter = ShaderFilter::new(FilterVariant::passthrough(), shaders);
let service = RenderService::new("render");
let engine = Engine::new(Box::new(device), Box::new(filter), EngineConfig::default(), &service);
# Ok(())
# }
```
*/

mod vulkan_device;
mod vulkan_format;
mod vulkan_pipeline;
mod vulkan_texture;

#[cfg(feature = "vulkan-validation")]
mod debug;

pub use vulkan_device::VulkanDevice;

// Validation statistics (only with the vulkan-validation feature)
#[cfg(feature = "vulkan-validation")]
pub use debug::{print_validation_stats_report, validation_stats, ValidationStats};
