/// Filter module - the pluggable draw-time pixel effect
///
/// A filter is built against one device and render pass (`init`), records its
/// draw into the frame's command buffer (`draw`) and destroys everything it
/// owns on `release`. Variants only differ in shader content and push-constant
/// layout, so a single `ShaderFilter` drives every `FilterVariant`.

pub mod variant;
pub mod shader_filter;

pub use variant::*;
pub use shader_filter::*;

use glam::Mat4;

use crate::error::Result;
use crate::graphics_device::{CommandBuffer, Device, Extent2D, GraphicsDevice, ImageView, RenderPass};

/// Per-draw data
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawParams {
    /// Texture sampled by the fragment shader
    pub texture_view: ImageView,
    /// Producer (or override) transform
    pub transform: Mat4,
    /// Output size in pixels
    pub resolution: Extent2D,
    /// Seconds since the engine started
    pub elapsed_seconds: f32,
}

/// Draw-time effect contract
pub trait Filter: Send {
    fn name(&self) -> &str;

    /// Build shader modules, layouts, pipeline, descriptor pool/set and sampler
    fn init(&mut self, gd: &mut dyn GraphicsDevice, device: Device, render_pass: RenderPass) -> Result<()>;

    /// Record the effect into `command_buffer` (inside the render pass)
    fn draw(
        &mut self,
        gd: &mut dyn GraphicsDevice,
        command_buffer: CommandBuffer,
        params: &DrawParams,
    ) -> Result<()>;

    /// Destroy everything `init` created, in reverse order; a second call is a no-op
    fn release(&mut self, gd: &mut dyn GraphicsDevice);

    fn is_initialized(&self) -> bool;
}
