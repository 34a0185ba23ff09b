/// GraphicsDevice trait - the seam between the engine and a GPU backend

use std::time::Duration;

use crate::error::Result;
use crate::graphics_device::{
    AcquireResult, AdapterSelection, ColorFormat, CommandBuffer, CommandPool, DescriptorPool,
    DescriptorSet, DescriptorSetLayout, Device, Extent2D, Fence, Framebuffer,
    GraphicsPipelineDesc, Image, ImageView, Instance, OutputSurface, PhysicalDevice, Pipeline,
    PipelineLayout, PresentOutcome, PushConstantRange, Queue, RenderPass, Sampler, Semaphore,
    ShaderModule, ShaderStages, SubmitDesc, Surface, SurfaceCapabilities, Swapchain,
    SwapchainDesc, TextureAllocation,
};

/// Backend device
///
/// One method per creation, destruction, recording and synchronization step
/// used by the engine. Objects are identified by opaque handles; the backend
/// keeps the native objects behind them.
///
/// Destroy methods never fail: backend errors are logged and teardown carries on.
/// Recording methods (`cmd_*`) are infallible, errors surface at `end_command_buffer`.
pub trait GraphicsDevice: Send {
    // ===== INSTANCE / SURFACE / DEVICE =====

    fn create_instance(&mut self, app_name: &str, enable_validation: bool) -> Result<Instance>;

    fn destroy_instance(&mut self, instance: Instance);

    fn create_surface(&mut self, instance: Instance, target: &OutputSurface) -> Result<Surface>;

    fn destroy_surface(&mut self, instance: Instance, surface: Surface);

    /// Pick a device with one queue family supporting both graphics and present
    fn select_physical_device(
        &mut self,
        instance: Instance,
        surface: Surface,
    ) -> Result<AdapterSelection>;

    /// Create the logical device and fetch its single queue
    fn create_device(
        &mut self,
        physical_device: PhysicalDevice,
        queue_family: u32,
    ) -> Result<(Device, Queue)>;

    fn destroy_device(&mut self, device: Device);

    fn device_wait_idle(&mut self, device: Device) -> Result<()>;

    fn surface_capabilities(
        &mut self,
        physical_device: PhysicalDevice,
        surface: Surface,
    ) -> Result<SurfaceCapabilities>;

    // ===== COMMAND POOL / BUFFERS =====

    fn create_command_pool(&mut self, device: Device, queue_family: u32) -> Result<CommandPool>;

    fn destroy_command_pool(&mut self, device: Device, pool: CommandPool);

    fn allocate_command_buffers(
        &mut self,
        device: Device,
        pool: CommandPool,
        count: u32,
    ) -> Result<Vec<CommandBuffer>>;

    fn free_command_buffers(&mut self, device: Device, pool: CommandPool, buffers: &[CommandBuffer]);

    // ===== RENDER PASS / SWAPCHAIN =====

    /// Single color attachment: clear on load, store, ends in present layout
    fn create_render_pass(&mut self, device: Device, format: ColorFormat) -> Result<RenderPass>;

    fn destroy_render_pass(&mut self, device: Device, render_pass: RenderPass);

    fn create_swapchain(&mut self, device: Device, desc: &SwapchainDesc) -> Result<Swapchain>;

    fn swapchain_images(&mut self, device: Device, swapchain: Swapchain) -> Result<Vec<Image>>;

    fn destroy_swapchain(&mut self, device: Device, swapchain: Swapchain);

    fn create_image_view(
        &mut self,
        device: Device,
        image: Image,
        format: ColorFormat,
    ) -> Result<ImageView>;

    fn destroy_image_view(&mut self, device: Device, view: ImageView);

    fn create_framebuffer(
        &mut self,
        device: Device,
        render_pass: RenderPass,
        view: ImageView,
        extent: Extent2D,
    ) -> Result<Framebuffer>;

    fn destroy_framebuffer(&mut self, device: Device, framebuffer: Framebuffer);

    // ===== SYNCHRONIZATION =====

    fn create_semaphore(&mut self, device: Device) -> Result<Semaphore>;

    fn destroy_semaphore(&mut self, device: Device, semaphore: Semaphore);

    fn create_fence(&mut self, device: Device, signaled: bool) -> Result<Fence>;

    fn destroy_fence(&mut self, device: Device, fence: Fence);

    /// Wait for `fence`; `Ok(false)` when `timeout` elapsed first
    fn wait_for_fence(&mut self, device: Device, fence: Fence, timeout: Duration) -> Result<bool>;

    fn reset_fence(&mut self, device: Device, fence: Fence) -> Result<()>;

    // ===== FRAME LOOP =====

    /// Acquire the next presentable image, signaling `signal` when it is ready
    fn acquire_next_image(
        &mut self,
        device: Device,
        swapchain: Swapchain,
        signal: Semaphore,
        timeout: Duration,
    ) -> AcquireResult;

    fn queue_submit(&mut self, queue: Queue, submit: &SubmitDesc) -> Result<()>;

    /// Present `image_index` once `wait` is signaled
    ///
    /// An `Err` means the request was rejected and `wait` was not consumed.
    fn queue_present(
        &mut self,
        queue: Queue,
        swapchain: Swapchain,
        image_index: u32,
        wait: Semaphore,
    ) -> Result<PresentOutcome>;

    // ===== RECORDING =====

    fn reset_command_buffer(&mut self, command_buffer: CommandBuffer) -> Result<()>;

    fn begin_command_buffer(&mut self, command_buffer: CommandBuffer) -> Result<()>;

    fn end_command_buffer(&mut self, command_buffer: CommandBuffer) -> Result<()>;

    fn cmd_begin_render_pass(
        &mut self,
        command_buffer: CommandBuffer,
        render_pass: RenderPass,
        framebuffer: Framebuffer,
        extent: Extent2D,
        clear_color: [f32; 4],
    );

    fn cmd_end_render_pass(&mut self, command_buffer: CommandBuffer);

    /// Full-extent viewport and scissor
    fn cmd_set_viewport_scissor(&mut self, command_buffer: CommandBuffer, extent: Extent2D);

    fn cmd_bind_pipeline(&mut self, command_buffer: CommandBuffer, pipeline: Pipeline);

    fn cmd_bind_descriptor_set(
        &mut self,
        command_buffer: CommandBuffer,
        layout: PipelineLayout,
        set: DescriptorSet,
    );

    fn cmd_push_constants(
        &mut self,
        command_buffer: CommandBuffer,
        layout: PipelineLayout,
        stages: ShaderStages,
        data: &[u8],
    );

    fn cmd_draw(&mut self, command_buffer: CommandBuffer, vertex_count: u32);

    // ===== FILTER OBJECTS =====

    /// `code` is validated SPIR-V
    fn create_shader_module(&mut self, device: Device, code: &[u32]) -> Result<ShaderModule>;

    fn destroy_shader_module(&mut self, device: Device, module: ShaderModule);

    /// One combined image sampler at binding 0, fragment stage
    fn create_descriptor_set_layout(&mut self, device: Device) -> Result<DescriptorSetLayout>;

    fn destroy_descriptor_set_layout(&mut self, device: Device, layout: DescriptorSetLayout);

    fn create_pipeline_layout(
        &mut self,
        device: Device,
        set_layout: DescriptorSetLayout,
        push_constants: Option<PushConstantRange>,
    ) -> Result<PipelineLayout>;

    fn destroy_pipeline_layout(&mut self, device: Device, layout: PipelineLayout);

    fn create_graphics_pipeline(
        &mut self,
        device: Device,
        desc: &GraphicsPipelineDesc,
    ) -> Result<Pipeline>;

    fn destroy_pipeline(&mut self, device: Device, pipeline: Pipeline);

    fn create_descriptor_pool(&mut self, device: Device, max_sets: u32) -> Result<DescriptorPool>;

    /// Also frees every set allocated from the pool
    fn destroy_descriptor_pool(&mut self, device: Device, pool: DescriptorPool);

    fn allocate_descriptor_set(
        &mut self,
        device: Device,
        pool: DescriptorPool,
        layout: DescriptorSetLayout,
    ) -> Result<DescriptorSet>;

    /// Point binding 0 of `set` at `view` sampled through `sampler`
    fn update_descriptor_set(
        &mut self,
        device: Device,
        set: DescriptorSet,
        view: ImageView,
        sampler: Sampler,
    );

    fn create_sampler(&mut self, device: Device) -> Result<Sampler>;

    fn destroy_sampler(&mut self, device: Device, sampler: Sampler);

    // ===== INPUT TEXTURE =====

    /// RGBA8 sampled image with bound memory and a view
    fn create_texture(&mut self, device: Device, extent: Extent2D) -> Result<TextureAllocation>;

    /// Copy tightly packed RGBA8 `pixels` into `texture` and leave it ready for sampling
    fn upload_texture(
        &mut self,
        device: Device,
        queue: Queue,
        pool: CommandPool,
        texture: &TextureAllocation,
        pixels: &[u8],
    ) -> Result<()>;

    fn destroy_texture(&mut self, device: Device, texture: &TextureAllocation);
}
