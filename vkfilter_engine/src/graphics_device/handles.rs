/// Opaque GPU object handles
///
/// Every object crossing the backend seam is a `Copy` newtype over `u64`.
/// `0` is the null handle, meaning "absent".

macro_rules! define_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
            pub struct $name(pub u64);

            impl $name {
                /// The absent handle
                pub const NULL: Self = Self(0);

                pub fn is_null(self) -> bool {
                    self.0 == 0
                }

                pub fn raw(self) -> u64 {
                    self.0
                }
            }
        )*
    };
}

define_handle!(
    /// API instance
    Instance,
    /// Presentation surface bound to a window
    Surface,
    PhysicalDevice,
    /// Logical device
    Device,
    Queue,
    CommandPool,
    CommandBuffer,
    RenderPass,
    Swapchain,
    Image,
    ImageView,
    Framebuffer,
    /// GPU-side signal
    Semaphore,
    /// CPU-observable completion signal
    Fence,
    ShaderModule,
    DescriptorSetLayout,
    PipelineLayout,
    Pipeline,
    DescriptorPool,
    DescriptorSet,
    Sampler,
    DeviceMemory,
);
