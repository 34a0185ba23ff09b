/// Plain data types exchanged with a graphics device

use bitflags::bitflags;
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle,
    RawWindowHandle, WindowHandle,
};

use crate::error::{Error, Result};
use crate::graphics_device::{
    DeviceMemory, Image, ImageView, PhysicalDevice, PipelineLayout,
    RenderPass, Semaphore, ShaderModule, Surface, Swapchain, CommandBuffer, Fence,
};

// ===== EXTENT =====

/// Size of a 2D image in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Build an extent from host-reported (possibly zero or negative) dimensions
    pub fn from_signed(width: i32, height: i32) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(Error::InvalidArgument(format!(
                "size must be positive, got {}x{}",
                width, height
            )));
        }
        Ok(Self::new(width as u32, height as u32))
    }

    /// Reject extents with a zero dimension
    pub fn validated(self) -> Result<Self> {
        if self.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Byte length of an RGBA8 buffer covering this extent
    pub fn rgba_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Clamp each dimension into `[min, max]`
    pub fn clamp(self, min: Extent2D, max: Extent2D) -> Self {
        Self {
            width: self.width.clamp(min.width, max.width.max(min.width)),
            height: self.height.clamp(min.height, max.height.max(min.height)),
        }
    }
}

// ===== FORMATS & MODES =====

/// Color attachment / texture format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum ColorFormat {
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
}

/// Presentation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentMode {
    /// V-sync queue, always supported
    Fifo,
    /// Triple-buffered, newest frame replaces the queued one
    Mailbox,
    /// No synchronization, may tear
    Immediate,
}

bitflags! {
    /// Shader stages a push-constant range is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 0b01;
        const FRAGMENT = 0b10;
    }
}

// ===== DEVICE SELECTION & SURFACE =====

/// Physical device picked for rendering and the queue family used for graphics+present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterSelection {
    pub physical_device: PhysicalDevice,
    pub queue_family: u32,
}

/// What the surface supports
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// 0 means no upper limit
    pub max_image_count: u32,
    /// `None` when the surface size is decided by the swapchain
    pub current_extent: Option<Extent2D>,
    pub min_extent: Extent2D,
    pub max_extent: Extent2D,
    pub formats: Vec<ColorFormat>,
    pub present_modes: Vec<PresentMode>,
}

/// Swapchain creation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwapchainDesc {
    pub surface: Surface,
    pub format: ColorFormat,
    pub extent: Extent2D,
    pub image_count: u32,
    pub present_mode: PresentMode,
    pub old_swapchain: Swapchain,
}

/// Window the engine presents into
///
/// Raw platform handles captured from the host window.
#[derive(Debug, Clone, Copy)]
pub struct OutputSurface {
    pub display: RawDisplayHandle,
    pub window: RawWindowHandle,
}

// SAFETY: the raw handles are plain identifiers; the host guarantees the
// window outlives the engine and they are only dereferenced by the backend
// while creating the surface.
unsafe impl Send for OutputSurface {}
unsafe impl Sync for OutputSurface {}

impl OutputSurface {
    pub fn new(display: RawDisplayHandle, window: RawWindowHandle) -> Self {
        Self { display, window }
    }

    /// Capture the handles of a host window
    pub fn from_window<W: HasDisplayHandle + HasWindowHandle>(window: &W) -> Result<Self> {
        let map = |e: HandleError| Error::InvalidArgument(format!("window handle unavailable: {}", e));
        let display = window.display_handle().map_err(map)?.as_raw();
        let raw_window = window.window_handle().map_err(map)?.as_raw();
        Ok(Self::new(display, raw_window))
    }
}

impl HasDisplayHandle for OutputSurface {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        // SAFETY: see the Send/Sync impls above
        Ok(unsafe { DisplayHandle::borrow_raw(self.display) })
    }
}

impl HasWindowHandle for OutputSurface {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        // SAFETY: see the Send/Sync impls above
        Ok(unsafe { WindowHandle::borrow_raw(self.window) })
    }
}

// ===== FRAME LOOP =====

/// Status of an image acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireCode {
    Success,
    /// Image acquired but the swapchain no longer matches the surface exactly
    Suboptimal,
    /// Swapchain must be recreated before it can be used again
    OutOfDate,
    Timeout,
    NotReady,
    SurfaceLost,
    DeviceLost,
    Failed,
}

/// Result of acquiring the next swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireResult {
    pub succeeded: bool,
    pub index: u32,
    pub code: AcquireCode,
}

impl AcquireResult {
    pub fn acquired(index: u32, code: AcquireCode) -> Self {
        Self { succeeded: true, index, code }
    }

    pub fn failed(code: AcquireCode) -> Self {
        Self { succeeded: false, index: 0, code }
    }
}

/// Non-fatal present result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// One queue submission
///
/// With no command buffer the submission only consumes `wait` and signals
/// `fence`, which keeps a frame slot usable after a failed recording.
/// `fence` may be null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitDesc {
    pub command_buffer: Option<CommandBuffer>,
    pub wait: Semaphore,
    pub signal: Option<Semaphore>,
    pub fence: Fence,
}

// ===== FILTER OBJECTS =====

/// Push-constant block declared by a pipeline layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantRange {
    pub stages: ShaderStages,
    pub size: u32,
}

/// Graphics pipeline parameters
///
/// Vertex positions are generated in the vertex shader; viewport and scissor are dynamic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphicsPipelineDesc {
    pub render_pass: RenderPass,
    pub layout: PipelineLayout,
    pub vertex_shader: ShaderModule,
    pub fragment_shader: ShaderModule,
}

// ===== INPUT TEXTURE =====

/// Sampled RGBA8 image owned by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureAllocation {
    pub image: Image,
    pub memory: DeviceMemory,
    pub view: ImageView,
    pub extent: Extent2D,
}

impl TextureAllocation {
    pub fn is_null(&self) -> bool {
        self.image.is_null() && self.memory.is_null() && self.view.is_null()
    }
}
