//! Error types for the vkfilter engine
//!
//! This module defines the error type shared by every layer of the engine:
//! initialization, per-frame rendering, lifecycle requests and the backend seam.

use std::fmt;

use crate::engine::EngineState;

/// Result type for vkfilter engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// GPU or engine resource whose creation failed during initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitResource {
    Instance,
    Surface,
    PhysicalDevice,
    QueueFamily,
    Device,
    CommandPool,
    CommandBuffer,
    Swapchain,
    RenderPass,
    ImageView,
    Framebuffer,
    SyncObject,
    ShaderModule,
    DescriptorSetLayout,
    PipelineLayout,
    Pipeline,
    DescriptorPool,
    DescriptorSet,
    Sampler,
    InputTexture,
    Worker,
}

impl fmt::Display for InitResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitResource::Instance => "instance",
            InitResource::Surface => "surface",
            InitResource::PhysicalDevice => "physical device",
            InitResource::QueueFamily => "queue family",
            InitResource::Device => "logical device",
            InitResource::CommandPool => "command pool",
            InitResource::CommandBuffer => "command buffer",
            InitResource::Swapchain => "swapchain",
            InitResource::RenderPass => "render pass",
            InitResource::ImageView => "image view",
            InitResource::Framebuffer => "framebuffer",
            InitResource::SyncObject => "sync object",
            InitResource::ShaderModule => "shader module",
            InitResource::DescriptorSetLayout => "descriptor set layout",
            InitResource::PipelineLayout => "pipeline layout",
            InitResource::Pipeline => "pipeline",
            InitResource::DescriptorPool => "descriptor pool",
            InitResource::DescriptorSet => "descriptor set",
            InitResource::Sampler => "sampler",
            InitResource::InputTexture => "input texture",
            InitResource::Worker => "render worker",
        };
        f.write_str(name)
    }
}

/// vkfilter engine errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Creation of a resource failed during the ordered initialization sequence
    InitFailed {
        resource: InitResource,
        reason: String,
    },

    /// The swapchain no longer matches the surface; the host should resize
    AcquireStaleSwapchain,

    /// Zero/negative size, null required handle, mismatched pixel buffer
    InvalidArgument(String),

    /// Re-entrant lifecycle request (start while started, stop while stopped)
    AlreadyInState(EngineState),

    /// Operation not valid in the current lifecycle state
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },

    /// A conflicting request is already in progress
    Busy(String),

    /// Backend-specific error (Vulkan, mock, ...)
    BackendError(String),
}

impl Error {
    /// Build an `InitFailed` error for `resource`
    pub fn init(resource: InitResource, reason: impl Into<String>) -> Self {
        Error::InitFailed {
            resource,
            reason: reason.into(),
        }
    }

    /// Tag an error raised while creating `resource`
    ///
    /// Errors that already name a resource keep their original tag.
    pub fn during_init(self, resource: InitResource) -> Self {
        match self {
            Error::InitFailed { .. } => self,
            other => Error::InitFailed {
                resource,
                reason: other.to_string(),
            },
        }
    }

    /// Resource tag of an initialization failure
    pub fn init_resource(&self) -> Option<InitResource> {
        match self {
            Error::InitFailed { resource, .. } => Some(*resource),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InitFailed { resource, reason } => {
                write!(f, "Initialization failed ({}): {}", resource, reason)
            }
            Error::AcquireStaleSwapchain => write!(f, "Swapchain is out of date"),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::AlreadyInState(state) => write!(f, "Engine already in state {:?}", state),
            Error::InvalidState { operation, state } => {
                write!(f, "Cannot {} while engine is {:?}", operation, state)
            }
            Error::Busy(msg) => write!(f, "Busy: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
