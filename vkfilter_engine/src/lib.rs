/*!
# vkfilter Engine

Render-loop and resource-lifecycle engine for real-time texture filtering.

Frames flow from an input texture (fed by an external producer or pushed by
the host) through a pluggable filter into a window-backed swapchain. The engine
owns every GPU object lifetime and drives frames on a dedicated worker.

## Architecture

- **GraphicsDevice**: backend seam, one method per GPU step, opaque handles
- **GraphicsContext**: instance, surface, device, queue, command pool
- **SwapchainState**: swapchain, image views, framebuffers, render pass
- **FrameScheduler**: multi-buffered synchronization and the per-tick loop
- **CommandRecorder**: per-image command buffers, re-recorded every frame
- **Filter**: draw-time effect (`ShaderFilter` + `FilterVariant`)
- **InputTexture / InputSurface**: the sampled texture and its producer handle
- **Engine**: lifecycle state machine aggregating all of the above

Backend implementations (Vulkan) live in their own crates.
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod config;
pub mod graphics_device;
pub mod context;
pub mod swapchain;
pub mod frame_scheduler;
pub mod command_recorder;
pub mod filter;
pub mod shader_source;
pub mod input_texture;
pub mod pattern;
pub mod worker;
pub mod service;

#[cfg(test)]
mod test_support;

// Main vkfilter namespace module
pub mod vkfilter {
    // Error types
    pub use crate::error::{Error, InitResource, Result};

    // Engine handle and its public types
    pub use crate::engine::{Engine, EngineEvent, EngineState, EngineStats, FrameInfo};
    pub use crate::config::EngineConfig;

    // Backend seam
    pub use crate::graphics_device::*;

    // Filters and shaders
    pub use crate::filter::{affine_rotation, DrawParams, Filter, FilterVariant, ShaderFilter};
    pub use crate::shader_source::{FileShaderSource, MemoryShaderSource, ShaderSource};

    // Input side
    pub use crate::input_texture::{InputMode, InputSurface};
    pub use crate::frame_scheduler::TickOutcome;

    // Scheduling
    pub use crate::service::{RenderService, ServiceLease};
    pub use crate::worker::{FrameNotifier, TickCadence};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Synthetic test patterns
    pub mod pattern {
        pub use crate::pattern::*;
    }
}

// Re-export math library at crate root
pub use glam;
