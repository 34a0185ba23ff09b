//! Engine configuration

use std::time::Duration;
use glam::Mat4;

use crate::graphics_device::{ColorFormat, PresentMode};

/// Smallest and largest accepted frames-in-flight count
pub const MIN_FRAMES_IN_FLIGHT: usize = 1;
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Application name reported to the driver
    pub app_name: String,
    /// Enable validation/debug layers
    pub enable_validation: bool,
    /// Number of frame slots (fence + semaphores) cycled round-robin
    pub frames_in_flight: usize,
    /// Bounded wait for the render worker to exit on stop
    pub stop_timeout: Duration,
    /// Bounded wait on a slot fence or image acquire inside one tick
    pub fence_timeout: Duration,
    /// Tick interval when the engine drives rendering itself
    pub self_drive_interval: Duration,
    /// Render pass clear color (RGBA)
    pub clear_color: [f32; 4],
    /// Preferred present mode (FIFO is used when unsupported)
    pub present_mode: PresentMode,
    /// Preferred swapchain format (first reported format is used when unsupported)
    pub preferred_format: ColorFormat,
    /// Go straight from Ready to Rendering after a successful start
    pub auto_render: bool,
    /// Transform used instead of the producer-supplied one
    pub override_transform: Option<Mat4>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_name: "vkfilter".to_string(),
            enable_validation: cfg!(debug_assertions),
            frames_in_flight: 2,
            stop_timeout: Duration::from_secs(1),
            fence_timeout: Duration::from_secs(1),
            self_drive_interval: Duration::from_millis(16),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            present_mode: PresentMode::Fifo,
            preferred_format: ColorFormat::B8G8R8A8_UNORM,
            auto_render: true,
            override_transform: None,
        }
    }
}

impl EngineConfig {
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Set the frame slot count, clamped to 1..=4
    pub fn with_frames_in_flight(mut self, count: usize) -> Self {
        self.frames_in_flight = count.clamp(MIN_FRAMES_IN_FLIGHT, MAX_FRAMES_IN_FLIGHT);
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout = timeout;
        self
    }

    pub fn with_self_drive_interval(mut self, interval: Duration) -> Self {
        self.self_drive_interval = interval;
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_present_mode(mut self, mode: PresentMode) -> Self {
        self.present_mode = mode;
        self
    }

    pub fn with_preferred_format(mut self, format: ColorFormat) -> Self {
        self.preferred_format = format;
        self
    }

    pub fn with_auto_render(mut self, auto_render: bool) -> Self {
        self.auto_render = auto_render;
        self
    }

    pub fn with_override_transform(mut self, transform: Option<Mat4>) -> Self {
        self.override_transform = transform;
        self
    }

    /// Frame slot count with the clamp applied (fields are public and may be set directly)
    pub fn slot_count(&self) -> usize {
        self.frames_in_flight.clamp(MIN_FRAMES_IN_FLIGHT, MAX_FRAMES_IN_FLIGHT)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
