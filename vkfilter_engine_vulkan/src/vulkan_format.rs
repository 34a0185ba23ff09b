/// Conversions between engine types and Vulkan enums

use ash::vk;
use vkfilter_engine::vkfilter::{AcquireCode, ColorFormat, Extent2D, PresentMode, ShaderStages};

pub(crate) fn color_format_to_vk(format: ColorFormat) -> vk::Format {
    match format {
        ColorFormat::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        ColorFormat::B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,
        ColorFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        ColorFormat::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
    }
}

/// Surface formats the engine cannot render to map to `None`
pub(crate) fn color_format_from_vk(format: vk::Format) -> Option<ColorFormat> {
    match format {
        vk::Format::B8G8R8A8_UNORM => Some(ColorFormat::B8G8R8A8_UNORM),
        vk::Format::B8G8R8A8_SRGB => Some(ColorFormat::B8G8R8A8_SRGB),
        vk::Format::R8G8B8A8_UNORM => Some(ColorFormat::R8G8B8A8_UNORM),
        vk::Format::R8G8B8A8_SRGB => Some(ColorFormat::R8G8B8A8_SRGB),
        _ => None,
    }
}

pub(crate) fn present_mode_to_vk(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

pub(crate) fn present_mode_from_vk(mode: vk::PresentModeKHR) -> Option<PresentMode> {
    match mode {
        vk::PresentModeKHR::FIFO => Some(PresentMode::Fifo),
        vk::PresentModeKHR::MAILBOX => Some(PresentMode::Mailbox),
        vk::PresentModeKHR::IMMEDIATE => Some(PresentMode::Immediate),
        _ => None,
    }
}

pub(crate) fn shader_stages_to_vk(stages: ShaderStages) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStages::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStages::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    flags
}

/// Acquire status for a `vkAcquireNextImageKHR` error code
pub(crate) fn acquire_code(result: vk::Result) -> AcquireCode {
    match result {
        vk::Result::SUCCESS => AcquireCode::Success,
        vk::Result::SUBOPTIMAL_KHR => AcquireCode::Suboptimal,
        vk::Result::ERROR_OUT_OF_DATE_KHR => AcquireCode::OutOfDate,
        vk::Result::TIMEOUT => AcquireCode::Timeout,
        vk::Result::NOT_READY => AcquireCode::NotReady,
        vk::Result::ERROR_SURFACE_LOST_KHR => AcquireCode::SurfaceLost,
        vk::Result::ERROR_DEVICE_LOST => AcquireCode::DeviceLost,
        _ => AcquireCode::Failed,
    }
}

pub(crate) fn extent_to_vk(extent: Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: extent.width,
        height: extent.height,
    }
}

/// `None` for the special "decided by the swapchain" value (0xFFFFFFFF)
pub(crate) fn extent_from_vk(extent: vk::Extent2D) -> Option<Extent2D> {
    if extent.width == u32::MAX && extent.height == u32::MAX {
        None
    } else {
        Some(Extent2D::new(extent.width, extent.height))
    }
}

/// Timeout in nanoseconds, saturating at `u64::MAX` (wait forever)
pub(crate) fn timeout_ns(timeout: std::time::Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
