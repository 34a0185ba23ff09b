//! Shared helpers for unit tests

use std::sync::Arc;

use raw_window_handle::{RawDisplayHandle, RawWindowHandle, XlibDisplayHandle, XlibWindowHandle};

use crate::config::EngineConfig;
use crate::context::GraphicsContext;
use crate::filter::{
    ShaderFilter, FilterVariant, ANIMATED_FRAGMENT_SHADER, FULLSCREEN_VERTEX_SHADER,
    QUAD_VERTEX_SHADER, TEXTURE_FRAGMENT_SHADER,
};
use crate::graphics_device::mock_graphics_device::MockGraphicsDevice;
use crate::graphics_device::OutputSurface;
use crate::shader_source::{MemoryShaderSource, ShaderSource, SPIRV_MAGIC};

/// Dummy Xlib handles; the mock never dereferences them
pub fn output_surface() -> OutputSurface {
    OutputSurface::new(
        RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0)),
        RawWindowHandle::Xlib(XlibWindowHandle::new(1)),
    )
}

/// Smallest blob accepted by `spirv_words`: a bare header
pub fn spirv_blob() -> Vec<u8> {
    [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect()
}

/// Every built-in shader name mapped to `spirv_blob()`
pub fn shader_source() -> Arc<dyn ShaderSource> {
    Arc::new(
        MemoryShaderSource::new()
            .with(QUAD_VERTEX_SHADER, spirv_blob())
            .with(TEXTURE_FRAGMENT_SHADER, spirv_blob())
            .with(FULLSCREEN_VERTEX_SHADER, spirv_blob())
            .with(ANIMATED_FRAGMENT_SHADER, spirv_blob()),
    )
}

pub fn filter(variant: FilterVariant) -> ShaderFilter {
    ShaderFilter::new(variant, shader_source())
}

/// Context created on `mock` with the default configuration
pub fn context(mock: &MockGraphicsDevice) -> GraphicsContext {
    let mut gd = mock.clone();
    GraphicsContext::create(&mut gd, &output_surface(), &EngineConfig::default()).unwrap()
}
