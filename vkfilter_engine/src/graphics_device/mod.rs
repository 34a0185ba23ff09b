/// Graphics device module - the backend seam and the types crossing it

// Module declarations
pub mod graphics_device;
pub mod handles;
pub mod types;

// Re-export everything from graphics_device.rs
pub use graphics_device::*;

// Re-export from other modules
pub use handles::*;
pub use types::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;
