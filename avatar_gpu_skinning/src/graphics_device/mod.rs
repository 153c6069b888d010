/// Graphics device module - the GPU API surface the skinning components drive

// Module declarations
pub mod graphics_device;
pub mod buffer;
pub mod texture;
pub mod shader;
pub mod pipeline;
pub mod command_list;

// Re-export everything from graphics_device.rs
pub use graphics_device::*;

// Re-export from other modules
pub use buffer::*;
pub use texture::*;
pub use shader::*;
pub use pipeline::*;
pub use command_list::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;
