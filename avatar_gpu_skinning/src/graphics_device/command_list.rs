/// CommandList trait - for recording draw commands

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{Buffer, Pipeline, Texture};

/// Index buffer element type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    /// Size of one index in bytes
    pub fn size_bytes(&self) -> u64 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

/// Command list for recording draw commands
///
/// Recorded by the skinning components inside a pass that the host
/// renderer has already begun (render target, viewport and blend state
/// are the host's responsibility).
pub trait CommandList {
    /// Bind a graphics pipeline
    fn bind_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()>;

    /// Bind a texture to a shader slot
    fn bind_texture(&mut self, slot: u32, texture: &Arc<dyn Texture>) -> Result<()>;

    /// Bind a uniform or storage buffer to a shader slot
    fn bind_buffer(&mut self, slot: u32, buffer: &Arc<dyn Buffer>) -> Result<()>;

    /// Bind a vertex buffer
    ///
    /// # Arguments
    ///
    /// * `buffer` - Buffer to bind
    /// * `offset` - Offset into the buffer in bytes
    fn bind_vertex_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64) -> Result<()>;

    /// Bind an index buffer
    fn bind_index_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64, index_type: IndexType) -> Result<()>;

    /// Push constants to the bound pipeline
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset in bytes into push constant range
    /// * `data` - Data to push
    fn push_constants(&mut self, offset: u32, data: &[u8]) -> Result<()>;

    /// Draw indexed primitives
    ///
    /// # Arguments
    ///
    /// * `index_count` - Number of indices to draw
    /// * `first_index` - First index in the index buffer
    /// * `vertex_offset` - Value added to each index before fetching
    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()>;
}
