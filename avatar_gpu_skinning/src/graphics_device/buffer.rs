/// Buffer trait and buffer descriptor

use crate::error::Result;

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer
    Vertex,
    /// Index buffer
    Index,
    /// Uniform/constant buffer
    Uniform,
    /// Storage buffer (structured, read by compute or vertex shaders)
    Storage,
}

/// How the CPU is expected to write the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// Written once at creation or rarely afterwards
    Immutable,
    /// Rewritten in full or in part every few frames
    Dynamic,
    /// Sub-ranges are rewritten every frame while other ranges are still
    /// being read by in-flight GPU work; the backend must not stall or
    /// orphan the whole buffer on partial updates
    SubUpdates,
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Debug label
    pub label: String,
    /// Size in bytes
    pub size: u64,
    /// Buffer usage
    pub usage: BufferUsage,
    /// Update pattern
    pub mode: BufferMode,
}

/// Buffer resource trait
///
/// Implemented by the host renderer's buffer type.
/// The buffer is released when the last reference is dropped.
pub trait Buffer: Send + Sync {
    /// Size in bytes
    fn size(&self) -> u64;

    /// Update buffer data
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset into the buffer in bytes
    /// * `data` - Data to write
    fn update(&self, offset: u64, data: &[u8]) -> Result<()>;
}
