/// Multi-buffered joint-matrix upload ring.
///
/// Architecture:
/// - One storage buffer holding `frame_count` regions back to back
/// - Each region holds `entities_per_frame` entries of `max_joints` records
/// - A `JointFrame` session writes one region through a CPU staging copy,
///   then commits only the entries actually handed out and rotates the ring
///
/// With enough regions to cover the GPU's queued-frame depth, the region
/// being written is never one an in-flight frame is still reading, so no
/// fences are needed.

use std::sync::{Arc, Mutex};
use crate::error::{Error, Result};
use crate::graphics_device::{Buffer, BufferDesc, BufferMode, BufferUsage, GraphicsDevice};
use crate::frame_ring::{JointData, JOINT_DATA_SIZE};
use crate::{skinning_bail, skinning_debug, skinning_error, skinning_info, skinning_trace};

/// Max active avatars per frame, plus a few extra for frames where the
/// count briefly overshoots
pub const DEFAULT_ENTITIES_PER_FRAME: u32 = 36;

/// Joint indices are encoded in 8 bits with a couple of values reserved,
/// so this can grow up to 254
pub const MAX_JOINTS: u32 = 160;

/// 3 covers the usual queued-frame depth; 4 leaves room for editor stalls
pub const DEFAULT_FRAME_COUNT: u32 = 4;

const SOURCE: &str = "skinning::JointRingPool";

// ===== DESC =====

/// Descriptor for creating a JointRingPool
pub struct JointRingDesc {
    pub device: Arc<Mutex<dyn GraphicsDevice>>,
    /// Entities that may write joints in one frame
    pub entities_per_frame: u32,
    /// Joint records reserved per entity
    pub max_joints: u32,
    /// Number of rotating regions
    pub frame_count: u32,
}

impl JointRingDesc {
    /// Descriptor with the default capacities
    pub fn new(device: Arc<Mutex<dyn GraphicsDevice>>) -> Self {
        Self {
            device,
            entities_per_frame: DEFAULT_ENTITIES_PER_FRAME,
            max_joints: MAX_JOINTS,
            frame_count: DEFAULT_FRAME_COUNT,
        }
    }
}

// ===== POOL =====

/// Ring of joint-data regions in a single GPU buffer
pub struct JointRingPool {
    joint_buffer: Arc<dyn Buffer>,
    /// CPU copy of one region, reused every frame
    staging: Vec<JointData>,
    entities_per_frame: u32,
    max_joints: u32,
    frame_count: u32,
    current_index: u32,
    frames_committed: u64,
}

impl JointRingPool {
    pub fn new(desc: JointRingDesc) -> Result<Self> {
        // ========== VALIDATION ==========
        if desc.entities_per_frame == 0 {
            skinning_bail!(SOURCE, "entities_per_frame must be non-zero");
        }
        if desc.max_joints == 0 {
            skinning_bail!(SOURCE, "max_joints must be non-zero");
        }
        if desc.frame_count == 0 {
            skinning_bail!(SOURCE, "frame_count must be non-zero");
        }

        let region_records = desc.entities_per_frame.checked_mul(desc.max_joints);
        let total_records = region_records.and_then(|r| r.checked_mul(desc.frame_count));
        let (region_records, total_records) = match (region_records, total_records) {
            (Some(region), Some(total)) => (region, total),
            _ => skinning_bail!(SOURCE,
                "{} entities x {} joints x {} frames overflows the record index",
                desc.entities_per_frame, desc.max_joints, desc.frame_count),
        };

        // ========== CREATE GPU BUFFER ==========
        let size = total_records as u64 * JOINT_DATA_SIZE as u64;
        let joint_buffer = desc.device.lock()
            .map_err(|_| Error::BackendError("Graphics device lock poisoned".to_string()))?
            .create_buffer(BufferDesc {
                label: "joint_ring".to_string(),
                size,
                usage: BufferUsage::Storage,
                mode: BufferMode::SubUpdates,
            })?;

        skinning_info!(SOURCE,
            "Created joint ring: {} regions x {} entities x {} joints ({} bytes)",
            desc.frame_count, desc.entities_per_frame, desc.max_joints, size);

        Ok(Self {
            joint_buffer,
            staging: vec![JointData::IDENTITY; region_records as usize],
            entities_per_frame: desc.entities_per_frame,
            max_joints: desc.max_joints,
            frame_count: desc.frame_count,
            current_index: 0,
            frames_committed: 0,
        })
    }

    // ===== ACCESSORS =====

    /// The GPU buffer to bind into skinning draws
    pub fn joint_buffer(&self) -> &Arc<dyn Buffer> { &self.joint_buffer }

    /// Region the next session will write
    pub fn current_index(&self) -> u32 { self.current_index }

    pub fn entities_per_frame(&self) -> u32 { self.entities_per_frame }

    pub fn max_joints(&self) -> u32 { self.max_joints }

    pub fn frame_count(&self) -> u32 { self.frame_count }

    /// Sessions committed since creation
    pub fn frames_committed(&self) -> u64 { self.frames_committed }

    /// First record of region `index` in the joint buffer, `None` past the ring
    pub fn region_offset(&self, index: u32) -> Option<u32> {
        if index >= self.frame_count {
            return None;
        }
        Some(self.region_start(index))
    }

    /// `index < frame_count`, so the product was range-checked in `new`
    fn region_start(&self, index: u32) -> u32 {
        index * self.max_joints * self.entities_per_frame
    }

    // ===== SESSION =====

    /// Open the write session for the current region
    ///
    /// The session borrows the pool mutably, so a second session cannot be
    /// opened until this one is finished or dropped.
    pub fn start_frame_joints(&mut self) -> JointFrame<'_> {
        skinning_trace!(SOURCE, "Open region {}", self.current_index);
        JointFrame {
            pool: self,
            written: 0,
            finished: false,
        }
    }

    /// Upload the first `written` entries of the staging region, then rotate
    fn commit(&mut self, written: u32) -> Result<()> {
        if written > 0 {
            let records = (written * self.max_joints) as usize;
            let offset = self.region_start(self.current_index) as u64 * JOINT_DATA_SIZE as u64;
            self.joint_buffer.update(offset, JointData::as_bytes(&self.staging[..records]))?;
        }
        skinning_trace!(SOURCE, "Committed {} entries to region {}", written, self.current_index);

        self.current_index = (self.current_index + 1) % self.frame_count;
        self.frames_committed += 1;
        Ok(())
    }
}

impl Drop for JointRingPool {
    fn drop(&mut self) {
        skinning_debug!(SOURCE, "Releasing joint ring after {} frames", self.frames_committed);
    }
}

// ===== ENTRY =====

/// One entity's slice of the open region
pub struct JointEntry<'a> {
    /// Index of `joints[0]` in the whole joint buffer, for the shader
    pub joint_offset: u32,
    /// `max_joints` records to fill
    pub joints: &'a mut [JointData],
}

// ===== FRAME SESSION =====

/// Write session over one region of the ring
///
/// Entries returned by `next_entry` borrow the session, so they cannot
/// outlive it. Dropping an unfinished session commits it like `finish`.
pub struct JointFrame<'a> {
    pool: &'a mut JointRingPool,
    written: u32,
    finished: bool,
}

impl<'a> JointFrame<'a> {
    /// Region being written
    pub fn region_index(&self) -> u32 {
        self.pool.current_index
    }

    /// Entries handed out so far
    pub fn written(&self) -> u32 {
        self.written
    }

    /// Entries still available in this session
    pub fn remaining(&self) -> u32 {
        self.pool.entities_per_frame - self.written
    }

    /// Hand out the next entity's joint range
    ///
    /// # Panics
    ///
    /// Panics when called more than `entities_per_frame` times in one
    /// session. Callers must cap the entities they skin per frame.
    pub fn next_entry(&mut self) -> JointEntry<'_> {
        assert!(
            self.written < self.pool.entities_per_frame,
            "joint frame capacity exceeded: {} entities per frame",
            self.pool.entities_per_frame
        );

        let slot = self.written;
        self.written += 1;

        let max_joints = self.pool.max_joints;
        let joint_offset = self.pool.region_start(self.pool.current_index) + slot * max_joints;
        let start = (slot * max_joints) as usize;
        let end = start + max_joints as usize;

        JointEntry {
            joint_offset,
            joints: &mut self.pool.staging[start..end],
        }
    }

    /// Commit the written entries and advance the ring
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.pool.commit(self.written)
    }
}

impl Drop for JointFrame<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Err(err) = self.pool.commit(self.written) {
            skinning_error!(SOURCE, "Dropped joint frame failed to commit: {}", err);
        }
    }
}

#[cfg(test)]
#[path = "joint_ring_pool_tests.rs"]
mod tests;
