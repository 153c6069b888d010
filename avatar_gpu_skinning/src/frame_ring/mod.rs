//! Frame-ring buffer pool of joint-transform data
//!
//! One GPU buffer split into `frame_count` regions; each frame the CPU
//! writes one region while the GPU may still read the previous ones.

pub mod joint_data;
pub mod joint_ring_pool;

pub use joint_data::{JointData, JOINT_DATA_SIZE, BYTES_PER_MATRIX};
pub use joint_ring_pool::{
    JointRingPool, JointRingDesc, JointFrame, JointEntry,
    DEFAULT_ENTITIES_PER_FRAME, DEFAULT_FRAME_COUNT, MAX_JOINTS,
};
