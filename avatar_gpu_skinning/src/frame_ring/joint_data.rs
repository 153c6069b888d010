/// Joint-data record uploaded to the skinning shader.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Size of one 4x4 float matrix in bytes
pub const BYTES_PER_MATRIX: usize = std::mem::size_of::<f32>() * 16;

/// Size of one joint record in bytes
pub const JOINT_DATA_SIZE: usize = 2 * BYTES_PER_MATRIX;

/// Skinning transform and normal transform of one joint
///
/// Laid out exactly as the shader's structured buffer element:
/// `transform` at byte 0, `normal_transform` at byte 64.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct JointData {
    pub transform: Mat4,
    pub normal_transform: Mat4,
}

const _: () = assert!(std::mem::size_of::<JointData>() == JOINT_DATA_SIZE);

impl JointData {
    pub const IDENTITY: Self = Self {
        transform: Mat4::IDENTITY,
        normal_transform: Mat4::IDENTITY,
    };

    /// Build a record from a skinning transform, deriving the normal
    /// transform as its inverse transpose
    ///
    /// A singular transform (zero scale) yields a zero normal transform.
    pub fn from_transform(transform: Mat4) -> Self {
        let normal_transform = if transform.determinant().abs() > f32::EPSILON {
            transform.inverse().transpose()
        } else {
            Mat4::ZERO
        };
        Self { transform, normal_transform }
    }

    /// Raw bytes of a run of records
    pub fn as_bytes(records: &[JointData]) -> &[u8] {
        bytemuck::cast_slice(records)
    }
}

impl Default for JointData {
    fn default() -> Self {
        Self::IDENTITY
    }
}
