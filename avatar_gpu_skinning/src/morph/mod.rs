//! Morph-target combiner and its supporting pieces
//!
//! Every active mesh's morph targets are placed as quads in one shared
//! mesh and blended into an output texture with a single draw call.

pub mod free_list_tracker;
pub mod quad_mesh;
pub mod expandable_texture_array;
pub mod morph_target_combiner;

pub use free_list_tracker::{BlockHandle, BlockLayout, FreeListTracker};
pub use quad_mesh::{
    build_block_quads, CombinerVertex, Quad, QuadMesh, QuadPlacement, TexelRect,
    MAX_QUADS, NUM_INDICES_PER_QUAD, NUM_VERTS_PER_QUAD,
};
pub use expandable_texture_array::{ExpandableTextureArray, ListenerKey};
pub use morph_target_combiner::{
    BlockData, CombineFeatures, CombinerDesc, MorphTargetBlockDesc, MorphTargetCombiner,
};
