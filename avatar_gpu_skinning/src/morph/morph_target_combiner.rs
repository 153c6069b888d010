/// Morph-target combiner: every block of every mesh in one draw call.
///
/// Architecture:
/// - `FreeListTracker` places each block's morph targets as a contiguous
///   run of quads in one shared `QuadMesh`
/// - One weight per morph target lives in a CPU shadow mirrored into a
///   storage buffer; blocks own contiguous weight ranges
/// - The source morph-target texture array is bound through a listener,
///   so a reallocated array is picked up on the next draw
///
/// The host begins the render pass on the combined output texture; this
/// type only records the bind and draw commands.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use bitflags::bitflags;
use glam::{UVec2, Vec4};
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::graphics_device::{
    Buffer, BufferDesc, BufferMode, BufferUsage, CommandList, GraphicsDevice,
    IndexType, Pipeline, PipelineDesc, Shader, Texture,
};
use crate::morph::{
    build_block_quads, BlockHandle, BlockLayout, ExpandableTextureArray,
    FreeListTracker, ListenerKey, QuadMesh, QuadPlacement, TexelRect, MAX_QUADS,
};
use crate::utils::IndexPool;
use crate::{skinning_bail, skinning_debug, skinning_info, skinning_trace, skinning_warn};

const SOURCE: &str = "skinning::MorphTargetCombiner";

const WEIGHT_SIZE: u64 = std::mem::size_of::<f32>() as u64;

bitflags! {
    /// Shader variants of the combine pipeline
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CombineFeatures: u32 {
        /// Morph targets carry tangent deltas
        const HAS_TANGENTS = 1 << 0;
        /// Source deltas are packed 10:10:10:2
        const MORPH_10_10_10_2 = 1 << 1;
    }
}

impl CombineFeatures {
    /// Preprocessor defines enabling these features
    pub fn defines(&self) -> Vec<&'static str> {
        let mut defines = Vec::new();
        if self.contains(Self::HAS_TANGENTS) {
            defines.push("OVR_HAS_TANGENTS");
        }
        if self.contains(Self::MORPH_10_10_10_2) {
            defines.push("OVR_MORPH_10_10_10_2");
        }
        defines
    }
}

// ===== DESCRIPTORS =====

/// Descriptor for creating a MorphTargetCombiner
pub struct CombinerDesc {
    pub device: Arc<Mutex<dyn GraphicsDevice>>,
    /// Combine shader program
    pub shader: Arc<dyn Shader>,
    /// Morph-target source texture array
    pub source: Arc<ExpandableTextureArray>,
    /// Per-block value ranges used to decode packed deltas
    pub ranges: Vec<Vec4>,
    pub features: CombineFeatures,
    /// Capacity of the quad layout
    pub max_quads: u32,
}

impl CombinerDesc {
    /// Descriptor with no ranges, no features and the full quad capacity
    pub fn new(
        device: Arc<Mutex<dyn GraphicsDevice>>,
        shader: Arc<dyn Shader>,
        source: Arc<ExpandableTextureArray>,
    ) -> Self {
        Self {
            device,
            shader,
            source,
            ranges: Vec::new(),
            features: CombineFeatures::empty(),
            max_quads: MAX_QUADS,
        }
    }
}

/// One mesh's morph targets to place in the combined draw
#[derive(Debug, Clone, Copy)]
pub struct MorphTargetBlockDesc {
    /// Rectangle of the first morph target in the source array
    pub texel_rect_in_source: TexelRect,
    /// Slice holding the first morph target; targets are on consecutive slices
    pub source_slice: u32,
    pub source_size: UVec2,
    /// Where the combined result lands in the output texture
    pub texel_rect_in_output: TexelRect,
    pub output_size: UVec2,
    pub num_morph_targets: u32,
}

impl MorphTargetBlockDesc {
    fn placement(&self) -> QuadPlacement {
        QuadPlacement {
            texel_rect_in_source: self.texel_rect_in_source,
            source_slice: self.source_slice,
            source_size: self.source_size,
            texel_rect_in_output: self.texel_rect_in_output,
            output_size: self.output_size,
        }
    }
}

/// Bookkeeping for one live block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockData {
    /// Compact index stamped into the block's quads
    pub block_index: u32,
    /// First weight of the block in the weights buffer
    pub index_in_weights_buffer: u32,
    pub num_morph_targets: u32,
}

// ===== COMBINER =====

pub struct MorphTargetCombiner {
    device: Arc<Mutex<dyn GraphicsDevice>>,
    pipeline: Option<Arc<dyn Pipeline>>,

    source: Arc<ExpandableTextureArray>,
    source_listener: Option<ListenerKey>,
    /// Texture bound at draw time, kept current by the source listener
    bound_source: Arc<RwLock<Arc<dyn Texture>>>,
    ranges_buffer: Option<Arc<dyn Buffer>>,

    mesh: QuadMesh,
    mesh_layout: FreeListTracker,
    block_indices: IndexPool,
    handle_to_block_data: FxHashMap<BlockHandle, BlockData>,

    /// CPU shadow of `weights_buffer`
    weights: Vec<f32>,
    weights_buffer: Option<Arc<dyn Buffer>>,

    block_enabled: bool,
    dirty: bool,
    destroyed: bool,
}

impl MorphTargetCombiner {
    pub fn new(desc: CombinerDesc) -> Result<Self> {
        if desc.max_quads == 0 || desc.max_quads > MAX_QUADS {
            skinning_bail!(SOURCE, "max_quads must be in 1..={}, got {}", MAX_QUADS, desc.max_quads);
        }

        let (pipeline, ranges_buffer) = {
            let mut device = lock_device(&desc.device)?;

            let pipeline = device.create_pipeline(PipelineDesc {
                label: "morph_target_combine".to_string(),
                shader: desc.shader.clone(),
                defines: desc.features.defines(),
                additive_blend: true,
            })?;

            let ranges_buffer = if desc.ranges.is_empty() {
                None
            } else {
                let bytes: &[u8] = bytemuck::cast_slice(&desc.ranges);
                let buffer = device.create_buffer(BufferDesc {
                    label: "morph_target_ranges".to_string(),
                    size: bytes.len() as u64,
                    usage: BufferUsage::Uniform,
                    mode: BufferMode::Immutable,
                })?;
                buffer.update(0, bytes)?;
                Some(buffer)
            };

            (pipeline, ranges_buffer)
        };

        let bound_source = Arc::new(RwLock::new(desc.source.texture()));
        let listener_target = bound_source.clone();
        let source_listener = desc.source.subscribe(move |texture| {
            let mut bound = match listener_target.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *bound = texture.clone();
            skinning_info!(SOURCE, "Rebound morph source texture ({} layers)",
                texture.info().array_layers);
        });

        skinning_info!(SOURCE, "Created morph-target combiner: {} quads max, features {:?}",
            desc.max_quads, desc.features);

        Ok(Self {
            device: desc.device,
            pipeline: Some(pipeline),
            source: desc.source,
            source_listener: Some(source_listener),
            bound_source,
            ranges_buffer,
            mesh: QuadMesh::new(),
            mesh_layout: FreeListTracker::new(desc.max_quads),
            block_indices: IndexPool::new(),
            handle_to_block_data: FxHashMap::default(),
            weights: Vec::new(),
            weights_buffer: None,
            block_enabled: false,
            dirty: false,
            destroyed: false,
        })
    }

    // ===== BLOCKS =====

    /// Place a block of morph targets into the combined mesh
    ///
    /// Returns `Ok(None)` for an empty block or when the quad layout has no
    /// contiguous run large enough. The block's weights start at zero.
    pub fn add_morph_targets_to_mesh(&mut self, desc: &MorphTargetBlockDesc) -> Result<Option<BlockHandle>> {
        if self.destroyed {
            skinning_bail!(SOURCE, "Cannot add morph targets to a destroyed combiner");
        }

        let count = desc.num_morph_targets;
        if count == 0 {
            skinning_warn!(SOURCE, "Ignoring morph-target block with no morph targets");
            return Ok(None);
        }
        if !desc.texel_rect_in_source.fits_in(desc.source_size) {
            skinning_bail!(SOURCE, "Source rect {:?} does not fit in {}x{}",
                desc.texel_rect_in_source, desc.source_size.x, desc.source_size.y);
        }
        if !desc.texel_rect_in_output.fits_in(desc.output_size) {
            skinning_bail!(SOURCE, "Output rect {:?} does not fit in {}x{}",
                desc.texel_rect_in_output, desc.output_size.x, desc.output_size.y);
        }

        let handle = match self.mesh_layout.track_block(count) {
            Some(handle) => handle,
            None => {
                skinning_warn!(SOURCE,
                    "No room for {} morph targets ({} of {} quads free, largest run {})",
                    count, self.mesh_layout.free_capacity(), self.mesh_layout.capacity(),
                    self.mesh_layout.largest_free_range());
                return Ok(None);
            }
        };
        let layout = match self.mesh_layout.layout_for_block(handle) {
            Some(layout) => layout,
            None => skinning_bail!(SOURCE, "Tracked block has no layout"),
        };
        let block_index = self.block_indices.acquire();

        match self.place_block(desc, layout, block_index) {
            Ok(block_data) => {
                self.handle_to_block_data.insert(handle, block_data);
                self.block_enabled = true;
                skinning_debug!(SOURCE, "Added block {} with {} morph targets at quad {}",
                    block_index, count, layout.start_index);
                Ok(Some(handle))
            }
            Err(err) => {
                self.mesh_layout.free_block(handle);
                self.block_indices.release(block_index);
                Err(err)
            }
        }
    }

    fn place_block(&mut self, desc: &MorphTargetBlockDesc, layout: BlockLayout, block_index: u32) -> Result<BlockData> {
        let device = self.device.clone();
        let mut device = lock_device(&device)?;

        if layout.end() > self.mesh.quad_count() {
            self.mesh.expand_to_fit_quads(&mut *device, layout.end())?;
        }

        let first_weight = self.weights.len() as u32;
        self.grow_weights(&mut *device, desc.num_morph_targets)?;

        let quads = build_block_quads(&desc.placement(), desc.num_morph_targets, block_index, first_weight);
        self.mesh.write_quads(layout.start_index, &quads)?;

        Ok(BlockData {
            block_index,
            index_in_weights_buffer: first_weight,
            num_morph_targets: desc.num_morph_targets,
        })
    }

    /// Append `additional` zeroed weights, reallocating the GPU buffer
    fn grow_weights(&mut self, device: &mut dyn GraphicsDevice, additional: u32) -> Result<()> {
        let old_len = self.weights.len();
        let new_len = old_len + additional as usize;

        let buffer = device.create_buffer(BufferDesc {
            label: "morph_weights".to_string(),
            size: new_len as u64 * WEIGHT_SIZE,
            usage: BufferUsage::Storage,
            mode: BufferMode::SubUpdates,
        })?;

        self.weights.resize(new_len, 0.0);
        if let Err(err) = buffer.update(0, bytemuck::cast_slice(&self.weights)) {
            self.weights.truncate(old_len);
            return Err(err);
        }
        self.weights_buffer = Some(buffer);

        skinning_debug!(SOURCE, "Grew weights buffer from {} to {} weights", old_len, new_len);
        Ok(())
    }

    /// Remove a block, returning false if the handle is unknown
    ///
    /// The block's weights are zeroed and its quads collapsed so it stops
    /// contributing immediately. Its weight range is not reused. On `Err`
    /// the block stays registered and removal can be retried.
    pub fn remove_morph_target_block(&mut self, handle: BlockHandle) -> Result<bool> {
        let block_data = match self.handle_to_block_data.get(&handle) {
            Some(block_data) => *block_data,
            None => return Ok(false),
        };
        let layout = match self.mesh_layout.layout_for_block(handle) {
            Some(layout) => layout,
            None => skinning_bail!(SOURCE, "Block {} has no layout", block_data.block_index),
        };

        self.mesh.collapse_quads(layout.start_index, layout.length)?;
        let range = weight_range(&block_data);
        self.weights[range.clone()].fill(0.0);
        self.upload_weights(range)?;

        self.handle_to_block_data.remove(&handle);
        self.mesh_layout.free_block(handle);
        self.block_indices.release(block_data.block_index);

        self.dirty = true;
        skinning_debug!(SOURCE, "Removed block {} ({} quads at {})",
            block_data.block_index, layout.length, layout.start_index);
        Ok(true)
    }

    // ===== WEIGHTS =====

    /// Writable weights of a block, one per morph target
    ///
    /// Call `morph_weights_update_complete` afterwards to upload them.
    pub fn morph_weights_mut(&mut self, handle: BlockHandle) -> Option<&mut [f32]> {
        let block_data = self.handle_to_block_data.get(&handle)?;
        let range = weight_range(block_data);
        self.weights.get_mut(range)
    }

    pub fn morph_weights(&self, handle: BlockHandle) -> Option<&[f32]> {
        let block_data = self.handle_to_block_data.get(&handle)?;
        self.weights.get(weight_range(block_data))
    }

    /// Upload a block's weights and schedule a combine
    ///
    /// Returns false, leaving the combiner clean, for an unknown handle.
    pub fn morph_weights_update_complete(&mut self, handle: BlockHandle) -> Result<bool> {
        let block_data = match self.handle_to_block_data.get(&handle) {
            Some(block_data) => *block_data,
            None => return Ok(false),
        };
        self.upload_weights(weight_range(&block_data))?;
        self.block_enabled = true;
        self.dirty = true;
        skinning_trace!(SOURCE, "Weights of block {} updated", block_data.block_index);
        Ok(true)
    }

    fn upload_weights(&self, range: std::ops::Range<usize>) -> Result<()> {
        match &self.weights_buffer {
            Some(buffer) if !range.is_empty() => buffer.update(
                range.start as u64 * WEIGHT_SIZE,
                bytemuck::cast_slice(&self.weights[range]),
            ),
            _ => Ok(()),
        }
    }

    // ===== DRAW =====

    /// Record the combine draw if anything changed since the last one
    pub fn draw(&mut self, cmd: &mut dyn CommandList) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.force_draw(cmd)
    }

    /// Record the combine draw unconditionally
    ///
    /// Issues one indexed draw over every quad. Returns false when there is
    /// nothing to draw yet.
    pub fn force_draw(&mut self, cmd: &mut dyn CommandList) -> Result<bool> {
        let (pipeline, vertex_buffer, index_buffer, weights_buffer) = match (
            &self.pipeline,
            self.mesh.vertex_buffer(),
            self.mesh.index_buffer(),
            &self.weights_buffer,
        ) {
            (Some(p), Some(v), Some(i), Some(w)) => (p, v, i, w),
            _ => return Ok(false),
        };

        let source = match self.bound_source.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        cmd.bind_pipeline(pipeline)?;
        cmd.bind_texture(0, &source)?;
        cmd.bind_buffer(1, weights_buffer)?;
        if let Some(ranges) = &self.ranges_buffer {
            cmd.bind_buffer(2, ranges)?;
        }
        cmd.bind_vertex_buffer(vertex_buffer, 0)?;
        cmd.bind_index_buffer(index_buffer, 0, IndexType::U16)?;

        let enabled: f32 = if self.block_enabled { 1.0 } else { 0.0 };
        cmd.push_constants(0, bytemuck::bytes_of(&enabled))?;
        cmd.draw_indexed(self.mesh.index_count(), 0, 0)?;

        self.block_enabled = false;
        self.dirty = false;
        Ok(true)
    }

    // ===== ACCESSORS =====

    /// Whether a block of `num_morph_targets` would currently be placed
    pub fn can_fit(&self, num_morph_targets: u32) -> bool {
        !self.destroyed && self.mesh_layout.can_fit(num_morph_targets)
    }

    pub fn block_count(&self) -> usize { self.handle_to_block_data.len() }

    /// Quads in the shared mesh, live or collapsed
    pub fn quad_count(&self) -> u32 { self.mesh.quad_count() }

    /// Weights ever allocated; the buffer never shrinks
    pub fn weight_count(&self) -> u32 { self.weights.len() as u32 }

    pub fn is_dirty(&self) -> bool { self.dirty }

    /// Texture the next draw will sample
    pub fn source_texture(&self) -> Arc<dyn Texture> {
        match self.bound_source.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn weights_buffer(&self) -> Option<&Arc<dyn Buffer>> { self.weights_buffer.as_ref() }

    pub fn block_data(&self, handle: BlockHandle) -> Option<&BlockData> {
        self.handle_to_block_data.get(&handle)
    }

    pub fn block_layout(&self, handle: BlockHandle) -> Option<BlockLayout> {
        self.mesh_layout.layout_for_block(handle)
    }

    pub fn mesh(&self) -> &QuadMesh { &self.mesh }

    // ===== TEARDOWN =====

    /// Stop listening to the source array and release GPU resources
    ///
    /// Safe to call more than once; also run on drop.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        if let Some(key) = self.source_listener.take() {
            self.source.unsubscribe(key);
        }
        self.mesh.release();
        self.pipeline = None;
        self.ranges_buffer = None;
        self.weights_buffer = None;
        self.weights.clear();
        self.handle_to_block_data.clear();
        self.block_enabled = false;
        self.dirty = false;

        skinning_info!(SOURCE, "Destroyed morph-target combiner");
    }
}

impl Drop for MorphTargetCombiner {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn weight_range(block_data: &BlockData) -> std::ops::Range<usize> {
    let start = block_data.index_in_weights_buffer as usize;
    start..start + block_data.num_morph_targets as usize
}

fn lock_device(device: &Arc<Mutex<dyn GraphicsDevice>>) -> Result<MutexGuard<'_, dyn GraphicsDevice + 'static>> {
    device.lock().map_err(|_| Error::BackendError("Graphics device lock poisoned".to_string()))
}

#[cfg(test)]
#[path = "morph_target_combiner_tests.rs"]
mod tests;
