/// Shared quad geometry of the morph-target combiner.
///
/// One quad per morph-target slot. Each quad covers the block's rectangle
/// in the output texture (in clip space) and samples the same rectangle
/// of one slice of the morph source texture array. The combine pipeline
/// blends additively, so drawing all quads of a block sums its weighted
/// morph-target deltas into the output rectangle.
///
/// Layout per quad: 4 vertices, 6 `u16` indices. The 16-bit index format
/// bounds the mesh to `MAX_QUADS` quads.

use std::sync::Arc;
use bytemuck::{Pod, Zeroable};
use glam::UVec2;
use crate::error::Result;
use crate::graphics_device::{Buffer, BufferDesc, BufferMode, BufferUsage, GraphicsDevice};
use crate::{skinning_bail, skinning_debug};

pub const NUM_VERTS_PER_QUAD: u32 = 4;
pub const NUM_INDICES_PER_QUAD: u32 = 6;

/// Largest quad count addressable with 16-bit indices
pub const MAX_QUADS: u32 = u16::MAX as u32 / NUM_VERTS_PER_QUAD;

const SOURCE: &str = "skinning::QuadMesh";

// ===== TEXEL RECT =====

/// Axis-aligned rectangle in texels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TexelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TexelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Whether the rectangle is non-empty and lies inside `size`
    pub fn fits_in(&self, size: UVec2) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= size.x as u64
            && self.y as u64 + self.height as u64 <= size.y as u64
    }

    /// `[min, max]` corners normalized to `0..1`
    fn normalized(&self, size: UVec2) -> [[f32; 2]; 2] {
        let w = size.x as f32;
        let h = size.y as f32;
        [
            [self.x as f32 / w, self.y as f32 / h],
            [(self.x + self.width) as f32 / w, (self.y + self.height) as f32 / h],
        ]
    }
}

// ===== VERTEX =====

/// Vertex of a combiner quad
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CombinerVertex {
    /// Clip-space corner of the output rectangle (z = 0)
    pub position: [f32; 3],
    /// Normalized corner of the source rectangle
    pub uv: [f32; 2],
    /// (source slice, weight index, block index, unused)
    pub params: [f32; 4],
}

const VERTEX_SIZE: u64 = std::mem::size_of::<CombinerVertex>() as u64;

/// The four vertices of one quad
pub type Quad = [CombinerVertex; NUM_VERTS_PER_QUAD as usize];

/// Where a block's quads read from and write to
#[derive(Debug, Clone, Copy)]
pub struct QuadPlacement {
    pub texel_rect_in_source: TexelRect,
    /// Slice of the first morph target; target `j` reads `source_slice + j`
    pub source_slice: u32,
    pub source_size: UVec2,
    pub texel_rect_in_output: TexelRect,
    pub output_size: UVec2,
}

/// Build one quad per morph target of a block
///
/// Morph target `j` reads slice `source_slice + j` and weight
/// `first_weight + j`.
pub fn build_block_quads(
    placement: &QuadPlacement,
    num_morph_targets: u32,
    block_index: u32,
    first_weight: u32,
) -> Vec<Quad> {
    let [uv_min, uv_max] = placement.texel_rect_in_source.normalized(placement.source_size);
    let [out_min, out_max] = placement.texel_rect_in_output.normalized(placement.output_size);
    let clip = |v: f32| v * 2.0 - 1.0;
    let (x0, y0) = (clip(out_min[0]), clip(out_min[1]));
    let (x1, y1) = (clip(out_max[0]), clip(out_max[1]));

    (0..num_morph_targets)
        .map(|j| {
            let params = [
                (placement.source_slice + j) as f32,
                (first_weight + j) as f32,
                block_index as f32,
                0.0,
            ];
            let corner = |x: f32, y: f32, u: f32, v: f32| CombinerVertex {
                position: [x, y, 0.0],
                uv: [u, v],
                params,
            };
            [
                corner(x0, y0, uv_min[0], uv_min[1]),
                corner(x1, y0, uv_max[0], uv_min[1]),
                corner(x1, y1, uv_max[0], uv_max[1]),
                corner(x0, y1, uv_min[0], uv_max[1]),
            ]
        })
        .collect()
}

// ===== MESH =====

/// CPU geometry mirrored into a vertex and an index buffer
#[derive(Default)]
pub struct QuadMesh {
    vertices: Vec<CombinerVertex>,
    indices: Vec<u16>,
    vertex_buffer: Option<Arc<dyn Buffer>>,
    index_buffer: Option<Arc<dyn Buffer>>,
}

impl QuadMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quad_count(&self) -> u32 {
        self.vertices.len() as u32 / NUM_VERTS_PER_QUAD
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn vertices(&self) -> &[CombinerVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    pub fn vertex_buffer(&self) -> Option<&Arc<dyn Buffer>> {
        self.vertex_buffer.as_ref()
    }

    pub fn index_buffer(&self) -> Option<&Arc<dyn Buffer>> {
        self.index_buffer.as_ref()
    }

    /// Quad `index` as currently stored
    pub fn quad(&self, index: u32) -> Option<&[CombinerVertex]> {
        let start = index.checked_mul(NUM_VERTS_PER_QUAD)? as usize;
        self.vertices.get(start..start + NUM_VERTS_PER_QUAD as usize)
    }

    /// Grow to exactly `quad_count` quads
    ///
    /// New quads are degenerate until written. Both GPU buffers are
    /// recreated at the new size and re-uploaded. Does nothing if the mesh
    /// already holds that many quads.
    pub fn expand_to_fit_quads(&mut self, device: &mut dyn GraphicsDevice, quad_count: u32) -> Result<()> {
        let old_count = self.quad_count();
        if quad_count <= old_count {
            return Ok(());
        }
        if quad_count > MAX_QUADS {
            skinning_bail!(SOURCE, "{} quads exceed the 16-bit index limit of {}", quad_count, MAX_QUADS);
        }

        let vertex_count = quad_count * NUM_VERTS_PER_QUAD;
        let index_count = quad_count * NUM_INDICES_PER_QUAD;

        let vertex_buffer = device.create_buffer(BufferDesc {
            label: "combiner_vertices".to_string(),
            size: vertex_count as u64 * VERTEX_SIZE,
            usage: BufferUsage::Vertex,
            mode: BufferMode::Dynamic,
        })?;
        let index_buffer = device.create_buffer(BufferDesc {
            label: "combiner_indices".to_string(),
            size: index_count as u64 * std::mem::size_of::<u16>() as u64,
            usage: BufferUsage::Index,
            mode: BufferMode::Immutable,
        })?;

        self.vertices.resize(vertex_count as usize, CombinerVertex::zeroed());
        for quad in old_count..quad_count {
            let base = (quad * NUM_VERTS_PER_QUAD) as u16;
            self.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        vertex_buffer.update(0, bytemuck::cast_slice(&self.vertices))?;
        index_buffer.update(0, bytemuck::cast_slice(&self.indices))?;
        self.vertex_buffer = Some(vertex_buffer);
        self.index_buffer = Some(index_buffer);

        skinning_debug!(SOURCE, "Expanded quad mesh from {} to {} quads", old_count, quad_count);
        Ok(())
    }

    /// Overwrite quads starting at `first_quad` and upload just that range
    pub fn write_quads(&mut self, first_quad: u32, quads: &[Quad]) -> Result<()> {
        let end_quad = first_quad as u64 + quads.len() as u64;
        if end_quad > self.quad_count() as u64 {
            skinning_bail!(SOURCE, "Quads [{}..{}) are outside the mesh ({} quads)",
                first_quad, end_quad, self.quad_count());
        }

        let start = (first_quad * NUM_VERTS_PER_QUAD) as usize;
        for (i, quad) in quads.iter().enumerate() {
            let at = start + i * NUM_VERTS_PER_QUAD as usize;
            self.vertices[at..at + NUM_VERTS_PER_QUAD as usize].copy_from_slice(quad);
        }
        self.upload_vertices(start, quads.len() * NUM_VERTS_PER_QUAD as usize)
    }

    /// Make `count` quads degenerate so they rasterize nothing
    pub fn collapse_quads(&mut self, first_quad: u32, count: u32) -> Result<()> {
        let quads = vec![[CombinerVertex::zeroed(); NUM_VERTS_PER_QUAD as usize]; count as usize];
        self.write_quads(first_quad, &quads)
    }

    /// Drop the GPU buffers and the CPU geometry
    pub fn release(&mut self) {
        self.vertex_buffer = None;
        self.index_buffer = None;
        self.vertices.clear();
        self.indices.clear();
    }

    fn upload_vertices(&self, first_vertex: usize, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        match &self.vertex_buffer {
            Some(buffer) => buffer.update(
                first_vertex as u64 * VERTEX_SIZE,
                bytemuck::cast_slice(&self.vertices[first_vertex..first_vertex + count]),
            ),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "quad_mesh_tests.rs"]
mod tests;
