/// Mock graphics device for unit tests (no GPU required)
///
/// Buffers keep their bytes in memory and log every update so tests can
/// check exactly which sub-ranges were uploaded. The command list records
/// one string per command.

use std::sync::{Arc, Mutex};
use crate::error::{Error, Result};
use crate::graphics_device::{
    GraphicsDevice, Buffer, BufferDesc, Texture, TextureDesc, TextureInfo,
    TextureFormat, Shader, Pipeline, PipelineDesc, CommandList, IndexType,
};

// ============================================================================
// Mock Buffer
// ============================================================================

#[derive(Debug)]
pub struct MockBuffer {
    pub desc: BufferDesc,
    data: Mutex<Vec<u8>>,
    updates: Mutex<Vec<(u64, usize)>>,
    fail_next_update: Mutex<bool>,
}

impl MockBuffer {
    pub fn new(desc: BufferDesc) -> Self {
        let size = desc.size as usize;
        Self {
            desc,
            data: Mutex::new(vec![0u8; size]),
            updates: Mutex::new(Vec::new()),
            fail_next_update: Mutex::new(false),
        }
    }

    /// Copy of the buffer bytes
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    /// Buffer bytes reinterpreted as f32
    pub fn read_f32s(&self) -> Vec<f32> {
        self.contents()
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Make the next `update` fail with a backend error
    pub fn fail_next_update(&self) {
        *self.fail_next_update.lock().unwrap() = true;
    }

    /// Every `(offset, len)` passed to `update`, in order
    pub fn update_log(&self) -> Vec<(u64, usize)> {
        self.updates.lock().unwrap().clone()
    }
}

impl Buffer for MockBuffer {
    fn size(&self) -> u64 {
        self.desc.size
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        {
            let mut fail = self.fail_next_update.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(Error::BackendError(format!("update of '{}' rejected", self.desc.label)));
            }
        }
        let end = offset as usize + data.len();
        let mut bytes = self.data.lock().unwrap();
        if end > bytes.len() {
            return Err(Error::InvalidResource(format!(
                "update [{}..{}) exceeds buffer '{}' of {} bytes",
                offset, end, self.desc.label, bytes.len()
            )));
        }
        bytes[offset as usize..end].copy_from_slice(data);
        self.updates.lock().unwrap().push((offset, data.len()));
        Ok(())
    }
}

// ============================================================================
// Mock Texture
// ============================================================================

#[derive(Debug)]
pub struct MockTexture {
    pub info: TextureInfo,
    pub label: String,
}

impl MockTexture {
    pub fn new(width: u32, height: u32, array_layers: u32, label: &str) -> Self {
        Self {
            info: TextureInfo {
                width,
                height,
                format: TextureFormat::R16G16B16A16_SFLOAT,
                array_layers,
            },
            label: label.to_string(),
        }
    }
}

impl Texture for MockTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }
}

// ============================================================================
// Mock Shader / Pipeline
// ============================================================================

#[derive(Debug)]
pub struct MockShader {
    pub name: String,
}

impl MockShader {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

impl Shader for MockShader {}

#[derive(Debug)]
pub struct MockPipeline {
    pub label: String,
    pub defines: Vec<&'static str>,
    pub additive_blend: bool,
}

impl Pipeline for MockPipeline {}

// ============================================================================
// Mock GraphicsDevice
// ============================================================================

#[derive(Default)]
pub struct MockGraphicsDevice {
    pub buffers: Vec<Arc<MockBuffer>>,
    pub textures: Vec<Arc<MockTexture>>,
    pub pipelines: Vec<Arc<MockPipeline>>,
    /// `(src layers, dst layers, copied layers)` per copy
    pub layer_copies: Vec<(u32, u32, u32)>,
    /// When set, the next `create_buffer` fails with OutOfMemory
    pub fail_next_buffer: bool,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently created buffer with the given label
    pub fn last_buffer(&self, label: &str) -> Option<Arc<MockBuffer>> {
        self.buffers.iter().rev().find(|b| b.desc.label == label).cloned()
    }

    /// Number of buffers ever created with the given label
    pub fn buffer_count(&self, label: &str) -> usize {
        self.buffers.iter().filter(|b| b.desc.label == label).count()
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn create_buffer(&mut self, desc: BufferDesc) -> Result<Arc<dyn Buffer>> {
        if self.fail_next_buffer {
            self.fail_next_buffer = false;
            return Err(Error::OutOfMemory);
        }
        let buffer = Arc::new(MockBuffer::new(desc));
        self.buffers.push(buffer.clone());
        Ok(buffer)
    }

    fn create_texture(&mut self, desc: TextureDesc) -> Result<Arc<dyn Texture>> {
        let texture = Arc::new(MockTexture {
            info: TextureInfo {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                array_layers: desc.array_layers,
            },
            label: desc.label,
        });
        self.textures.push(texture.clone());
        Ok(texture)
    }

    fn create_pipeline(&mut self, desc: PipelineDesc) -> Result<Arc<dyn Pipeline>> {
        let pipeline = Arc::new(MockPipeline {
            label: desc.label,
            defines: desc.defines,
            additive_blend: desc.additive_blend,
        });
        self.pipelines.push(pipeline.clone());
        Ok(pipeline)
    }

    fn copy_texture_layers(
        &mut self,
        src: &Arc<dyn Texture>,
        dst: &Arc<dyn Texture>,
        layer_count: u32,
    ) -> Result<()> {
        if layer_count > src.info().array_layers || layer_count > dst.info().array_layers {
            return Err(Error::InvalidResource("layer copy out of range".to_string()));
        }
        self.layer_copies.push((src.info().array_layers, dst.info().array_layers, layer_count));
        Ok(())
    }
}

// ============================================================================
// Mock CommandList
// ============================================================================

#[derive(Debug, Default)]
pub struct MockCommandList {
    pub commands: Vec<String>,
    /// Bytes of every push_constants call, in order
    pub pushed: Vec<Vec<u8>>,
}

impl MockCommandList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded commands starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.commands.iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl CommandList for MockCommandList {
    fn bind_pipeline(&mut self, _pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        self.commands.push("bind_pipeline".to_string());
        Ok(())
    }

    fn bind_texture(&mut self, slot: u32, texture: &Arc<dyn Texture>) -> Result<()> {
        self.commands.push(format!("bind_texture:{}:{}", slot, texture.info().array_layers));
        Ok(())
    }

    fn bind_buffer(&mut self, slot: u32, buffer: &Arc<dyn Buffer>) -> Result<()> {
        self.commands.push(format!("bind_buffer:{}:{}", slot, buffer.size()));
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64) -> Result<()> {
        self.commands.push(format!("bind_vertex_buffer:{}:{}", buffer.size(), offset));
        Ok(())
    }

    fn bind_index_buffer(&mut self, _buffer: &Arc<dyn Buffer>, offset: u64, index_type: IndexType) -> Result<()> {
        self.commands.push(format!("bind_index_buffer:{:?}:{}", index_type, offset));
        Ok(())
    }

    fn push_constants(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        self.commands.push(format!("push_constants:{}:{}", offset, data.len()));
        self.pushed.push(data.to_vec());
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()> {
        self.commands.push(format!("draw_indexed:{}:{}:{}", index_count, first_index, vertex_offset));
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
