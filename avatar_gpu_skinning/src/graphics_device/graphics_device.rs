/// GraphicsDevice trait - resource factory implemented by the host renderer

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{
    Buffer, BufferDesc, Pipeline, PipelineDesc, Texture, TextureDesc,
};

/// Factory for the GPU resources the skinning components own
///
/// Shared as `Arc<Mutex<dyn GraphicsDevice>>` between the joint ring pool,
/// the morph-target combiner and the texture array owner.
pub trait GraphicsDevice: Send + Sync {
    /// Create a GPU buffer
    fn create_buffer(&mut self, desc: BufferDesc) -> Result<Arc<dyn Buffer>>;

    /// Create a texture (array)
    fn create_texture(&mut self, desc: TextureDesc) -> Result<Arc<dyn Texture>>;

    /// Create a graphics pipeline from a shader and its keyword defines
    fn create_pipeline(&mut self, desc: PipelineDesc) -> Result<Arc<dyn Pipeline>>;

    /// Copy the first `layer_count` layers of `src` into `dst`
    ///
    /// Both textures must share width, height and format.
    fn copy_texture_layers(
        &mut self,
        src: &Arc<dyn Texture>,
        dst: &Arc<dyn Texture>,
        layer_count: u32,
    ) -> Result<()>;
}
