/// Pipeline trait and pipeline descriptor

use std::sync::Arc;
use crate::graphics_device::Shader;

/// Descriptor for creating a pipeline from a shader and a set of
/// preprocessor defines (keyword variants)
#[derive(Clone)]
pub struct PipelineDesc {
    /// Debug label
    pub label: String,
    /// Shader program
    pub shader: Arc<dyn Shader>,
    /// Enabled keyword defines
    pub defines: Vec<&'static str>,
    /// Additive blending into the bound target
    pub additive_blend: bool,
}

/// Pipeline resource trait
pub trait Pipeline: Send + Sync {}
