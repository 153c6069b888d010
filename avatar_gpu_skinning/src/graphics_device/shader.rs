/// Compiled shader module provided by the host renderer.
///
/// Opaque to this crate: the combiner only forwards it to
/// `GraphicsDevice::create_pipeline` together with its defines.
pub trait Shader: Send + Sync {}
