/// Texture trait, texture descriptor, and texture info

/// Texel format of a texture array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    R8G8B8A8_UNORM,
    R16G16B16A16_SFLOAT,
    R32G32B32A32_SFLOAT,
    /// Packed signed 10:10:10:2 morph deltas
    A2B10G10R10_SNORM,
}

/// Descriptor for creating a texture (array)
#[derive(Debug, Clone)]
pub struct TextureDesc {
    /// Debug label
    pub label: String,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Texel format
    pub format: TextureFormat,
    /// Number of array layers (1 = simple 2D texture)
    pub array_layers: u32,
}

/// Read-only properties of a created texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub array_layers: u32,
}

impl TextureInfo {
    /// Returns true if this texture is a texture array (array_layers > 1)
    pub fn is_array(&self) -> bool {
        self.array_layers > 1
    }
}

/// Texture resource trait
///
/// Implemented by the host renderer's texture type.
pub trait Texture: Send + Sync {
    /// Get the read-only properties of this texture
    fn info(&self) -> &TextureInfo;
}
