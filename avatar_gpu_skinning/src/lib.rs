/*!
# Avatar GPU Skinning

GPU-side buffer management for skinned and morphed avatars.

The host renderer implements the `GraphicsDevice`, `Buffer`, `Texture` and
`CommandList` traits; this crate decides what lives in which buffer and
records the draw commands.

## Architecture

- **JointRingPool**: multi-buffered joint-matrix uploads, one ring region per frame
- **FreeListTracker**: first-fit placement of variable-size blocks
- **MorphTargetCombiner**: every mesh's morph targets blended in one draw call
- **ExpandableTextureArray**: morph-target source array with resize listeners
*/

// Internal modules
mod error;
mod runtime;
mod utils;
pub mod log;
pub mod graphics_device;
pub mod frame_ring;
pub mod morph;

// Main skinning namespace module
pub mod skinning {
    // Error types
    pub use crate::error::{Error, Result};

    // Global logger dispatch
    pub use crate::runtime::Runtime;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // GPU API surface implemented by the host
    pub mod device {
        pub use crate::graphics_device::*;
    }

    // Joint upload ring
    pub mod frame_ring {
        pub use crate::frame_ring::*;
    }

    // Morph-target combining
    pub mod morph {
        pub use crate::morph::*;
    }
}

// Re-export math library at crate root
pub use glam;
