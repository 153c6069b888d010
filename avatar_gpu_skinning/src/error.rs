//! Error types for the avatar GPU-skinning library
//!
//! Capacity exhaustion and unknown handles are not errors here: they are
//! reported through `Option` / `bool` returns. `Error` covers descriptor
//! validation and failures reported by the graphics device.

use std::fmt;

/// Result type for skinning operations
pub type Result<T> = std::result::Result<T, Error>;

/// Skinning library errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (device lock poisoned, upload rejected, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource or descriptor (buffer, texture, block, etc.)
    InvalidResource(String),

    /// Initialization failed (pool, combiner, pipeline)
    InitializationFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ===== ERROR MACROS =====

/// Log an ERROR and build an `Error::InvalidResource` with the same message
///
/// # Example
///
/// ```ignore
/// let layout = tracker.layout_for_block(handle)
///     .ok_or_else(|| skinning_err!("skinning::Combiner", "Unknown block {:?}", handle))?;
/// ```
#[macro_export]
macro_rules! skinning_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::skinning_error!($source, "{}", message);
        $crate::skinning::Error::InvalidResource(message)
    }};
}

/// Log an ERROR and return early with `Err(Error::InvalidResource)`
///
/// # Example
///
/// ```ignore
/// if desc.max_joints == 0 {
///     skinning_bail!("skinning::JointRingPool", "max_joints must be non-zero");
/// }
/// ```
#[macro_export]
macro_rules! skinning_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::skinning_err!($source, $($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
