//! Coverage renderer error types

use thiserror::Error;

use crate::gpu::BufferKind;

/// Resource failures hit while preparing a flush
///
/// None of these escape the flush API; they are logged and the affected
/// paths are skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoverageError {
    /// The backend could not allocate a buffer
    #[error("Failed to allocate {kind:?} buffer of {size} bytes")]
    BufferAllocation { kind: BufferKind, size: usize },

    /// Copying data into a buffer failed
    #[error("Failed to upload {size} bytes into {kind:?} buffer")]
    BufferUpload { kind: BufferKind, size: usize },

    /// The backend could not allocate an atlas render target
    #[error("Failed to allocate {width}x{height} render target")]
    RenderTargetAllocation { width: i32, height: i32 },

    /// A path is larger than the biggest atlas the device supports
    #[error("Path of {width}x{height} pixels exceeds the maximum atlas size {max_size}")]
    AtlasTooLarge {
        width: i32,
        height: i32,
        max_size: i32,
    },
}

/// Result type for coverage renderer operations
pub type Result<T> = std::result::Result<T, CoverageError>;
