//! Error types for reframe.

use crate::backend::StageKind;
use crate::format::PixelFormat;
use thiserror::Error;

/// Result type alias using reframe's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for transform operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Requested pixel-format label is not in the format table.
    #[error("unknown pixel format label: {0}")]
    UnknownFormat(String),

    /// Width or height is zero.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// The format's color model carries no stride/elevation rule.
    #[error("no row-padding rule for {format} (packed-RGBX color model)")]
    NoLayoutRule {
        /// The format that cannot be resolved.
        format: PixelFormat,
    },

    /// A backend stage could not be instantiated.
    #[error("failed to build {kind} stage: {reason}")]
    GraphBuild {
        /// The stage that failed to build.
        kind: StageKind,
        /// Backend-reported reason.
        reason: String,
    },

    /// The backend could not link the stages into a graph.
    #[error("failed to link transform stages: {0}")]
    Link(String),

    /// Submitting the source buffer to the source stage failed.
    #[error("failed to submit source buffer: {0}")]
    Push(String),

    /// A stage reported an unrecoverable fault while the graph was running.
    #[error("transform backend error: {0}")]
    Backend(String),

    /// The captured output buffer disagrees with the computed expected size.
    #[error("output buffer size mismatch: backend produced {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// Independently computed expected byte count.
        expected: usize,
        /// Byte count the backend actually produced.
        actual: usize,
    },

    /// The padded row layout disagrees with the size table.
    #[error("padded layout disagrees with size table: rows give {computed} bytes, table gives {expected}")]
    LayoutMismatch {
        /// Byte count derived from row length and row count.
        computed: usize,
        /// Byte count from the per-format size table.
        expected: usize,
    },

    /// The caller's source buffer holds fewer bytes than the format needs.
    #[error("source buffer too small: need {expected} bytes, got {actual}")]
    ShortSourceBuffer {
        /// Bytes the resolved source format requires.
        expected: usize,
        /// Bytes the caller supplied.
        actual: usize,
    },

    /// The caller's destination buffer cannot hold the validated output.
    #[error("destination buffer too small: need {expected} bytes, got {actual}")]
    ShortDestinationBuffer {
        /// Bytes the validated output occupies.
        expected: usize,
        /// Bytes the caller supplied.
        actual: usize,
    },
}

/// Coarse error classes for callers that surface numeric codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The caller violated the contract (bad label, dimensions, buffers).
    InvalidArgument,
    /// Memory could not be obtained. Not produced by this crate itself
    /// (allocator failures abort); present for callers that fold their own
    /// allocation step into the same code space.
    Allocation,
    /// The backend or the run-time machinery failed.
    Internal,
}

impl Error {
    /// Map this error onto the coarse category surfaced at the boundary.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnknownFormat(_)
            | Error::InvalidDimensions { .. }
            | Error::NoLayoutRule { .. }
            | Error::ShortSourceBuffer { .. }
            | Error::ShortDestinationBuffer { .. } => ErrorCategory::InvalidArgument,
            Error::GraphBuild { .. }
            | Error::Link(_)
            | Error::Push(_)
            | Error::Backend(_)
            | Error::SizeMismatch { .. }
            | Error::LayoutMismatch { .. } => ErrorCategory::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::UnknownFormat("FOO".into());
        assert_eq!(err.to_string(), "unknown pixel format label: FOO");

        let err = Error::SizeMismatch {
            expected: 76032,
            actual: 76000,
        };
        assert_eq!(
            err.to_string(),
            "output buffer size mismatch: backend produced 76000 bytes, expected 76032"
        );
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(
            Error::UnknownFormat("FOO".into()).category(),
            ErrorCategory::InvalidArgument
        );
        assert_eq!(
            Error::InvalidDimensions {
                width: 0,
                height: 1
            }
            .category(),
            ErrorCategory::InvalidArgument
        );
        assert_eq!(
            Error::Backend("stage fault".into()).category(),
            ErrorCategory::Internal
        );
        assert_eq!(
            Error::SizeMismatch {
                expected: 1,
                actual: 2
            }
            .category(),
            ErrorCategory::Internal
        );
    }
}
