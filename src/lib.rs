//! # Reframe
//!
//! One-shot raster image conversion: pixel format, resolution, and
//! rotation/flip in a single synchronous transform.
//!
//! Reframe is the format/layout engine and orchestration around an opaque
//! transform backend. It knows how to classify pixel formats, derive padded
//! layouts (stride/elevation), compute exact buffer sizes, repack tight
//! frames into padded ones, and drive a five-stage transform graph
//! (source → convert → scale → flip → sink) from setup to a validated,
//! copied-out output frame. The pixel math itself lives behind the
//! [`backend::Backend`] trait.
//!
//! ## Quick Start
//!
//! ```rust
//! use reframe::prelude::*;
//! use reframe::backend::testing::LoopbackBackend;
//!
//! // A real deployment plugs in a pixel-processing backend; the loopback
//! // backend echoes frames and is good enough to show the flow.
//! let mut backend = LoopbackBackend::producing(76_032);
//!
//! let request = ConvertRequest {
//!     input: PixelFormat::I420,
//!     src_width: 176,
//!     src_height: 144,
//!     output: PixelFormat::Rgb888,
//!     dst_width: 176,
//!     dst_height: 144,
//!     method: FlipMethod::Identity,
//! };
//! let src = vec![0u8; PixelFormat::I420.buffer_size(176, 144)];
//! let rgb = convert(&mut backend, &request, &src)?;
//! assert_eq!(rgb.len(), 76_032);
//! # Ok::<(), reframe::Error>(())
//! ```
//!
//! ## Concurrency
//!
//! [`job::TransformJob::run`] blocks its calling thread; each job owns a
//! private event channel and graph, so jobs on separate threads do not
//! interfere. Backend runtime initialization, if any, is process-wide and
//! must happen before the first job.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod convert;
pub mod error;
pub mod format;
pub mod job;
pub mod repack;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::backend::{Backend, FlipMethod, Graph, Stage, StageKind};
    pub use crate::convert::{ConvertRequest, convert};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::format::{ColorModel, ImageFormat, PixelFormat, VideoCaps};
    pub use crate::job::{JobState, TransformJob};
}

pub use error::{Error, Result};
