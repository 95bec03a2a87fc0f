//! One-shot conversion entry point.
//!
//! [`convert`] is the boundary helper over [`TransformJob`]: it resolves
//! both formats, sizes and allocates the destination, runs one job and
//! returns the copied bytes. Callers that manage their own destination
//! buffers use [`TransformJob`] directly.

use crate::backend::{Backend, FlipMethod};
use crate::error::Result;
use crate::format::{ImageFormat, PixelFormat};
use crate::job::{self, TransformJob};

/// Parameters of a one-shot conversion.
///
/// Labels arrive through [`PixelFormat::from_label`] and rotation codes
/// through [`FlipMethod::from_code`] when the caller speaks the wire
/// vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvertRequest {
    /// Source pixel format.
    pub input: PixelFormat,
    /// Source width in pixels.
    pub src_width: u32,
    /// Source height in pixels.
    pub src_height: u32,
    /// Destination pixel format.
    pub output: PixelFormat,
    /// Destination width in pixels.
    pub dst_width: u32,
    /// Destination height in pixels.
    pub dst_height: u32,
    /// Rotation/flip to apply.
    pub method: FlipMethod,
}

/// Convert one frame, allocating the destination buffer.
///
/// Returns the output frame, truncated to the bytes the job actually
/// copied. An empty vector means the backend finished without producing a
/// frame (see [`TransformJob::run`]).
///
/// # Example
///
/// ```rust
/// use reframe::backend::FlipMethod;
/// use reframe::backend::testing::LoopbackBackend;
/// use reframe::convert::{ConvertRequest, convert};
/// use reframe::format::PixelFormat;
///
/// let mut backend = LoopbackBackend::producing(50 * 50 * 4);
/// let request = ConvertRequest {
///     input: PixelFormat::Rgb888,
///     src_width: 100,
///     src_height: 75,
///     output: PixelFormat::Rgba8888,
///     dst_width: 50,
///     dst_height: 50,
///     method: FlipMethod::Rotate180,
/// };
/// let src = vec![0u8; PixelFormat::Rgb888.buffer_size(100, 75)];
/// let out = convert(&mut backend, &request, &src).unwrap();
/// assert_eq!(out.len(), 10_000);
/// ```
pub fn convert<B: Backend + ?Sized>(
    backend: &mut B,
    request: &ConvertRequest,
    source: &[u8],
) -> Result<Vec<u8>> {
    let input = ImageFormat::resolve_input(request.input, request.src_width, request.src_height)?;
    let output = ImageFormat::resolve_output(
        request.output,
        request.dst_width,
        request.dst_height,
        &input,
    )?;
    tracing::info!(
        "convert {} {}x{} -> {} {}x{}, flip {:?}",
        request.input,
        request.src_width,
        request.src_height,
        request.output,
        request.dst_width,
        request.dst_height,
        request.method
    );

    // Padding propagation can push the copied frame past the block size
    // evaluated at the requested dimensions; allocate for the larger.
    let capacity = output.block_size.max(job::expected_copy_size(
        &input,
        &output,
        request.dst_width,
        request.dst_height,
    ));
    let mut destination = vec![0u8; capacity];

    let job = TransformJob::new(
        backend,
        input,
        output,
        request.dst_width,
        request.dst_height,
        request.method,
    );
    let copied = job.run(source, &mut destination)?;
    destination.truncate(copied);
    Ok(destination)
}
