//! The one-shot transform job state machine.
//!
//! A [`TransformJob`] owns one run of the backend graph: it builds and
//! configures the five stages, submits the (possibly repacked) source
//! frame, blocks on the graph's event channel until a terminal
//! notification, drives the graph to idle, validates the captured output
//! frame against the independently computed expected size, and copies it
//! into the caller's destination.
//!
//! # State machine
//!
//! ```text
//! Created -> Negotiated -> Running -> Completed
//!                |            |
//!                +------------+----> Failed
//! ```
//!
//! `Completed` and `Failed` are terminal; [`TransformJob::run`] consumes
//! the job, so retrying means constructing a new one. Every exit path tears
//! down the graph, the stages, the event channel and the captured frame by
//! dropping them.

use crate::backend::{
    Backend, EventReceiver, FlipMethod, GraphEvent, StageKind, Stages, event_channel,
};
use crate::error::{Error, Result};
use crate::format::{ColorModel, ImageFormat};
use crate::repack;
use bytes::Bytes;
use smallvec::smallvec;
use std::time::Duration;

/// Bounded wait for the graph to settle after the run loop exits.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle state of a transform job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Constructed; no backend resources exist yet.
    Created,
    /// Stages are built and configured with both capability descriptors.
    Negotiated,
    /// The graph is running and the job is blocked on its event channel.
    Running,
    /// The run finished and the output (if any) was validated and copied.
    Completed,
    /// The job hit an unrecoverable fault; nothing was copied.
    Failed,
}

/// A single synchronous format/scale/rotate transform.
///
/// The job borrows the backend for its whole lifetime and owns everything
/// else it creates: stages, graph, event channel, captured output frame.
/// Concurrent jobs on separate threads never share any of that state.
pub struct TransformJob<'a, B: Backend + ?Sized> {
    backend: &'a mut B,
    input: ImageFormat,
    output: ImageFormat,
    requested_width: u32,
    requested_height: u32,
    method: FlipMethod,
    state: JobState,
}

impl<'a, B: Backend + ?Sized> TransformJob<'a, B> {
    /// Create a job for one resolved input/output format pair.
    ///
    /// `requested_width`/`requested_height` are the destination dimensions
    /// the caller asked for, before any padding propagation that
    /// [`ImageFormat::resolve_output`] may have applied to `output`.
    pub fn new(
        backend: &'a mut B,
        input: ImageFormat,
        output: ImageFormat,
        requested_width: u32,
        requested_height: u32,
        method: FlipMethod,
    ) -> Self {
        Self {
            backend,
            input,
            output,
            requested_width,
            requested_height,
            method,
            state: JobState::Created,
        }
    }

    /// The job's current lifecycle state.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Run the transform to completion.
    ///
    /// Blocks the calling thread until the backend reports end-of-stream or
    /// an error. On success returns the number of bytes copied into
    /// `destination` — zero when the backend reached end-of-stream without
    /// producing a frame, in which case the destination is untouched and
    /// the caller must treat the empty copy as its signal.
    pub fn run(mut self, source: &[u8], destination: &mut [u8]) -> Result<usize> {
        match self.execute(source, destination) {
            Ok(copied) => {
                self.state = JobState::Completed;
                tracing::debug!("transform job completed, {copied} bytes copied");
                Ok(copied)
            }
            Err(err) => {
                self.state = JobState::Failed;
                tracing::debug!("transform job failed: {err}");
                Err(err)
            }
        }
    }

    fn execute(&mut self, source: &[u8], destination: &mut [u8]) -> Result<usize> {
        // Created -> Negotiated: build and configure the five stages.
        let mut source_stage = self.backend.build_stage(StageKind::Source)?;
        let convert_stage = self.backend.build_stage(StageKind::Convert)?;
        let scale_stage = self.backend.build_stage(StageKind::Scale)?;
        let mut flip_stage = self.backend.build_stage(StageKind::Flip)?;
        let sink_stage = {
            let mut sink = self.backend.build_stage(StageKind::Sink)?;
            sink.set_caps(&self.output.caps)?;
            sink
        };
        source_stage.set_caps(&self.input.caps)?;
        flip_stage.set_flip_method(self.method)?;
        self.state = JobState::Negotiated;
        tracing::debug!(
            "negotiated [{}] -> [{}], flip {:?}",
            self.input.caps,
            self.output.caps,
            self.method
        );

        // The sole frame for this run; end-of-stream follows it.
        let frame = self.prepare_frame(source)?;
        source_stage.submit(frame)?;

        // Negotiated -> Running.
        let (events, notifications) = event_channel();
        let stages: Stages = smallvec![
            source_stage,
            convert_stage,
            scale_stage,
            flip_stage,
            sink_stage,
        ];
        let mut graph = self.backend.link(stages, events)?;
        graph.start()?;
        self.state = JobState::Running;

        let captured = self.await_completion(&notifications)?;

        // Settle the graph before touching the captured frame.
        if let Err(err) = graph.drain_idle(DRAIN_TIMEOUT) {
            tracing::warn!("transform graph did not settle cleanly: {err}");
        }

        let Some(frame) = captured else {
            tracing::warn!("run finished without an output frame; copying nothing");
            return Ok(0);
        };

        let expected = self.expected_output_size();
        if frame.len() != expected {
            return Err(Error::SizeMismatch {
                expected,
                actual: frame.len(),
            });
        }
        if destination.len() < frame.len() {
            return Err(Error::ShortDestinationBuffer {
                expected: frame.len(),
                actual: destination.len(),
            });
        }
        destination[..frame.len()].copy_from_slice(&frame);
        Ok(frame.len())
    }

    /// Produce the frame to submit: repacked into the padded layout when
    /// the input format calls for it, otherwise the caller's bytes at the
    /// computed block size.
    fn prepare_frame(&self, source: &[u8]) -> Result<Bytes> {
        if repack::needs_repacking(&self.input) {
            return Ok(Bytes::from(repack::repack(source, &self.input)?));
        }
        if source.len() < self.input.block_size {
            return Err(Error::ShortSourceBuffer {
                expected: self.input.block_size,
                actual: source.len(),
            });
        }
        Ok(Bytes::copy_from_slice(&source[..self.input.block_size]))
    }

    /// Block on the event channel until a terminal notification.
    ///
    /// Captures at most one output frame; the first capture wins and later
    /// samples are dropped with a warning.
    fn await_completion(&self, notifications: &EventReceiver) -> Result<Option<Bytes>> {
        let mut captured: Option<Bytes> = None;
        loop {
            match notifications.recv() {
                Some(GraphEvent::Sample(frame)) => {
                    tracing::debug!("captured output frame of {} bytes", frame.len());
                    if captured.is_some() {
                        tracing::warn!("dropping unexpected second output frame");
                    } else {
                        captured = Some(frame);
                    }
                }
                Some(GraphEvent::EndOfStream) => return Ok(captured),
                Some(GraphEvent::Error(message)) => return Err(Error::Backend(message)),
                None => {
                    return Err(Error::Backend(
                        "event channel closed before end of stream".into(),
                    ));
                }
            }
        }
    }

    fn expected_output_size(&self) -> usize {
        expected_copy_size(
            &self.input,
            &self.output,
            self.requested_width,
            self.requested_height,
        )
    }
}

/// The byte count the captured output frame must have.
///
/// When padding propagation overwrote the output's logical dimensions and
/// the input is an RGB-family frame, the backend produced the padded frame,
/// so the size table is evaluated at the overwritten dimensions; otherwise
/// at the dimensions the caller requested.
pub(crate) fn expected_copy_size(
    input: &ImageFormat,
    output: &ImageFormat,
    requested_width: u32,
    requested_height: u32,
) -> usize {
    let overwritten = requested_width != output.width || requested_height != output.height;
    let padded_input = matches!(input.color_model(), ColorModel::Rgb | ColorModel::Rgba);
    if overwritten && padded_input {
        output
            .pixel_format
            .buffer_size(output.width, output.height)
    } else {
        output
            .pixel_format
            .buffer_size(requested_width, requested_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::LoopbackBackend;
    use crate::format::PixelFormat;

    fn resolve_pair(
        input: PixelFormat,
        src: (u32, u32),
        output: PixelFormat,
        dst: (u32, u32),
    ) -> (ImageFormat, ImageFormat) {
        let input = ImageFormat::resolve_input(input, src.0, src.1).unwrap();
        let output = ImageFormat::resolve_output(output, dst.0, dst.1, &input).unwrap();
        (input, output)
    }

    #[test]
    fn test_echo_run_copies_output() {
        let mut backend = LoopbackBackend::new();
        let (input, output) = resolve_pair(
            PixelFormat::Rgb888,
            (64, 64),
            PixelFormat::Rgb888,
            (64, 64),
        );
        let source: Vec<u8> = (0..input.block_size).map(|i| (i % 255) as u8).collect();
        let mut destination = vec![0u8; output.block_size];

        let job = TransformJob::new(&mut backend, input, output, 64, 64, FlipMethod::Identity);
        let copied = job.run(&source, &mut destination).unwrap();

        assert_eq!(copied, 64 * 3 * 64);
        assert_eq!(destination, source);
        assert_eq!(backend.flip_method(), Some(FlipMethod::Identity));
    }

    #[test]
    fn test_caps_reach_source_and_sink() {
        let mut backend = LoopbackBackend::producing(176 * 3 * 144);
        let (input, output) = resolve_pair(
            PixelFormat::I420,
            (176, 144),
            PixelFormat::Rgb888,
            (176, 144),
        );
        let source = vec![0u8; input.block_size];
        let mut destination = vec![0u8; output.block_size];

        let job = TransformJob::new(&mut backend, input, output, 176, 144, FlipMethod::Clockwise90);
        job.run(&source, &mut destination).unwrap();

        let negotiated_input = backend.negotiated_input().unwrap();
        assert_eq!(negotiated_input.format_name, "I420");
        assert_eq!((negotiated_input.width, negotiated_input.height), (176, 144));

        let negotiated_output = backend.negotiated_output().unwrap();
        assert_eq!(negotiated_output.format_name, "RGB888");
        assert!(negotiated_output.rgb_layout.is_some());

        assert_eq!(backend.flip_method(), Some(FlipMethod::Clockwise90));
    }

    #[test]
    fn test_padded_rgb_input_is_repacked_before_submission() {
        let mut backend = LoopbackBackend::producing(170 * 100 * 4);
        let (input, output) = resolve_pair(
            PixelFormat::Rgb888,
            (170, 99),
            PixelFormat::Rgba8888,
            (170, 99),
        );
        let source: Vec<u8> = (0..170 * 3 * 99).map(|i| (i % 253) as u8).collect();
        let mut destination = vec![0u8; 170 * 100 * 4];

        let job = TransformJob::new(&mut backend, input, output, 170, 99, FlipMethod::Identity);
        let copied = job.run(&source, &mut destination).unwrap();

        // Output dimensions were padding-propagated: 170x100, not 170x99.
        assert_eq!(copied, 170 * 100 * 4);

        let submitted = backend.submitted_frame().unwrap();
        assert_eq!(submitted.len(), PixelFormat::Rgb888.buffer_size(172, 100));
        // First row survives intact, strided.
        assert_eq!(&submitted[..170 * 3], &source[..170 * 3]);
        assert!(submitted[170 * 3..172 * 3].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_unpadded_input_is_submitted_verbatim() {
        let mut backend = LoopbackBackend::new();
        let (input, output) = resolve_pair(
            PixelFormat::Rgb888,
            (100, 76),
            PixelFormat::Rgb888,
            (100, 76),
        );
        let source: Vec<u8> = (0..input.block_size).map(|i| (i % 249) as u8).collect();
        let mut destination = vec![0u8; output.block_size];

        let job = TransformJob::new(&mut backend, input, output, 100, 76, FlipMethod::Identity);
        job.run(&source, &mut destination).unwrap();

        assert_eq!(backend.submitted_frame().unwrap().as_ref(), &source[..]);
    }

    #[test]
    fn test_backend_error_fails_job_without_copying() {
        let mut backend = LoopbackBackend::new().reporting_error("convert stage fault");
        let (input, output) = resolve_pair(
            PixelFormat::I420,
            (176, 144),
            PixelFormat::Rgb888,
            (176, 144),
        );
        let source = vec![0u8; input.block_size];
        let mut destination = vec![0xEE; output.block_size];

        let job = TransformJob::new(&mut backend, input, output, 176, 144, FlipMethod::Identity);
        let err = job.run(&source, &mut destination).unwrap_err();

        assert!(matches!(err, Error::Backend(message) if message.contains("convert stage fault")));
        assert!(destination.iter().all(|&b| b == 0xEE), "destination touched");
    }

    #[test]
    fn test_size_mismatch_fails_job_without_copying() {
        let mut backend = LoopbackBackend::producing(76_032 - 4);
        let (input, output) = resolve_pair(
            PixelFormat::I420,
            (176, 144),
            PixelFormat::Rgb888,
            (176, 144),
        );
        let source = vec![0u8; input.block_size];
        let mut destination = vec![0xEE; output.block_size];

        let job = TransformJob::new(&mut backend, input, output, 176, 144, FlipMethod::Identity);
        let err = job.run(&source, &mut destination).unwrap_err();

        assert!(matches!(
            err,
            Error::SizeMismatch {
                expected: 76_032,
                actual: 76_028,
            }
        ));
        assert!(destination.iter().all(|&b| b == 0xEE), "destination touched");
    }

    #[test]
    fn test_missing_output_is_soft_success() {
        let mut backend = LoopbackBackend::new().swallowing_output();
        let (input, output) = resolve_pair(
            PixelFormat::I420,
            (176, 144),
            PixelFormat::Rgb888,
            (176, 144),
        );
        let source = vec![0u8; input.block_size];
        let mut destination = vec![0xEE; output.block_size];

        let job = TransformJob::new(&mut backend, input, output, 176, 144, FlipMethod::Identity);
        let copied = job.run(&source, &mut destination).unwrap();

        assert_eq!(copied, 0);
        assert!(destination.iter().all(|&b| b == 0xEE), "destination touched");
    }

    #[test]
    fn test_duplicate_sample_first_capture_wins() {
        let mut backend = LoopbackBackend::new().duplicating_sample();
        let (input, output) = resolve_pair(
            PixelFormat::Rgb888,
            (64, 64),
            PixelFormat::Rgb888,
            (64, 64),
        );
        let source = vec![7u8; input.block_size];
        let mut destination = vec![0u8; output.block_size];

        let job = TransformJob::new(&mut backend, input, output, 64, 64, FlipMethod::Identity);
        let copied = job.run(&source, &mut destination).unwrap();
        assert_eq!(copied, source.len());
        assert_eq!(destination, source);
    }

    #[test]
    fn test_stage_build_failure() {
        let mut backend = LoopbackBackend::new().failing_stage(StageKind::Scale);
        let (input, output) = resolve_pair(
            PixelFormat::I420,
            (176, 144),
            PixelFormat::Rgb888,
            (176, 144),
        );
        let source = vec![0u8; input.block_size];
        let mut destination = vec![0u8; output.block_size];

        let job = TransformJob::new(&mut backend, input, output, 176, 144, FlipMethod::Identity);
        assert!(matches!(
            job.run(&source, &mut destination),
            Err(Error::GraphBuild {
                kind: StageKind::Scale,
                ..
            })
        ));
    }

    #[test]
    fn test_link_failure() {
        let mut backend = LoopbackBackend::new().failing_link();
        let (input, output) = resolve_pair(
            PixelFormat::I420,
            (176, 144),
            PixelFormat::Rgb888,
            (176, 144),
        );
        let source = vec![0u8; input.block_size];
        let mut destination = vec![0u8; output.block_size];

        let job = TransformJob::new(&mut backend, input, output, 176, 144, FlipMethod::Identity);
        assert!(matches!(
            job.run(&source, &mut destination),
            Err(Error::Link(_))
        ));
    }

    #[test]
    fn test_push_failure() {
        let mut backend = LoopbackBackend::new().failing_push();
        let (input, output) = resolve_pair(
            PixelFormat::I420,
            (176, 144),
            PixelFormat::Rgb888,
            (176, 144),
        );
        let source = vec![0u8; input.block_size];
        let mut destination = vec![0u8; output.block_size];

        let job = TransformJob::new(&mut backend, input, output, 176, 144, FlipMethod::Identity);
        assert!(matches!(
            job.run(&source, &mut destination),
            Err(Error::Push(_))
        ));
    }

    #[test]
    fn test_short_source_rejected_before_submission() {
        let mut backend = LoopbackBackend::new();
        let (input, output) = resolve_pair(
            PixelFormat::I420,
            (176, 144),
            PixelFormat::Rgb888,
            (176, 144),
        );
        let source = vec![0u8; input.block_size - 1];
        let mut destination = vec![0u8; output.block_size];

        let job = TransformJob::new(&mut backend, input, output, 176, 144, FlipMethod::Identity);
        assert!(matches!(
            job.run(&source, &mut destination),
            Err(Error::ShortSourceBuffer { .. })
        ));
        assert!(backend.submitted_frame().is_none());
    }

    #[test]
    fn test_short_destination_rejected() {
        let mut backend = LoopbackBackend::new();
        let (input, output) = resolve_pair(
            PixelFormat::Rgb888,
            (64, 64),
            PixelFormat::Rgb888,
            (64, 64),
        );
        let source = vec![0u8; input.block_size];
        let mut destination = vec![0u8; output.block_size - 1];

        let job = TransformJob::new(&mut backend, input, output, 64, 64, FlipMethod::Identity);
        assert!(matches!(
            job.run(&source, &mut destination),
            Err(Error::ShortDestinationBuffer { .. })
        ));
    }

    #[test]
    fn test_expected_size_uses_padded_dimensions_for_rgb_input() {
        // Padded RGB input propagates into the RGBA output's height.
        let (input, output) = resolve_pair(
            PixelFormat::Rgb888,
            (170, 99),
            PixelFormat::Rgba8888,
            (170, 99),
        );
        assert_eq!(expected_copy_size(&input, &output, 170, 99), 170 * 100 * 4);

        // A YUV input keeps the caller-requested dimensions authoritative.
        let (input, output) = resolve_pair(
            PixelFormat::I420,
            (176, 144),
            PixelFormat::Rgb888,
            (170, 100),
        );
        assert_eq!(
            expected_copy_size(&input, &output, 170, 100),
            PixelFormat::Rgb888.buffer_size(170, 100)
        );
    }
}
