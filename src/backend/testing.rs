//! Deterministic in-process backend for tests.
//!
//! [`LoopbackBackend`] performs no pixel math: it either echoes the
//! submitted frame back as the output sample or synthesizes a frame of a
//! configured size, and can inject every fault the job state machine has to
//! survive (stage build failure, link failure, push failure, reported stage
//! error, missing sample, duplicate sample).
//!
//! # Example
//!
//! ```rust
//! use reframe::backend::FlipMethod;
//! use reframe::backend::testing::LoopbackBackend;
//! use reframe::convert::{ConvertRequest, convert};
//! use reframe::format::PixelFormat;
//!
//! let mut backend = LoopbackBackend::producing(76_032);
//! let request = ConvertRequest {
//!     input: PixelFormat::I420,
//!     src_width: 176,
//!     src_height: 144,
//!     output: PixelFormat::Rgb888,
//!     dst_width: 176,
//!     dst_height: 144,
//!     method: FlipMethod::Identity,
//! };
//! let src = vec![0u8; 38_016];
//! let out = convert(&mut backend, &request, &src).unwrap();
//! assert_eq!(out.len(), 76_032);
//! ```

use crate::backend::{
    Backend, EventSender, FlipMethod, Graph, Stage, StageKind, Stages,
};
use crate::error::{Error, Result};
use crate::format::VideoCaps;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// State observed by the test after a run: what the job actually handed
/// the backend during configuration and submission.
#[derive(Debug, Default)]
struct LoopbackShared {
    source_caps: Option<VideoCaps>,
    sink_caps: Option<VideoCaps>,
    flip_method: Option<FlipMethod>,
    frame: Option<Bytes>,
}

/// A loopback transform backend with configurable fault injection.
///
/// By default the graph echoes the submitted source frame as its single
/// output sample and then reports end-of-stream. [`producing`]
/// (LoopbackBackend::producing) replaces the echo with a synthesized frame
/// of a fixed size, which is what format-converting tests use.
pub struct LoopbackBackend {
    output_len: Option<usize>,
    fill: u8,
    fail_build: Option<StageKind>,
    fail_link: bool,
    fail_push: bool,
    stage_error: Option<String>,
    swallow_output: bool,
    duplicate_sample: bool,
    shared: Arc<Mutex<LoopbackShared>>,
}

impl LoopbackBackend {
    /// A backend that echoes the submitted frame unchanged.
    pub fn new() -> Self {
        Self {
            output_len: None,
            fill: 0,
            fail_build: None,
            fail_link: false,
            fail_push: false,
            stage_error: None,
            swallow_output: false,
            duplicate_sample: false,
            shared: Arc::new(Mutex::new(LoopbackShared::default())),
        }
    }

    /// A backend that synthesizes an output frame of exactly `len` bytes.
    pub fn producing(len: usize) -> Self {
        let mut backend = Self::new();
        backend.output_len = Some(len);
        backend
    }

    /// Set the fill byte of synthesized frames.
    pub fn with_fill(mut self, fill: u8) -> Self {
        self.fill = fill;
        self
    }

    /// Fail to build the given stage kind.
    pub fn failing_stage(mut self, kind: StageKind) -> Self {
        self.fail_build = Some(kind);
        self
    }

    /// Fail to link the stages into a graph.
    pub fn failing_link(mut self) -> Self {
        self.fail_link = true;
        self
    }

    /// Refuse the submitted source frame.
    pub fn failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    /// Report a stage fault instead of running to end-of-stream.
    pub fn reporting_error(mut self, message: impl Into<String>) -> Self {
        self.stage_error = Some(message.into());
        self
    }

    /// Reach end-of-stream without ever producing a sample.
    pub fn swallowing_output(mut self) -> Self {
        self.swallow_output = true;
        self
    }

    /// Deliver the output sample twice before end-of-stream.
    pub fn duplicating_sample(mut self) -> Self {
        self.duplicate_sample = true;
        self
    }

    /// The capability descriptor the job attached to the source stage.
    pub fn negotiated_input(&self) -> Option<VideoCaps> {
        self.shared.lock().unwrap().source_caps.clone()
    }

    /// The capability descriptor the job attached to the sink stage.
    pub fn negotiated_output(&self) -> Option<VideoCaps> {
        self.shared.lock().unwrap().sink_caps.clone()
    }

    /// The flip method the job configured.
    pub fn flip_method(&self) -> Option<FlipMethod> {
        self.shared.lock().unwrap().flip_method
    }

    /// The frame the job submitted to the source stage.
    pub fn submitted_frame(&self) -> Option<Bytes> {
        self.shared.lock().unwrap().frame.clone()
    }
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for LoopbackBackend {
    fn build_stage(&mut self, kind: StageKind) -> Result<Box<dyn Stage>> {
        if self.fail_build == Some(kind) {
            return Err(Error::GraphBuild {
                kind,
                reason: "injected build failure".into(),
            });
        }
        Ok(Box::new(LoopbackStage {
            kind,
            fail_push: self.fail_push,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn link(&mut self, stages: Stages, events: EventSender) -> Result<Box<dyn Graph>> {
        if self.fail_link {
            return Err(Error::Link("injected link failure".into()));
        }
        if stages.len() != StageKind::ALL.len() {
            return Err(Error::Link(format!(
                "expected {} stages, got {}",
                StageKind::ALL.len(),
                stages.len()
            )));
        }
        for (stage, kind) in stages.iter().zip(StageKind::ALL) {
            if stage.kind() != kind {
                return Err(Error::Link(format!(
                    "stage out of order: expected {kind}, got {}",
                    stage.kind()
                )));
            }
        }
        Ok(Box::new(LoopbackGraph {
            output_len: self.output_len,
            fill: self.fill,
            stage_error: self.stage_error.clone(),
            swallow_output: self.swallow_output,
            duplicate_sample: self.duplicate_sample,
            shared: Arc::clone(&self.shared),
            events,
        }))
    }
}

struct LoopbackStage {
    kind: StageKind,
    fail_push: bool,
    shared: Arc<Mutex<LoopbackShared>>,
}

impl Stage for LoopbackStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    fn set_caps(&mut self, caps: &VideoCaps) -> Result<()> {
        let mut shared = self.shared.lock().unwrap();
        match self.kind {
            StageKind::Source => shared.source_caps = Some(caps.clone()),
            StageKind::Sink => shared.sink_caps = Some(caps.clone()),
            _ => {}
        }
        Ok(())
    }

    fn set_flip_method(&mut self, method: FlipMethod) -> Result<()> {
        if self.kind == StageKind::Flip {
            self.shared.lock().unwrap().flip_method = Some(method);
        }
        Ok(())
    }

    fn submit(&mut self, frame: Bytes) -> Result<()> {
        if self.kind != StageKind::Source {
            return Err(Error::Push(format!(
                "{} stage does not accept buffers",
                self.kind
            )));
        }
        if self.fail_push {
            return Err(Error::Push("injected push failure".into()));
        }
        self.shared.lock().unwrap().frame = Some(frame);
        Ok(())
    }
}

struct LoopbackGraph {
    output_len: Option<usize>,
    fill: u8,
    stage_error: Option<String>,
    swallow_output: bool,
    duplicate_sample: bool,
    shared: Arc<Mutex<LoopbackShared>>,
    events: EventSender,
}

impl Graph for LoopbackGraph {
    fn start(&mut self) -> Result<()> {
        if let Some(message) = &self.stage_error {
            self.events.send_error(message.clone());
            return Ok(());
        }

        let frame = self.shared.lock().unwrap().frame.clone();
        let Some(frame) = frame else {
            self.events.send_error("no source frame submitted");
            return Ok(());
        };

        let sample = match self.output_len {
            Some(len) => Bytes::from(vec![self.fill; len]),
            None => frame,
        };

        if !self.swallow_output {
            self.events.send_sample(sample.clone());
            if self.duplicate_sample {
                tracing::debug!("loopback graph delivering duplicate sample");
                self.events.send_sample(sample);
            }
        }
        self.events.send_eos();
        Ok(())
    }

    fn drain_idle(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}
