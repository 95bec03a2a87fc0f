//! The transform backend capability.
//!
//! The job drives an opaque five-stage graph (source → convert → scale →
//! flip → sink) through the traits in this module. The crate itself contains
//! no pixel math: a [`Backend`] implementation owns the conversion, scaling
//! and rotation algorithms, and reports progress back over a single-consumer
//! event channel.
//!
//! # Event delivery
//!
//! A graph delivers exactly one terminal notification per run — either
//! [`GraphEvent::EndOfStream`] or [`GraphEvent::Error`] — plus at most one
//! [`GraphEvent::Sample`] carrying the output frame. Events are messages on
//! a channel owned by the job, not callbacks, so backend threads never
//! re-enter job state.

pub mod testing;

use crate::error::Result;
use crate::format::VideoCaps;
use bytes::Bytes;
use smallvec::SmallVec;
use std::time::Duration;

// ============================================================================
// Stage and graph vocabulary
// ============================================================================

/// The role of a stage within the transform graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Feeds the single source frame into the graph.
    Source,
    /// Converts between pixel formats.
    Convert,
    /// Scales to the destination resolution.
    Scale,
    /// Applies the rotation/flip method.
    Flip,
    /// Collects the output frame.
    Sink,
}

impl StageKind {
    /// Every stage kind, in graph order.
    pub const ALL: [StageKind; 5] = [
        StageKind::Source,
        StageKind::Convert,
        StageKind::Scale,
        StageKind::Flip,
        StageKind::Sink,
    ];
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StageKind::Source => "source",
            StageKind::Convert => "convert",
            StageKind::Scale => "scale",
            StageKind::Flip => "flip",
            StageKind::Sink => "sink",
        };
        f.write_str(name)
    }
}

/// Rotation/flip applied by the flip stage.
///
/// The discriminants are the wire codes callers pass at the boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FlipMethod {
    /// No rotation.
    #[default]
    Identity = 0,
    /// Rotate clockwise 90 degrees.
    Clockwise90 = 1,
    /// Rotate 180 degrees.
    Rotate180 = 2,
    /// Rotate counter-clockwise 90 degrees.
    CounterClockwise90 = 3,
    /// Flip horizontally.
    HorizontalFlip = 4,
    /// Flip vertically.
    VerticalFlip = 5,
    /// Flip across the upper-left/lower-right diagonal.
    UpperLeftDiagonal = 6,
    /// Flip across the upper-right/lower-left diagonal.
    UpperRightDiagonal = 7,
}

impl FlipMethod {
    /// Decode a wire code (0..=7).
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FlipMethod::Identity),
            1 => Some(FlipMethod::Clockwise90),
            2 => Some(FlipMethod::Rotate180),
            3 => Some(FlipMethod::CounterClockwise90),
            4 => Some(FlipMethod::HorizontalFlip),
            5 => Some(FlipMethod::VerticalFlip),
            6 => Some(FlipMethod::UpperLeftDiagonal),
            7 => Some(FlipMethod::UpperRightDiagonal),
            _ => None,
        }
    }

    /// The wire code of this method.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

// ============================================================================
// Events
// ============================================================================

/// Notifications a running graph sends to the job that owns it.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    /// The sink produced an output frame.
    Sample(Bytes),
    /// The source has been fully consumed and downstream stages drained.
    EndOfStream,
    /// A stage reported an unrecoverable fault.
    Error(String),
}

impl std::fmt::Display for GraphEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphEvent::Sample(bytes) => write!(f, "Sample ({} bytes)", bytes.len()),
            GraphEvent::EndOfStream => write!(f, "EOS"),
            GraphEvent::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

/// Sender half of a job's event channel.
///
/// Held by the graph and its worker threads; cheap to clone. Sending never
/// blocks and silently drops events once the job has gone away.
#[derive(Clone)]
pub struct EventSender {
    sender: kanal::Sender<GraphEvent>,
}

impl EventSender {
    /// Send an event. Returns whether a receiver was still listening.
    pub fn send(&self, event: GraphEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    /// Send an output frame.
    pub fn send_sample(&self, frame: Bytes) {
        self.send(GraphEvent::Sample(frame));
    }

    /// Send an end-of-stream notification.
    pub fn send_eos(&self) {
        self.send(GraphEvent::EndOfStream);
    }

    /// Send an error notification.
    pub fn send_error(&self, message: impl Into<String>) {
        self.send(GraphEvent::Error(message.into()));
    }
}

/// Receiver half of a job's event channel.
pub struct EventReceiver {
    receiver: kanal::Receiver<GraphEvent>,
}

impl EventReceiver {
    /// Receive the next event, blocking until one arrives.
    ///
    /// Returns `None` once every sender has been dropped.
    pub fn recv(&self) -> Option<GraphEvent> {
        self.receiver.recv().ok()
    }
}

/// Create a fresh event channel for one job.
///
/// Each job owns its own pair; nothing is shared between jobs.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (sender, receiver) = kanal::unbounded();
    (EventSender { sender }, EventReceiver { receiver })
}

// ============================================================================
// Backend traits
// ============================================================================

/// A single stage of the transform graph.
///
/// The job configures stages before linking: capability descriptors go to
/// the source and sink, the flip method to the flip stage, and the one
/// source frame to the source stage. Stages of other kinds keep the default
/// no-op configuration hooks.
pub trait Stage: Send {
    /// The role this stage plays in the graph.
    fn kind(&self) -> StageKind;

    /// Attach a negotiated capability descriptor.
    fn set_caps(&mut self, caps: &VideoCaps) -> Result<()> {
        let _ = caps;
        Ok(())
    }

    /// Configure the rotation/flip method.
    fn set_flip_method(&mut self, method: FlipMethod) -> Result<()> {
        let _ = method;
        Ok(())
    }

    /// Submit the single source frame.
    ///
    /// The frame is the sole buffer for this run; end-of-stream follows
    /// immediately once it has been consumed.
    fn submit(&mut self, frame: Bytes) -> Result<()>;
}

/// The stage list handed to [`Backend::link`], in graph order.
pub type Stages = SmallVec<[Box<dyn Stage>; 5]>;

/// A linked, runnable transform graph.
pub trait Graph: Send {
    /// Start the graph. Events arrive on the channel given at link time.
    fn start(&mut self) -> Result<()>;

    /// Drive the graph to its idle state, waiting at most `timeout`.
    fn drain_idle(&mut self, timeout: Duration) -> Result<()>;
}

/// Factory for transform stages and graphs.
///
/// One backend value can serve many jobs; each job builds its own stages
/// and graph, so concurrent jobs never share graph state. Process-wide
/// backend runtime initialization, if the implementation needs any, is the
/// caller's responsibility and must happen before the first job.
pub trait Backend: Send {
    /// Instantiate a stage of the given kind.
    fn build_stage(&mut self, kind: StageKind) -> Result<Box<dyn Stage>>;

    /// Link configured stages (in graph order) into a runnable graph.
    ///
    /// The graph takes ownership of the stages and of the sender half of
    /// the job's event channel.
    fn link(&mut self, stages: Stages, events: EventSender) -> Result<Box<dyn Graph>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_method_codes() {
        for code in 0u8..=7 {
            let method = FlipMethod::from_code(code).unwrap();
            assert_eq!(method.code(), code);
        }
        assert_eq!(FlipMethod::from_code(8), None);
        assert_eq!(FlipMethod::from_code(255), None);
        assert_eq!(FlipMethod::default(), FlipMethod::Identity);
    }

    #[test]
    fn test_stage_kind_display() {
        let names: Vec<String> = StageKind::ALL.iter().map(|k| k.to_string()).collect();
        assert_eq!(names, ["source", "convert", "scale", "flip", "sink"]);
    }

    #[test]
    fn test_event_channel_order() {
        let (tx, rx) = event_channel();
        tx.send_sample(Bytes::from_static(b"abc"));
        tx.send_eos();

        assert!(matches!(rx.recv(), Some(GraphEvent::Sample(b)) if b.len() == 3));
        assert!(matches!(rx.recv(), Some(GraphEvent::EndOfStream)));
    }

    #[test]
    fn test_event_channel_closed() {
        let (tx, rx) = event_channel();
        drop(tx);
        assert!(rx.recv().is_none());
    }

    #[test]
    fn test_send_without_receiver_is_harmless() {
        let (tx, rx) = event_channel();
        drop(rx);
        assert!(!tx.send(GraphEvent::EndOfStream));
    }

    #[test]
    fn test_event_display() {
        assert_eq!(GraphEvent::EndOfStream.to_string(), "EOS");
        assert_eq!(
            GraphEvent::Error("stage fault".into()).to_string(),
            "Error: stage fault"
        );
        assert_eq!(
            GraphEvent::Sample(Bytes::from_static(&[0; 16])).to_string(),
            "Sample (16 bytes)"
        );
    }
}
