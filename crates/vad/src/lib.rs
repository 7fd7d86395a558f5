//! Voice activity detection: a windowed speech/silence state machine
//! with pre-roll capture, wired as a Pipeline [`Element`](flowmesh_element::Element).
//!
//! The [`detector::Detector`] trait abstracts the actual inference
//! backend; the reference deployment wraps an ONNX runtime session,
//! `detector::MockDetector` drives a fixed sequence for tests.

mod detector;
mod segmenter;
mod worker;

pub use detector::{Detector, DetectorError, MockDetector};
pub use segmenter::{OutputMode, VadConfig, VadSegmenter, SAMPLE_RATE_HZ, WINDOW_SAMPLES};
pub use worker::VadWorker;

use flowmesh_element::BaseElement;

/// An Element wrapping a [`VadWorker`] with the standard bounded queues.
pub type VadElement = BaseElement<VadWorker>;
