//! The inference boundary the state machine consumes. The reference
//! implementation wraps an ONNX runtime session over a Silero-style
//! model; `MockDetector` drives a fixed probability sequence for tests.

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("model not loaded")]
    ModelNotLoaded,
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Implicit sample rate is 16 kHz; windows are always 512 samples.
pub trait Detector: Send {
    fn infer(&mut self, window: &[f32; 512]) -> Result<f32, DetectorError>;
    fn reset(&mut self);
}

/// Drives a fixed sequence of probabilities, repeating the last value
/// once exhausted. Useful for deterministic state-machine tests.
pub struct MockDetector {
    sequence: Vec<f32>,
    index: usize,
}

impl MockDetector {
    pub fn new(sequence: Vec<f32>) -> Self {
        Self { sequence, index: 0 }
    }
}

impl Detector for MockDetector {
    fn infer(&mut self, _window: &[f32; 512]) -> Result<f32, DetectorError> {
        let prob = self
            .sequence
            .get(self.index)
            .copied()
            .or_else(|| self.sequence.last().copied())
            .unwrap_or(0.0);
        self.index += 1;
        Ok(prob)
    }

    fn reset(&mut self) {
        self.index = 0;
    }
}
