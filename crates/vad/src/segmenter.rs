//! The windowed speech/silence state machine, independent of how audio
//! arrives (an [`crate::worker::VadWorker`] drives it from the Pipeline;
//! tests drive it directly).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flowmesh_event::{EventPayload, VadSpeechEndPayload, VadSpeechStartPayload};
use flowmesh_message::SessionId;
use flowmesh_ring::RingBuffer;

use crate::detector::Detector;

pub const WINDOW_SAMPLES: usize = 512;
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// Probability must drop `HYSTERESIS` below `threshold` before silence
/// starts counting, preventing rapid flapping right at the boundary.
const HYSTERESIS: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Forward every input message unchanged.
    Passthrough,
    /// Forward only while speech is in progress.
    Filter,
}

#[derive(Debug, Clone)]
pub struct VadConfig {
    pub threshold: f32,
    pub min_silence_dur_ms: u64,
    pub speech_pad_ms: u64,
    pub pre_roll_ms: u32,
    pub output_mode: OutputMode,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_silence_dur_ms: 100,
            speech_pad_ms: 30,
            pre_roll_ms: 300,
            output_mode: OutputMode::Passthrough,
        }
    }
}

/// Windowed speech-boundary detector: normalizes incoming PCM into
/// 512-sample windows, feeds each to a [`Detector`], and emits
/// `VadSpeechStart`/`VadSpeechEnd` on state transitions.
pub struct VadSegmenter {
    config: VadConfig,
    detector: Box<dyn Detector>,
    pre_roll: RingBuffer,
    carry: Vec<u8>,
    curr_sample: u64,
    triggered: bool,
    temp_end: Option<u64>,
    is_speaking: Arc<AtomicBool>,
    min_silence_samples: u64,
    speech_pad_samples: u64,
}

impl VadSegmenter {
    pub fn new(config: VadConfig, detector: Box<dyn Detector>) -> Self {
        let min_silence_samples = config.min_silence_dur_ms * 16;
        let speech_pad_samples = config.speech_pad_ms * 16;
        let pre_roll = RingBuffer::new(SAMPLE_RATE_HZ, config.pre_roll_ms);
        Self {
            config,
            detector,
            pre_roll,
            carry: Vec::new(),
            curr_sample: 0,
            triggered: false,
            temp_end: None,
            is_speaking: Arc::new(AtomicBool::new(false)),
            min_silence_samples,
            speech_pad_samples,
        }
    }

    pub fn output_mode(&self) -> OutputMode {
        self.config.output_mode
    }

    /// Read from the hot audio path; written only here on state
    /// transitions.
    pub fn is_speaking(&self) -> bool {
        self.is_speaking.load(Ordering::Acquire)
    }

    pub fn is_speaking_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.is_speaking)
    }

    /// Feeds raw 16 kHz mono PCM S16LE bytes. Returns events emitted by
    /// any state transitions the new windows produced. Detector errors
    /// are swallowed here (the caller logs); the state machine simply
    /// does not advance for that window.
    pub fn process(&mut self, session_id: &SessionId, pcm: &[u8]) -> (Vec<EventPayload>, Vec<String>) {
        self.pre_roll.write(pcm);
        self.carry.extend_from_slice(pcm);

        let mut events = Vec::new();
        let mut warnings = Vec::new();
        let window_bytes = WINDOW_SAMPLES * 2;

        while self.carry.len() >= window_bytes {
            let window_raw: Vec<u8> = self.carry.drain(..window_bytes).collect();
            let mut window = [0f32; WINDOW_SAMPLES];
            for (i, sample) in window_raw.chunks_exact(2).enumerate() {
                let s = i16::from_le_bytes([sample[0], sample[1]]);
                window[i] = s as f32 / 32768.0;
            }

            match self.detector.infer(&window) {
                Ok(prob) => self.advance(session_id, prob, &mut events),
                Err(e) => warnings.push(format!("VAD inference failed, window skipped: {e}")),
            }
        }

        (events, warnings)
    }

    fn advance(&mut self, session_id: &SessionId, prob: f32, events: &mut Vec<EventPayload>) {
        self.curr_sample += WINDOW_SAMPLES as u64;

        if prob >= self.config.threshold {
            if self.temp_end.is_some() {
                // Re-entered speech before silence was confirmed.
                self.temp_end = None;
            }
            if !self.triggered {
                self.triggered = true;
                let speech_start_sample = self
                    .curr_sample
                    .saturating_sub(WINDOW_SAMPLES as u64)
                    .saturating_sub(self.speech_pad_samples);

                if !self.is_speaking.load(Ordering::Acquire) {
                    self.is_speaking.store(true, Ordering::Release);
                    let pre_roll_audio = self.pre_roll.read_all();
                    self.pre_roll.clear();
                    events.push(EventPayload::VadSpeechStart(VadSpeechStartPayload {
                        audio_ms: speech_start_sample * 1000 / SAMPLE_RATE_HZ as u64,
                        item_id: session_id.clone(),
                        confidence: prob,
                        pre_roll_audio,
                        sample_rate: SAMPLE_RATE_HZ,
                        channels: 1,
                    }));
                }
            }
        }

        if prob < self.config.threshold - HYSTERESIS && self.triggered {
            match self.temp_end {
                None => self.temp_end = Some(self.curr_sample),
                Some(temp_end) => {
                    if self.curr_sample - temp_end >= self.min_silence_samples {
                        let speech_end_sample = temp_end + self.speech_pad_samples;
                        self.temp_end = None;
                        self.triggered = false;

                        if self.is_speaking.load(Ordering::Acquire) {
                            self.is_speaking.store(false, Ordering::Release);
                            events.push(EventPayload::VadSpeechEnd(VadSpeechEndPayload {
                                audio_ms: speech_end_sample * 1000 / SAMPLE_RATE_HZ as u64,
                                item_id: session_id.clone(),
                                confidence: prob,
                            }));
                        }
                    }
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.detector.reset();
        self.pre_roll.clear();
        self.carry.clear();
        self.curr_sample = 0;
        self.triggered = false;
        self.temp_end = None;
        self.is_speaking.store(false, Ordering::Release);
    }
}
