//! Absorbs bursty PCM arrivals and emits fixed-duration frames at a steady
//! cadence, decoupling model/network jitter from downstream playback.
//!
//! A small prebuffer (10 frames, ~200ms) is accumulated before playback
//! starts so the first few `read_frame` calls after a burst don't
//! underrun. On interrupt, `clear_with_fade_out` ramps the about-to-play
//! audio to silence instead of cutting it abruptly (which would click).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Fixed cadence every frame represents.
pub const FRAME_DURATION_MS: u32 = 20;

/// PCM is assumed 16-bit signed.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Frames to accumulate before playback starts (~200ms of jitter buffer).
pub const PREBUFFER_FRAMES: usize = 10;

struct PacerState {
    buffer: VecDeque<u8>,
    accumulating: bool,
}

/// Emits `bytes_per_frame`-sized PCM frames at a fixed cadence from
/// whatever has been `write`n so far.
pub struct AudioPacer {
    state: Mutex<PacerState>,
    paused: AtomicBool,
    bytes_per_frame: usize,
    sample_rate_hz: u32,
    channels: u16,
}

impl AudioPacer {
    pub fn new(sample_rate_hz: u32, channels: u16) -> Self {
        let bytes_per_frame = sample_rate_hz as usize * FRAME_DURATION_MS as usize / 1000
            * channels as usize
            * BYTES_PER_SAMPLE;
        Self {
            state: Mutex::new(PacerState {
                buffer: VecDeque::new(),
                accumulating: true,
            }),
            paused: AtomicBool::new(false),
            bytes_per_frame,
            sample_rate_hz,
            channels,
        }
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    /// Appends PCM bytes to the pacing buffer.
    pub fn write(&self, bytes: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.buffer.extend(bytes.iter().copied());
    }

    /// Always returns exactly `bytes_per_frame` bytes.
    pub fn read_frame(&self) -> Vec<u8> {
        if self.paused.load(Ordering::Acquire) {
            return vec![0u8; self.bytes_per_frame];
        }

        let mut state = self.state.lock().unwrap();
        let prebuffer_bytes = self.bytes_per_frame * PREBUFFER_FRAMES;

        if state.accumulating {
            if state.buffer.len() < prebuffer_bytes {
                return vec![0u8; self.bytes_per_frame];
            }
            state.accumulating = false;
        }

        let mut frame = vec![0u8; self.bytes_per_frame];
        let available = state.buffer.len().min(self.bytes_per_frame);
        for slot in frame.iter_mut().take(available) {
            *slot = state.buffer.pop_front().unwrap();
        }
        frame
    }

    /// Drains the buffer and re-arms prebuffering.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.buffer.clear();
        state.accumulating = true;
    }

    /// Keeps at most `fade_ms` worth of the buffer's front (the audio
    /// that was about to play), ramps its amplitude linearly from 1.0 to
    /// 0.0, discards everything after it, and re-arms prebuffering.
    /// `fade_ms = 0` behaves exactly like `clear`.
    pub fn clear_with_fade_out(&self, fade_ms: u32) {
        if fade_ms == 0 {
            self.clear();
            return;
        }

        let mut state = self.state.lock().unwrap();
        let sample_frame_bytes = self.channels as usize * BYTES_PER_SAMPLE;
        if sample_frame_bytes == 0 {
            state.buffer.clear();
            state.accumulating = true;
            return;
        }

        let fade_samples = (self.sample_rate_hz as usize * fade_ms as usize / 1000).max(1);
        let mut fade_bytes = fade_samples * sample_frame_bytes;
        fade_bytes = fade_bytes.min(state.buffer.len());
        fade_bytes -= fade_bytes % sample_frame_bytes;

        let mut retained: Vec<u8> = state.buffer.iter().take(fade_bytes).copied().collect();
        state.buffer.clear();

        let num_samples = retained.len() / sample_frame_bytes;
        for i in 0..num_samples {
            let gain = if num_samples <= 1 {
                0.0
            } else {
                1.0 - (i as f32 / (num_samples - 1) as f32)
            };
            for ch in 0..self.channels as usize {
                let offset = i * sample_frame_bytes + ch * BYTES_PER_SAMPLE;
                let sample = i16::from_le_bytes([retained[offset], retained[offset + 1]]);
                let scaled = (sample as f32 * gain).round() as i16;
                let bytes = scaled.to_le_bytes();
                retained[offset] = bytes[0];
                retained[offset + 1] = bytes[1];
            }
        }

        state.buffer.extend(retained);
        state.accumulating = true;
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Snapshot of currently buffered bytes, oldest first. Intended for
    /// tests and diagnostics, not the playback hot path.
    pub fn buffered_snapshot(&self) -> Vec<u8> {
        self.state.lock().unwrap().buffer.iter().copied().collect()
    }
}
