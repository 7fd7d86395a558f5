//! Streaming sentence segmenter: accumulates incoming text and emits
//! complete sentences as soon as a boundary is found, falling back to a
//! forced break at `max_length` or a flush on inactivity timeout.
//!
//! `Feed` may be called faster than sentences complete; the segmenter
//! only ever emits what it can prove is a complete (or forced, or
//! timed-out) sentence, never speculatively.

mod boundary;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use boundary::find_boundary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Auto,
    En,
    Zh,
    Ja,
}

#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Minimum rune count a detected sentence must have before it's
    /// emitted; shorter candidates keep the scan going past them.
    pub min_length: usize,
    /// Rune count at which a forced break fires even without a real
    /// sentence ender.
    pub max_length: usize,
    /// How long the buffer may sit idle before its remainder is flushed.
    pub flush_timeout: Duration,
    pub language: Language,
    pub enable_smart_punctuation: bool,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_length: 2,
            max_length: 200,
            flush_timeout: Duration::from_millis(1500),
            language: Language::Auto,
            enable_smart_punctuation: true,
        }
    }
}

type Callback = Box<dyn FnMut(String, bool) + Send>;

struct Inner {
    buffer: Mutex<String>,
    callback: Mutex<Option<Callback>>,
    generation: AtomicU64,
    config: SegmenterConfig,
}

impl Inner {
    fn emit(&self, sentence: String, is_final: bool) {
        if sentence.is_empty() {
            return;
        }
        if let Some(cb) = self.callback.lock().unwrap().as_mut() {
            cb(sentence, is_final);
        }
    }

    fn drain_complete_sentences(&self, buffer: &mut String) -> Vec<String> {
        let mut emitted = Vec::new();
        loop {
            let chars: Vec<char> = buffer.chars().collect();
            let Some(b) = find_boundary(
                &chars,
                self.config.min_length,
                self.config.max_length,
                self.config.language,
                self.config.enable_smart_punctuation,
            ) else {
                break;
            };
            let sentence: String = chars[..b.index].iter().collect();
            let trimmed = sentence.trim().to_string();
            *buffer = chars[b.index..].iter().collect::<String>();
            *buffer = buffer.trim_start().to_string();
            if !trimmed.is_empty() {
                emitted.push(trimmed);
            }
        }
        emitted
    }

    fn fire_timeout(&self) {
        let mut buf = self.buffer.lock().unwrap();
        if buf.trim().is_empty() {
            return;
        }
        let remainder = std::mem::take(&mut *buf).trim().to_string();
        drop(buf);
        self.emit(remainder, false);
    }
}

/// Streaming sentence boundary detector. `Clone` is cheap; clones share
/// the same buffer and callback.
#[derive(Clone)]
pub struct SentenceSegmenter {
    inner: Arc<Inner>,
}

impl SentenceSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(String::new()),
                callback: Mutex::new(None),
                generation: AtomicU64::new(0),
                config,
            }),
        }
    }

    /// Registers the sentence callback: `(sentence, is_final)`. `is_final`
    /// is true only for the remainder emitted by an explicit `flush`.
    pub fn on_sentence(&self, cb: impl FnMut(String, bool) + Send + 'static) {
        *self.inner.callback.lock().unwrap() = Some(Box::new(cb));
    }

    /// Appends `text` to the buffer, emitting any sentences that are now
    /// complete, and (re)arms the inactivity timer.
    pub fn feed(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let emitted = {
            let mut buf = self.inner.buffer.lock().unwrap();
            buf.push_str(text);
            self.inner.drain_complete_sentences(&mut buf)
        };
        for sentence in emitted {
            self.inner.emit(sentence, false);
        }
        self.arm_timer();
    }

    /// Emits whatever remains in the buffer as a final sentence, even if
    /// it doesn't end on a real sentence boundary, and cancels the timer.
    pub fn flush(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let remainder = {
            let mut buf = self.inner.buffer.lock().unwrap();
            std::mem::take(&mut *buf).trim().to_string()
        };
        if !remainder.is_empty() {
            self.inner.emit(remainder, true);
        }
    }

    /// Discards the buffer without emitting anything and cancels the
    /// timer.
    pub fn reset(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.buffer.lock().unwrap().clear();
    }

    fn arm_timer(&self) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);
        let timeout = self.inner.config.flush_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if inner.generation.load(Ordering::SeqCst) == generation {
                inner.fire_timeout();
            }
        });
    }
}
