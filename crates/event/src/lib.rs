//! Out-of-band signals that travel on the Event Bus, orthogonal to the
//! message data path. Events are immutable once published.

use serde::{Deserialize, Serialize};

use flowmesh_message::{now_ms, SessionId, Timestamp};

/// Closed set of event types. Names are stable — consumers match on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    VadSpeechStart,
    VadSpeechEnd,
    PartialResult,
    FinalResult,
    TextDelta,
    ResponseStart,
    ResponseEnd,
    Interrupted,
    InterruptAcknowledged,
    AudioPause,
    AudioResume,
    Error,
    Warning,
    BargeIn,
}

/// Who originated an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterruptSource {
    Vad,
    Api,
    Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadSpeechStartPayload {
    pub audio_ms: u64,
    pub item_id: SessionId,
    pub confidence: f32,
    pub pre_roll_audio: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadSpeechEndPayload {
    pub audio_ms: u64,
    pub item_id: SessionId,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextResultPayload {
    pub session_id: SessionId,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub response_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptedPayload {
    pub source: InterruptSource,
    pub response_id: Option<String>,
    pub interrupted_at: Timestamp,
    pub reason: Option<String>,
    pub audio_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptAcknowledgedPayload {
    pub response_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPayload {
    pub source: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BargeInPayload {
    pub audio_position_ms: Option<u64>,
}

/// Variant-typed payload, one shape per [`EventType`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    VadSpeechStart(VadSpeechStartPayload),
    VadSpeechEnd(VadSpeechEndPayload),
    PartialResult(TextResultPayload),
    FinalResult(TextResultPayload),
    TextDelta(TextResultPayload),
    ResponseStart(ResponsePayload),
    ResponseEnd(ResponsePayload),
    Interrupted(InterruptedPayload),
    InterruptAcknowledged(InterruptAcknowledgedPayload),
    AudioPause,
    AudioResume,
    Error(LogPayload),
    Warning(LogPayload),
    BargeIn(BargeInPayload),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::VadSpeechStart(_) => EventType::VadSpeechStart,
            EventPayload::VadSpeechEnd(_) => EventType::VadSpeechEnd,
            EventPayload::PartialResult(_) => EventType::PartialResult,
            EventPayload::FinalResult(_) => EventType::FinalResult,
            EventPayload::TextDelta(_) => EventType::TextDelta,
            EventPayload::ResponseStart(_) => EventType::ResponseStart,
            EventPayload::ResponseEnd(_) => EventType::ResponseEnd,
            EventPayload::Interrupted(_) => EventType::Interrupted,
            EventPayload::InterruptAcknowledged(_) => EventType::InterruptAcknowledged,
            EventPayload::AudioPause => EventType::AudioPause,
            EventPayload::AudioResume => EventType::AudioResume,
            EventPayload::Error(_) => EventType::Error,
            EventPayload::Warning(_) => EventType::Warning,
            EventPayload::BargeIn(_) => EventType::BargeIn,
        }
    }
}

/// A single out-of-band signal published to the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            timestamp: now_ms(),
            payload,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_payload() {
        let evt = Event::new(EventPayload::AudioPause);
        assert_eq!(evt.event_type(), EventType::AudioPause);
    }
}
