//! The message type that flows along Pipeline edges.
//!
//! A [`PipelineMessage`] is a tagged union: it carries exactly one payload
//! kind (audio, video, text, or command) plus metadata common to all of
//! them. Ownership of a message transfers on enqueue — once a producer
//! hands a message to the next stage's input queue it must not touch it
//! again.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Opaque identifier tying a message to a logical conversation.
pub type SessionId = String;

/// Monotonic-ish wall-clock timestamp, milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Returns the current wall-clock time in milliseconds since the epoch.
pub fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// The discriminant of a [`PipelineMessage`]. Kept in sync with `Payload`
/// by construction: `PipelineMessage::kind()` reads it off the payload
/// rather than a separately-settable field, so the two can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    Audio,
    Video,
    Data,
    Command,
}

/// Raw PCM audio, 16-bit signed little-endian unless `codec` says otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioData {
    pub bytes: Vec<u8>,
    pub sample_rate_hz: u32,
    pub channels: u16,
    /// e.g. `"audio/x-raw"`, `"audio/pcm"`, `"audio/x-opus"`.
    pub media_type: String,
    pub codec: Option<String>,
    pub produced_at: Timestamp,
}

impl AudioData {
    pub fn new(bytes: Vec<u8>, sample_rate_hz: u32, channels: u16) -> Self {
        Self {
            bytes,
            sample_rate_hz,
            channels,
            media_type: "audio/x-raw".to_string(),
            codec: None,
            produced_at: now_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoData {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub media_type: String,
    pub codec: Option<String>,
    pub produced_at: Timestamp,
}

/// Recognized `text_type` values. Kept as a string (not an enum) because
/// the set is open-ended for downstream consumers (`"user_input"` and
/// friends are not exhaustively specified).
pub mod text_type {
    pub const PARTIAL: &str = "text/partial";
    pub const FINAL: &str = "text/final";
    pub const AGENT_RESPONSE: &str = "agent_response";
    pub const ERROR: &str = "error";
    pub const USER_INPUT: &str = "user_input";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextData {
    pub bytes: String,
    pub text_type: String,
    pub produced_at: Timestamp,
}

impl TextData {
    pub fn new(text: impl Into<String>, text_type: impl Into<String>) -> Self {
        Self {
            bytes: text.into(),
            text_type: text_type.into(),
            produced_at: now_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// The payload carried by a message. The variant itself is the `Kind`
/// discriminant — there is no way to construct a message whose `Kind`
/// disagrees with its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    Audio(AudioData),
    Video(VideoData),
    Data(TextData),
    Command(CommandData),
}

impl Payload {
    pub fn kind(&self) -> Kind {
        match self {
            Payload::Audio(_) => Kind::Audio,
            Payload::Video(_) => Kind::Video,
            Payload::Data(_) => Kind::Data,
            Payload::Command(_) => Kind::Command,
        }
    }
}

/// Tagged-union message flowing between Elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMessage {
    pub session_id: SessionId,
    pub timestamp: Timestamp,
    pub payload: Payload,
}

impl PipelineMessage {
    pub fn new(session_id: impl Into<SessionId>, payload: Payload) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: now_ms(),
            payload,
        }
    }

    pub fn audio(session_id: impl Into<SessionId>, data: AudioData) -> Self {
        Self::new(session_id, Payload::Audio(data))
    }

    pub fn video(session_id: impl Into<SessionId>, data: VideoData) -> Self {
        Self::new(session_id, Payload::Video(data))
    }

    pub fn text(session_id: impl Into<SessionId>, data: TextData) -> Self {
        Self::new(session_id, Payload::Data(data))
    }

    pub fn command(session_id: impl Into<SessionId>, data: CommandData) -> Self {
        Self::new(session_id, Payload::Command(data))
    }

    pub fn kind(&self) -> Kind {
        self.payload.kind()
    }

    pub fn as_audio(&self) -> Option<&AudioData> {
        match &self.payload {
            Payload::Audio(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_video(&self) -> Option<&VideoData> {
        match &self.payload {
            Payload::Video(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextData> {
        match &self.payload {
            Payload::Data(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_command(&self) -> Option<&CommandData> {
        match &self.payload {
            Payload::Command(c) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_payload() {
        let msg = PipelineMessage::audio("s1", AudioData::new(vec![0; 4], 16000, 1));
        assert_eq!(msg.kind(), Kind::Audio);
        assert!(msg.as_audio().is_some());
        assert!(msg.as_text().is_none());
    }

    #[test]
    fn text_helper_sets_type() {
        let msg = PipelineMessage::text("s1", TextData::new("hi", text_type::PARTIAL));
        let text = msg.as_text().unwrap();
        assert_eq!(text.text_type, text_type::PARTIAL);
        assert_eq!(text.bytes, "hi");
    }
}
