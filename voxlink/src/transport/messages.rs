/// WebSocket message types for the live voice session protocol
///
/// The wire protocol is a fixed external interface: typed JSON frames in
/// both directions, audio payloads Base64-encoded 16-bit little-endian PCM.
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

// ============================================================================
// Client -> Server Messages
// ============================================================================

/// One wire-format microphone chunk.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AudioInput {
    /// Message type identifier (always "input_audio")
    pub message_type: &'static str,

    /// Base64-encoded PCM audio data (i16 little-endian)
    pub audio_base_64: String,

    /// MIME-style tag declaring the wire format
    pub mime_type: String,

    /// Sample rate in Hz (sent with the first chunk)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
}

impl AudioInput {
    /// Wrap encoded PCM bytes for transmission.
    pub fn from_wire(bytes: &[u8], sample_rate: u32) -> Self {
        Self {
            message_type: "input_audio",
            audio_base_64: STANDARD.encode(bytes),
            mime_type: format!("audio/pcm;rate={}", sample_rate),
            sample_rate: None,
        }
    }

    /// Declare the sample rate explicitly (first chunk of a session).
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }
}

/// Out-of-band text directive (not user speech), used by the silence
/// provocation path.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TextDirective {
    /// Message type identifier (always "text_directive")
    pub message_type: &'static str,

    /// Directive text
    pub text: String,

    /// Marks the text as steering input rather than a user utterance
    pub out_of_band: bool,
}

impl TextDirective {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            message_type: "text_directive",
            text: text.into(),
            out_of_band: true,
        }
    }
}

/// Graceful close request.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CloseMessage {
    /// Message type identifier (always "close")
    pub message_type: &'static str,
}

impl Default for CloseMessage {
    fn default() -> Self {
        Self {
            message_type: "close",
        }
    }
}

impl CloseMessage {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Union type for all client messages.
#[derive(Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum ClientMessage {
    /// Microphone audio chunk
    Audio(AudioInput),
    /// Out-of-band text directive
    Text(TextDirective),
    /// Close request
    Close(CloseMessage),
}

// ============================================================================
// Server -> Client Messages
// ============================================================================

/// Messages received from the server, dispatched on `message_type`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "message_type")]
pub enum ServerMessage {
    /// Session established
    #[serde(rename = "session_started")]
    SessionStarted {
        /// Unique session identifier
        session_id: String,
    },

    /// One chunk of response audio
    #[serde(rename = "audio")]
    Audio {
        /// Base64-encoded PCM audio data (i16 little-endian)
        audio_base_64: String,
    },

    /// The server detected the user talking over the response
    #[serde(rename = "interrupted")]
    Interrupted,

    /// The model finished its turn (audio may still be streaming)
    #[serde(rename = "turn_complete")]
    TurnComplete,

    /// Server-side error
    #[serde(rename = "error")]
    Error {
        /// Error message description
        error_message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_input_serialization() {
        let msg = AudioInput::from_wire(&[0x01, 0x02], 16000).with_sample_rate(16000);
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains("\"message_type\":\"input_audio\""));
        assert!(json.contains("\"mime_type\":\"audio/pcm;rate=16000\""));
        assert!(json.contains("\"sample_rate\":16000"));
        assert!(json.contains(&STANDARD.encode([0x01, 0x02])));
    }

    #[test]
    fn test_audio_input_omits_optional_rate() {
        let msg = AudioInput::from_wire(&[0x01, 0x02], 16000);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("\"sample_rate\""));
    }

    #[test]
    fn test_text_directive_is_out_of_band() {
        let msg = TextDirective::new("say something");
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains("\"message_type\":\"text_directive\""));
        assert!(json.contains("\"out_of_band\":true"));
    }

    #[test]
    fn test_close_message() {
        let json = serde_json::to_string(&CloseMessage::new()).unwrap();
        assert_eq!(json, "{\"message_type\":\"close\"}");
    }

    #[test]
    fn test_server_audio_deserialization() {
        let json = r#"{"message_type":"audio","audio_base_64":"AAB/fw=="}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();

        match msg {
            ServerMessage::Audio { audio_base_64 } => {
                assert_eq!(STANDARD.decode(audio_base_64).unwrap().len(), 4);
            }
            other => panic!("expected Audio, got {:?}", other),
        }
    }

    #[test]
    fn test_server_unit_variants() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"message_type":"interrupted"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Interrupted);

        let msg: ServerMessage =
            serde_json::from_str(r#"{"message_type":"turn_complete"}"#).unwrap();
        assert_eq!(msg, ServerMessage::TurnComplete);
    }

    #[test]
    fn test_server_session_started() {
        let json = r#"{"message_type":"session_started","session_id":"abc-123"}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ServerMessage::SessionStarted {
                session_id: "abc-123".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_message_type_is_rejected() {
        let json = r#"{"message_type":"telemetry","value":1}"#;
        assert!(serde_json::from_str::<ServerMessage>(json).is_err());
    }
}
