/// Integration tests for the transport wire messages
///
/// Validates the JSON shapes both directions of the session protocol
/// agree on.
use base64::{Engine, engine::general_purpose::STANDARD};
use voxlink_lib::transport::{
    AudioInput, ClientMessage, CloseMessage, ServerMessage, TextDirective,
};

#[test]
fn test_audio_input_full_shape() {
    let pcm = [0x00u8, 0x40, 0x00, 0xC0];
    let message = AudioInput::from_wire(&pcm, 16000).with_sample_rate(16000);

    let json = serde_json::to_string(&ClientMessage::Audio(message)).unwrap();

    assert!(json.contains("\"message_type\":\"input_audio\""));
    assert!(json.contains("\"mime_type\":\"audio/pcm;rate=16000\""));
    assert!(json.contains("\"sample_rate\":16000"));
    assert!(json.contains(&STANDARD.encode(pcm)));
}

#[test]
fn test_follow_up_chunks_omit_sample_rate() {
    let message = AudioInput::from_wire(&[0x00, 0x01], 16000);
    let json = serde_json::to_string(&ClientMessage::Audio(message)).unwrap();
    assert!(!json.contains("sample_rate"));
}

#[test]
fn test_text_directive_shape() {
    let message = TextDirective::new("(Silence. Say something.)");
    let json = serde_json::to_string(&ClientMessage::Text(message)).unwrap();

    assert!(json.contains("\"message_type\":\"text_directive\""));
    assert!(json.contains("\"out_of_band\":true"));
    assert!(json.contains("(Silence. Say something.)"));
}

#[test]
fn test_close_shape() {
    let json = serde_json::to_string(&ClientMessage::Close(CloseMessage::new())).unwrap();
    assert_eq!(json, "{\"message_type\":\"close\"}");
}

#[test]
fn test_server_audio_round_trip() {
    let payload = STANDARD.encode([1u8, 2, 3, 4, 5, 6]);
    let json = format!(
        "{{\"message_type\":\"audio\",\"audio_base_64\":\"{}\"}}",
        payload
    );

    let message: ServerMessage = serde_json::from_str(&json).unwrap();
    match message {
        ServerMessage::Audio { audio_base_64 } => {
            assert_eq!(STANDARD.decode(audio_base_64).unwrap(), [1, 2, 3, 4, 5, 6]);
        }
        other => panic!("expected Audio, got {:?}", other),
    }
}

#[test]
fn test_server_lifecycle_messages() {
    let started: ServerMessage = serde_json::from_str(
        r#"{"message_type":"session_started","session_id":"s-42"}"#,
    )
    .unwrap();
    assert_eq!(
        started,
        ServerMessage::SessionStarted {
            session_id: "s-42".to_string()
        }
    );

    let interrupted: ServerMessage =
        serde_json::from_str(r#"{"message_type":"interrupted"}"#).unwrap();
    assert_eq!(interrupted, ServerMessage::Interrupted);

    let turn_complete: ServerMessage =
        serde_json::from_str(r#"{"message_type":"turn_complete"}"#).unwrap();
    assert_eq!(turn_complete, ServerMessage::TurnComplete);

    let error: ServerMessage = serde_json::from_str(
        r#"{"message_type":"error","error_message":"quota exceeded"}"#,
    )
    .unwrap();
    assert_eq!(
        error,
        ServerMessage::Error {
            error_message: "quota exceeded".to_string()
        }
    );
}

#[test]
fn test_unknown_server_message_is_an_error() {
    let result =
        serde_json::from_str::<ServerMessage>(r#"{"message_type":"future_feature"}"#);
    assert!(result.is_err());
}
