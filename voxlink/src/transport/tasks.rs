/// Async tasks bridging the WebSocket and the session's typed channels
///
/// The sender drains outbound [`ClientMessage`]s into the socket; the
/// receiver turns socket frames into [`TransportEvent`]s, emitting `Open`
/// first and `Closed` last so the session core observes the connection
/// lifecycle purely through its event channel.
use base64::{Engine, engine::general_purpose::STANDARD};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::transport::TransportEvent;
use crate::transport::connection::{WsReader, WsWriter};
use crate::transport::error::{TransportError, TransportResult};
use crate::transport::messages::{ClientMessage, ServerMessage};

/// Drain outbound messages into the socket.
///
/// Returns when the channel closes or a `Close` message is sent; either way
/// the socket is shut down before returning.
pub async fn sender_task(
    mut ws_writer: WsWriter,
    mut outbound_rx: mpsc::Receiver<ClientMessage>,
) -> TransportResult<()> {
    info!("Transport sender task started");

    let mut sent = 0u64;
    while let Some(message) = outbound_rx.recv().await {
        let closing = matches!(message, ClientMessage::Close(_));

        let json = serde_json::to_string(&message).map_err(TransportError::Serialization)?;
        ws_writer
            .send(Message::Text(json.into()))
            .await
            .map_err(TransportError::WebSocket)?;
        sent += 1;

        if closing {
            debug!("Close requested, shutting down socket");
            break;
        }
    }

    if let Err(e) = ws_writer.close().await {
        warn!("Failed to close WebSocket writer: {}", e);
    }

    info!(sent, "Transport sender task finished");
    Ok(())
}

/// Decode socket frames into transport events.
///
/// Emits [`TransportEvent::Open`] immediately and [`TransportEvent::Closed`]
/// when the stream ends, errors out, or the peer closes. Malformed frames
/// are logged and skipped.
pub async fn receiver_task(
    mut ws_reader: WsReader,
    events_tx: mpsc::Sender<TransportEvent>,
) -> TransportResult<()> {
    info!("Transport receiver task started");

    if events_tx.send(TransportEvent::Open).await.is_err() {
        return Ok(());
    }

    let mut result = Ok(());
    while let Some(frame) = ws_reader.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(message) => {
                    let Some(event) = map_server_message(message) else {
                        continue;
                    };
                    if events_tx.send(event).await.is_err() {
                        debug!("Event consumer dropped, receiver exiting");
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Skipping malformed server frame");
                }
            },
            // Some backends push raw PCM as binary frames
            Ok(Message::Binary(data)) => {
                if events_tx
                    .send(TransportEvent::Audio(data.to_vec()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(Message::Close(frame)) => {
                info!(?frame, "Server closed the session");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
            Err(e) => {
                error!("WebSocket error: {}", e);
                result = Err(TransportError::WebSocket(e));
                break;
            }
        }
    }

    let _ = events_tx.send(TransportEvent::Closed).await;
    info!("Transport receiver task finished");
    result
}

fn map_server_message(message: ServerMessage) -> Option<TransportEvent> {
    match message {
        ServerMessage::SessionStarted { session_id } => {
            Some(TransportEvent::SessionStarted { session_id })
        }
        ServerMessage::Audio { audio_base_64 } => match STANDARD.decode(&audio_base_64) {
            Ok(bytes) => Some(TransportEvent::Audio(bytes)),
            Err(e) => {
                warn!(error = %e, "Skipping undecodable audio payload");
                None
            }
        },
        ServerMessage::Interrupted => Some(TransportEvent::Interrupted),
        ServerMessage::TurnComplete => Some(TransportEvent::TurnComplete),
        ServerMessage::Error { error_message } => Some(TransportEvent::Error {
            message: error_message,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_payload_is_decoded() {
        let message = ServerMessage::Audio {
            audio_base_64: STANDARD.encode([0x10, 0x20, 0x30, 0x40]),
        };

        match map_server_message(message) {
            Some(TransportEvent::Audio(bytes)) => {
                assert_eq!(bytes, vec![0x10, 0x20, 0x30, 0x40]);
            }
            other => panic!("expected Audio event, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_base64_is_skipped() {
        let message = ServerMessage::Audio {
            audio_base_64: "not base64!!!".to_string(),
        };
        assert!(map_server_message(message).is_none());
    }

    #[test]
    fn test_bookkeeping_messages_map_through() {
        assert_eq!(
            map_server_message(ServerMessage::Interrupted),
            Some(TransportEvent::Interrupted)
        );
        assert_eq!(
            map_server_message(ServerMessage::TurnComplete),
            Some(TransportEvent::TurnComplete)
        );
        assert_eq!(
            map_server_message(ServerMessage::Error {
                error_message: "bad".to_string()
            }),
            Some(TransportEvent::Error {
                message: "bad".to_string()
            })
        );
    }
}
