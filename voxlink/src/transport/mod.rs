//! Session transport
//!
//! WebSocket client for the live voice session endpoint. The wire protocol
//! is a fixed external interface; the rest of the crate only ever sees the
//! typed [`TransportEvent`]/[`ClientMessage`] channels, so the network
//! client is replaceable and tests drive the session with channels
//! directly.

use tokio::sync::mpsc;

/// WebSocket connection management
pub mod connection;

/// Transport-related error types
pub mod error;

/// Typed client/server wire messages
pub mod messages;

/// Sender/receiver bridge tasks
pub mod tasks;

// Re-export commonly used types
pub use connection::{ConnectionConfig, LiveConnection, WsReader, WsWriter};
pub use error::{TransportError, TransportResult};
pub use messages::{AudioInput, ClientMessage, CloseMessage, ServerMessage, TextDirective};

/// Typed events the session core consumes from the transport boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Channel established; engines may spin up
    Open,
    /// Server acknowledged the session
    SessionStarted { session_id: String },
    /// One wire-format audio chunk (decoded from the frame payload)
    Audio(Vec<u8>),
    /// The server believes the user talked over the response. Bookkeeping
    /// only: scheduled audio still plays out.
    Interrupted,
    /// Model turn finished; the audio tail may still be streaming
    TurnComplete,
    /// Server-side error report
    Error { message: String },
    /// Channel gone; engines must wind down
    Closed,
}

/// Channel pair binding the session core to a transport implementation.
pub struct TransportLink {
    /// Events flowing from the transport into the session
    pub events: mpsc::Receiver<TransportEvent>,
    /// Messages flowing from the session out to the transport
    pub outbound: mpsc::Sender<ClientMessage>,
}
