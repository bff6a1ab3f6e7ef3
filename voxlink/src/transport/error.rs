use thiserror::Error;

/// Transport-related errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to establish the connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation on a closed connection
    #[error("Connection closed")]
    ConnectionClosed,

    /// Server rejected the credentials
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Connect attempt exceeded the configured timeout
    #[error("Connection timeout after {0} ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP-level error while upgrading
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
