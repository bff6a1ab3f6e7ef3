/// WebSocket connection to the live voice session endpoint
///
/// Owns the connection lifecycle: URL construction, authenticated upgrade,
/// typed send/receive, and splitting into halves for the sender and
/// receiver tasks.
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        http::{Request, Uri},
    },
};
use tracing::{debug, info, warn};

use crate::transport::error::{TransportError, TransportResult};
use crate::transport::messages::ServerMessage;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the WebSocket stream
pub type WsWriter = SplitSink<WsStream, Message>;

/// Read half of the WebSocket stream
pub type WsReader = SplitStream<WsStream>;

/// Configuration for a live session connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket endpoint, e.g. `wss://host/v1/live`
    pub endpoint: String,

    /// Model identifier requested from the endpoint
    pub model_id: Option<String>,

    /// Sample rate of the audio the client will send, in Hz
    pub sample_rate: u32,

    /// Connection timeout in milliseconds
    pub timeout_ms: u64,
}

impl ConnectionConfig {
    /// Create a configuration for the given endpoint and capture rate.
    pub fn new(endpoint: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            model_id: None,
            sample_rate,
            timeout_ms: 10_000,
        }
    }

    /// Set the model id.
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Set the connection timeout in milliseconds.
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Build the WebSocket URL with query parameters.
    pub fn build_url(&self) -> TransportResult<String> {
        if self.endpoint.is_empty() {
            return Err(TransportError::InvalidConfig("empty endpoint".to_string()));
        }

        let mut url = format!("{}?sample_rate={}", self.endpoint, self.sample_rate);
        if let Some(ref model) = self.model_id {
            url.push_str(&format!("&model_id={}", model));
        }
        Ok(url)
    }
}

/// An established live session connection.
#[derive(Debug)]
pub struct LiveConnection {
    ws_stream: WsStream,
    is_open: bool,
}

impl LiveConnection {
    /// Connect and authenticate against the session endpoint.
    pub async fn connect(api_key: &str, config: &ConnectionConfig) -> TransportResult<Self> {
        let url = config.build_url()?;
        info!("Connecting to live session endpoint");
        debug!(%url, "Connection URL");

        let uri: Uri = url
            .parse()
            .map_err(|e| TransportError::InvalidConfig(format!("Invalid URL: {}", e)))?;

        let host = uri.host().unwrap_or_default().to_string();
        let request = Request::builder()
            .uri(uri)
            .header("x-api-key", api_key)
            .header("Host", host)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .body(())
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let timeout = tokio::time::Duration::from_millis(config.timeout_ms);
        let (ws_stream, response) = tokio::time::timeout(timeout, connect_async(request))
            .await
            .map_err(|_| TransportError::Timeout(config.timeout_ms))?
            .map_err(|e| {
                if let tokio_tungstenite::tungstenite::Error::Http(resp) = &e {
                    if resp.status() == 401 {
                        return TransportError::AuthenticationFailed;
                    }
                }
                TransportError::ConnectionFailed(e.to_string())
            })?;

        info!(status = %response.status(), "Live session connected");

        Ok(Self {
            ws_stream,
            is_open: true,
        })
    }

    /// Serialize a message to JSON and send it.
    pub async fn send<T: Serialize>(&mut self, message: &T) -> TransportResult<()> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        let json = serde_json::to_string(message)?;
        self.ws_stream.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Receive the next typed message; `None` means the connection closed
    /// gracefully.
    pub async fn recv(&mut self) -> TransportResult<Option<ServerMessage>> {
        if !self.is_open {
            return Ok(None);
        }

        match self.ws_stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let message: ServerMessage = serde_json::from_str(&text)?;
                Ok(Some(message))
            }
            Some(Ok(Message::Close(frame))) => {
                info!(?frame, "Received close frame");
                self.is_open = false;
                Ok(None)
            }
            Some(Ok(Message::Ping(data))) => {
                self.ws_stream.send(Message::Pong(data)).await?;
                Box::pin(self.recv()).await
            }
            Some(Ok(Message::Pong(_))) => Box::pin(self.recv()).await,
            Some(Ok(msg)) => {
                warn!("Received unexpected message type: {:?}", msg);
                Box::pin(self.recv()).await
            }
            Some(Err(e)) => {
                self.is_open = false;
                Err(TransportError::WebSocket(e))
            }
            None => {
                self.is_open = false;
                Ok(None)
            }
        }
    }

    /// Send a close frame.
    pub async fn close(&mut self) -> TransportResult<()> {
        if !self.is_open {
            return Ok(());
        }
        self.ws_stream.close(None).await?;
        self.is_open = false;
        Ok(())
    }

    /// Whether the connection is open.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Split into independent read and write halves for concurrent tasks.
    pub fn split(self) -> (WsWriter, WsReader) {
        self.ws_stream.split()
    }
}
