//! WebSocket transport to the realtime speech service.
//!
//! [`RealtimeConnector`] / [`RealtimeConnection`] are the seam the session is
//! written against; [`GeminiLiveConnector`] implements them on
//! `tokio-tungstenite`.  `connect` only returns once the server has
//! acknowledged the setup message, so a returned connection is ready for
//! audio.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::protocol::{ClientMessage, ServerMessage, SessionSetup};
use super::session::SessionError;
use crate::config::{ApiConfig, VoiceConfig};

const BIDI_PATH: &str =
    "/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Upper bound on flushing our close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Opens realtime connections.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    /// Connect, send `setup`, and wait for the server's acknowledgement.
    async fn connect(
        &self,
        setup: &SessionSetup,
    ) -> Result<Box<dyn RealtimeConnection>, SessionError>;
}

/// An established realtime connection.
#[async_trait]
pub trait RealtimeConnection: Send {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), SessionError>;

    /// Next server message.
    ///
    /// `None` means the server closed the stream normally.  An abnormal
    /// close, a transport error, or the stream ending without a close frame
    /// is reported as `Some(Err(_))`.  Must be cancel-safe.
    async fn recv(&mut self) -> Option<Result<ServerMessage, SessionError>>;

    /// Best-effort close; errors are ignored.
    async fn close(&mut self);
}

// ---------------------------------------------------------------------------
// GeminiLiveConnector
// ---------------------------------------------------------------------------

/// Connects to the Gemini Live `BidiGenerateContent` endpoint.
pub struct GeminiLiveConnector {
    realtime_url: String,
    api_key: Option<String>,
    handshake_timeout: Duration,
}

impl GeminiLiveConnector {
    pub fn from_config(api: &ApiConfig, voice: &VoiceConfig) -> Self {
        Self {
            realtime_url: api.realtime_url.trim_end_matches('/').to_string(),
            api_key: api.resolve_api_key(),
            handshake_timeout: Duration::from_secs(voice.handshake_timeout_secs),
        }
    }

    fn endpoint(&self, key: &str) -> String {
        format!("{}{}?key={}", self.realtime_url, BIDI_PATH, key)
    }

    async fn handshake(
        &self,
        url: &str,
        setup: &SessionSetup,
    ) -> Result<GeminiLiveConnection, SessionError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;
        log::debug!("transport: websocket open, sending setup");

        let mut conn = GeminiLiveConnection { ws };
        conn.send(&ClientMessage::Setup(setup.clone())).await?;

        loop {
            match conn.recv().await {
                Some(Ok(message)) if message.is_setup_complete() => return Ok(conn),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(SessionError::Connection(
                        "server closed the stream during setup".into(),
                    ))
                }
            }
        }
    }
}

#[async_trait]
impl RealtimeConnector for GeminiLiveConnector {
    async fn connect(
        &self,
        setup: &SessionSetup,
    ) -> Result<Box<dyn RealtimeConnection>, SessionError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SessionError::Connection("no API key configured".into()))?;

        // The URL carries the key; log the base only.
        log::info!("transport: connecting to {}", self.realtime_url);
        let url = self.endpoint(key);

        match tokio::time::timeout(self.handshake_timeout, self.handshake(&url, setup)).await {
            Ok(Ok(conn)) => {
                log::info!("transport: setup complete");
                Ok(Box::new(conn))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SessionError::Connection(format!(
                "no setup acknowledgement within {}s",
                self.handshake_timeout.as_secs()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// GeminiLiveConnection
// ---------------------------------------------------------------------------

struct GeminiLiveConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

/// What a single WebSocket frame means to the session.
#[derive(Debug)]
enum Incoming {
    Message(ServerMessage),
    /// Control frames and payloads that are not valid JSON.
    Skip,
    ClosedNormally,
    Failed(SessionError),
}

fn interpret(frame: Message) -> Incoming {
    let parsed = match &frame {
        Message::Text(text) => serde_json::from_str::<ServerMessage>(text),
        Message::Binary(bytes) => serde_json::from_slice::<ServerMessage>(bytes),
        Message::Close(None) => return Incoming::ClosedNormally,
        Message::Close(Some(close)) => {
            return if close.code == CloseCode::Normal {
                Incoming::ClosedNormally
            } else {
                Incoming::Failed(SessionError::Connection(format!(
                    "server closed the stream ({}): {}",
                    u16::from(close.code),
                    close.reason
                )))
            };
        }
        _ => return Incoming::Skip,
    };

    match parsed {
        Ok(message) => Incoming::Message(message),
        Err(e) => {
            log::warn!("transport: ignoring unparseable message: {e}");
            Incoming::Skip
        }
    }
}

#[async_trait]
impl RealtimeConnection for GeminiLiveConnection {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), SessionError> {
        let json = message
            .to_json()
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        self.ws
            .send(Message::Text(json))
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<ServerMessage, SessionError>> {
        loop {
            let frame = match self.ws.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Some(Err(SessionError::Connection(e.to_string()))),
                None => {
                    return Some(Err(SessionError::Connection(
                        "stream ended without a close frame".into(),
                    )))
                }
            };

            match interpret(frame) {
                Incoming::Message(message) => return Some(Ok(message)),
                Incoming::Skip => continue,
                Incoming::ClosedNormally => return None,
                Incoming::Failed(e) => return Some(Err(e)),
            }
        }
    }

    async fn close(&mut self) {
        if tokio::time::timeout(CLOSE_TIMEOUT, self.ws.close(None))
            .await
            .is_err()
        {
            log::debug!("transport: close frame not flushed in time");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
