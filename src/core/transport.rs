//! One WebSocket connection per exchange.
//!
//! A [`TransportSession`] is created unopened, becomes ready once the socket is
//! connected, sends the request exactly once, then yields the reply as
//! [`SessionEvent`]s. After the first terminal event (`Complete` or `Error`)
//! the socket is torn down and the session reports `Closed` once.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::api::{parse_server_frame, ChatRequest, ServerFrame};
use crate::core::constants::DEFAULT_CONNECT_TIMEOUT_SECS;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Longest slice of an offending payload quoted in a `Malformed` error.
const MALFORMED_EXCERPT_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// `send` was called before the session was ready or after it closed.
    NotReady,
    /// The connection could not be established.
    Connect(String),
    /// A connect or response deadline passed; the connection was closed.
    Timeout { stage: &'static str, after: Duration },
    /// The server went away before completing the reply.
    Disconnected,
    /// The server sent something that is not a known frame.
    Malformed(String),
    /// The server reported a failure while producing the reply.
    Server(String),
    /// Socket-level failure while reading or writing.
    WebSocket(String),
    /// The connection was closed locally before completion.
    Cancelled,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotReady => write!(f, "transport session is not ready"),
            TransportError::Connect(reason) => write!(f, "failed to connect: {reason}"),
            TransportError::Timeout { stage, after } => {
                write!(f, "{stage} timed out after {}s", after.as_secs_f32())
            }
            TransportError::Disconnected => {
                write!(f, "connection closed before the reply completed")
            }
            TransportError::Malformed(detail) => write!(f, "malformed server frame: {detail}"),
            TransportError::Server(text) => write!(f, "server error: {text}"),
            TransportError::WebSocket(reason) => write!(f, "websocket error: {reason}"),
            TransportError::Cancelled => write!(f, "connection closed before completion"),
        }
    }
}

impl StdError for TransportError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection is open and the request may be sent.
    Ready,
    Fragment(String),
    Complete,
    Error(TransportError),
    /// The connection has been torn down. Always the last event.
    Closed,
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Ready => "ready",
            SessionEvent::Fragment(_) => "fragment",
            SessionEvent::Complete => "complete",
            SessionEvent::Error(_) => "error",
            SessionEvent::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    pub connect_timeout: Duration,
    /// Longest wait between two server frames. `None` waits forever.
    pub response_timeout: Option<Duration>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            response_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Ready,
    Closed,
}

pub struct TransportSession {
    endpoint: String,
    options: TransportOptions,
    state: SessionState,
    socket: Option<WsStream>,
    terminated: bool,
    closed_reported: bool,
}

impl TransportSession {
    pub fn new(endpoint: impl Into<String>, options: TransportOptions) -> Self {
        Self {
            endpoint: endpoint.into(),
            options,
            state: SessionState::Connecting,
            socket: None,
            terminated: false,
            closed_reported: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a terminal event (`Complete` or `Error`) has been produced.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Open the connection. A failure closes the session for good.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.state != SessionState::Connecting {
            return Err(TransportError::NotReady);
        }

        let limit = self.options.connect_timeout;
        let result = match tokio::time::timeout(limit, connect_async(self.endpoint.as_str())).await
        {
            Ok(Ok((socket, _response))) => Ok(socket),
            Ok(Err(err)) => Err(TransportError::Connect(err.to_string())),
            Err(_) => Err(TransportError::Timeout {
                stage: "connect",
                after: limit,
            }),
        };

        match result {
            Ok(socket) => {
                debug!(endpoint = %self.endpoint, "Transport session ready");
                self.socket = Some(socket);
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(err) => {
                debug!(endpoint = %self.endpoint, error = %err, "Transport connect failed");
                self.terminated = true;
                self.state = SessionState::Closed;
                Err(err)
            }
        }
    }

    /// Send the request payload. Only valid while the session is ready.
    pub async fn send(&mut self, request: &ChatRequest) -> Result<(), TransportError> {
        if self.state != SessionState::Ready {
            return Err(TransportError::NotReady);
        }
        let socket = self.socket.as_mut().ok_or(TransportError::NotReady)?;
        let payload =
            serde_json::to_string(request).map_err(|e| TransportError::Malformed(e.to_string()))?;
        socket
            .send(WsMessage::text(payload))
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }

    /// Next event of the exchange, or `None` once `Closed` has been reported.
    ///
    /// The first `Complete` or `Error` closes the connection; the following
    /// call yields `Closed`.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        match self.state {
            SessionState::Connecting => return None,
            SessionState::Closed => {
                if self.closed_reported {
                    return None;
                }
                self.closed_reported = true;
                return Some(SessionEvent::Closed);
            }
            SessionState::Ready => {}
        }

        let event = match self.read_frame().await {
            Ok(Some(ServerFrame::Stream { text })) => return Some(SessionEvent::Fragment(text)),
            Ok(Some(ServerFrame::Done)) => SessionEvent::Complete,
            Ok(Some(ServerFrame::Error { text })) => {
                SessionEvent::Error(TransportError::Server(text))
            }
            Ok(None) => SessionEvent::Error(TransportError::Disconnected),
            Err(err) => SessionEvent::Error(err),
        };

        self.terminated = true;
        self.close().await;
        Some(event)
    }

    /// Force the connection down. Returns the error to report if the exchange
    /// had not reached a terminal event yet.
    pub async fn force_close(&mut self) -> Option<SessionEvent> {
        let event = if self.terminated {
            None
        } else {
            self.terminated = true;
            Some(SessionEvent::Error(TransportError::Cancelled))
        };
        self.close().await;
        event
    }

    /// Tear the socket down. Safe to call repeatedly; only the first call
    /// touches the network.
    pub async fn close(&mut self) {
        self.state = SessionState::Closed;
        if let Some(mut socket) = self.socket.take() {
            if let Err(err) = socket.close(None).await {
                debug!(endpoint = %self.endpoint, error = %err, "Ignoring close handshake failure");
            }
        }
    }

    async fn read_frame(&mut self) -> Result<Option<ServerFrame>, TransportError> {
        let response_timeout = self.options.response_timeout;
        let socket = self.socket.as_mut().ok_or(TransportError::NotReady)?;

        loop {
            let next = match response_timeout {
                Some(limit) => tokio::time::timeout(limit, socket.next())
                    .await
                    .map_err(|_| TransportError::Timeout {
                        stage: "response",
                        after: limit,
                    })?,
                None => socket.next().await,
            };

            let message = match next {
                None => return Ok(None),
                Some(Err(err)) => return Err(TransportError::WebSocket(err.to_string())),
                Some(Ok(message)) => message,
            };

            match message {
                WsMessage::Text(text) => {
                    return parse_server_frame(text.as_str())
                        .map(Some)
                        .map_err(|err| malformed(&err, text.as_str()));
                }
                WsMessage::Binary(bytes) => {
                    return Err(TransportError::Malformed(format!(
                        "unexpected binary frame ({} bytes)",
                        bytes.len()
                    )));
                }
                WsMessage::Close(_) => return Ok(None),
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
            }
        }
    }
}

fn malformed(err: &serde_json::Error, payload: &str) -> TransportError {
    let excerpt: String = payload.chars().take(MALFORMED_EXCERPT_CHARS).collect();
    TransportError::Malformed(format!("{err}: {excerpt}"))
}
