use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::core::session::{ChatSession, SessionSettings};

/// One scripted action of the in-process agent server.
#[derive(Debug, Clone)]
pub enum ServerStep {
    Text(String),
    Binary(Vec<u8>),
    Pause(Duration),
    /// Drop the TCP connection without a close handshake.
    Disconnect,
}

impl ServerStep {
    pub fn stream(text: &str) -> Self {
        ServerStep::Text(serde_json::json!({ "type": "stream", "text": text }).to_string())
    }

    pub fn done() -> Self {
        ServerStep::Text(r#"{"type":"done"}"#.to_string())
    }
}

pub struct TestServer {
    pub endpoint: String,
    handle: JoinHandle<Vec<String>>,
}

impl TestServer {
    /// First request payload the server received.
    pub async fn request(self) -> Option<String> {
        self.requests().await.into_iter().next()
    }

    /// Request payloads of every served connection, in order.
    pub async fn requests(self) -> Vec<String> {
        self.handle.await.expect("test server panicked")
    }
}

/// Serve exactly one connection with `steps`.
pub async fn spawn_agent_server(steps: Vec<ServerStep>) -> TestServer {
    spawn_agent_server_for(vec![steps]).await
}

/// Serve one connection per script, sequentially.
pub async fn spawn_agent_server_for(scripts: Vec<Vec<ServerStep>>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for steps in scripts {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("handshake");

            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => requests.push(text.as_str().to_string()),
                _ => continue,
            }

            let mut dropped = false;
            for step in steps {
                match step {
                    ServerStep::Text(text) => {
                        if ws.send(WsMessage::text(text)).await.is_err() {
                            break;
                        }
                    }
                    ServerStep::Binary(bytes) => {
                        if ws.send(WsMessage::binary(bytes)).await.is_err() {
                            break;
                        }
                    }
                    ServerStep::Pause(duration) => tokio::time::sleep(duration).await,
                    ServerStep::Disconnect => {
                        dropped = true;
                        break;
                    }
                }
            }

            if !dropped {
                // Let the client close first.
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_close() {
                        break;
                    }
                }
            }
        }
        requests
    });

    TestServer {
        endpoint: format!("ws://{addr}/chat"),
        handle,
    }
}

/// An endpoint nobody is listening on.
pub async fn unused_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("ws://{addr}/chat")
}

pub fn create_test_session() -> ChatSession {
    ChatSession::new(SessionSettings {
        endpoint: "ws://127.0.0.1:9/chat".to_string(),
        greeting: String::new(),
        ..SessionSettings::default()
    })
}

pub fn create_test_session_for(endpoint: &str) -> ChatSession {
    ChatSession::new(SessionSettings {
        endpoint: endpoint.to_string(),
        greeting: String::new(),
        ..SessionSettings::default()
    })
}
