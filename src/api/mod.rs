use serde::{Deserialize, Serialize};

/// Payload sent once per exchange, right after the connection is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Frames the agent server streams back for one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// One fragment of the reply; appended to what came before.
    Stream { text: String },
    /// The reply is complete. Nothing follows.
    Done,
    /// The server failed while producing the reply.
    Error {
        #[serde(default)]
        text: String,
    },
}

/// Parse one text frame. Unknown `type` values and malformed JSON are errors.
pub fn parse_server_frame(payload: &str) -> Result<ServerFrame, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Body of the agent server's HTTP root.
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub message: String,
}
