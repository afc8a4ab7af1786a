//! Shared constants used across the application

/// Chat endpoint of the agent server when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8002/chat";

/// First assistant message of a new conversation.
pub const DEFAULT_GREETING: &str = "Hello! How can I assist you today?";

/// Assistant message shown when an exchange fails at the transport level.
pub const DEFAULT_ERROR_NOTICE: &str = "Error connecting to chat service. Please try again later.";

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Canned prompts offered by the chat prompt.
pub const QUICK_ACTIONS: [&str; 4] = ["Transfer SOL", "List NFTs", "Swap Tokens", "View Transactions"];
