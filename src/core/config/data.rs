use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of `config.toml`. Every key is optional; unset keys fall back to
/// the built-in defaults when settings are resolved.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// WebSocket endpoint of the agent server (e.g., "ws://localhost:8002/chat")
    pub endpoint: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    /// Longest silence tolerated between server frames. Unset waits forever.
    pub response_timeout_secs: Option<u64>,
    /// First assistant message of a new conversation; empty disables it
    pub greeting: Option<String>,
    pub error_notice: Option<String>,
    /// Transcript file enabled at startup
    pub log_file: Option<String>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
///
/// # Examples
/// - Unix: `/home/user/.config/heysol/config.toml` → `~/.config/heysol/config.toml`
/// - macOS: `/Users/user/Library/Application Support/...` → `~/Library/Application Support/...`
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
