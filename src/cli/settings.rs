//! `heysol set` / `heysol unset` key handling.

use std::fmt;

use crate::core::config::Config;
use crate::utils::url::validate_chat_endpoint;

pub const KEYS: [&str; 6] = [
    "endpoint",
    "connect-timeout",
    "response-timeout",
    "greeting",
    "error-notice",
    "log-file",
];

/// Errors that can occur when modifying configuration settings.
#[derive(Debug, PartialEq, Eq)]
pub enum SettingError {
    /// The provided setting key is not recognized.
    UnknownKey(String),
    InvalidValue {
        key: &'static str,
        input: String,
        reason: String,
    },
    /// Required arguments are missing.
    MissingArgs {
        hint: &'static str,
        example: &'static str,
    },
}

impl SettingError {
    /// Print the error message to stderr with appropriate formatting.
    pub fn print(&self) {
        match self {
            SettingError::UnknownKey(key) => {
                eprintln!("❌ Unknown config key: {key}");
                eprintln!("   Known keys: {}", KEYS.join(", "));
            }
            SettingError::InvalidValue { key, input, reason } => {
                eprintln!("❌ Invalid value for {key}: {input}");
                eprintln!("   {reason}");
            }
            SettingError::MissingArgs { hint, example } => {
                eprintln!("⚠️  {hint}");
                eprintln!("Example: {example}");
            }
        }
    }

    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl fmt::Display for SettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingError::UnknownKey(key) => write!(f, "Unknown config key: {key}"),
            SettingError::InvalidValue { key, input, reason } => {
                write!(f, "Invalid value for {key}: {input} ({reason})")
            }
            SettingError::MissingArgs { hint, .. } => write!(f, "{hint}"),
        }
    }
}

impl std::error::Error for SettingError {}

fn parse_secs(key: &'static str, input: &str) -> Result<u64, SettingError> {
    match input.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(SettingError::InvalidValue {
            key,
            input: input.to_string(),
            reason: "expected a whole number of seconds greater than zero".to_string(),
        }),
    }
}

/// Apply `heysol set <key> <value…>` to `config`. Returns the confirmation
/// line on success.
pub fn apply_set(config: &mut Config, key: &str, value: &[String]) -> Result<String, SettingError> {
    let joined = value.join(" ");
    // An empty greeting is meaningful: it disables the greeting.
    if value.is_empty() && key != "greeting" {
        return Err(SettingError::MissingArgs {
            hint: "Specify a value for the key",
            example: "heysol set endpoint ws://localhost:8002/chat",
        });
    }

    match key {
        "endpoint" => {
            validate_chat_endpoint(&joined).map_err(|reason| SettingError::InvalidValue {
                key: "endpoint",
                input: joined.clone(),
                reason,
            })?;
            config.endpoint = Some(joined.clone());
        }
        "connect-timeout" => {
            config.connect_timeout_secs = Some(parse_secs("connect-timeout", &joined)?);
        }
        "response-timeout" => {
            config.response_timeout_secs = Some(parse_secs("response-timeout", &joined)?);
        }
        "greeting" => config.greeting = Some(joined.clone()),
        "error-notice" => config.error_notice = Some(joined.clone()),
        "log-file" => config.log_file = Some(joined.clone()),
        other => return Err(SettingError::UnknownKey(other.to_string())),
    }

    if joined.is_empty() {
        Ok(format!("Set {key} to: (empty)"))
    } else {
        Ok(format!("Set {key} to: {joined}"))
    }
}

pub fn apply_unset(config: &mut Config, key: &str) -> Result<String, SettingError> {
    match key {
        "endpoint" => config.endpoint = None,
        "connect-timeout" => config.connect_timeout_secs = None,
        "response-timeout" => config.response_timeout_secs = None,
        "greeting" => config.greeting = None,
        "error-notice" => config.error_notice = None,
        "log-file" => config.log_file = None,
        other => return Err(SettingError::UnknownKey(other.to_string())),
    }
    Ok(format!("Unset {key}"))
}
