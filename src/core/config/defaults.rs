use std::time::Duration;

use crate::core::config::data::Config;
use crate::core::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_ENDPOINT, DEFAULT_ERROR_NOTICE, DEFAULT_GREETING,
};
use crate::core::session::SessionSettings;
use crate::core::transport::TransportOptions;

impl Config {
    pub fn endpoint_or_default(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    pub fn greeting_or_default(&self) -> &str {
        self.greeting.as_deref().unwrap_or(DEFAULT_GREETING)
    }

    pub fn error_notice_or_default(&self) -> &str {
        self.error_notice.as_deref().unwrap_or(DEFAULT_ERROR_NOTICE)
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            connect_timeout: Duration::from_secs(
                self.connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            response_timeout: self.response_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Resolve session settings; `endpoint_override` (from the command line
    /// or environment) beats the file.
    pub fn session_settings(&self, endpoint_override: Option<&str>) -> SessionSettings {
        SessionSettings {
            endpoint: endpoint_override
                .unwrap_or_else(|| self.endpoint_or_default())
                .to_string(),
            transport: self.transport_options(),
            greeting: self.greeting_or_default().to_string(),
            error_notice: self.error_notice_or_default().to_string(),
        }
    }
}
