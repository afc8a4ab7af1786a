use crate::core::config::data::Config;

fn show<T: std::fmt::Display>(value: Option<T>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "(unset)".to_string(),
    }
}

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        println!(
            "  endpoint: {}",
            self.endpoint
                .clone()
                .unwrap_or_else(|| format!("(default: {})", self.endpoint_or_default()))
        );
        println!(
            "  connect-timeout: {}",
            match self.connect_timeout_secs {
                Some(secs) => format!("{secs}s"),
                None => format!(
                    "(default: {}s)",
                    self.transport_options().connect_timeout.as_secs()
                ),
            }
        );
        println!(
            "  response-timeout: {}",
            show(self.response_timeout_secs.map(|secs| format!("{secs}s")))
        );
        match self.greeting.as_deref() {
            Some("") => println!("  greeting: (disabled)"),
            other => println!("  greeting: {}", show(other)),
        }
        println!("  error-notice: {}", show(self.error_notice.as_deref()));
        println!("  log-file: {}", show(self.log_file.as_deref()));
    }
}
