//! Prompt-less "say" command

use std::error::Error;
use std::io::{self, Write};

use crate::core::chat_stream::ChatStreamService;
use crate::core::config::Config;
use crate::core::driver::run_exchange;
use crate::core::exchange::ExchangeStatus;
use crate::core::session::{ChatSession, SessionUpdate, SubmitError};

pub async fn run_say(
    config: &Config,
    endpoint: Option<&str>,
    prompt: Vec<String>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");

    let mut settings = config.session_settings(endpoint);
    settings.greeting.clear();
    let mut session = ChatSession::new(settings);

    let params = match session.submit(&prompt) {
        Ok(params) => params,
        Err(SubmitError::Blank) => {
            eprintln!("Usage: heysol say <prompt>");
            std::process::exit(1);
        }
        Err(err) => return Err(err.into()),
    };

    let (stream_service, mut rx) = ChatStreamService::new();
    let mut write_error = None;
    let status = run_exchange(&mut session, &stream_service, &mut rx, params, |update| {
        match update {
            SessionUpdate::Fragment(text) => {
                print!("{text}");
                if let Err(err) = io::stdout().flush() {
                    write_error.get_or_insert(err);
                }
            }
            SessionUpdate::Committed(_) => println!(),
            SessionUpdate::Failed { notice, cause } => {
                eprintln!("\n❌ {}", notice.content);
                eprintln!("   {cause}");
            }
            SessionUpdate::Ready | SessionUpdate::Idle(_) => {}
        }
    })
    .await?;

    if let Some(err) = write_error {
        return Err(err.into());
    }
    if status != ExchangeStatus::Done {
        std::process::exit(1);
    }
    Ok(())
}
