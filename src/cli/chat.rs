//! Line-oriented chat prompt over stdin/stdout.

use std::error::Error;
use std::io::{self, Write};

use chrono::{DateTime, Local};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::core::chat_stream::ChatStreamService;
use crate::core::config::Config;
use crate::core::constants::QUICK_ACTIONS;
use crate::core::driver::run_exchange;
use crate::core::message::TranscriptRole;
use crate::core::session::{ChatSession, SessionUpdate, SubmitError};
use crate::utils::logging::LoggingState;

const ASSISTANT_LABEL: &str = "HeySol";

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Empty,
    Submit(String),
    Help,
    Quit,
    Actions,
    History,
    Log(Option<String>),
    Unknown(String),
}

pub fn parse_input(line: &str) -> ChatInput {
    let line = line.trim();
    if line.is_empty() {
        return ChatInput::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ChatInput::Submit(line.to_string());
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name {
        "help" | "?" => ChatInput::Help,
        "quit" | "exit" => ChatInput::Quit,
        "actions" => ChatInput::Actions,
        "history" => ChatInput::History,
        "log" if rest.is_empty() => ChatInput::Log(None),
        "log" => ChatInput::Log(Some(rest.to_string())),
        _ => match name.parse::<usize>() {
            Ok(n) if (1..=QUICK_ACTIONS.len()).contains(&n) => {
                ChatInput::Submit(QUICK_ACTIONS[n - 1].to_string())
            }
            _ => ChatInput::Unknown(line.to_string()),
        },
    }
}

fn prefix(role: TranscriptRole, timestamp: DateTime<Local>) -> String {
    let label = match role {
        TranscriptRole::User => "You",
        TranscriptRole::Assistant => ASSISTANT_LABEL,
    };
    format!("[{}] {label}:", timestamp.format("%H:%M"))
}

pub fn format_entry(role: TranscriptRole, content: &str, timestamp: DateTime<Local>) -> String {
    if content.is_empty() {
        prefix(role, timestamp)
    } else {
        format!("{} {content}", prefix(role, timestamp))
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /help             Show this help");
    println!("  /actions          List quick actions; /<n> sends action n");
    println!("  /history          Print the conversation so far");
    println!("  /log <filename>   Enable logging to specified file");
    println!("  /log              Toggle logging pause/resume");
    println!("  /quit             Leave the chat");
    println!("Ctrl+C cancels a reply in progress.");
}

fn print_actions() {
    for (i, action) in QUICK_ACTIONS.iter().enumerate() {
        println!("  /{}  {action}", i + 1);
    }
}

fn print_history(session: &ChatSession) {
    for entry in session.conversation().entries() {
        println!(
            "{}",
            format_entry(entry.role(), entry.content(), entry.timestamp())
        );
    }
}

fn handle_log_command(logging: &mut LoggingState, file: Option<String>) {
    let result = match file {
        Some(path) => logging.set_log_file(path),
        None => logging.toggle_logging("Logging paused"),
    };
    match result {
        Ok(status) => println!("{status}"),
        Err(err) => eprintln!("⚠️  {err}"),
    }
}

pub async fn run_chat(
    config: &Config,
    endpoint: Option<&str>,
    log_file: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let mut session = ChatSession::new(config.session_settings(endpoint));

    if let Some(path) = log_file.or_else(|| config.log_file.clone()) {
        let mut logging = LoggingState::disabled();
        match logging.set_log_file(path) {
            Ok(status) => println!("{status}"),
            Err(err) => eprintln!("⚠️  {err}"),
        }
        session.set_logging(logging);
    }

    println!("Endpoint: {}", session.settings().endpoint);
    println!("Type /help for commands, /actions for quick actions.");
    println!();
    print_history(&session);

    let (stream_service, mut rx) = ChatStreamService::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        io::stdout().flush()?;

        // Ctrl-C at the prompt quits; during a reply it only cancels.
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let text = match parse_input(&line) {
            ChatInput::Empty => continue,
            ChatInput::Quit => break,
            ChatInput::Help => {
                print_help();
                continue;
            }
            ChatInput::Actions => {
                print_actions();
                continue;
            }
            ChatInput::History => {
                print_history(&session);
                continue;
            }
            ChatInput::Log(file) => {
                handle_log_command(session.logging_mut(), file);
                continue;
            }
            ChatInput::Unknown(command) => {
                eprintln!("⚠️  Unknown command: {command}. Type /help for commands.");
                continue;
            }
            ChatInput::Submit(text) => text,
        };

        let params = match session.submit(&text) {
            Ok(params) => params,
            Err(SubmitError::Blank) => continue,
            Err(err @ SubmitError::Busy { .. }) => {
                debug!(error = %err, "Submit rejected");
                eprintln!("⚠️  Still waiting for the previous reply.");
                continue;
            }
        };

        let cancel = params.cancel_token.clone();
        let mut streaming = false;
        let mut settled = false;
        let on_update = |update: &SessionUpdate| match update {
            SessionUpdate::Fragment(text) => {
                if !streaming {
                    print!("{} ", prefix(TranscriptRole::Assistant, Local::now()));
                    streaming = true;
                }
                print!("{text}");
                let _ = io::stdout().flush();
            }
            SessionUpdate::Committed(message) => {
                settled = true;
                if streaming {
                    println!();
                } else {
                    println!(
                        "{}",
                        format_entry(message.role, &message.content, message.timestamp)
                    );
                }
            }
            SessionUpdate::Failed { notice, .. } => {
                settled = true;
                if streaming {
                    println!();
                }
                println!(
                    "{}",
                    format_entry(notice.role, &notice.content, notice.timestamp)
                );
            }
            SessionUpdate::Ready | SessionUpdate::Idle(_) => {}
        };

        let result = {
            let exchange = run_exchange(&mut session, &stream_service, &mut rx, params, on_update);
            tokio::pin!(exchange);
            loop {
                tokio::select! {
                    result = &mut exchange => break result,
                    _ = tokio::signal::ctrl_c() => {
                        debug!("Ctrl-C: cancelling reply");
                        cancel.cancel();
                    }
                }
            }
        };

        if let Err(violation) = result {
            if streaming && !settled {
                println!();
            }
            eprintln!("⚠️  {violation}");
            // An aborted exchange never settled; its notice is the last entry.
            if let Some(notice) = session.conversation().last_message().filter(|_| !settled) {
                println!(
                    "{}",
                    format_entry(notice.role, &notice.content, notice.timestamp)
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn plain_lines_are_submitted_trimmed() {
        assert_eq!(
            parse_input("  show my balance \n"),
            ChatInput::Submit("show my balance".to_string())
        );
        assert_eq!(parse_input("   "), ChatInput::Empty);
    }

    #[test]
    fn slash_commands_are_recognized() {
        assert_eq!(parse_input("/help"), ChatInput::Help);
        assert_eq!(parse_input("/quit"), ChatInput::Quit);
        assert_eq!(parse_input("/actions"), ChatInput::Actions);
        assert_eq!(parse_input("/history"), ChatInput::History);
        assert_eq!(parse_input("/log"), ChatInput::Log(None));
        assert_eq!(
            parse_input("/log  chat.log "),
            ChatInput::Log(Some("chat.log".to_string()))
        );
        assert_eq!(
            parse_input("/frobnicate"),
            ChatInput::Unknown("/frobnicate".to_string())
        );
    }

    #[test]
    fn numbered_commands_send_quick_actions() {
        assert_eq!(
            parse_input("/1"),
            ChatInput::Submit("Transfer SOL".to_string())
        );
        assert_eq!(
            parse_input("/4"),
            ChatInput::Submit("View Transactions".to_string())
        );
        assert_eq!(parse_input("/0"), ChatInput::Unknown("/0".to_string()));
        assert_eq!(parse_input("/5"), ChatInput::Unknown("/5".to_string()));
    }

    #[test]
    fn entries_carry_time_and_speaker() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 9, 7, 0).unwrap();
        assert_eq!(
            format_entry(TranscriptRole::User, "List NFTs", at),
            "[09:07] You: List NFTs"
        );
        assert_eq!(
            format_entry(TranscriptRole::Assistant, "", at),
            "[09:07] HeySol:"
        );
    }
}
