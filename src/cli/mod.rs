//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod ping;
pub mod say;
pub mod settings;

use std::error::Error;

use clap::{Parser, Subcommand};

use crate::cli::chat::run_chat;
use crate::cli::ping::run_ping;
use crate::cli::say::run_say;
use crate::cli::settings::{apply_set, apply_unset};
use crate::core::config::{path_display, Config};
use crate::utils::logging::init_tracing;

#[derive(Parser)]
#[command(name = "heysol")]
#[command(about = "A terminal chat client for the HeySol agent server")]
#[command(
    long_about = "HeySol talks to an agent server over a WebSocket. Each message you send \
opens a fresh connection; the reply streams back fragment by fragment.\n\n\
Environment Variables:\n\
  HEYSOL_ENDPOINT   Chat endpoint (defaults to ws://localhost:8002/chat)\n\
  RUST_LOG          Diagnostic log filter (e.g. heysol=debug)\n\n\
Controls:\n\
  Enter             Send the message\n\
  Ctrl+C            Cancel the reply in progress\n\n\
Commands:\n\
  /help             Show the chat commands\n\
  /actions          List quick actions; /<n> sends action n\n\
  /history          Print the conversation so far\n\
  /log <filename>   Enable logging to specified file\n\
  /log              Toggle logging pause/resume\n\
  /quit             Leave the chat"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// WebSocket endpoint of the agent server
    #[arg(short = 'e', long, global = true, env = "HEYSOL_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Enable logging to specified file
    #[arg(short = 'l', long, global = true)]
    pub log: Option<String>,

    /// Print debug diagnostics to stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat prompt (default)
    Chat,
    /// Send a single message and print the reply
    Say {
        /// The message to send
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Check that the agent server is up
    Ping,
    /// Set configuration values, or show them when no key is given
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key (can be multiple words)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
    /// Show the configuration file location and contents
    Config,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let config = Config::load()?;
            run_chat(&config, args.endpoint.as_deref(), args.log).await
        }
        Commands::Say { prompt } => {
            let config = Config::load()?;
            run_say(&config, args.endpoint.as_deref(), prompt).await
        }
        Commands::Ping => {
            let config = Config::load()?;
            let endpoint = args
                .endpoint
                .as_deref()
                .unwrap_or_else(|| config.endpoint_or_default());
            run_ping(endpoint).await
        }
        Commands::Set { key, value } => {
            let Some(key) = key else {
                Config::load()?.print_all();
                return Ok(());
            };
            match Config::mutate(|config| Ok(apply_set(config, &key, &value))) {
                Ok(Ok(message)) => {
                    println!("✅ {message}");
                    Ok(())
                }
                Ok(Err(err)) => {
                    err.print();
                    std::process::exit(err.exit_code());
                }
                Err(err) => Err(err),
            }
        }
        Commands::Unset { key } => {
            match Config::mutate(|config| Ok(apply_unset(config, &key))) {
                Ok(Ok(message)) => {
                    println!("✅ {message}");
                    Ok(())
                }
                Ok(Err(err)) => {
                    err.print();
                    std::process::exit(err.exit_code());
                }
                Err(err) => Err(err),
            }
        }
        Commands::Config => {
            let path = Config::get_config_path()?;
            println!("Config file: {}", path_display(&path));
            Config::load_from_path(&path)?.print_all();
            Ok(())
        }
    }
}
