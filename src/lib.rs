//! HeySol is a terminal chat client for an agent server that streams its
//! replies over a WebSocket.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation log, the per-exchange state machine, the
//!   WebSocket transport and the stream aggregation that turns fragments into
//!   finished replies.
//! - [`api`] defines the wire payloads exchanged with the agent server.
//! - [`cli`] parses arguments and runs the chat prompt and one-shot commands.
//! - [`utils`] holds transcript logging and URL helpers.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
