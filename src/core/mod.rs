pub mod aggregator;
pub mod chat_stream;
pub mod config;
pub mod constants;
pub mod conversation;
pub mod driver;
pub mod exchange;
pub mod message;
pub mod session;
pub mod transport;
