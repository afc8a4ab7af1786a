//! Identity, status and invariant errors shared by the pieces of one exchange.

use std::error::Error as StdError;
use std::fmt;

/// Identifies one user-submit-to-final-reply cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangeId(u64);

impl ExchangeId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStatus {
    /// Submitted; the connection is opening or no fragment has arrived yet.
    Pending,
    /// At least one fragment has been applied.
    Streaming,
    /// Completion was committed. Waiting for teardown.
    Done,
    /// The transport failed. Waiting for teardown.
    Failed,
}

impl ExchangeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExchangeStatus::Pending => "pending",
            ExchangeStatus::Streaming => "streaming",
            ExchangeStatus::Done => "done",
            ExchangeStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExchangeStatus::Done | ExchangeStatus::Failed)
    }
}

impl fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A broken sequencing invariant. These indicate a bug in the caller or a
/// misbehaving transport and are never absorbed silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// An event arrived for an exchange that is not the active one, or while
    /// no exchange is active at all.
    NoActiveExchange { exchange: ExchangeId },
    /// An event arrived that the exchange's current status does not allow.
    OutOfOrder {
        exchange: ExchangeId,
        event: &'static str,
        status: ExchangeStatus,
    },
    /// A slot operation ran while no in-flight slot was open.
    NoInFlight { operation: &'static str },
    /// `begin_in_flight` ran while a slot was already open.
    InFlightAlreadyOpen,
    /// The aggregator was used after it produced its final text.
    AggregatorFinished,
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolViolation::NoActiveExchange { exchange } => {
                write!(f, "event for exchange {exchange} but it is not active")
            }
            ProtocolViolation::OutOfOrder {
                exchange,
                event,
                status,
            } => write!(
                f,
                "unexpected {event} event for exchange {exchange} in status {status}"
            ),
            ProtocolViolation::NoInFlight { operation } => {
                write!(f, "{operation} called with no in-flight message")
            }
            ProtocolViolation::InFlightAlreadyOpen => {
                write!(f, "an in-flight message is already open")
            }
            ProtocolViolation::AggregatorFinished => {
                write!(f, "stream aggregator used after completion")
            }
        }
    }
}

impl StdError for ProtocolViolation {}
