//! The session orchestrator.
//!
//! [`ChatSession`] owns the conversation log and at most one live exchange.
//! `submit` starts an exchange and returns the parameters for the transport
//! task; every event that task produces is fed back through `handle_event`,
//! which applies it as a named transition of the exchange state machine:
//!
//! ```text
//! Idle -> Pending -> Streaming -> Done   -> Idle
//!            \           \------> Failed -> Idle
//!             \-----------------> Failed
//! ```
//!
//! `Idle` is re-entered only when the transport reports `Closed`.

use std::error::Error as StdError;
use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::aggregator::StreamAggregator;
use super::chat_stream::StreamParams;
use super::constants::{DEFAULT_ENDPOINT, DEFAULT_ERROR_NOTICE, DEFAULT_GREETING};
use super::conversation::ConversationLog;
use super::exchange::{ExchangeId, ExchangeStatus, ProtocolViolation};
use super::message::Message;
use super::transport::{SessionEvent, TransportError, TransportOptions};
use crate::api::ChatRequest;
use crate::utils::logging::LoggingState;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub endpoint: String,
    pub transport: TransportOptions,
    /// First assistant message of a new conversation. Empty for none.
    pub greeting: String,
    /// Text of the assistant message appended when an exchange fails.
    pub error_notice: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            transport: TransportOptions::default(),
            greeting: DEFAULT_GREETING.to_string(),
            error_notice: DEFAULT_ERROR_NOTICE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// Empty or whitespace-only input. Nothing was sent.
    Blank,
    /// Another exchange is still outstanding.
    Busy {
        exchange: ExchangeId,
        status: ExchangeStatus,
    },
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Blank => write!(f, "message is empty"),
            SubmitError::Busy { exchange, status } => {
                write!(f, "exchange {exchange} is still {status}")
            }
        }
    }
}

impl StdError for SubmitError {}

/// What changed after an event was applied, for the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Ready,
    /// A fragment was folded into the in-flight reply.
    Fragment(String),
    Committed(Message),
    Failed {
        notice: Message,
        cause: TransportError,
    },
    /// Teardown finished; the session accepts a new submit.
    Idle(ExchangeStatus),
}

struct Exchange {
    id: ExchangeId,
    status: ExchangeStatus,
    /// `Ready` has been seen. The transport reports it at most once.
    ready: bool,
    aggregator: StreamAggregator,
    cancel_token: CancellationToken,
}

pub struct ChatSession {
    settings: SessionSettings,
    conversation: ConversationLog,
    exchange: Option<Exchange>,
    next_exchange_id: u64,
    logging: LoggingState,
}

impl ChatSession {
    pub fn new(settings: SessionSettings) -> Self {
        let conversation = ConversationLog::with_greeting(&settings.greeting);
        Self {
            settings,
            conversation,
            exchange: None,
            next_exchange_id: 0,
            logging: LoggingState::disabled(),
        }
    }

    pub fn conversation(&self) -> &ConversationLog {
        &self.conversation
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn logging(&self) -> &LoggingState {
        &self.logging
    }

    pub fn logging_mut(&mut self) -> &mut LoggingState {
        &mut self.logging
    }

    pub fn set_logging(&mut self, logging: LoggingState) {
        self.logging = logging;
    }

    /// Status of the outstanding exchange, `None` when idle.
    pub fn status(&self) -> Option<ExchangeStatus> {
        self.exchange.as_ref().map(|exchange| exchange.status)
    }

    pub fn current_exchange(&self) -> Option<ExchangeId> {
        self.exchange.as_ref().map(|exchange| exchange.id)
    }

    pub fn is_idle(&self) -> bool {
        self.exchange.is_none()
    }

    /// Start a new exchange for `text`.
    ///
    /// Blank input and input arriving while another exchange is outstanding
    /// are rejected without touching the log. Nothing is queued.
    pub fn submit(&mut self, text: &str) -> Result<StreamParams, SubmitError> {
        if text.trim().is_empty() {
            return Err(SubmitError::Blank);
        }
        if let Some(exchange) = &self.exchange {
            debug!(exchange_id = %exchange.id, status = %exchange.status, "Rejecting submit while busy");
            return Err(SubmitError::Busy {
                exchange: exchange.id,
                status: exchange.status,
            });
        }

        self.conversation.append_user_message(text);
        self.log_transcript(&format!("You: {text}"));

        self.next_exchange_id += 1;
        let id = ExchangeId::new(self.next_exchange_id);
        let cancel_token = CancellationToken::new();
        self.exchange = Some(Exchange {
            id,
            status: ExchangeStatus::Pending,
            ready: false,
            aggregator: StreamAggregator::new(),
            cancel_token: cancel_token.clone(),
        });
        debug!(exchange_id = %id, endpoint = %self.settings.endpoint, "Exchange submitted");

        Ok(StreamParams {
            endpoint: self.settings.endpoint.clone(),
            request: ChatRequest::new(text),
            options: self.settings.transport,
            cancel_token,
            exchange_id: id,
        })
    }

    /// Close the live connection early. The transport reports this as an
    /// error, which then runs through the normal failure path.
    pub fn cancel(&self) {
        if let Some(exchange) = &self.exchange {
            debug!(exchange_id = %exchange.id, "Cancelling exchange");
            exchange.cancel_token.cancel();
        }
    }

    /// Apply one transport event of `exchange_id`.
    ///
    /// Events for an exchange that is not the active one leave the log
    /// untouched and are reported as a [`ProtocolViolation`].
    pub fn handle_event(
        &mut self,
        exchange_id: ExchangeId,
        event: SessionEvent,
    ) -> Result<SessionUpdate, ProtocolViolation> {
        let Some((status, ready)) = self
            .exchange
            .as_ref()
            .filter(|exchange| exchange.id == exchange_id)
            .map(|exchange| (exchange.status, exchange.ready))
        else {
            let violation = ProtocolViolation::NoActiveExchange {
                exchange: exchange_id,
            };
            error!(event = event.name(), %violation, "Rejected stray transport event");
            return Err(violation);
        };

        let out_of_order = |event: &SessionEvent| ProtocolViolation::OutOfOrder {
            exchange: exchange_id,
            event: event.name(),
            status,
        };

        match event {
            SessionEvent::Ready if status == ExchangeStatus::Pending && !ready => {
                if let Some(exchange) = self.exchange.as_mut() {
                    exchange.ready = true;
                }
                debug!(exchange_id = %exchange_id, "Transport ready; request sent");
                Ok(SessionUpdate::Ready)
            }
            SessionEvent::Fragment(text) if !status.is_terminal() => {
                self.apply_fragment(text).map_err(|v| self.abort(v))
            }
            SessionEvent::Complete if !status.is_terminal() => {
                self.complete().map_err(|v| self.abort(v))
            }
            SessionEvent::Error(cause) if !status.is_terminal() => {
                self.fail(cause).map_err(|v| self.abort(v))
            }
            SessionEvent::Closed => self.teardown(status),
            other => {
                let violation = out_of_order(&other);
                error!(%violation, "Rejected out-of-order transport event");
                if status.is_terminal() {
                    // Already settled; teardown still follows.
                    Err(violation)
                } else {
                    Err(self.abort(violation))
                }
            }
        }
    }

    fn apply_fragment(&mut self, text: String) -> Result<SessionUpdate, ProtocolViolation> {
        let Self {
            exchange,
            conversation,
            ..
        } = self;
        let Some(exchange) = exchange.as_mut() else {
            return Err(ProtocolViolation::NoInFlight {
                operation: "apply_fragment",
            });
        };

        if exchange.status == ExchangeStatus::Pending {
            conversation.begin_in_flight()?;
            exchange.status = ExchangeStatus::Streaming;
        }
        let buffer = exchange.aggregator.push_fragment(&text)?;
        conversation.update_in_flight(buffer)?;
        Ok(SessionUpdate::Fragment(text))
    }

    fn complete(&mut self) -> Result<SessionUpdate, ProtocolViolation> {
        let Self {
            exchange,
            conversation,
            ..
        } = self;
        let Some(exchange) = exchange.as_mut() else {
            return Err(ProtocolViolation::NoInFlight {
                operation: "complete",
            });
        };

        let final_text = exchange.aggregator.finish()?;
        if conversation.in_flight().is_none() {
            // No fragments: the reply is empty but still committed.
            conversation.begin_in_flight()?;
        }
        let message = conversation.commit_in_flight(final_text)?;
        exchange.status = ExchangeStatus::Done;
        debug!(
            exchange_id = %exchange.id,
            message_id = %message.id,
            fragments = exchange.aggregator.fragment_count(),
            "Exchange completed"
        );

        if !message.content.is_empty() {
            self.log_transcript(&message.content);
        }
        Ok(SessionUpdate::Committed(message))
    }

    fn fail(&mut self, cause: TransportError) -> Result<SessionUpdate, ProtocolViolation> {
        let Some(exchange) = self.exchange.as_mut() else {
            return Err(ProtocolViolation::NoInFlight { operation: "fail" });
        };

        if self.conversation.in_flight().is_some() {
            self.conversation.discard_in_flight()?;
        }
        exchange.status = ExchangeStatus::Failed;
        exchange.cancel_token.cancel();
        warn!(exchange_id = %exchange.id, error = %cause, "Exchange failed");

        let notice = self.conversation.append_notice(&self.settings.error_notice);
        self.log_transcript(&format!("## {}", notice.content));
        Ok(SessionUpdate::Failed { notice, cause })
    }

    fn teardown(&mut self, status: ExchangeStatus) -> Result<SessionUpdate, ProtocolViolation> {
        if status.is_terminal() {
            if let Some(exchange) = self.exchange.take() {
                debug!(exchange_id = %exchange.id, %status, "Exchange torn down");
            }
            return Ok(SessionUpdate::Idle(status));
        }

        // Closed without a completion signal counts as a transport error.
        let update = self.fail(TransportError::Disconnected);
        self.exchange = None;
        update
    }

    /// Drop the live exchange after an internal invariant broke.
    fn abort(&mut self, violation: ProtocolViolation) -> ProtocolViolation {
        if let Some(exchange) = self.exchange.take() {
            error!(exchange_id = %exchange.id, %violation, "Aborting exchange");
            exchange.cancel_token.cancel();
            if self.conversation.in_flight().is_some() {
                let _ = self.conversation.discard_in_flight();
            }
            let notice = self.conversation.append_notice(&self.settings.error_notice);
            self.log_transcript(&format!("## {}", notice.content));
        }
        violation
    }

    fn log_transcript(&self, line: &str) {
        if let Err(e) = self.logging.log_message(line) {
            warn!(error = %e, "Failed to write transcript log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conversation::Entry;
    use crate::core::message::TranscriptRole;
    use crate::utils::test_utils::create_test_session;

    fn submit(session: &mut ChatSession, text: &str) -> ExchangeId {
        session.submit(text).expect("submit").exchange_id
    }

    fn feed(session: &mut ChatSession, id: ExchangeId, events: Vec<SessionEvent>) {
        for event in events {
            session.handle_event(id, event).expect("event applies");
        }
    }

    fn fragments(texts: &[&str]) -> Vec<SessionEvent> {
        texts
            .iter()
            .map(|text| SessionEvent::Fragment((*text).to_string()))
            .collect()
    }

    #[test]
    fn scenario_fragments_concatenate_into_final_message() {
        let mut session = create_test_session();
        let id = submit(&mut session, "say hello");

        feed(&mut session, id, vec![SessionEvent::Ready]);
        feed(&mut session, id, fragments(&["Hel", "lo ", "world"]));
        assert_eq!(session.status(), Some(ExchangeStatus::Streaming));
        assert_eq!(
            session.conversation().in_flight().unwrap().content,
            "Hello world"
        );

        let update = session.handle_event(id, SessionEvent::Complete).unwrap();
        let SessionUpdate::Committed(message) = update else {
            panic!("expected commit, got {update:?}");
        };
        assert_eq!(message.content, "Hello world");
        assert_eq!(message.role, TranscriptRole::Assistant);
        assert_eq!(session.status(), Some(ExchangeStatus::Done));

        assert_eq!(
            session.handle_event(id, SessionEvent::Closed).unwrap(),
            SessionUpdate::Idle(ExchangeStatus::Done)
        );
        assert!(session.is_idle());
        let texts: Vec<_> = session
            .conversation()
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(texts, vec!["say hello", "Hello world"]);
    }

    #[test]
    fn scenario_done_without_fragments_commits_empty_message() {
        let mut session = create_test_session();
        let id = submit(&mut session, "anything?");
        feed(&mut session, id, vec![SessionEvent::Ready]);

        let update = session.handle_event(id, SessionEvent::Complete).unwrap();
        assert!(matches!(update, SessionUpdate::Committed(ref m) if m.content.is_empty()));
        feed(&mut session, id, vec![SessionEvent::Closed]);

        assert_eq!(session.conversation().len(), 2);
        assert_eq!(session.conversation().last_message().unwrap().content, "");
        assert!(session.conversation().in_flight().is_none());
    }

    #[test]
    fn scenario_error_after_fragment_discards_partial_reply() {
        let mut session = create_test_session();
        let id = submit(&mut session, "list NFTs");
        feed(&mut session, id, vec![SessionEvent::Ready]);
        feed(&mut session, id, fragments(&["Par"]));

        let update = session
            .handle_event(id, SessionEvent::Error(TransportError::Disconnected))
            .unwrap();
        assert!(matches!(update, SessionUpdate::Failed { .. }));
        assert_eq!(session.status(), Some(ExchangeStatus::Failed));
        feed(&mut session, id, vec![SessionEvent::Closed]);

        let log = session.conversation();
        assert!(log.in_flight().is_none());
        assert!(log.messages().iter().all(|m| m.content != "Par"));
        let notices: Vec<_> = log.messages().iter().filter(|m| m.role == TranscriptRole::Assistant).collect();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].content, DEFAULT_ERROR_NOTICE);
        assert!(session.is_idle());
    }

    #[test]
    fn scenario_stray_fragments_without_exchange_are_rejected() {
        let mut session = create_test_session();
        let id = submit(&mut session, "transfer 1 SOL");
        feed(
            &mut session,
            id,
            vec![
                SessionEvent::Error(TransportError::Connect("refused".into())),
                SessionEvent::Closed,
            ],
        );
        let before: Vec<Message> = session.conversation().messages().to_vec();

        for text in ["late", "later"] {
            let result = session.handle_event(id, SessionEvent::Fragment(text.into()));
            assert_eq!(
                result,
                Err(ProtocolViolation::NoActiveExchange { exchange: id })
            );
        }

        assert_eq!(session.conversation().messages(), before.as_slice());
        assert!(session.conversation().in_flight().is_none());
        assert!(session.is_idle());
    }

    #[test]
    fn blank_input_never_creates_an_exchange() {
        let mut session = create_test_session();
        for input in ["", "   ", "\n\t "] {
            assert_eq!(session.submit(input).unwrap_err(), SubmitError::Blank);
        }
        assert!(session.is_idle());
        assert!(session.conversation().is_empty());
    }

    #[test]
    fn second_submit_is_rejected_while_outstanding() {
        let mut session = create_test_session();
        let id = submit(&mut session, "first");

        let err = session.submit("second").unwrap_err();
        assert_eq!(
            err,
            SubmitError::Busy {
                exchange: id,
                status: ExchangeStatus::Pending
            }
        );

        feed(&mut session, id, fragments(&["a"]));
        assert!(matches!(
            session.submit("third"),
            Err(SubmitError::Busy {
                status: ExchangeStatus::Streaming,
                ..
            })
        ));
        assert_eq!(session.conversation().len(), 1);

        feed(&mut session, id, vec![SessionEvent::Complete]);
        assert!(session.submit("still tearing down").is_err());
        feed(&mut session, id, vec![SessionEvent::Closed]);

        let next = session.submit("fourth").unwrap();
        assert_ne!(next.exchange_id, id);
        assert_eq!(next.request, ChatRequest::new("fourth"));
    }

    #[test]
    fn commit_adds_exactly_one_finalized_message() {
        let mut session = create_test_session();
        let id = submit(&mut session, "swap tokens");
        feed(&mut session, id, fragments(&["x"]));

        let finalized_before = session.conversation().len();
        assert!(session.conversation().in_flight().is_some());
        feed(&mut session, id, vec![SessionEvent::Complete]);

        assert_eq!(session.conversation().len(), finalized_before + 1);
        assert!(session.conversation().in_flight().is_none());
    }

    #[test]
    fn in_flight_is_overwritten_not_duplicated() {
        let mut session = create_test_session();
        let id = submit(&mut session, "view transactions");
        feed(&mut session, id, fragments(&["one", " two", " three"]));

        let in_flight_rows = session
            .conversation()
            .entries()
            .filter(|entry| matches!(entry, Entry::InFlight(_)))
            .count();
        assert_eq!(in_flight_rows, 1);
        assert_eq!(session.conversation().entries().count(), 2);
    }

    #[test]
    fn close_before_completion_fails_the_exchange() {
        let mut session = create_test_session();
        let id = submit(&mut session, "hi");
        feed(&mut session, id, fragments(&["half"]));

        let update = session.handle_event(id, SessionEvent::Closed).unwrap();
        assert!(matches!(
            update,
            SessionUpdate::Failed {
                cause: TransportError::Disconnected,
                ..
            }
        ));
        assert!(session.is_idle());
        assert!(session.conversation().in_flight().is_none());
        assert_eq!(
            session.conversation().last_message().unwrap().content,
            DEFAULT_ERROR_NOTICE
        );
    }

    #[test]
    fn events_after_terminal_are_out_of_order() {
        let mut session = create_test_session();
        let id = submit(&mut session, "hi");
        feed(&mut session, id, vec![SessionEvent::Complete]);
        let finalized = session.conversation().len();

        for event in [
            SessionEvent::Fragment("extra".into()),
            SessionEvent::Complete,
            SessionEvent::Error(TransportError::Disconnected),
            SessionEvent::Ready,
        ] {
            assert!(matches!(
                session.handle_event(id, event),
                Err(ProtocolViolation::OutOfOrder {
                    status: ExchangeStatus::Done,
                    ..
                })
            ));
        }
        assert_eq!(session.conversation().len(), finalized);
        assert_eq!(session.status(), Some(ExchangeStatus::Done));
    }

    #[test]
    fn live_out_of_order_event_aborts_the_exchange() {
        let mut session = create_test_session();
        let params = session.submit("hi").unwrap();
        let id = params.exchange_id;
        feed(&mut session, id, fragments(&["a"]));

        assert_eq!(
            session.handle_event(id, SessionEvent::Ready),
            Err(ProtocolViolation::OutOfOrder {
                exchange: id,
                event: "ready",
                status: ExchangeStatus::Streaming,
            })
        );

        assert!(session.is_idle());
        assert!(params.cancel_token.is_cancelled());
        let log = session.conversation();
        assert!(log.in_flight().is_none());
        assert_eq!(log.last_message().unwrap().content, DEFAULT_ERROR_NOTICE);
        assert!(session.submit("next").is_ok());
    }

    #[test]
    fn second_ready_is_a_violation() {
        let mut session = create_test_session();
        let id = submit(&mut session, "hi");

        assert_eq!(
            session.handle_event(id, SessionEvent::Ready),
            Ok(SessionUpdate::Ready)
        );
        assert!(matches!(
            session.handle_event(id, SessionEvent::Ready),
            Err(ProtocolViolation::OutOfOrder {
                status: ExchangeStatus::Pending,
                ..
            })
        ));
        assert!(session.is_idle());
        assert_eq!(session.conversation().len(), 2);
    }

    #[test]
    fn events_for_another_exchange_are_rejected() {
        let mut session = create_test_session();
        let first = submit(&mut session, "one");
        feed(&mut session, first, vec![SessionEvent::Complete, SessionEvent::Closed]);
        let second = submit(&mut session, "two");

        assert_eq!(
            session.handle_event(first, SessionEvent::Fragment("old".into())),
            Err(ProtocolViolation::NoActiveExchange { exchange: first })
        );
        assert_eq!(session.status(), Some(ExchangeStatus::Pending));
        assert_eq!(session.current_exchange(), Some(second));
    }

    #[test]
    fn failure_cancels_the_transport_token() {
        let mut session = create_test_session();
        let params = session.submit("hi").unwrap();
        assert!(!params.cancel_token.is_cancelled());

        session
            .handle_event(
                params.exchange_id,
                SessionEvent::Error(TransportError::Malformed("bad".into())),
            )
            .unwrap();
        assert!(params.cancel_token.is_cancelled());
    }

    #[test]
    fn cancel_trips_the_token_of_the_live_exchange() {
        let mut session = create_test_session();
        let params = session.submit("hi").unwrap();
        session.cancel();
        assert!(params.cancel_token.is_cancelled());
        assert_eq!(session.status(), Some(ExchangeStatus::Pending));
    }

    #[test]
    fn greeting_seeds_the_conversation() {
        let session = ChatSession::new(SessionSettings::default());
        let first = session.conversation().messages().first().unwrap();
        assert_eq!(first.content, DEFAULT_GREETING);
        assert_eq!(first.role, TranscriptRole::Assistant);
    }

    #[test]
    fn transcript_log_records_user_reply_and_notices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.log");
        let mut session = create_test_session();
        session.set_logging(LoggingState::new(Some(path.to_string_lossy().into_owned())));

        let id = submit(&mut session, "hello");
        feed(
            &mut session,
            id,
            vec![
                SessionEvent::Fragment("hi ".into()),
                SessionEvent::Fragment("there".into()),
                SessionEvent::Complete,
                SessionEvent::Closed,
            ],
        );
        let id = submit(&mut session, "again");
        feed(
            &mut session,
            id,
            vec![SessionEvent::Error(TransportError::Disconnected), SessionEvent::Closed],
        );

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            format!("You: hello\n\nhi there\n\nYou: again\n\n## {DEFAULT_ERROR_NOTICE}\n\n")
        );
    }
}
