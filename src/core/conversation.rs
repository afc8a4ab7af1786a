use chrono::{DateTime, Local};

use super::exchange::ProtocolViolation;
use super::message::{Message, MessageId, TranscriptRole};

/// The assistant reply that is still streaming.
///
/// The slot has no [`MessageId`]; it only receives one when it is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightMessage {
    pub content: String,
    pub started_at: DateTime<Local>,
}

/// One row as the rendering layer sees it.
#[derive(Debug, Clone, Copy)]
pub enum Entry<'a> {
    Finalized(&'a Message),
    InFlight(&'a InFlightMessage),
}

impl Entry<'_> {
    pub fn role(&self) -> TranscriptRole {
        match self {
            Entry::Finalized(message) => message.role,
            Entry::InFlight(_) => TranscriptRole::Assistant,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Entry::Finalized(message) => &message.content,
            Entry::InFlight(slot) => &slot.content,
        }
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        match self {
            Entry::Finalized(message) => message.timestamp,
            Entry::InFlight(slot) => slot.started_at,
        }
    }
}

/// Ordered log of finalized messages plus at most one in-flight slot.
#[derive(Debug, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
    in_flight: Option<InFlightMessage>,
    next_id: u64,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the log with an assistant greeting. Blank greetings are skipped.
    pub fn with_greeting(greeting: &str) -> Self {
        let mut log = Self::new();
        if !greeting.trim().is_empty() {
            log.push(TranscriptRole::Assistant, greeting);
        }
        log
    }

    fn push(&mut self, role: TranscriptRole, content: impl Into<String>) -> Message {
        self.next_id += 1;
        let message = Message::new(MessageId::new(self.next_id), role, content);
        self.messages.push(message.clone());
        message
    }

    pub fn append_user_message(&mut self, text: &str) -> Message {
        self.push(TranscriptRole::User, text)
    }

    /// Synthetic assistant message, used for transport failure notices.
    pub fn append_notice(&mut self, text: &str) -> Message {
        self.push(TranscriptRole::Assistant, text)
    }

    pub fn begin_in_flight(&mut self) -> Result<&InFlightMessage, ProtocolViolation> {
        if self.in_flight.is_some() {
            return Err(ProtocolViolation::InFlightAlreadyOpen);
        }
        Ok(self.in_flight.insert(InFlightMessage {
            content: String::new(),
            started_at: Local::now(),
        }))
    }

    /// Replace the slot's text. Calling it again with the same text is a no-op.
    pub fn update_in_flight(&mut self, text: &str) -> Result<(), ProtocolViolation> {
        let slot = self
            .in_flight
            .as_mut()
            .ok_or(ProtocolViolation::NoInFlight {
                operation: "update_in_flight",
            })?;
        slot.content.clear();
        slot.content.push_str(text);
        Ok(())
    }

    /// Promote the slot to a finalized assistant message with a fresh id.
    pub fn commit_in_flight(&mut self, final_text: String) -> Result<Message, ProtocolViolation> {
        if self.in_flight.take().is_none() {
            return Err(ProtocolViolation::NoInFlight {
                operation: "commit_in_flight",
            });
        }
        Ok(self.push(TranscriptRole::Assistant, final_text))
    }

    pub fn discard_in_flight(&mut self) -> Result<(), ProtocolViolation> {
        self.in_flight
            .take()
            .map(|_| ())
            .ok_or(ProtocolViolation::NoInFlight {
                operation: "discard_in_flight",
            })
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn in_flight(&self) -> Option<&InFlightMessage> {
        self.in_flight.as_ref()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Finalized messages in display order, followed by the in-flight slot.
    pub fn entries(&self) -> impl Iterator<Item = Entry<'_>> {
        self.messages
            .iter()
            .map(Entry::Finalized)
            .chain(self.in_flight.iter().map(Entry::InFlight))
    }
}
