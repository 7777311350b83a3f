//! Normalized message and thread input types.
//!
//! These are the values the engine receives from the ingestion and
//! normalization layers. Bodies are already cleaned (HTML stripped, quotes
//! and signatures removed, unicode-normalized); this crate never touches
//! raw connector payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MessageId, ThreadId};

/// A sender or recipient address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Email address or chat handle.
    pub email: String,
    /// Display name (e.g., "John Doe").
    pub name: Option<String>,
}

impl Address {
    /// Creates a new address with just an email.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    /// Creates a new address with email and display name.
    pub fn with_name(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }

    /// Returns the display representation of this address.
    ///
    /// If a name is present, returns "Name <email>", otherwise just the email.
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// A single normalized message (email or chat post).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// Stable identifier assigned by the ingestion layer.
    pub id: MessageId,
    /// Thread this message belongs to.
    pub thread_id: ThreadId,
    /// Sender.
    pub from: Address,
    /// Direct recipients.
    pub to: Vec<Address>,
    /// Carbon-copy recipients.
    pub cc: Vec<Address>,
    /// Subject line, if the source has one.
    pub subject: Option<String>,
    /// Cleaned, unicode-normalized body text. Citation offsets index into
    /// this exact string.
    pub body: String,
    /// When the message was sent.
    pub date: DateTime<Utc>,
    /// Whether the source marked the message important/flagged.
    pub is_flagged: bool,
    /// Whether the message carries attachments.
    pub has_attachments: bool,
}

impl NormalizedMessage {
    /// Returns true if `email` appears among the direct recipients.
    pub fn is_addressed_to(&self, email: &str) -> bool {
        self.to.iter().any(|a| a.email.eq_ignore_ascii_case(email))
    }
}

/// A thread (conversation) of normalized messages, ordered by date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageThread {
    /// Unique identifier for this thread.
    pub id: ThreadId,
    /// Thread subject (from the first message).
    pub subject: Option<String>,
    /// All messages in the thread, ordered by date ascending.
    pub messages: Vec<NormalizedMessage>,
}

impl MessageThread {
    /// Date of the most recent message, if any.
    pub fn last_message_date(&self) -> Option<DateTime<Utc>> {
        self.messages.iter().map(|m| m.date).max()
    }

    /// Total number of messages in the thread.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}
