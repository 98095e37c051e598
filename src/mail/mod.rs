//! Mail transport boundary: mailbox polling and outbound dispatch.
//!
//! The core only sees the `Mailbox` and `Dispatcher` traits; IMAP and
//! SMTP live behind them. Marking messages consumed is the transport's
//! responsibility, not the core's.

pub mod imap;
pub mod smtp;

pub use imap::ImapMailbox;
pub use smtp::{SmtpDispatcher, render_rfp_email};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// A parsed inbound message, as handed to the correlation engine.
#[derive(Debug, Clone)]
pub struct InboundEmail {
    /// Sender address, already extracted from the From header.
    /// Empty when the header was missing or unparsable.
    pub sender: String,
    pub subject: String,
    pub in_reply_to: Option<String>,
    /// Message-ids from the References header, in header order.
    pub references: Vec<String>,
    pub body_text: String,
    pub date: DateTime<Utc>,
}

/// Inbound boundary: poll for unread messages.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Fetch unread messages and mark them consumed on the transport
    /// side. At-least-once: a message missed by one cycle is picked up
    /// by the next.
    async fn fetch_unread(&self) -> Result<Vec<InboundEmail>>;
}

/// Outbound boundary: send one message to one recipient.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}
