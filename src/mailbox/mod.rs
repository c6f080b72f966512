//! Inbound mailbox: where waybill numbers come from.

pub mod imap;
pub mod sync;

use std::fmt;

use async_trait::async_trait;

use crate::error::MailboxError;

pub use imap::{ImapConfig, ImapMailbox};
pub use sync::{MailboxSynchronizer, SyncReport};

/// Stable identifier of a message within the mailbox (an IMAP UID).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An unread message, reduced to what extraction needs.
#[derive(Debug, Clone)]
pub struct InboundMail {
    pub id: MessageId,
    pub subject: String,
    pub body: String,
}

/// Mailbox collaborator.
///
/// `fetch_unseen` must not change any message's read state; only
/// `mark_read` and `mark_read_all` do.
#[async_trait]
pub trait Mailbox: Send + Sync {
    async fn fetch_unseen(&self) -> Result<Vec<InboundMail>, MailboxError>;

    async fn mark_read(&self, id: &MessageId) -> Result<(), MailboxError>;

    /// Mark a batch read. One result per id, in order. Implementations that
    /// can share a connection across the batch should override this.
    async fn mark_read_all(&self, ids: &[MessageId]) -> Vec<Result<(), MailboxError>> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            results.push(self.mark_read(id).await);
        }
        results
    }
}
