//! Mailbox synchronizer: unread mail → new shipments → acknowledged mail.
//!
//! Order per cycle:
//! 1. Fetch unseen messages (read state untouched)
//! 2. Extract waybills and upsert them (creation only)
//! 3. Persist the store
//! 4. Only then mark every fetched message read, as one batch
//!
//! If step 3 fails nothing is marked read, so the next cycle sees the same
//! messages again and re-extraction is a no-op for ids already stored.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::extract::extract_from_message;
use crate::mailbox::{Mailbox, MessageId};
use crate::shipment::{ShipmentPatch, Waybill};
use crate::store::{ShipmentStore, Upsert};

/// What one mailbox pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Unseen messages fetched.
    pub fetched: usize,
    /// Waybills seen for the first time.
    pub discovered: Vec<Waybill>,
    /// Messages successfully marked read.
    pub acknowledged: usize,
    /// Messages whose mark-read failed (harmless, retried next cycle).
    pub ack_failures: usize,
    /// Set when the fetch itself failed and the phase was abandoned.
    pub fetch_error: Option<String>,
}

impl SyncReport {
    pub fn had_errors(&self) -> bool {
        self.fetch_error.is_some() || self.ack_failures > 0
    }
}

pub struct MailboxSynchronizer {
    mailbox: Arc<dyn Mailbox>,
}

impl MailboxSynchronizer {
    pub fn new(mailbox: Arc<dyn Mailbox>) -> Self {
        Self { mailbox }
    }

    /// Run one mailbox pass against `store`.
    ///
    /// Mailbox failures are recorded in the report. A persist failure is
    /// returned as an error: the cycle cannot continue without it.
    pub async fn sync(&self, store: &mut ShipmentStore) -> Result<SyncReport, StoreError> {
        let mut report = SyncReport::default();

        let messages = match self.mailbox.fetch_unseen().await {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, "Fetching unread mail failed; skipping mailbox phase");
                report.fetch_error = Some(e.to_string());
                return Ok(report);
            }
        };

        report.fetched = messages.len();
        if messages.is_empty() {
            return Ok(report);
        }

        let mut to_ack: Vec<MessageId> = Vec::with_capacity(messages.len());
        for message in &messages {
            let found = extract_from_message(&message.subject, &message.body);
            if found.is_empty() {
                debug!(uid = %message.id, "No waybill numbers in message");
            }
            for waybill in found {
                if store.upsert(&waybill, ShipmentPatch::default()) == Upsert::Created {
                    info!(waybill = %waybill, uid = %message.id, "Added new tracking ID");
                    report.discovered.push(waybill);
                }
            }
            to_ack.push(message.id.clone());
        }

        store.persist().await?;

        let results = self.mailbox.mark_read_all(&to_ack).await;
        for (id, result) in to_ack.iter().zip(results) {
            match result {
                Ok(()) => report.acknowledged += 1,
                Err(e) => {
                    warn!(uid = %id, error = %e, "Failed to mark message read; it will be rescanned");
                    report.ack_failures += 1;
                }
            }
        }

        Ok(report)
    }
}
