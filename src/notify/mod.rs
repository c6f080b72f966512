//! Outbound notifications for decided tracking events.

pub mod smtp;
pub mod template;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::DispatchError;
use crate::shipment::EventDescriptor;

pub use smtp::{SmtpConfig, SmtpSender};
pub use template::Notification;

/// Outbound mail transport.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, html_body: &str) -> Result<(), DispatchError>;
}

/// Renders and dispatches notifications to a single recipient.
///
/// The notifier does not touch the store. Committing or deferring the event
/// after a send attempt is the caller's job.
pub struct Notifier {
    sender: Arc<dyn MailSender>,
    recipient: String,
}

impl Notifier {
    pub fn new(sender: Arc<dyn MailSender>, recipient: impl Into<String>) -> Self {
        Self {
            sender,
            recipient: recipient.into(),
        }
    }

    pub async fn notify(&self, event: &EventDescriptor) -> Result<(), DispatchError> {
        let Notification { subject, html_body } = template::render(event);
        self.sender.send(&self.recipient, &subject, &html_body).await?;
        info!(
            waybill = %event.shipment_id,
            status = %event.label,
            delivered = event.is_terminal,
            "Notification dispatched"
        );
        Ok(())
    }
}
