//! SMTP mail sender via lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::error::DispatchError;
use crate::notify::MailSender;

/// SMTP connection settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

/// Sends notifications over SMTP with STARTTLS.
pub struct SmtpSender {
    config: SmtpConfig,
}

impl SmtpSender {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, to: &str, subject: &str, html_body: &str) -> Result<Message, DispatchError> {
        Message::builder()
            .from(
                self.config
                    .from_address
                    .parse()
                    .map_err(|e| DispatchError::InvalidAddress {
                        address: self.config.from_address.clone(),
                        reason: format!("{e}"),
                    })?,
            )
            .to(to.parse().map_err(|e| DispatchError::InvalidAddress {
                address: to.to_string(),
                reason: format!("{e}"),
            })?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| DispatchError::Build(e.to_string()))
    }

    /// Blocking send. Run in `spawn_blocking`.
    fn send_blocking(&self, email: &Message) -> Result<(), DispatchError> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::starttls_relay(&self.config.host)
            .map_err(|e| DispatchError::Transport(format!("SMTP relay error: {e}")))?
            .port(self.config.port)
            .credentials(creds)
            .build();

        transport
            .send(email)
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl MailSender for SmtpSender {
    async fn send(&self, recipient: &str, subject: &str, html_body: &str) -> Result<(), DispatchError> {
        let email = self.build_message(recipient, subject, html_body)?;
        let sender = SmtpSender::new(self.config.clone());
        tokio::task::spawn_blocking(move || sender.send_blocking(&email))
            .await
            .map_err(|e| DispatchError::Transport(format!("send task failed: {e}")))??;

        info!(to = %recipient, "Notification email sent");
        Ok(())
    }
}
