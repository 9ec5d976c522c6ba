//! Outbound email delivery.
//!
//! The service only hands messages to a delivery client; templates are
//! rendered by the notification module. `LogEmailSender` is the default when
//! no delivery client is configured.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Email delivery disabled")]
    Disabled,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str, text: &str)
        -> Result<(), EmailError>;

    fn name(&self) -> &'static str;
}

/// Writes each message to the log instead of delivering it
pub struct LogEmailSender {
    from: String,
    enabled: bool,
}

impl LogEmailSender {
    pub fn new(from: impl Into<String>, enabled: bool) -> Self {
        Self {
            from: from.into(),
            enabled,
        }
    }
}

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        _html: &str,
        text: &str,
    ) -> Result<(), EmailError> {
        if !self.enabled {
            return Err(EmailError::Disabled);
        }
        if !to.contains('@') {
            return Err(EmailError::InvalidRecipient(to.to_string()));
        }

        tracing::info!(
            from = %self.from,
            to = %to,
            subject = %subject,
            body_len = text.len(),
            "Email handed to log sink"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_log_sender_accepts_valid_address() {
        let sender = LogEmailSender::new("no-reply@shelf.local", true);
        assert_ok!(sender.send("ada@example.com", "Hi", "<p>Hi</p>", "Hi").await);
    }

    #[tokio::test]
    async fn test_log_sender_rejects_bad_address() {
        let sender = LogEmailSender::new("no-reply@shelf.local", true);
        let err = assert_err!(sender.send("not-an-address", "Hi", "", "").await);
        assert!(matches!(err, EmailError::InvalidRecipient(_)));
    }

    #[tokio::test]
    async fn test_disabled_sender_fails() {
        let sender = LogEmailSender::new("no-reply@shelf.local", false);
        let err = assert_err!(sender.send("ada@example.com", "Hi", "", "").await);
        assert!(matches!(err, EmailError::Disabled));
    }
}
