use async_trait::async_trait;
use lettre::{AsyncSendmailTransport, AsyncTransport, Tokio1Executor};

use super::{MailMessage, MailTransport, TransportReceipt};
use crate::errors::{AppError, Result};

/// Hands messages to the local `sendmail` binary.
pub struct SendmailMailer {
    transport: AsyncSendmailTransport<Tokio1Executor>,
}

impl Default for SendmailMailer {
    fn default() -> Self {
        Self::new()
    }
}

impl SendmailMailer {
    pub fn new() -> Self {
        Self {
            transport: AsyncSendmailTransport::<Tokio1Executor>::new(),
        }
    }
}

#[async_trait]
impl MailTransport for SendmailMailer {
    async fn send(&self, message: &MailMessage) -> Result<TransportReceipt> {
        let email = message.to_lettre()?;
        let recipients = email.envelope().to().len();
        self.transport
            .send(email)
            .await
            .map_err(|e| AppError::Transport(e.to_string()))?;

        tracing::info!(recipients, "Backup mail handed to sendmail");
        Ok(TransportReceipt {
            accepted_recipients: recipients,
            detail: "queued by sendmail".to_string(),
        })
    }
}
