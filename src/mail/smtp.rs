//! SMTP delivery via the `lettre` async transport.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde::Deserialize;

use super::{MailMessage, MailTransport, TransportReceipt};
use crate::backup::Secret;
use crate::errors::{AppError, Result};

pub const DEFAULT_SMTP_PORT: u16 = 25;

/// How the connection to the relay is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS.
    #[default]
    StartTls,
    /// TLS from the first byte (usually port 465).
    Tls,
    /// No encryption at all.
    None,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: Secret,
    pub port: u16,
    pub security: SmtpSecurity,
}

impl SmtpConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<Secret>,
        port: u16,
    ) -> Self {
        SmtpConfig {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            port,
            security: SmtpSecurity::default(),
        }
    }
}

pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let host = self.config.host.as_str();
        let builder = match self.config.security {
            SmtpSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| AppError::Transport(e.to_string()))?,
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| AppError::Transport(e.to_string()))?,
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        };

        let mut builder = builder.port(self.config.port);
        if !self.config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.expose().to_owned(),
            ));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, message: &MailMessage) -> Result<TransportReceipt> {
        let email = message.to_lettre()?;
        let recipients = email.envelope().to().len();
        let response = self
            .transport()?
            .send(email)
            .await
            .map_err(|e| AppError::Transport(e.to_string()))?;

        let detail = response.message().collect::<Vec<_>>().join(" ");
        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            code = %response.code(),
            "Backup mail accepted by SMTP relay"
        );
        Ok(TransportReceipt {
            accepted_recipients: recipients,
            detail,
        })
    }
}
