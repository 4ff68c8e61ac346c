mod sendmail;
mod smtp;

pub use sendmail::SendmailMailer;
pub use smtp::{DEFAULT_SMTP_PORT, SmtpConfig, SmtpMailer, SmtpSecurity};

use async_trait::async_trait;
use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use std::path::PathBuf;

use crate::errors::{AppError, Result};

/// Which transport delivers the backup mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MailerKind {
    #[default]
    None,
    /// Local submission through the system's sendmail binary.
    Direct,
    Smtp,
}

impl MailerKind {
    /// Parses a mailer name. Unknown names mean "no mail step".
    ///
    /// `mail` is accepted as an alias for `direct`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "direct" | "mail" => MailerKind::Direct,
            "smtp" => MailerKind::Smtp,
            "none" => MailerKind::None,
            other => {
                tracing::warn!(mailer = other, "Unknown mailer, mail step disabled");
                MailerKind::None
            }
        }
    }

    pub fn is_enabled(self) -> bool {
        self != MailerKind::None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

impl MailMessage {
    /// Builds the MIME message, reading every attachment from disk.
    pub fn to_lettre(&self) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.parse()?)
            .subject(self.subject.clone());
        for recipient in &self.to {
            builder = builder.to(recipient.parse()?);
        }

        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(self.body.clone()));
        for path in &self.attachments {
            let content = std::fs::read(path)?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let content_type = ContentType::parse(attachment_mime(&filename))
                .map_err(|e| AppError::Attachment(e.to_string()))?;
            parts = parts.singlepart(Attachment::new(filename).body(content, content_type));
        }

        Ok(builder.multipart(parts)?)
    }
}

fn attachment_mime(filename: &str) -> &'static str {
    if filename.ends_with(".gz") {
        "application/gzip"
    } else {
        "application/octet-stream"
    }
}

/// What the transport reported after accepting a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReceipt {
    pub accepted_recipients: usize,
    pub detail: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<TransportReceipt>;
}

/// Builds the transport for `kind`, or `None` when nothing should be sent.
pub fn create_transport(
    kind: MailerKind,
    smtp: Option<&SmtpConfig>,
) -> Option<Box<dyn MailTransport>> {
    match kind {
        MailerKind::None => None,
        MailerKind::Direct => Some(Box::new(SendmailMailer::new())),
        MailerKind::Smtp => {
            let Some(config) = smtp else {
                tracing::warn!("SMTP mailer selected without SMTP configuration, mail step skipped");
                return None;
            };
            if config.host.is_empty() {
                tracing::warn!("SMTP host is empty, mail step skipped");
                return None;
            }
            Some(Box::new(SmtpMailer::new(config.clone())))
        }
    }
}
