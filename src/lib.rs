//! MySQL backup runner
//!
//! Dumps a list of MySQL databases through `mysqldump | gzip` into dated
//! files, optionally mails the files and optionally deletes them afterwards.

pub mod backup;
pub mod config;
pub mod errors;
pub mod logging;
pub mod mail;
pub mod utils;

pub use backup::{BackupResult, BackupRunner, JobDescriptor, Secret};
pub use errors::{AbortHook, AppError, Fatal, Result};
pub use mail::{MailMessage, MailTransport, MailerKind, SmtpConfig, TransportReceipt};
