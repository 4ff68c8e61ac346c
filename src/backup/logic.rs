// mysqlbackup/src/backup/logic.rs
use std::path::PathBuf;
use std::sync::Arc;

use super::db_dump::DumpPipeline;
use super::job::{BackupResult, JobDescriptor};
use crate::errors::{AbortHook, Fatal, Result, exit_process};
use crate::mail::{MailMessage, MailTransport, MailerKind, SmtpConfig, create_transport};
use crate::utils::{Clock, DEFAULT_DATE_FORMAT, SystemClock, format_date, is_valid_date_format};

pub const DEFAULT_EXTENSION: &str = ".gz";
pub const DEFAULT_COMPRESSOR: &str = "gzip";
pub const DEFAULT_DUMP_OPTIONS: &str = "--quick --lock-tables --add-drop-table";
pub const DEFAULT_SENDER: &str = "backup@localhost";
pub const DEFAULT_SUBJECT: &str = "Backup";

/// Settings shared by every job of a run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub output_directory: String,
    pub date_format: String,
    pub file_extension: String,
    pub dump_path: String,
    pub compressor_path: String,
    pub compressor: String,
    pub dump_options: String,
    pub delete_after_backup: bool,
    pub mailer: MailerKind,
    pub smtp: Option<SmtpConfig>,
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            output_directory: String::new(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            file_extension: DEFAULT_EXTENSION.to_string(),
            dump_path: String::new(),
            compressor_path: String::new(),
            compressor: DEFAULT_COMPRESSOR.to_string(),
            dump_options: DEFAULT_DUMP_OPTIONS.to_string(),
            delete_after_backup: false,
            mailer: MailerKind::None,
            smtp: None,
            sender: DEFAULT_SENDER.to_string(),
            recipients: Vec::new(),
            subject: DEFAULT_SUBJECT.to_string(),
        }
    }
}

/// Dumps each configured database into a compressed file, then optionally
/// mails and deletes the files.
///
/// ```ignore
/// let results = BackupRunner::new()
///     .add_database(JobDescriptor::new("orders", "u", "p")?)
///     .output_directory("/var/backups/")
///     .mailer("smtp")
///     .smtp_config(SmtpConfig::new("mail.example.com", "u", "p", 587))
///     .recipients(["ops@example.com"])
///     .run()
///     .await?;
/// ```
pub struct BackupRunner {
    jobs: Vec<JobDescriptor>,
    config: RunnerConfig,
    clock: Arc<dyn Clock>,
    transport: Option<Box<dyn MailTransport>>,
    abort: AbortHook,
}

impl std::fmt::Debug for BackupRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupRunner")
            .field("jobs", &self.jobs)
            .field("config", &self.config)
            .field("transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for BackupRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupRunner {
    pub fn new() -> Self {
        BackupRunner {
            jobs: Vec::new(),
            config: RunnerConfig::default(),
            clock: Arc::new(SystemClock),
            transport: None,
            abort: exit_process,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn jobs(&self) -> &[JobDescriptor] {
        &self.jobs
    }

    pub fn add_database(mut self, job: JobDescriptor) -> Self {
        self.jobs.push(job);
        self
    }

    /// Sets the directory the backup files are written to.
    ///
    /// A missing trailing `/` is appended. An empty path is fatal.
    pub fn output_directory(mut self, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if path.is_empty() {
            (self.abort)(&Fatal::EmptyOutputDirectory);
        }
        if !path.ends_with('/') {
            tracing::debug!(%path, "Appending trailing separator to output directory");
            path.push('/');
        }
        self.config.output_directory = path;
        self
    }

    /// strftime pattern for the date part of file names. Empty or invalid
    /// patterns are ignored.
    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        let format = format.into();
        if format.is_empty() {
            return self;
        }
        if !is_valid_date_format(&format) {
            tracing::warn!(%format, "Ignoring invalid date format");
            return self;
        }
        self.config.date_format = format;
        self
    }

    pub fn file_extension(mut self, extension: impl Into<String>) -> Self {
        self.config.file_extension = extension.into();
        self
    }

    /// Directory prefix for mysqldump, with trailing separator. Empty uses `PATH`.
    pub fn dump_executable_path(mut self, prefix: impl Into<String>) -> Self {
        self.config.dump_path = prefix.into();
        self
    }

    /// Directory prefix for the compressor, with trailing separator.
    pub fn compressor_path(mut self, prefix: impl Into<String>) -> Self {
        self.config.compressor_path = prefix.into();
        self
    }

    pub fn compressor(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.config.compressor = name;
        }
        self
    }

    pub fn dump_options(mut self, options: impl Into<String>) -> Self {
        self.config.dump_options = options.into();
        self
    }

    pub fn delete_after_backup(mut self) -> Self {
        self.config.delete_after_backup = true;
        self
    }

    /// Selects the mailer by name: `none`, `direct` (alias `mail`) or `smtp`.
    /// Unknown names disable mailing; an empty name keeps the current choice.
    pub fn mailer(mut self, name: &str) -> Self {
        if name.is_empty() {
            return self;
        }
        self.config.mailer = MailerKind::from_name(name);
        self
    }

    pub fn mailer_kind(mut self, kind: MailerKind) -> Self {
        self.config.mailer = kind;
        self
    }

    pub fn smtp_config(mut self, smtp: SmtpConfig) -> Self {
        self.config.smtp = Some(smtp);
        self
    }

    pub fn sender(mut self, email: impl Into<String>) -> Self {
        let email = email.into();
        if !email.is_empty() {
            self.config.sender = email;
        }
        self
    }

    pub fn recipients<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.recipients = recipients.into_iter().map(Into::into).collect();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        let subject = subject.into();
        if !subject.is_empty() {
            self.config.subject = subject;
        }
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Uses `transport` instead of the one built from the mailer settings.
    /// The mailer must still be enabled for anything to be sent.
    pub fn transport(mut self, transport: impl MailTransport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Replaces the handler for fatal conditions. Set it before any other
    /// setter that may abort.
    pub fn abort_hook(mut self, hook: AbortHook) -> Self {
        self.abort = hook;
        self
    }

    /// `{output_directory}{schema}_{date}.sql{extension}`, dated now.
    pub fn destination_for(&self, job: &JobDescriptor) -> PathBuf {
        let now = self.clock.now();
        let date = format_date(&now, &self.config.date_format)
            .unwrap_or_else(|_| now.format(DEFAULT_DATE_FORMAT).to_string());
        PathBuf::from(format!(
            "{}{}_{}.sql{}",
            self.config.output_directory,
            job.schema(),
            date,
            self.config.file_extension
        ))
    }

    /// Backs up every database in insertion order, then handles mail and
    /// deletion.
    ///
    /// A failing dump does not stop the batch. A backup file that is missing
    /// when the mail is assembled triggers the abort hook. Transport failures
    /// are returned after the delete step has run.
    pub async fn run(&self) -> Result<Vec<BackupResult>> {
        let pipeline = DumpPipeline::new(
            &self.config.dump_path,
            &self.config.compressor_path,
            &self.config.compressor,
            &self.config.dump_options,
        );

        tracing::info!(jobs = self.jobs.len(), "Starting database backups");
        let mut results = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            let path = self.destination_for(job);
            tracing::info!(schema = job.schema(), path = %path.display(), "Backing up database");
            let result = pipeline.execute(job, &path).await;
            if result.success {
                tracing::info!(schema = job.schema(), "✓ Backup written");
            }
            results.push(result);
        }

        let mailed = self.send_mail(&results).await;

        if self.config.delete_after_backup {
            delete_files(&results);
        }

        mailed?;
        Ok(results)
    }

    async fn send_mail(&self, results: &[BackupResult]) -> Result<()> {
        if !self.config.mailer.is_enabled() {
            tracing::debug!("No mailer configured, skipping mail step");
            return Ok(());
        }
        if self.config.recipients.is_empty() {
            tracing::debug!("No recipients configured, skipping mail step");
            return Ok(());
        }

        for result in results {
            if !result.path.exists() {
                (self.abort)(&Fatal::MissingAttachment(result.path.clone()));
            }
        }

        let message = MailMessage {
            subject: self.config.subject.clone(),
            from: self.config.sender.clone(),
            to: self.config.recipients.clone(),
            body: String::new(),
            attachments: results.iter().map(|r| r.path.clone()).collect(),
        };

        let built;
        let transport: &dyn MailTransport = match &self.transport {
            Some(transport) => transport.as_ref(),
            None => match create_transport(self.config.mailer, self.config.smtp.as_ref()) {
                Some(transport) => {
                    built = transport;
                    built.as_ref()
                }
                None => return Ok(()),
            },
        };

        let receipt = transport.send(&message).await.inspect_err(|e| {
            tracing::error!(error = %e, "Sending backup mail failed");
        })?;
        tracing::info!(
            recipients = receipt.accepted_recipients,
            detail = %receipt.detail,
            attachments = message.attachments.len(),
            "Backup mail sent"
        );
        Ok(())
    }
}

fn delete_files(results: &[BackupResult]) {
    for result in results {
        match std::fs::remove_file(&result.path) {
            Ok(()) => tracing::info!(path = %result.path.display(), "Deleted backup file"),
            Err(e) => tracing::warn!(
                path = %result.path.display(),
                error = %e,
                "Failed to delete backup file"
            ),
        }
    }
}
