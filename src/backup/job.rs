// mysqlbackup/src/backup/job.rs
use crate::errors::{AppError, Result};
use std::fmt;
use std::path::PathBuf;

/// A credential that never shows up in logs or debug output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overwrites the buffer in place and empties it.
    pub fn wipe(&mut self) {
        let len = self.0.len();
        self.0.replace_range(.., &"\0".repeat(len));
        self.0.clear();
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"********\"")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("********")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret(value)
    }
}

/// One database to back up.
///
/// An empty host means the server is reached through the local socket.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    schema: String,
    username: String,
    password: Secret,
    host: String,
}

impl JobDescriptor {
    /// Schema and username must be non-empty; an empty password is accepted.
    pub fn new(
        schema: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<Secret>,
    ) -> Result<Self> {
        let schema = schema.into();
        let username = username.into();
        if schema.trim().is_empty() {
            return Err(AppError::Config("database schema must not be empty".into()));
        }
        if username.trim().is_empty() {
            return Err(AppError::Config(format!(
                "username for schema '{}' must not be empty",
                schema
            )));
        }
        Ok(JobDescriptor {
            schema,
            username,
            password: password.into(),
            host: String::new(),
        })
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &Secret {
        &self.password
    }

    /// `None` when the local socket should be used.
    pub fn host(&self) -> Option<&str> {
        if self.host.is_empty() {
            None
        } else {
            Some(&self.host)
        }
    }
}

/// Outcome of one dump pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupResult {
    pub schema: String,
    pub path: PathBuf,
    pub success: bool,
    /// First non-zero exit code of the pipeline, `Some(0)` on success, `None`
    /// when a process could not be started or was killed by a signal.
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl BackupResult {
    pub(crate) fn failed(schema: &str, path: PathBuf, error: String) -> Self {
        BackupResult {
            schema: schema.to_string(),
            path,
            success: false,
            exit_code: None,
            error: Some(error),
        }
    }
}
