// mysqlbackup/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::backup::{BackupRunner, JobDescriptor, Secret};
use crate::errors::{AbortHook, exit_process};
use crate::logging::LogConfig;
use crate::mail::{DEFAULT_SMTP_PORT, SmtpConfig, SmtpSecurity};

pub const SMTP_PASSWORD_VAR: &str = "BACKUP_SMTP_PASSWORD";
pub const DB_PASSWORD_VAR_PREFIX: &str = "BACKUP_DB_PASSWORD_";

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonDatabaseEntry {
    pub schema: String,
    pub username: String,
    pub password: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonSmtpConfig {
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub port: Option<u16>,
    pub security: Option<SmtpSecurity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonLogOptions {
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub output_directory: Option<String>,
    pub date_format: Option<String>,
    pub file_extension: Option<String>,
    pub mysqldump_path: Option<String>,
    pub gzip_path: Option<String>,
    pub compressor: Option<String>,
    pub dump_options: Option<String>,
    pub delete_after_backup: Option<bool>,
    pub mailer: Option<String>,
    pub smtp: Option<JsonSmtpConfig>,
    pub sender: Option<String>,
    pub recipients: Option<Vec<String>>,
    pub subject: Option<String>,
    pub databases: Option<Vec<JsonDatabaseEntry>>,
    pub log: Option<JsonLogOptions>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub raw_json_config: RawJsonConfig,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        Self::from_json_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw_json_config: RawJsonConfig = serde_json::from_str(content)?;
        Ok(AppConfig { raw_json_config })
    }

    pub fn log_config(&self) -> LogConfig {
        let log = self.raw_json_config.log.clone().unwrap_or_default();
        LogConfig {
            json: log.json,
            verbose: log.verbose,
        }
    }

    /// Builds a runner, reading missing passwords from the process environment.
    pub fn build_runner(&self) -> Result<BackupRunner> {
        self.build_runner_with(|name| std::env::var(name).ok(), exit_process)
    }

    pub fn build_runner_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
        abort: AbortHook,
    ) -> Result<BackupRunner> {
        let raw = &self.raw_json_config;

        let output_directory = raw
            .output_directory
            .as_ref()
            .context("output_directory must be set in config.json")?;

        let databases = raw
            .databases
            .as_ref()
            .filter(|dbs| !dbs.is_empty())
            .context("databases must list at least one database in config.json")?;

        let mut runner = BackupRunner::new()
            .abort_hook(abort)
            .output_directory(output_directory.as_str());

        for entry in databases {
            let password = match &entry.password {
                Some(password) => password.clone(),
                None => lookup(&db_password_var(&entry.schema)).unwrap_or_default(),
            };
            let job = JobDescriptor::new(&entry.schema, &entry.username, password)
                .with_context(|| format!("Invalid database entry '{}'", entry.schema))?
                .with_host(entry.host.clone().unwrap_or_default());
            runner = runner.add_database(job);
        }

        if let Some(format) = &raw.date_format {
            runner = runner.date_format(format.as_str());
        }
        if let Some(extension) = &raw.file_extension {
            runner = runner.file_extension(extension.as_str());
        }
        if let Some(prefix) = &raw.mysqldump_path {
            runner = runner.dump_executable_path(prefix.as_str());
        }
        if let Some(prefix) = &raw.gzip_path {
            runner = runner.compressor_path(prefix.as_str());
        }
        if let Some(compressor) = &raw.compressor {
            runner = runner.compressor(compressor.as_str());
        }
        if let Some(options) = &raw.dump_options {
            runner = runner.dump_options(options.as_str());
        }
        if raw.delete_after_backup.unwrap_or(false) {
            runner = runner.delete_after_backup();
        }
        if let Some(mailer) = &raw.mailer {
            runner = runner.mailer(mailer);
        }
        if let Some(smtp) = &raw.smtp {
            runner = runner.smtp_config(smtp_config(smtp, &lookup));
        }
        if let Some(sender) = &raw.sender {
            runner = runner.sender(sender.as_str());
        }
        if let Some(recipients) = &raw.recipients {
            runner = runner.recipients(recipients.iter().cloned());
        }
        if let Some(subject) = &raw.subject {
            runner = runner.subject(subject.as_str());
        }

        Ok(runner)
    }
}

fn smtp_config(raw: &JsonSmtpConfig, lookup: &impl Fn(&str) -> Option<String>) -> SmtpConfig {
    let password = raw
        .password
        .clone()
        .filter(|p| !p.is_empty())
        .or_else(|| lookup(SMTP_PASSWORD_VAR))
        .unwrap_or_default();

    SmtpConfig {
        host: raw.host.clone(),
        username: raw.username.clone().unwrap_or_default(),
        password: Secret::new(password),
        port: raw.port.unwrap_or(DEFAULT_SMTP_PORT),
        security: raw.security.unwrap_or_default(),
    }
}

/// `BACKUP_DB_PASSWORD_<SCHEMA>`, upper-cased, non-alphanumerics as `_`.
fn db_password_var(schema: &str) -> String {
    let suffix: String = schema
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}", DB_PASSWORD_VAR_PREFIX, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Fatal;
    use crate::mail::MailerKind;
    use serde_json::json;
    use std::collections::HashMap;

    fn panic_hook(fatal: &Fatal) -> ! {
        panic!("fatal: {}", fatal)
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn config(value: serde_json::Value) -> AppConfig {
        AppConfig::from_json_str(&value.to_string()).unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() -> anyhow::Result<()> {
        let app = config(json!({
            "output_directory": "/tmp/b/",
            "databases": [{ "schema": "orders", "username": "u", "password": "p" }]
        }));
        let runner = app.build_runner_with(no_env, panic_hook)?;

        assert_eq!(runner.jobs().len(), 1);
        assert_eq!(runner.jobs()[0].schema(), "orders");
        assert_eq!(runner.jobs()[0].host(), None);
        let cfg = runner.config();
        assert_eq!(cfg.output_directory, "/tmp/b/");
        assert_eq!(cfg.date_format, "%Y-%m-%d");
        assert_eq!(cfg.file_extension, ".gz");
        assert_eq!(cfg.mailer, MailerKind::None);
        assert!(!cfg.delete_after_backup);
        Ok(())
    }

    #[test]
    fn test_full_config() -> anyhow::Result<()> {
        let app = config(json!({
            "output_directory": "/var/backups/mysql",
            "date_format": "%Y%m%d",
            "file_extension": ".bz2",
            "mysqldump_path": "/usr/local/mysql/bin/",
            "gzip_path": "/usr/bin/",
            "compressor": "bzip2",
            "dump_options": "--single-transaction",
            "delete_after_backup": true,
            "mailer": "smtp",
            "smtp": { "host": "mail.example.com", "username": "u", "password": "p", "port": 465, "security": "tls" },
            "sender": "db@example.com",
            "recipients": ["ops@example.com", "dba@example.com"],
            "subject": "Nightly",
            "databases": [
                { "schema": "orders", "username": "u", "password": "p", "host": "db1" },
                { "schema": "users", "username": "u", "password": "" }
            ],
            "log": { "json": true }
        }));
        let runner = app.build_runner_with(no_env, panic_hook)?;

        let cfg = runner.config();
        assert_eq!(cfg.output_directory, "/var/backups/mysql/");
        assert_eq!(cfg.date_format, "%Y%m%d");
        assert_eq!(cfg.file_extension, ".bz2");
        assert_eq!(cfg.dump_path, "/usr/local/mysql/bin/");
        assert_eq!(cfg.compressor_path, "/usr/bin/");
        assert_eq!(cfg.compressor, "bzip2");
        assert_eq!(cfg.dump_options, "--single-transaction");
        assert!(cfg.delete_after_backup);
        assert_eq!(cfg.mailer, MailerKind::Smtp);
        assert_eq!(cfg.sender, "db@example.com");
        assert_eq!(cfg.recipients.len(), 2);
        assert_eq!(cfg.subject, "Nightly");

        let smtp = cfg.smtp.as_ref().unwrap();
        assert_eq!(smtp.port, 465);
        assert_eq!(smtp.security, SmtpSecurity::Tls);
        assert_eq!(smtp.password.expose(), "p");

        assert_eq!(runner.jobs()[0].host(), Some("db1"));
        assert!(runner.jobs()[1].password().is_empty());

        let log = app.log_config();
        assert!(log.json);
        assert!(!log.verbose);
        Ok(())
    }

    #[test]
    fn test_passwords_fall_back_to_environment() -> anyhow::Result<()> {
        let env: HashMap<&str, &str> = [
            ("BACKUP_SMTP_PASSWORD", "smtp-secret"),
            ("BACKUP_DB_PASSWORD_SHOP_EU", "db-secret"),
        ]
        .into_iter()
        .collect();
        let lookup = |name: &str| env.get(name).map(|v| v.to_string());

        let app = config(json!({
            "output_directory": "/tmp/b/",
            "mailer": "smtp",
            "smtp": { "host": "mail.example.com", "username": "u" },
            "databases": [{ "schema": "shop-eu", "username": "u" }]
        }));
        let runner = app.build_runner_with(lookup, panic_hook)?;

        assert_eq!(runner.jobs()[0].password().expose(), "db-secret");
        let smtp = runner.config().smtp.as_ref().unwrap();
        assert_eq!(smtp.password.expose(), "smtp-secret");
        assert_eq!(smtp.port, 25);
        assert_eq!(smtp.security, SmtpSecurity::StartTls);
        Ok(())
    }

    #[test]
    fn test_db_password_var_name() {
        assert_eq!(db_password_var("orders"), "BACKUP_DB_PASSWORD_ORDERS");
        assert_eq!(db_password_var("shop-eu.v2"), "BACKUP_DB_PASSWORD_SHOP_EU_V2");
    }

    #[test]
    fn test_missing_output_directory_is_an_error() {
        let app = config(json!({
            "databases": [{ "schema": "orders", "username": "u" }]
        }));
        assert!(app.build_runner_with(no_env, panic_hook).is_err());
    }

    #[test]
    #[should_panic(expected = "No path for backup files given!")]
    fn test_empty_output_directory_is_fatal() {
        let app = config(json!({
            "output_directory": "",
            "databases": [{ "schema": "orders", "username": "u" }]
        }));
        let _ = app.build_runner_with(no_env, panic_hook);
    }

    #[test]
    fn test_empty_database_list_is_an_error() {
        let app = config(json!({ "output_directory": "/tmp/b/", "databases": [] }));
        assert!(app.build_runner_with(no_env, panic_hook).is_err());
    }

    #[test]
    fn test_database_without_username_is_an_error() {
        let app = config(json!({
            "output_directory": "/tmp/b/",
            "databases": [{ "schema": "orders", "username": "" }]
        }));
        let err = app.build_runner_with(no_env, panic_hook).unwrap_err();
        assert!(err.to_string().contains("orders"));
    }

    #[test]
    fn test_legacy_mail_name_selects_direct() -> anyhow::Result<()> {
        let app = config(json!({
            "output_directory": "/tmp/b/",
            "mailer": "mail",
            "databases": [{ "schema": "orders", "username": "u" }]
        }));
        let runner = app.build_runner_with(no_env, panic_hook)?;
        assert_eq!(runner.config().mailer, MailerKind::Direct);
        Ok(())
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(AppConfig::from_json_str("{ not json").is_err());
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = AppConfig::load_from_json(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
