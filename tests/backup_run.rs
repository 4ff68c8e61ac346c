#![cfg(unix)]

use async_trait::async_trait;
use chrono::NaiveDate;
use mysqlbackup::config::AppConfig;
use mysqlbackup::utils::FixedClock;
use mysqlbackup::{
    BackupRunner, Fatal, JobDescriptor, MailMessage, MailTransport, Result, TransportReceipt,
    backup,
};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// A fake toolchain: `mysqldump` prints its arguments and password, the
/// compressor copies stdin to stdout after leaving a marker file.
fn fake_tools() -> TempDir {
    let bin = TempDir::new().unwrap();
    script(bin.path(), "mysqldump", r#"echo "$*"; echo "MYSQL_PWD=$MYSQL_PWD""#);
    let marker = bin.path().join("compressor-ran");
    script(
        bin.path(),
        "gzip",
        &format!("echo x >> '{}'; cat", marker.display()),
    );
    bin
}

fn prefix(dir: &TempDir) -> String {
    format!("{}/", dir.path().display())
}

fn new_year() -> FixedClock {
    FixedClock(
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(3, 0, 0)
            .unwrap(),
    )
}

fn panic_hook(fatal: &Fatal) -> ! {
    panic!("fatal: {}", fatal)
}

#[derive(Clone, Default)]
struct Outbox(Arc<Mutex<Vec<MailMessage>>>);

#[async_trait]
impl MailTransport for Outbox {
    async fn send(&self, message: &MailMessage) -> Result<TransportReceipt> {
        self.0.lock().unwrap().push(message.clone());
        Ok(TransportReceipt {
            accepted_recipients: message.to.len(),
            detail: "250 queued".into(),
        })
    }
}

#[tokio::test]
async fn test_single_database_end_to_end() {
    let bin = fake_tools();
    let out = TempDir::new().unwrap();

    let runner = BackupRunner::new()
        .abort_hook(panic_hook)
        .clock(new_year())
        .add_database(JobDescriptor::new("orders", "u", "p").unwrap())
        .output_directory(prefix(&out))
        .date_format("%Y-%m-%d")
        .file_extension(".gz")
        .dump_executable_path(prefix(&bin))
        .compressor_path(prefix(&bin));

    let results = runner.run().await.unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.success, "{:?}", result);
    assert_eq!(result.path, out.path().join("orders_2024-01-01.sql.gz"));

    let dump = std::fs::read_to_string(&result.path).unwrap();
    assert_eq!(
        dump,
        "--user=u --quick --lock-tables --add-drop-table orders\nMYSQL_PWD=p\n"
    );
    assert!(bin.path().join("compressor-ran").exists());
}

#[tokio::test]
async fn test_every_database_gets_a_file_in_order() {
    let bin = fake_tools();
    let out = TempDir::new().unwrap();
    let schemas = ["billing", "audit", "users", "orders"];

    let mut runner = BackupRunner::new()
        .abort_hook(panic_hook)
        .clock(new_year())
        .output_directory(prefix(&out))
        .dump_executable_path(prefix(&bin))
        .compressor_path(prefix(&bin));
    for schema in schemas {
        runner = runner.add_database(JobDescriptor::new(schema, "u", "p").unwrap());
    }

    let results = runner.run().await.unwrap();

    let got: Vec<_> = results.iter().map(|r| r.schema.as_str()).collect();
    assert_eq!(got, schemas);
    for result in &results {
        assert!(result.success);
        assert!(result.path.exists());
    }
}

#[tokio::test]
async fn test_mail_then_delete() {
    let bin = fake_tools();
    let out = TempDir::new().unwrap();
    let outbox = Outbox::default();

    let runner = BackupRunner::new()
        .abort_hook(panic_hook)
        .clock(new_year())
        .add_database(JobDescriptor::new("orders", "u", "p").unwrap().with_host("db1"))
        .output_directory(prefix(&out))
        .dump_executable_path(prefix(&bin))
        .compressor_path(prefix(&bin))
        .mailer("smtp")
        .sender("db@example.com")
        .recipients(["ops@example.com"])
        .delete_after_backup()
        .transport(outbox.clone());

    let results = runner.run().await.unwrap();

    let sent = outbox.0.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].attachments, vec![results[0].path.clone()]);
    assert_eq!(sent[0].from, "db@example.com");
    assert!(!results[0].path.exists());
}

#[tokio::test]
async fn test_config_file_drives_the_run() {
    let bin = fake_tools();
    let out = TempDir::new().unwrap();
    let config_path = out.path().join("config.json");
    let config = serde_json::json!({
        "output_directory": out.path().join("dumps").display().to_string(),
        "date_format": "%Y",
        "mysqldump_path": prefix(&bin),
        "gzip_path": prefix(&bin),
        "dump_options": "--single-transaction",
        "databases": [{ "schema": "orders", "username": "u", "password": "p" }]
    });
    std::fs::create_dir(out.path().join("dumps")).unwrap();
    std::fs::write(&config_path, config.to_string()).unwrap();

    let app = AppConfig::load_from_json(&config_path).unwrap();
    let results = backup::run_backup_flow(&app).await.unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    let name = results[0].path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("orders_20"), "{}", name);
    assert!(name.ends_with(".sql.gz"));
    let dump = std::fs::read_to_string(&results[0].path).unwrap();
    assert!(dump.starts_with("--user=u --single-transaction orders\n"));
}
