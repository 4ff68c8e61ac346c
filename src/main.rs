//! MySQL Backup Tool
//!
//! Dumps the configured databases, then mails and/or deletes the archives

// mysqlbackup/src/main.rs
use anyhow::{Context, Result};
use mysqlbackup::{backup, config::AppConfig, logging};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    match run_app().await {
        Ok(true) => {
            println!("✅ Backup completed successfully.");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            eprintln!("⚠️ Backup finished with failed databases.");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every database was dumped successfully.
async fn run_app() -> Result<bool> {
    dotenv::dotenv().ok();

    // The config file is taken from the first argument, or `config.json` in
    // the working directory.
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let app_config = AppConfig::load_from_json(&config_path).context(format!(
        "Failed to load application configuration from {}",
        config_path.display()
    ))?;

    logging::init(app_config.log_config());

    println!("🚀 Starting Backup Process...");
    let results = backup::run_backup_flow(&app_config)
        .await
        .context("Backup process failed")?;

    for result in &results {
        match (result.success, &result.error) {
            (true, _) => println!("✓ {} -> {}", result.schema, result.path.display()),
            (false, Some(error)) => println!("✗ {}: {}", result.schema, error),
            (false, None) => println!(
                "✗ {}: pipeline exited with {}",
                result.schema,
                result
                    .exit_code
                    .map_or_else(|| "a signal".to_string(), |code| format!("status {}", code))
            ),
        }
    }

    Ok(results.iter().all(|r| r.success))
}
