pub mod db_dump;
pub mod job;
mod logic;

pub use db_dump::DumpPipeline;
pub use job::{BackupResult, JobDescriptor, Secret};
pub use logic::{
    BackupRunner, DEFAULT_COMPRESSOR, DEFAULT_DUMP_OPTIONS, DEFAULT_EXTENSION, DEFAULT_SENDER,
    DEFAULT_SUBJECT, RunnerConfig,
};

use anyhow::{Context, Result};
use crate::config::AppConfig;

/// Public entry point for the backup process.
/// Builds a runner from the loaded configuration and runs every job.
pub async fn run_backup_flow(app_config: &AppConfig) -> Result<Vec<BackupResult>> {
    let runner = app_config
        .build_runner()
        .context("Invalid backup configuration")?;

    runner.run().await.context("Backup mail could not be sent")
}
