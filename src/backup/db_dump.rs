// mysqlbackup/src/backup/db_dump.rs
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

use super::job::{BackupResult, JobDescriptor, Secret};
use crate::errors::{AppError, Result};
use crate::utils::resolve_executable;

pub const DUMP_EXECUTABLE: &str = "mysqldump";
pub const PASSWORD_ENV: &str = "MYSQL_PWD";

/// The `mysqldump | gzip > file` chain, run without a shell.
#[derive(Debug, Clone)]
pub struct DumpPipeline {
    dump_bin: PathBuf,
    compressor_bin: PathBuf,
    dump_options: Vec<String>,
}

impl DumpPipeline {
    pub fn new(
        dump_prefix: &str,
        compressor_prefix: &str,
        compressor: &str,
        dump_options: &str,
    ) -> Self {
        DumpPipeline {
            dump_bin: resolve_executable(dump_prefix, DUMP_EXECUTABLE),
            compressor_bin: resolve_executable(compressor_prefix, compressor),
            dump_options: dump_options.split_whitespace().map(str::to_owned).collect(),
        }
    }

    pub fn dump_bin(&self) -> &Path {
        &self.dump_bin
    }

    pub fn compressor_bin(&self) -> &Path {
        &self.compressor_bin
    }

    /// Arguments for mysqldump. The password is passed via `MYSQL_PWD`.
    pub fn dump_args(&self, job: &JobDescriptor) -> Vec<String> {
        let mut args = Vec::with_capacity(self.dump_options.len() + 3);
        args.push(format!("--user={}", job.username()));
        if let Some(host) = job.host() {
            args.push(format!("--host={}", host));
        }
        args.extend(self.dump_options.iter().cloned());
        args.push(job.schema().to_owned());
        args
    }

    /// Runs the pipeline for `job`, writing the compressed dump to `destination`.
    ///
    /// Never fails: spawn and wait errors are folded into the returned result.
    pub async fn execute(&self, job: &JobDescriptor, destination: &Path) -> BackupResult {
        match self.spawn_and_wait(job, destination).await {
            Ok((dump_status, compress_status)) => {
                let exit_code = first_failure(dump_status, compress_status);
                let success = dump_status.success() && compress_status.success();
                if !success {
                    tracing::warn!(
                        schema = job.schema(),
                        dump = %dump_status,
                        compressor = %compress_status,
                        "Dump pipeline exited unsuccessfully"
                    );
                }
                BackupResult {
                    schema: job.schema().to_owned(),
                    path: destination.to_path_buf(),
                    success,
                    exit_code,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(schema = job.schema(), error = %e, "Dump pipeline could not run");
                BackupResult::failed(job.schema(), destination.to_path_buf(), e.to_string())
            }
        }
    }

    /// The mysqldump command for `job`. `MYSQL_PWD` is always set or removed,
    /// so the child never picks up a password from this process's environment.
    fn dump_command(&self, job: &JobDescriptor, password: &Secret) -> Command {
        let mut cmd = Command::new(&self.dump_bin);
        cmd.args(self.dump_args(job))
            .stdout(Stdio::piped())
            .kill_on_drop(true);
        if password.is_empty() {
            cmd.env_remove(PASSWORD_ENV);
        } else {
            cmd.env(PASSWORD_ENV, password.expose());
        }
        cmd
    }

    async fn spawn_and_wait(
        &self,
        job: &JobDescriptor,
        destination: &Path,
    ) -> Result<(ExitStatus, ExitStatus)> {
        let output = File::create(destination).map_err(|e| {
            AppError::Command(format!(
                "Failed to create backup file {}: {}",
                destination.display(),
                e
            ))
        })?;

        tracing::debug!(
            executable = %self.dump_bin.display(),
            args = ?self.dump_args(job),
            "Spawning mysqldump"
        );

        let mut password = job.password().clone();
        let mut dump_cmd = self.dump_command(job, &password);
        let spawned = dump_cmd.spawn();
        password.wipe();
        drop(dump_cmd);

        let mut dump = spawned.map_err(|e| spawn_error(&self.dump_bin, e))?;

        let dump_stdout = dump
            .stdout
            .take()
            .ok_or_else(|| AppError::Command("Failed to capture mysqldump stdout".to_string()))?;
        let dump_stdout = TryInto::<Stdio>::try_into(dump_stdout).map_err(|e: std::io::Error| {
            AppError::Command(format!("Failed to hand mysqldump output to compressor: {}", e))
        })?;

        let compressor = Command::new(&self.compressor_bin)
            .stdin(dump_stdout)
            .stdout(Stdio::from(output))
            .spawn();

        let mut compressor = match compressor {
            Ok(child) => child,
            Err(e) => {
                let _ = dump.kill().await;
                return Err(spawn_error(&self.compressor_bin, e));
            }
        };

        let dump_status = dump
            .wait()
            .await
            .map_err(|e| AppError::Command(format!("Failed to wait for mysqldump: {}", e)))?;
        let compress_status = compressor
            .wait()
            .await
            .map_err(|e| AppError::Command(format!("Failed to wait for compressor: {}", e)))?;

        Ok((dump_status, compress_status))
    }
}

fn spawn_error(bin: &Path, e: std::io::Error) -> AppError {
    if e.kind() == ErrorKind::NotFound {
        AppError::MissingExecutable(bin.to_path_buf())
    } else {
        AppError::Command(format!("Failed to execute {}: {}", bin.display(), e))
    }
}

fn first_failure(dump: ExitStatus, compressor: ExitStatus) -> Option<i32> {
    if !dump.success() {
        dump.code()
    } else {
        compressor.code()
    }
}
