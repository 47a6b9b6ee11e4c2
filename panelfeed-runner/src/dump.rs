//! Hand-off to the binary dataset dump tool.
//!
//! The dump is an external collaborator: it reads the directory of cleaned
//! CSV exports and writes the columnar binary store. `ProcessDumper` runs it
//! as a child process; tests substitute a recording implementation.

use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dump exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Inputs for one dump run.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpJob {
    pub source_dir: PathBuf,
    pub dest_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub include_fields: Vec<String>,
    pub symbol_field: String,
    pub date_field: String,
    pub workers: usize,
}

impl DumpJob {
    /// Job with the standard key columns, single worker and `dest/backup`.
    pub fn new(source_dir: PathBuf, dest_dir: PathBuf, include_fields: Vec<String>) -> Self {
        let backup_dir = dest_dir.join("backup");
        Self {
            source_dir,
            dest_dir,
            backup_dir,
            include_fields,
            symbol_field: "instrument".into(),
            date_field: "date".into(),
            workers: 1,
        }
    }
}

pub trait BinaryDumper: Send + Sync {
    fn name(&self) -> &str;

    fn dump(&self, job: &DumpJob) -> Result<(), DumpError>;
}

/// Runs an external dump command, appending the job as `--flag value` pairs.
#[derive(Debug, Clone)]
pub struct ProcessDumper {
    program: String,
    args: Vec<String>,
}

impl ProcessDumper {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Full argument list for `job`.
    pub fn command_args(&self, job: &DumpJob) -> Vec<String> {
        let mut args = self.args.clone();
        let flags = [
            ("--csv_path", job.source_dir.display().to_string()),
            ("--qlib_dir", job.dest_dir.display().to_string()),
            ("--backup_dir", job.backup_dir.display().to_string()),
            ("--include_fields", job.include_fields.join(",")),
            ("--symbol_field_name", job.symbol_field.clone()),
            ("--date_field_name", job.date_field.clone()),
            ("--max_workers", job.workers.to_string()),
        ];
        for (flag, value) in flags {
            args.push(flag.to_string());
            args.push(value);
        }
        args
    }
}

impl BinaryDumper for ProcessDumper {
    fn name(&self) -> &str {
        &self.program
    }

    fn dump(&self, job: &DumpJob) -> Result<(), DumpError> {
        let args = self.command_args(job);
        debug!(program = %self.program, ?args, "launching dump");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| DumpError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(DumpError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(dest = %job.dest_dir.display(), "binary dump complete");
        Ok(())
    }
}
