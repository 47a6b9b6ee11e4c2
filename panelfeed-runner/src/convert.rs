//! Batch conversion: parallel snapshot cleaning, then one binary dump.

use crate::clean::{CleanError, CleanOutcome, ExportRecord, SnapshotCleaner};
use crate::dump::{BinaryDumper, DumpJob};
use panelfeed_core::data::provider::DataError;
use panelfeed_core::data::snapshot::SnapshotStore;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("no snapshots found in {}", .0.display())]
    NoSnapshots(PathBuf),

    #[error("failed to prepare {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Data(#[from] DataError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpStatus {
    Completed,
    Failed(String),
}

#[derive(Debug)]
pub struct ConversionSummary {
    pub exported: Vec<ExportRecord>,
    /// Zero-row snapshots that were skipped.
    pub empty: Vec<PathBuf>,
    pub failed: Vec<CleanError>,
    pub dump: DumpStatus,
}

impl ConversionSummary {
    pub fn dump_succeeded(&self) -> bool {
        self.dump == DumpStatus::Completed
    }
}

/// Directories and settings for one conversion run.
#[derive(Debug, Clone)]
pub struct ConversionPaths {
    pub raw_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub binary_dir: PathBuf,
}

pub struct BatchConversionPipeline<'a> {
    paths: ConversionPaths,
    include_fields: Vec<String>,
    workers: usize,
    dumper: &'a dyn BinaryDumper,
}

impl<'a> BatchConversionPipeline<'a> {
    pub fn new(
        paths: ConversionPaths,
        include_fields: Vec<String>,
        workers: usize,
        dumper: &'a dyn BinaryDumper,
    ) -> Self {
        Self {
            paths,
            include_fields,
            workers: workers.max(1),
            dumper,
        }
    }

    pub fn run(&self) -> Result<ConversionSummary, ConvertError> {
        let started = Instant::now();
        recreate_dir(&self.paths.temp_dir)?;
        fs::create_dir_all(&self.paths.binary_dir).map_err(|e| ConvertError::Io {
            path: self.paths.binary_dir.clone(),
            source: e,
        })?;

        let snapshots = SnapshotStore::new(&self.paths.raw_dir).list()?;
        if snapshots.is_empty() {
            return Err(ConvertError::NoSnapshots(self.paths.raw_dir.clone()));
        }
        info!(
            snapshots = snapshots.len(),
            workers = self.workers,
            "cleaning snapshots"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| ConvertError::ThreadPool(e.to_string()))?;

        let cleaner = SnapshotCleaner::new(&self.paths.temp_dir);
        let results: Vec<(PathBuf, Result<CleanOutcome, CleanError>)> = pool.install(|| {
            snapshots
                .par_iter()
                .map(|path| (path.clone(), cleaner.clean(path)))
                .collect()
        });

        let mut exported = Vec::new();
        let mut empty = Vec::new();
        let mut failed = Vec::new();
        for (path, result) in results {
            match result {
                Ok(CleanOutcome::Exported(record)) => exported.push(record),
                Ok(CleanOutcome::Empty) => {
                    warn!(file = %path.display(), "empty snapshot skipped");
                    empty.push(path);
                }
                Err(e) => {
                    error!(file = %e.file.display(), cause = %e.cause, "snapshot conversion failed");
                    failed.push(e);
                }
            }
        }
        info!(
            exported = exported.len(),
            empty = empty.len(),
            failed = failed.len(),
            elapsed = format!("{:.1}s", started.elapsed().as_secs_f64()),
            "cleaning complete"
        );

        let job = DumpJob::new(
            self.paths.temp_dir.clone(),
            self.paths.binary_dir.clone(),
            self.include_fields.clone(),
        );
        let dump = match self.dumper.dump(&job) {
            Ok(()) => DumpStatus::Completed,
            Err(e) => {
                error!(dumper = self.dumper.name(), error = %e, "binary dump failed");
                DumpStatus::Failed(e.to_string())
            }
        };

        Ok(ConversionSummary {
            exported,
            empty,
            failed,
            dump,
        })
    }
}

fn recreate_dir(dir: &Path) -> Result<(), ConvertError> {
    let io_err = |e| ConvertError::Io {
        path: dir.to_path_buf(),
        source: e,
    };
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(io_err)?;
    }
    fs::create_dir_all(dir).map_err(io_err)
}
