//! PanelFeed Runner — fetch orchestration and batch conversion.
//!
//! This crate builds on `panelfeed-core` to provide:
//! - TOML pipeline configuration
//! - Per-instrument fetch pipeline (skip-if-exists, retry, align, snapshot)
//! - Sequential universe fetch with pacing and progress reporting
//! - Snapshot cleaning and CSV export
//! - Parallel conversion followed by a single binary dump

pub mod clean;
pub mod config;
pub mod convert;
pub mod dump;
pub mod fetch;
pub mod orchestrator;
pub mod runner;

pub use clean::{CleanCause, CleanError, CleanOutcome, CleanedFrame, ExportRecord, SnapshotCleaner};
pub use config::{ConfigError, PipelineConfig};
pub use convert::{
    BatchConversionPipeline, ConversionPaths, ConversionSummary, ConvertError, DumpStatus,
};
pub use dump::{BinaryDumper, DumpError, DumpJob, ProcessDumper};
pub use fetch::{FetchOutcome, FetchWindow, InstrumentFetchPipeline};
pub use orchestrator::{
    FetchProgress, FetchSummary, LogProgress, Pacer, ThreadPacer, UniverseFetchOrchestrator,
    UniverseSource,
};
pub use runner::{
    build_fetch_pipeline, open_session, process_dumper, run_convert, run_fetch, run_pipeline,
    PipelineReport, RunError,
};
