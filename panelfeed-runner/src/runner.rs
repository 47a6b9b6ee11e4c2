//! Pipeline entry points — wires configuration, sessions, fetch and convert.
//!
//! Three entry points:
//! - `run_fetch()`: resolve the universe and write missing snapshots.
//! - `run_convert()`: clean every snapshot and hand the exports to the dump.
//! - `run_pipeline()`: fetch then convert, as one run.

use chrono::NaiveDate;
use panelfeed_core::data::http::HttpQuoteSession;
use panelfeed_core::data::provider::{DataError, QuoteSession};
use panelfeed_core::data::retry::RetryingQuery;
use panelfeed_core::data::snapshot::SnapshotStore;
use panelfeed_core::data::synthetic::SyntheticSession;
use panelfeed_core::domain::Instrument;
use thiserror::Error;

use crate::config::{ConfigError, PipelineConfig};
use crate::convert::{BatchConversionPipeline, ConversionPaths, ConversionSummary, ConvertError};
use crate::dump::{BinaryDumper, ProcessDumper};
use crate::fetch::{FetchWindow, InstrumentFetchPipeline};
use crate::orchestrator::{FetchProgress, FetchSummary, UniverseFetchOrchestrator, UniverseSource};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("conversion error: {0}")]
    Convert(#[from] ConvertError),
}

/// Outcome of a full fetch + convert run.
#[derive(Debug)]
pub struct PipelineReport {
    pub fetch: FetchSummary,
    pub conversion: ConversionSummary,
}

/// The HTTP gateway session, or deterministic synthetic data.
pub fn open_session(
    config: &PipelineConfig,
    synthetic: bool,
) -> Result<Box<dyn QuoteSession>, RunError> {
    if synthetic {
        return Ok(Box::new(SyntheticSession::default_universe()));
    }
    let session = HttpQuoteSession::new(config.remote.endpoint.clone(), config.timeout())?;
    Ok(Box::new(session))
}

/// The external dump command from `[dump]`.
pub fn process_dumper(config: &PipelineConfig) -> ProcessDumper {
    ProcessDumper::new(config.dump.program.clone(), config.dump.args.clone())
}

pub fn build_fetch_pipeline(config: &PipelineConfig) -> Result<InstrumentFetchPipeline, RunError> {
    Ok(InstrumentFetchPipeline::new(
        RetryingQuery::new(config.retry_policy()),
        config.market_map()?,
        config.fundamental_map()?,
        SnapshotStore::new(&config.paths.raw_data),
        FetchWindow {
            start: config.data_scope.start_date,
            end: config.data_scope.end_date,
            lookback_days: config.remote.fundamental_lookback_days,
        },
    ))
}

/// Fetch every instrument of the universe (or of `instruments`, when given).
pub fn run_fetch(
    config: &PipelineConfig,
    session: &mut dyn QuoteSession,
    instruments: Option<Vec<Instrument>>,
    as_of: NaiveDate,
    progress: &dyn FetchProgress,
) -> Result<FetchSummary, RunError> {
    let pipeline = build_fetch_pipeline(config)?;
    let universe = match instruments {
        Some(list) => UniverseSource::Explicit(list),
        None => UniverseSource::Remote {
            selector: config.remote.pool_code.clone(),
            as_of,
        },
    };
    let orchestrator = UniverseFetchOrchestrator::new(&pipeline, config.request_gap());
    Ok(orchestrator.run(session, &universe, progress)?)
}

pub fn run_convert(
    config: &PipelineConfig,
    dumper: &dyn BinaryDumper,
) -> Result<ConversionSummary, RunError> {
    let paths = ConversionPaths {
        raw_dir: config.paths.raw_data.clone(),
        temp_dir: config.paths.temp_csv.clone(),
        binary_dir: config.paths.binary_data.clone(),
    };
    let pipeline =
        BatchConversionPipeline::new(paths, config.include_fields(), config.worker_count(), dumper);
    Ok(pipeline.run()?)
}

pub fn run_pipeline(
    config: &PipelineConfig,
    session: &mut dyn QuoteSession,
    instruments: Option<Vec<Instrument>>,
    as_of: NaiveDate,
    progress: &dyn FetchProgress,
    dumper: &dyn BinaryDumper,
) -> Result<PipelineReport, RunError> {
    let fetch = run_fetch(config, session, instruments, as_of, progress)?;
    let conversion = run_convert(config, dumper)?;
    Ok(PipelineReport { fetch, conversion })
}
