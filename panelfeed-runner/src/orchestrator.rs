//! Universe fetch orchestrator: resolves the universe and drives the
//! per-instrument pipeline sequentially over one quotation session.

use crate::fetch::{FetchOutcome, InstrumentFetchPipeline};
use chrono::NaiveDate;
use panelfeed_core::data::provider::{DataError, QuoteSession};
use panelfeed_core::data::universe::resolve_universe;
use panelfeed_core::domain::Instrument;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Where the instrument list comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum UniverseSource {
    /// One constituent-set query against the session.
    Remote { selector: String, as_of: NaiveDate },
    /// Explicit list; no remote resolution.
    Explicit(Vec<Instrument>),
}

/// Progress callbacks for a fetch run. Implementations must not block.
pub trait FetchProgress: Send {
    /// Called before an instrument is fetched.
    fn on_start(&self, instrument: &Instrument, index: usize, total: usize);

    /// Called when an instrument is done, whatever the outcome.
    fn on_complete(
        &self,
        instrument: &Instrument,
        index: usize,
        total: usize,
        result: &Result<FetchOutcome, DataError>,
    );

    /// Called once after the last instrument.
    fn on_batch_complete(&self, summary: &FetchSummary);
}

/// Progress reporter that writes to the `tracing` log.
pub struct LogProgress;

impl FetchProgress for LogProgress {
    fn on_start(&self, instrument: &Instrument, index: usize, total: usize) {
        info!(instrument = %instrument, "[{}/{}] fetching", index + 1, total);
    }

    fn on_complete(
        &self,
        instrument: &Instrument,
        _index: usize,
        _total: usize,
        result: &Result<FetchOutcome, DataError>,
    ) {
        match result {
            Ok(FetchOutcome::Written { rows, degraded, .. }) => {
                info!(instrument = %instrument, rows, degraded, "ok")
            }
            Ok(FetchOutcome::Skipped) => info!(instrument = %instrument, "skipped (exists)"),
            Ok(FetchOutcome::NoMarketData) => info!(instrument = %instrument, "no data"),
            Ok(FetchOutcome::MarketUnavailable { cause }) => {
                warn!(instrument = %instrument, cause = %cause, "unavailable")
            }
            Ok(FetchOutcome::EmptyHistory) => warn!(instrument = %instrument, "empty history"),
            Err(e) => error!(instrument = %instrument, error = %e, "failed"),
        }
    }

    fn on_batch_complete(&self, summary: &FetchSummary) {
        summary.log_summary();
    }
}

/// Waits out the gap between instruments that hit the remote service.
pub trait Pacer: Send + Sync {
    fn pause(&self, gap: Duration);
}

/// Blocks the calling thread for the gap.
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&self, gap: Duration) {
        std::thread::sleep(gap);
    }
}

/// Counts for a fetch run.
#[derive(Debug, Default)]
pub struct FetchSummary {
    pub total: usize,
    pub written: usize,
    pub skipped: usize,
    /// Written with neutral-filled fundamentals.
    pub degraded: usize,
    pub no_data: usize,
    /// Instruments whose daily history was empty.
    pub empty: usize,
    pub rows_written: usize,
    /// Instrument plus cause, for unavailable market data and write failures.
    pub failed: Vec<(Instrument, String)>,
    pub elapsed: Duration,
}

impl FetchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, instrument: &Instrument, result: &Result<FetchOutcome, DataError>) {
        match result {
            Ok(FetchOutcome::Skipped) => self.skipped += 1,
            Ok(FetchOutcome::Written { rows, degraded, .. }) => {
                self.written += 1;
                self.rows_written += rows;
                if *degraded {
                    self.degraded += 1;
                }
            }
            Ok(FetchOutcome::NoMarketData) => self.no_data += 1,
            Ok(FetchOutcome::EmptyHistory) => self.empty += 1,
            Ok(FetchOutcome::MarketUnavailable { cause }) => {
                self.failed.push((instrument.clone(), cause.clone()))
            }
            Err(e) => self.failed.push((instrument.clone(), e.to_string())),
        }
    }

    pub fn log_summary(&self) {
        info!(
            total = self.total,
            written = self.written,
            skipped = self.skipped,
            degraded = self.degraded,
            no_data = self.no_data,
            empty = self.empty,
            failed = self.failed.len(),
            rows = self.rows_written,
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "fetch complete"
        );
        if self.all_succeeded() {
            return;
        }
        for (instrument, cause) in &self.failed {
            warn!(instrument = %instrument, cause = %cause, "fetch failed");
        }
    }
}

pub struct UniverseFetchOrchestrator<'a> {
    pipeline: &'a InstrumentFetchPipeline,
    request_gap: Duration,
    pacer: &'a dyn Pacer,
}

impl<'a> UniverseFetchOrchestrator<'a> {
    pub fn new(pipeline: &'a InstrumentFetchPipeline, request_gap: Duration) -> Self {
        Self {
            pipeline,
            request_gap,
            pacer: &ThreadPacer,
        }
    }

    pub fn with_pacer(mut self, pacer: &'a dyn Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    /// Start the session, resolve the universe, fetch every instrument in
    /// order, then close the session.
    ///
    /// Session start and universe resolution failures are fatal. Per
    /// instrument failures are recorded in the summary and the loop goes on.
    pub fn run(
        &self,
        session: &mut dyn QuoteSession,
        universe: &UniverseSource,
        progress: &dyn FetchProgress,
    ) -> Result<FetchSummary, DataError> {
        let started = Instant::now();
        session.start()?;

        let instruments = match universe {
            UniverseSource::Explicit(list) => list.clone(),
            UniverseSource::Remote { selector, as_of } => {
                match resolve_universe(session, selector, *as_of) {
                    Ok(list) => list,
                    Err(e) => {
                        session.close();
                        return Err(e);
                    }
                }
            }
        };

        let total = instruments.len();
        let mut summary = FetchSummary {
            total,
            ..FetchSummary::default()
        };
        info!(
            session = session.name(),
            instruments = total,
            start = %self.pipeline.window().start,
            end = %self.pipeline.window().end,
            "starting fetch"
        );

        for (i, instrument) in instruments.iter().enumerate() {
            progress.on_start(instrument, i, total);
            let result = self.pipeline.fetch(session, instrument);
            progress.on_complete(instrument, i, total, &result);

            let paced = match &result {
                Ok(outcome) => outcome.made_remote_calls(),
                Err(_) => true,
            };
            summary.record(instrument, &result);

            if paced && !self.request_gap.is_zero() {
                self.pacer.pause(self.request_gap);
            }
        }

        session.close();
        summary.elapsed = started.elapsed();
        progress.on_batch_complete(&summary);
        Ok(summary)
    }
}
