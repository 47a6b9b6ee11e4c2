//! Per-instrument fetch: market series, fundamentals, alignment, snapshot.

use chrono::NaiveDate;
use panelfeed_core::data::align::{fundamental_window_start, AlignWarning, TemporalAligner};
use panelfeed_core::data::field_map::FieldMap;
use panelfeed_core::data::provider::{DataError, QueryOptions, QuoteSession, SeriesRequest};
use panelfeed_core::data::retry::{QueryOutcome, RetryingQuery};
use panelfeed_core::data::snapshot::SnapshotStore;
use panelfeed_core::domain::{DailySeries, Instrument, QuarterlySeries, RawTable};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Date window for one fetch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub lookback_days: u32,
}

impl FetchWindow {
    pub fn fundamental_start(&self) -> NaiveDate {
        fundamental_window_start(self.start, self.lookback_days)
    }
}

/// What happened to one instrument.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A snapshot already existed; no remote call was made.
    Skipped,
    Written {
        path: PathBuf,
        rows: usize,
        /// Fundamentals were unavailable and filled with the neutral value.
        degraded: bool,
    },
    /// The provider has no market data for the range.
    NoMarketData,
    /// Market data could not be fetched after all retries.
    MarketUnavailable { cause: String },
    /// The daily history came back with zero rows.
    EmptyHistory,
}

impl FetchOutcome {
    pub fn made_remote_calls(&self) -> bool {
        !matches!(self, FetchOutcome::Skipped)
    }
}

pub struct InstrumentFetchPipeline {
    query: RetryingQuery,
    market: FieldMap,
    fundamentals: FieldMap,
    aligner: TemporalAligner,
    store: SnapshotStore,
    window: FetchWindow,
}

impl InstrumentFetchPipeline {
    pub fn new(
        query: RetryingQuery,
        market: FieldMap,
        fundamentals: FieldMap,
        store: SnapshotStore,
        window: FetchWindow,
    ) -> Self {
        let aligner = TemporalAligner::from_field_map(&fundamentals);
        Self {
            query,
            market,
            fundamentals,
            aligner,
            store,
            window,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn window(&self) -> FetchWindow {
        self.window
    }

    /// Fetch, align and persist one instrument.
    ///
    /// Only a snapshot write failure (or a malformed provider table) is an
    /// `Err`; every remote outcome is a `FetchOutcome`.
    pub fn fetch(
        &self,
        session: &mut dyn QuoteSession,
        instrument: &Instrument,
    ) -> Result<FetchOutcome, DataError> {
        if self.store.exists(instrument) {
            debug!(instrument = %instrument, "snapshot exists, skipping");
            return Ok(FetchOutcome::Skipped);
        }

        let market_request = SeriesRequest {
            instrument: instrument.clone(),
            fields: self.market.provider_fields(),
            start: self.window.start,
            end: self.window.end,
            options: QueryOptions::market_unadjusted(),
        };
        let market_table = match self.query.fetch(session, &market_request) {
            QueryOutcome::Data(table) => table,
            QueryOutcome::NoData => {
                info!(instrument = %instrument, "no market data for range");
                return Ok(FetchOutcome::NoMarketData);
            }
            QueryOutcome::Unavailable {
                attempts,
                last_error,
            } => {
                warn!(
                    instrument = %instrument,
                    attempts,
                    cause = %last_error,
                    "market data unavailable"
                );
                return Ok(FetchOutcome::MarketUnavailable { cause: last_error });
            }
        };

        let daily = DailySeries::from_table(self.rename_market(instrument, market_table)?);
        if daily.is_empty() {
            warn!(instrument = %instrument, "empty daily history, nothing persisted");
            return Ok(FetchOutcome::EmptyHistory);
        }

        let quarterly = self.fetch_fundamentals(session, instrument);
        let report = self.aligner.align(&daily, quarterly.as_ref());
        let degraded = report
            .warnings
            .contains(&AlignWarning::FundamentalsUnavailable);
        for warning in &report.warnings {
            match warning {
                AlignWarning::FundamentalsUnavailable => warn!(
                    instrument = %instrument,
                    "fundamentals unavailable, filled with neutral value"
                ),
                AlignWarning::ShadowedColumn(column) => warn!(
                    instrument = %instrument,
                    column = %column,
                    "fundamental column shadowed by market column, dropped"
                ),
            }
        }

        if report.panel.is_empty() {
            warn!(instrument = %instrument, "aligned panel is empty, nothing persisted");
            return Ok(FetchOutcome::EmptyHistory);
        }

        let rows = report.panel.len();
        let path = self.store.write(instrument, &report.panel)?;
        info!(instrument = %instrument, rows, degraded, path = %path.display(), "snapshot written");

        Ok(FetchOutcome::Written {
            path,
            rows,
            degraded,
        })
    }

    /// `None` when the provider has nothing usable; the aligner then degrades.
    fn fetch_fundamentals(
        &self,
        session: &mut dyn QuoteSession,
        instrument: &Instrument,
    ) -> Option<QuarterlySeries> {
        let request = SeriesRequest {
            instrument: instrument.clone(),
            fields: self.fundamentals.provider_fields(),
            start: self.window.fundamental_start(),
            end: self.window.end,
            options: QueryOptions::quarterly_fundamentals(),
        };

        match self.query.fetch(session, &request) {
            QueryOutcome::Data(table) => match self.fundamentals.apply(table) {
                Ok(renamed) => Some(QuarterlySeries::from_table(renamed)),
                Err(e) => {
                    warn!(instrument = %instrument, error = %e, "unusable fundamental table");
                    None
                }
            },
            QueryOutcome::NoData => {
                warn!(instrument = %instrument, "no fundamental data in window");
                None
            }
            QueryOutcome::Unavailable { last_error, .. } => {
                warn!(instrument = %instrument, cause = %last_error, "fundamentals unavailable");
                None
            }
        }
    }

    fn rename_market(&self, instrument: &Instrument, table: RawTable) -> Result<RawTable, DataError> {
        self.market.apply(table).map_err(|e| DataError::Series {
            instrument: instrument.to_string(),
            source: e,
        })
    }
}
