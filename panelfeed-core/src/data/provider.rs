//! Quotation session trait and structured error types.
//!
//! The QuoteSession trait abstracts over the remote quotation service (HTTP
//! gateway, synthetic offline data) so the pipeline can be driven against a
//! fake session in tests. Every call takes `&mut self`: a session is a
//! single-writer resource and must only ever be used sequentially.

use crate::domain::{Instrument, RawTable, SeriesError};
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// Status code for a successful remote call.
pub const STATUS_OK: i64 = 0;

/// Provider status code meaning "no data for this instrument and range".
pub const NO_DATA_CODE: i64 = -40520007;

/// Structured error types for remote and snapshot operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("remote error code {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("session is not started ({0})")]
    SessionNotStarted(String),

    #[error("session start failed: {0}")]
    SessionStart(String),

    #[error("universe resolution failed for selector '{selector}': {reason}")]
    Universe { selector: String, reason: String },

    #[error("invalid series for {instrument}: {source}")]
    Series {
        instrument: String,
        #[source]
        source: SeriesError,
    },

    #[error("snapshot error for '{instrument}': {reason}")]
    Snapshot { instrument: String, reason: String },

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// A remote response: provider status code plus payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse<T> {
    pub error_code: i64,
    pub data: T,
}

/// Classification of a provider status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    NoData,
    Error(i64),
}

impl<T> RemoteResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            error_code: STATUS_OK,
            data,
        }
    }

    pub fn status(&self) -> ResponseStatus {
        match self.error_code {
            STATUS_OK => ResponseStatus::Ok,
            NO_DATA_CODE => ResponseStatus::NoData,
            code => ResponseStatus::Error(code),
        }
    }
}

impl RemoteResponse<RawTable> {
    pub fn no_data() -> Self {
        Self {
            error_code: NO_DATA_CODE,
            data: RawTable::empty(),
        }
    }

    pub fn error(code: i64) -> Self {
        Self {
            error_code: code,
            data: RawTable::empty(),
        }
    }
}

/// Provider-specific query options, rendered as `key=value;key=value`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryOptions {
    pairs: Vec<(String, String)>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an option.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.pairs.push((key, value)),
        }
        self
    }

    /// Unadjusted daily prices.
    pub fn market_unadjusted() -> Self {
        Self::new().with("priceAdj", "U")
    }

    /// Quarterly reports in base units and reporting currency.
    pub fn quarterly_fundamentals() -> Self {
        Self::new()
            .with("period", "Q")
            .with("unit", "1")
            .with("currencyType", "")
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_quarterly(&self) -> bool {
        self.get("period").is_some_and(|p| p.eq_ignore_ascii_case("Q"))
    }
}

impl fmt::Display for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
        f.write_str(&rendered.join(";"))
    }
}

/// One time-series request for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRequest {
    pub instrument: Instrument,
    pub fields: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub options: QueryOptions,
}

impl SeriesRequest {
    /// Provider field identifiers joined with commas.
    pub fn joined_fields(&self) -> String {
        self.fields.join(",")
    }
}

/// Trait for remote quotation sessions.
///
/// Lifecycle is explicit: `start()` before use, `close()` when done.
pub trait QuoteSession: Send {
    /// Human-readable name of this session implementation.
    fn name(&self) -> &str;

    /// Open the session. Calling it on an open session is a no-op.
    fn start(&mut self) -> Result<(), DataError>;

    fn is_connected(&self) -> bool;

    fn close(&mut self);

    /// Fetch a date-indexed table for one instrument.
    ///
    /// A non-zero `error_code` is reported in the response, not as `Err`;
    /// `Err` is reserved for transport and decoding failures.
    fn series(&mut self, request: &SeriesRequest) -> Result<RemoteResponse<RawTable>, DataError>;

    /// Members of a constituent set (sector / index) as of `date`.
    fn constituents(
        &mut self,
        sector_id: &str,
        date: NaiveDate,
    ) -> Result<RemoteResponse<Vec<String>>, DataError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(RemoteResponse::ok(()).status(), ResponseStatus::Ok);
        assert_eq!(RemoteResponse::no_data().status(), ResponseStatus::NoData);
        assert_eq!(
            RemoteResponse::error(-40521009).status(),
            ResponseStatus::Error(-40521009)
        );
    }

    #[test]
    fn options_render_in_insertion_order() {
        assert_eq!(
            QueryOptions::quarterly_fundamentals().to_string(),
            "period=Q;unit=1;currencyType="
        );
        assert_eq!(QueryOptions::market_unadjusted().to_string(), "priceAdj=U");
    }

    #[test]
    fn option_lookup_ignores_key_case() {
        let opts = QueryOptions::quarterly_fundamentals();
        assert!(opts.is_quarterly());
        assert_eq!(opts.get("UNIT"), Some("1"));
        assert!(!QueryOptions::market_unadjusted().is_quarterly());
    }

    #[test]
    fn with_replaces_existing_key() {
        let opts = QueryOptions::market_unadjusted().with("priceAdj", "F");
        assert_eq!(opts.to_string(), "priceAdj=F");
    }
}
