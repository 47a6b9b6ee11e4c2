//! Remote extraction, field mapping, alignment and snapshot persistence

pub mod align;
pub mod field_map;
pub mod http;
pub mod provider;
pub mod retry;
pub mod snapshot;
pub mod synthetic;
pub mod universe;

pub use align::{
    fundamental_window_start, AlignWarning, AlignmentReport, TemporalAligner,
    DEFAULT_LOOKBACK_DAYS, NEUTRAL_VALUE,
};
pub use field_map::{CanonicalField, FieldKind, FieldMap, FieldMapError};
pub use http::HttpQuoteSession;
pub use provider::{
    DataError, QueryOptions, QuoteSession, RemoteResponse, ResponseStatus, SeriesRequest,
    NO_DATA_CODE, STATUS_OK,
};
pub use retry::{Backoff, QueryOutcome, RemoteFailure, RetryPolicy, RetryingQuery};
pub use snapshot::{SnapshotInfo, SnapshotStore, DATE_COLUMN, INSTRUMENT_COLUMN};
pub use synthetic::SyntheticSession;
pub use universe::{parse_instrument_list, resolve_universe};
