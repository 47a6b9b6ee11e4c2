//! Universe resolution.
//!
//! The instrument universe is the provider's constituent set for a pool code
//! as of a date. Resolution is a single, non-retried query: a universe that
//! cannot be resolved aborts the run. An explicit instrument list bypasses
//! the remote query entirely.

use super::provider::{DataError, QuoteSession, ResponseStatus};
use crate::domain::Instrument;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{info, warn};

/// Query the constituent set `selector` as of `as_of`.
///
/// Codes that are not valid instrument identifiers are skipped with a
/// warning; duplicates are dropped keeping first-seen order.
pub fn resolve_universe(
    session: &mut dyn QuoteSession,
    selector: &str,
    as_of: NaiveDate,
) -> Result<Vec<Instrument>, DataError> {
    let response = session
        .constituents(selector, as_of)
        .map_err(|e| DataError::Universe {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;

    match response.status() {
        ResponseStatus::Ok => {}
        ResponseStatus::NoData | ResponseStatus::Error(_) => {
            return Err(DataError::Universe {
                selector: selector.to_string(),
                reason: format!("provider returned code {}", response.error_code),
            });
        }
    }

    let instruments = dedupe_codes(response.data.iter().map(String::as_str));
    if instruments.is_empty() {
        return Err(DataError::Universe {
            selector: selector.to_string(),
            reason: "constituent set is empty".into(),
        });
    }

    info!(
        selector,
        as_of = %as_of,
        count = instruments.len(),
        "resolved universe"
    );
    Ok(instruments)
}

/// Parse a comma-separated instrument list such as `000001.SZ,600000.SH`.
pub fn parse_instrument_list(list: &str) -> Result<Vec<Instrument>, DataError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for raw in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let instrument = Instrument::new(raw)
            .map_err(|e| DataError::ValidationError(format!("instrument '{raw}': {e}")))?;
        if seen.insert(instrument.clone()) {
            out.push(instrument);
        }
    }
    if out.is_empty() {
        return Err(DataError::ValidationError(
            "instrument list is empty".into(),
        ));
    }
    Ok(out)
}

fn dedupe_codes<'a>(codes: impl Iterator<Item = &'a str>) -> Vec<Instrument> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for code in codes {
        match Instrument::new(code) {
            Ok(instrument) => {
                if seen.insert(instrument.clone()) {
                    out.push(instrument);
                }
            }
            Err(e) => warn!(code, error = %e, "skipping invalid constituent code"),
        }
    }
    out
}
