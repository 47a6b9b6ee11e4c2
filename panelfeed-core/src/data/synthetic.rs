//! Synthetic quotation session for offline development.
//!
//! Produces a deterministic random walk per instrument and field (seeded from
//! a BLAKE3 hash of the pair) on weekday trading days, and quarter-end
//! reports for quarterly requests. Results are obviously fake and must never
//! be mixed with real snapshots.

use super::provider::{DataError, QuoteSession, RemoteResponse, SeriesRequest, NO_DATA_CODE};
use crate::domain::{RawColumn, RawTable};
use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct SyntheticSession {
    universe: Vec<String>,
    connected: bool,
}

impl SyntheticSession {
    pub fn new(universe: Vec<String>) -> Self {
        Self {
            universe,
            connected: false,
        }
    }

    /// A small fixed universe of exchange-qualified codes.
    pub fn default_universe() -> Self {
        Self::new(
            ["000001.SZ", "000002.SZ", "600000.SH", "600036.SH", "600519.SH"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }
}

impl QuoteSession for SyntheticSession {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn start(&mut self) -> Result<(), DataError> {
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        self.connected = false;
    }

    fn series(&mut self, request: &SeriesRequest) -> Result<RemoteResponse<RawTable>, DataError> {
        if !self.connected {
            return Err(DataError::SessionNotStarted(self.name().to_string()));
        }

        let dates = if request.options.is_quarterly() {
            quarter_ends(request.start, request.end)
        } else {
            weekdays(request.start, request.end)
        };
        if dates.is_empty() {
            return Ok(RemoteResponse {
                error_code: NO_DATA_CODE,
                data: RawTable::empty(),
            });
        }

        let columns = request
            .fields
            .iter()
            .map(|field| {
                let values = random_walk(request.instrument.code(), field, dates.len());
                RawColumn::new(field.clone(), values.into_iter().map(Some).collect())
            })
            .collect();

        let table = RawTable::new(dates, columns).map_err(|e| DataError::Series {
            instrument: request.instrument.to_string(),
            source: e,
        })?;
        Ok(RemoteResponse::ok(table))
    }

    fn constituents(
        &mut self,
        _sector_id: &str,
        _date: NaiveDate,
    ) -> Result<RemoteResponse<Vec<String>>, DataError> {
        if !self.connected {
            return Err(DataError::SessionNotStarted(self.name().to_string()));
        }
        Ok(RemoteResponse::ok(self.universe.clone()))
    }
}

fn weekdays(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

fn quarter_ends(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    for year in start.year()..=end.year() {
        for (month, day) in [(3, 31), (6, 30), (9, 30), (12, 31)] {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                if date >= start && date <= end {
                    out.push(date);
                }
            }
        }
    }
    out
}

fn random_walk(code: &str, field: &str, n: usize) -> Vec<f64> {
    let seed = blake3::hash(format!("{code}|{field}").as_bytes());
    let mut rng = StdRng::from_seed(*seed.as_bytes());

    let mut level: f64 = rng.gen_range(10.0..200.0);
    (0..n)
        .map(|_| {
            let step: f64 = rng.gen_range(-0.03..0.03);
            level *= 1.0 + step;
            (level * 100.0).round() / 100.0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::{QueryOptions, ResponseStatus};
    use crate::domain::Instrument;

    fn request(options: QueryOptions, start: &str, end: &str) -> SeriesRequest {
        SeriesRequest {
            instrument: Instrument::new("000001.SZ").unwrap(),
            fields: vec!["CLOSE".into(), "VOLUME".into()],
            start: NaiveDate::parse_from_str(start, "%Y-%m-%d").unwrap(),
            end: NaiveDate::parse_from_str(end, "%Y-%m-%d").unwrap(),
            options,
        }
    }

    #[test]
    fn requires_started_session() {
        let mut session = SyntheticSession::default_universe();
        let req = request(QueryOptions::market_unadjusted(), "2023-01-02", "2023-01-06");
        assert!(session.series(&req).is_err());
    }

    #[test]
    fn daily_series_skips_weekends() {
        let mut session = SyntheticSession::default_universe();
        session.start().unwrap();
        let req = request(QueryOptions::market_unadjusted(), "2023-01-02", "2023-01-15");
        let table = session.series(&req).unwrap().data;

        assert_eq!(table.len(), 10);
        assert!(table
            .dates()
            .iter()
            .all(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)));
    }

    #[test]
    fn quarterly_series_uses_quarter_ends() {
        let mut session = SyntheticSession::default_universe();
        session.start().unwrap();
        let req = request(QueryOptions::quarterly_fundamentals(), "2022-07-05", "2023-06-30");
        let table = session.series(&req).unwrap().data;

        assert_eq!(table.len(), 4);
        assert_eq!(table.dates()[0], NaiveDate::from_ymd_opt(2022, 9, 30).unwrap());
    }

    #[test]
    fn output_is_deterministic() {
        let mut a = SyntheticSession::default_universe();
        let mut b = SyntheticSession::default_universe();
        a.start().unwrap();
        b.start().unwrap();
        let req = request(QueryOptions::market_unadjusted(), "2023-01-02", "2023-03-31");
        assert_eq!(a.series(&req).unwrap(), b.series(&req).unwrap());
    }

    #[test]
    fn empty_range_reports_no_data() {
        let mut session = SyntheticSession::default_universe();
        session.start().unwrap();
        let req = request(QueryOptions::quarterly_fundamentals(), "2023-01-01", "2023-02-01");
        assert_eq!(session.series(&req).unwrap().status(), ResponseStatus::NoData);
    }
}
