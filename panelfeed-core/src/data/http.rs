//! HTTP quotation gateway session.
//!
//! Talks to a JSON gateway sitting in front of the quotation terminal:
//! - `GET {base}/session/start` → `{ "error_code": 0 }`
//! - `GET {base}/wsd?codes&fields&begin&end&options` → column-major series
//! - `GET {base}/wset?name=sectorconstituent&date&sectorid` → member codes
//!
//! The gateway reports provider status codes in `error_code`; HTTP-level
//! failures and undecodable payloads become `DataError`s, which the retry
//! layer treats as transient.

use super::provider::{DataError, QuoteSession, RemoteResponse, SeriesRequest, STATUS_OK};
use crate::domain::{RawColumn, RawTable};
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Series payload: `data[i]` holds the values of `fields[i]`, one per entry
/// in `times`.
#[derive(Debug, Deserialize)]
pub(crate) struct SeriesPayload {
    error_code: i64,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    times: Vec<String>,
    #[serde(default)]
    data: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct ConstituentPayload {
    error_code: i64,
    #[serde(default)]
    codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    error_code: i64,
    #[serde(default)]
    message: Option<String>,
}

pub struct HttpQuoteSession {
    client: reqwest::blocking::Client,
    base_url: String,
    connected: bool,
}

impl HttpQuoteSession {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::SessionStart(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            connected: false,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, DataError> {
        let resp = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DataError::Remote {
                code: i64::from(status.as_u16()),
                message: format!("HTTP {status} from {path}"),
            });
        }

        resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse {path} response: {e}"))
        })
    }

    fn ensure_connected(&self) -> Result<(), DataError> {
        if self.connected {
            Ok(())
        } else {
            Err(DataError::SessionNotStarted(self.base_url.clone()))
        }
    }
}

impl QuoteSession for HttpQuoteSession {
    fn name(&self) -> &str {
        "http_gateway"
    }

    fn start(&mut self) -> Result<(), DataError> {
        if self.connected {
            return Ok(());
        }
        let status: StatusPayload = self
            .get_json("session/start", &[])
            .map_err(|e| DataError::SessionStart(e.to_string()))?;
        if status.error_code != STATUS_OK {
            return Err(DataError::SessionStart(format!(
                "gateway returned code {}: {}",
                status.error_code,
                status.message.unwrap_or_default()
            )));
        }
        self.connected = true;
        info!(gateway = %self.base_url, "quotation session started");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        if self.connected {
            let _ = self.get_json::<StatusPayload>("session/stop", &[]);
            self.connected = false;
            debug!(gateway = %self.base_url, "quotation session closed");
        }
    }

    fn series(&mut self, request: &SeriesRequest) -> Result<RemoteResponse<RawTable>, DataError> {
        self.ensure_connected()?;
        let payload: SeriesPayload = self.get_json(
            "wsd",
            &[
                ("codes", request.instrument.to_string()),
                ("fields", request.joined_fields()),
                ("begin", request.start.format("%Y-%m-%d").to_string()),
                ("end", request.end.format("%Y-%m-%d").to_string()),
                ("options", request.options.to_string()),
            ],
        )?;
        parse_series_payload(payload)
    }

    fn constituents(
        &mut self,
        sector_id: &str,
        date: NaiveDate,
    ) -> Result<RemoteResponse<Vec<String>>, DataError> {
        self.ensure_connected()?;
        let payload: ConstituentPayload = self.get_json(
            "wset",
            &[
                ("name", "sectorconstituent".to_string()),
                ("date", date.format("%Y-%m-%d").to_string()),
                ("sectorid", sector_id.to_string()),
            ],
        )?;
        Ok(RemoteResponse {
            error_code: payload.error_code,
            data: payload.codes,
        })
    }
}

/// Decode a column-major series payload. Non-zero codes carry no table.
pub(crate) fn parse_series_payload(
    payload: SeriesPayload,
) -> Result<RemoteResponse<RawTable>, DataError> {
    if payload.error_code != STATUS_OK {
        return Ok(RemoteResponse::error(payload.error_code));
    }

    if payload.fields.len() != payload.data.len() {
        return Err(DataError::ResponseFormatChanged(format!(
            "{} fields but {} data columns",
            payload.fields.len(),
            payload.data.len()
        )));
    }

    let dates = payload
        .times
        .iter()
        .map(|t| parse_time(t))
        .collect::<Result<Vec<_>, _>>()?;

    let columns = payload
        .fields
        .into_iter()
        .zip(payload.data)
        .map(|(name, values)| RawColumn::new(name, values))
        .collect();

    let table = RawTable::new(dates, columns)
        .map_err(|e| DataError::ResponseFormatChanged(format!("malformed series: {e}")))?;
    Ok(RemoteResponse::ok(table))
}

/// Accepts `YYYY-MM-DD` optionally followed by a time component.
fn parse_time(raw: &str) -> Result<NaiveDate, DataError> {
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| DataError::ResponseFormatChanged(format!("invalid time '{raw}': {e}")))
}
