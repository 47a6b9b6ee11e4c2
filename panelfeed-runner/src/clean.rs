//! Snapshot cleaning and CSV export for the binary dump.
//!
//! Turns one Parquet snapshot into a date-sorted, gap-free, all-float frame
//! and writes it as `{out_dir}/{instrument}.csv` with the header
//! `date,<value columns>,instrument`. The instrument is the snapshot's file
//! stem; an `instrument` column that disagrees with it rejects the file. The
//! same snapshot always produces the same bytes.

use chrono::NaiveDate;
use panelfeed_core::data::provider::DataError;
use panelfeed_core::data::snapshot::{
    instrument_from_path, read_parquet, DATE_COLUMN, INSTRUMENT_COLUMN,
};
use panelfeed_core::data::field_map::CanonicalField;
use panelfeed_core::domain::{Instrument, PanelColumn};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Why a snapshot could not be cleaned.
#[derive(Debug, Error)]
pub enum CleanCause {
    #[error("{0}")]
    Read(#[from] DataError),

    #[error("unparseable date '{value}' at row {row}")]
    UnparseableDate { row: usize, value: String },

    #[error("null date at row {row}")]
    NullDate { row: usize },

    #[error("column '{column}' row {row}: cannot parse '{value}' as a number")]
    UnparseableValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("column '{column}' has unsupported type {dtype}")]
    UnsupportedType { column: String, dtype: String },

    #[error("column '{column}': {reason}")]
    Column { column: String, reason: String },

    #[error("snapshot file name '{stem}' is not a valid instrument code")]
    InvalidInstrument { stem: String },

    #[error("instrument column holds '{found}' at row {row}, file name says '{expected}'")]
    InstrumentMismatch {
        expected: String,
        found: String,
        row: usize,
    },

    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A cleaning failure, tagged with the snapshot it came from.
#[derive(Debug, Error)]
#[error("failed to clean {}: {cause}", file.display())]
pub struct CleanError {
    pub file: PathBuf,
    #[source]
    pub cause: CleanCause,
}

/// A fully cleaned snapshot, ready for export.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedFrame {
    /// Taken from the snapshot file name; also names the export.
    pub instrument: String,
    /// `None` when the snapshot carried no date column; rows keep file order.
    pub dates: Option<Vec<NaiveDate>>,
    pub columns: Vec<PanelColumn>,
    /// Non-numeric extra columns left out of the export.
    pub dropped: Vec<String>,
}

impl CleanedFrame {
    pub fn len(&self) -> usize {
        self.columns
            .first()
            .map(|c| c.values.len())
            .or_else(|| self.dates.as_ref().map(Vec::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encode as CSV: `date` (if present), value columns, `instrument`.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header: Vec<&str> = Vec::with_capacity(self.columns.len() + 2);
        if self.dates.is_some() {
            header.push(DATE_COLUMN);
        }
        header.extend(self.columns.iter().map(|c| c.name.as_str()));
        header.push(INSTRUMENT_COLUMN);
        writer.write_record(&header)?;

        let mut record: Vec<String> = Vec::with_capacity(header.len());
        for row in 0..self.len() {
            record.clear();
            if let Some(dates) = &self.dates {
                record.push(dates[row].format("%Y-%m-%d").to_string());
            }
            for column in &self.columns {
                record.push(column.values[row].to_string());
            }
            record.push(self.instrument.clone());
            writer.write_record(&record)?;
        }

        writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }
}

/// One successful export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRecord {
    pub instrument: String,
    pub path: PathBuf,
    pub rows: usize,
    /// BLAKE3 hex digest of the exported bytes.
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CleanOutcome {
    Exported(ExportRecord),
    /// The snapshot had zero rows; nothing was written.
    Empty,
}

/// Cleans snapshots into CSV files under `out_dir`.
#[derive(Debug, Clone)]
pub struct SnapshotCleaner {
    out_dir: PathBuf,
}

impl SnapshotCleaner {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Load, clean and export one snapshot.
    pub fn clean(&self, path: &Path) -> Result<CleanOutcome, CleanError> {
        let tag = |cause: CleanCause| CleanError {
            file: path.to_path_buf(),
            cause,
        };

        let frame = match load_cleaned(path).map_err(tag)? {
            Some(frame) => frame,
            None => return Ok(CleanOutcome::Empty),
        };

        if !frame.dropped.is_empty() {
            warn!(
                file = %path.display(),
                columns = ?frame.dropped,
                "non-numeric columns left out of export"
            );
        }

        let bytes = frame.to_csv_bytes().map_err(|e| tag(e.into()))?;
        let out_path = self.out_dir.join(format!("{}.csv", frame.instrument));
        fs::write(&out_path, &bytes).map_err(|e| tag(e.into()))?;

        Ok(CleanOutcome::Exported(ExportRecord {
            instrument: frame.instrument.clone(),
            path: out_path,
            rows: frame.len(),
            digest: blake3::hash(&bytes).to_hex().to_string(),
        }))
    }
}

/// Read a snapshot and clean it. `None` for a zero-row snapshot.
pub fn load_cleaned(path: &Path) -> Result<Option<CleanedFrame>, CleanCause> {
    let df = read_parquet(path)?;
    if df.height() == 0 {
        return Ok(None);
    }
    clean_frame(&df, path).map(Some)
}

fn clean_frame(df: &DataFrame, path: &Path) -> Result<CleanedFrame, CleanCause> {
    let n = df.height();

    let instrument = instrument_for(path)?;
    if let Ok(column) = df.column(INSTRUMENT_COLUMN) {
        check_instrument_column(column, instrument.code())?;
    }

    let dates = match df.column(DATE_COLUMN) {
        Ok(column) => Some(parse_dates(column)?),
        Err(_) => None,
    };

    let mut columns = Vec::new();
    let mut dropped = Vec::new();
    for column in df.get_columns() {
        let name = column.name().as_str();
        if name == DATE_COLUMN || name == INSTRUMENT_COLUMN {
            continue;
        }
        match coerce_f64(column)? {
            Some(values) => columns.push((name.to_string(), values)),
            None => dropped.push(name.to_string()),
        }
    }

    // Stable sort by date; ties keep file order.
    let order: Vec<usize> = match &dates {
        Some(d) => {
            let mut idx: Vec<usize> = (0..n).collect();
            idx.sort_by_key(|&i| d[i]);
            idx
        }
        None => (0..n).collect(),
    };

    let columns = columns
        .into_iter()
        .map(|(name, values)| PanelColumn {
            name,
            values: fill_forward_then_zero(order.iter().map(|&i| values[i])),
        })
        .collect();

    Ok(CleanedFrame {
        instrument: instrument.to_string(),
        dates: dates.map(|d| order.iter().map(|&i| d[i]).collect()),
        columns,
        dropped,
    })
}

fn fill_forward_then_zero(values: impl Iterator<Item = Option<f64>>) -> Vec<f64> {
    let mut last: Option<f64> = None;
    values
        .map(|v| {
            if let Some(x) = v.filter(|x| !x.is_nan()) {
                last = Some(x);
            }
            last.unwrap_or(0.0)
        })
        .collect()
}

fn column_err(column: &Column, e: PolarsError) -> CleanCause {
    CleanCause::Column {
        column: column.name().to_string(),
        reason: e.to_string(),
    }
}

/// The file stem, which must be a valid instrument code as written.
fn instrument_for(path: &Path) -> Result<Instrument, CleanCause> {
    let stem = instrument_from_path(path).unwrap_or_default();
    match Instrument::new(stem.as_str()) {
        Ok(instrument) if instrument.code() == stem => Ok(instrument),
        _ => Err(CleanCause::InvalidInstrument { stem }),
    }
}

/// Every non-null cell of the instrument column must match the file name.
fn check_instrument_column(column: &Column, expected: &str) -> Result<(), CleanCause> {
    let as_text = column
        .cast(&DataType::String)
        .map_err(|e| column_err(column, e))?;
    let ca = as_text.str().map_err(|e| column_err(column, e))?;
    let mismatch = ca
        .into_iter()
        .enumerate()
        .find_map(|(row, v)| match v {
            Some(found) if found.trim() != expected => Some((row, found.to_string())),
            _ => None,
        });
    match mismatch {
        Some((row, found)) => Err(CleanCause::InstrumentMismatch {
            expected: expected.to_string(),
            found,
            row,
        }),
        None => Ok(()),
    }
}

fn parse_dates(column: &Column) -> Result<Vec<NaiveDate>, CleanCause> {
    match column.dtype() {
        DataType::String => {
            let ca = column.str().map_err(|e| column_err(column, e))?;
            ca.into_iter()
                .enumerate()
                .map(|(row, v)| match v {
                    Some(text) => parse_date_text(text).ok_or_else(|| CleanCause::UnparseableDate {
                        row,
                        value: text.to_string(),
                    }),
                    None => Err(CleanCause::NullDate { row }),
                })
                .collect()
        }
        DataType::Date | DataType::Datetime(_, _) => {
            let as_date = column
                .cast(&DataType::Date)
                .map_err(|e| column_err(column, e))?;
            let ca = as_date.date().map_err(|e| column_err(column, e))?;
            (0..ca.len())
                .map(|row| {
                    ca.get(row)
                        .map(days_to_date)
                        .ok_or(CleanCause::NullDate { row })
                })
                .collect()
        }
        other => Err(CleanCause::UnsupportedType {
            column: column.name().to_string(),
            dtype: other.to_string(),
        }),
    }
}

/// `YYYY-MM-DD`, optionally followed by a time component.
fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    let day = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn days_to_date(days: i32) -> NaiveDate {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    epoch + chrono::Duration::days(i64::from(days))
}

/// Numeric and boolean columns are cast to float. Text is parsed, blank
/// being null. Volume-like columns must parse; any other column that is not
/// numeric comes back as `None` and is left out of the export.
fn coerce_f64(column: &Column) -> Result<Option<Vec<Option<f64>>>, CleanCause> {
    let required = CanonicalField::from_name(column.name().as_str())
        .is_some_and(|field| field.is_volume_like());
    let dtype = column.dtype();

    if dtype.is_primitive_numeric() || matches!(dtype, DataType::Boolean) {
        let as_float = column
            .cast(&DataType::Float64)
            .map_err(|e| column_err(column, e))?;
        let ca = as_float.f64().map_err(|e| column_err(column, e))?;
        let values: Vec<Option<f64>> = ca.into_iter().collect();
        return Ok(Some(values));
    }

    match dtype {
        DataType::Null => Ok(Some(vec![None; column.len()])),
        DataType::String => {
            let ca = column.str().map_err(|e| column_err(column, e))?;
            let parsed: Result<Vec<Option<f64>>, CleanCause> = ca
                .into_iter()
                .enumerate()
                .map(|(row, v)| match v.map(str::trim) {
                    None | Some("") => Ok(None),
                    Some(text) => text.parse::<f64>().map(Some).map_err(|_| {
                        CleanCause::UnparseableValue {
                            column: column.name().to_string(),
                            row,
                            value: text.to_string(),
                        }
                    }),
                })
                .collect();
            match parsed {
                Ok(values) => Ok(Some(values)),
                Err(e) if required => Err(e),
                Err(_) => Ok(None),
            }
        }
        other if required => Err(CleanCause::UnsupportedType {
            column: column.name().to_string(),
            dtype: other.to_string(),
        }),
        _ => Ok(None),
    }
}
