//! Date-indexed tables: raw remote results, daily and quarterly series, and
//! the aligned daily panel.
//!
//! Raw tables carry `Option<f64>` cells because the provider may leave gaps.
//! The aligned panel carries plain `f64`: every gap has been resolved by the
//! time it exists.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("column '{column}' has {actual} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("date index is not strictly increasing at row {row} ({date})")]
    NotIncreasing { row: usize, date: NaiveDate },
}

/// One named column of optional values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// A table as returned by the remote session: one date per row, any number of
/// value columns, no ordering guarantee.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawTable {
    dates: Vec<NaiveDate>,
    columns: Vec<RawColumn>,
}

impl RawTable {
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<RawColumn>) -> Result<Self, SeriesError> {
        let mut seen = HashSet::new();
        for column in &columns {
            if column.values.len() != dates.len() {
                return Err(SeriesError::LengthMismatch {
                    column: column.name.clone(),
                    expected: dates.len(),
                    actual: column.values.len(),
                });
            }
            if !seen.insert(column.name.as_str()) {
                return Err(SeriesError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(Self { dates, columns })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[RawColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&RawColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Rename every column through `rename`. Fails if two columns end up with
    /// the same name.
    pub fn rename_columns<F>(self, mut rename: F) -> Result<Self, SeriesError>
    where
        F: FnMut(&str) -> String,
    {
        let columns = self
            .columns
            .into_iter()
            .map(|c| RawColumn {
                name: rename(&c.name),
                values: c.values,
            })
            .collect();
        Self::new(self.dates, columns)
    }

    /// Sort rows by date (stable) and collapse duplicate dates, keeping the
    /// last row seen for each date.
    pub fn normalized(self) -> Self {
        let mut order: Vec<usize> = (0..self.dates.len()).collect();
        order.sort_by_key(|&i| self.dates[i]);

        let mut keep: Vec<usize> = Vec::with_capacity(order.len());
        for (pos, &idx) in order.iter().enumerate() {
            let next_same = order
                .get(pos + 1)
                .is_some_and(|&next| self.dates[next] == self.dates[idx]);
            if !next_same {
                keep.push(idx);
            }
        }

        let dates = keep.iter().map(|&i| self.dates[i]).collect();
        let columns = self
            .columns
            .into_iter()
            .map(|c| RawColumn {
                values: keep.iter().map(|&i| c.values[i]).collect(),
                name: c.name,
            })
            .collect();

        Self { dates, columns }
    }

    fn check_strictly_increasing(&self) -> Result<(), SeriesError> {
        for (row, pair) in self.dates.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(SeriesError::NotIncreasing {
                    row: row + 1,
                    date: pair[1],
                });
            }
        }
        Ok(())
    }
}

/// Daily market series: one row per trading day, strictly increasing dates.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries(RawTable);

impl DailySeries {
    /// Wrap a table that is already strictly increasing.
    pub fn try_new(table: RawTable) -> Result<Self, SeriesError> {
        table.check_strictly_increasing()?;
        Ok(Self(table))
    }

    /// Sort and de-duplicate a raw remote table into a daily series.
    pub fn from_table(table: RawTable) -> Self {
        Self(table.normalized())
    }

    pub fn table(&self) -> &RawTable {
        &self.0
    }

    pub fn dates(&self) -> &[NaiveDate] {
        self.0.dates()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Quarterly fundamental series keyed by report date.
#[derive(Debug, Clone, PartialEq)]
pub struct QuarterlySeries(RawTable);

impl QuarterlySeries {
    pub fn try_new(table: RawTable) -> Result<Self, SeriesError> {
        table.check_strictly_increasing()?;
        Ok(Self(table))
    }

    /// Duplicate report dates keep the last report.
    pub fn from_table(table: RawTable) -> Self {
        Self(table.normalized())
    }

    pub fn table(&self) -> &RawTable {
        &self.0
    }

    pub fn dates(&self) -> &[NaiveDate] {
        self.0.dates()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One fully-populated column of the aligned panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// Per-instrument daily panel with market and fundamental columns and no
/// missing cells.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlignedPanel {
    dates: Vec<NaiveDate>,
    columns: Vec<PanelColumn>,
}

impl AlignedPanel {
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<PanelColumn>) -> Result<Self, SeriesError> {
        let mut seen = HashSet::new();
        for column in &columns {
            if column.values.len() != dates.len() {
                return Err(SeriesError::LengthMismatch {
                    column: column.name.clone(),
                    expected: dates.len(),
                    actual: column.values.len(),
                });
            }
            if !seen.insert(column.name.as_str()) {
                return Err(SeriesError::DuplicateColumn(column.name.clone()));
            }
        }
        let panel = Self { dates, columns };
        for (row, pair) in panel.dates.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(SeriesError::NotIncreasing {
                    row: row + 1,
                    date: pair[1],
                });
            }
        }
        Ok(panel)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[PanelColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}
