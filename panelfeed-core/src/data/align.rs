//! Point-in-time alignment of daily market data and quarterly fundamentals.
//!
//! Fundamentals are joined "as of" each trading day: the value visible on
//! day `d` is the one from the latest report dated on or before `d`. Reports
//! dated on non-trading days (or before the first daily row) become visible
//! from the next trading day, which is what a left join onto the union index
//! followed by a forward fill produces. Nothing from a later report can leak
//! into an earlier row.

use crate::domain::{AlignedPanel, DailySeries, PanelColumn, QuarterlySeries};
use chrono::{Duration, NaiveDate};
use std::collections::HashSet;

use super::field_map::FieldMap;

/// Value used for any cell that no observation can fill.
pub const NEUTRAL_VALUE: f64 = 0.0;

/// Default widening of the fundamental window before the daily start.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 180;

/// Start of the fundamental fetch window for a daily range starting at `start`.
pub fn fundamental_window_start(start: NaiveDate, lookback_days: u32) -> NaiveDate {
    start - Duration::days(i64::from(lookback_days))
}

/// Non-fatal conditions raised while aligning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignWarning {
    /// No quarterly series at all; fundamentals were set to the neutral value.
    FundamentalsUnavailable,
    /// A quarterly column shares its name with a market column and was left
    /// out; the market column is kept.
    ShadowedColumn(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentReport {
    pub panel: AlignedPanel,
    pub warnings: Vec<AlignWarning>,
}

/// Merges one daily and one (optional) quarterly series into a daily panel.
#[derive(Debug, Clone)]
pub struct TemporalAligner {
    fundamental_columns: Vec<String>,
}

impl TemporalAligner {
    /// `fundamental_columns` are always present in the output, even when the
    /// provider omitted them.
    pub fn new(fundamental_columns: Vec<String>) -> Self {
        Self {
            fundamental_columns,
        }
    }

    pub fn from_field_map(fundamentals: &FieldMap) -> Self {
        Self::new(fundamentals.canonical_names())
    }

    pub fn align(
        &self,
        daily: &DailySeries,
        quarterly: Option<&QuarterlySeries>,
    ) -> AlignmentReport {
        let dates = daily.dates().to_vec();
        let mut warnings = Vec::new();
        let mut columns: Vec<PanelColumn> = daily
            .table()
            .columns()
            .iter()
            .map(|c| PanelColumn {
                name: c.name.clone(),
                values: c
                    .values
                    .iter()
                    .map(|v| present(*v).unwrap_or(NEUTRAL_VALUE))
                    .collect(),
            })
            .collect();

        let market: HashSet<String> = columns.iter().map(|c| c.name.clone()).collect();
        let mut taken: HashSet<String> = HashSet::new();
        let mut fundamental_names: Vec<String> = Vec::new();
        let extra = quarterly
            .map(|q| q.table().column_names())
            .unwrap_or_default();
        for name in self
            .fundamental_columns
            .iter()
            .map(String::as_str)
            .chain(extra)
        {
            if !taken.insert(name.to_string()) {
                continue;
            }
            if market.contains(name) {
                warnings.push(AlignWarning::ShadowedColumn(name.to_string()));
            } else {
                fundamental_names.push(name.to_string());
            }
        }

        match quarterly {
            None => {
                warnings.push(AlignWarning::FundamentalsUnavailable);
                for name in fundamental_names {
                    columns.push(PanelColumn {
                        name,
                        values: vec![NEUTRAL_VALUE; dates.len()],
                    });
                }
            }
            Some(q) => {
                for name in fundamental_names {
                    let values = match q.table().column(&name) {
                        Some(col) => as_of_fill(&dates, q.dates(), &col.values, NEUTRAL_VALUE),
                        None => vec![NEUTRAL_VALUE; dates.len()],
                    };
                    columns.push(PanelColumn { name, values });
                }
            }
        }

        // Daily dates are strictly increasing and every column has one value
        // per date, so construction cannot fail.
        let panel = AlignedPanel::new(dates, columns).unwrap_or_default();
        AlignmentReport { panel, warnings }
    }
}

/// For each daily date, the latest non-missing report value dated on or
/// before it; `neutral` before the first such report.
fn as_of_fill(
    daily: &[NaiveDate],
    report_dates: &[NaiveDate],
    report_values: &[Option<f64>],
    neutral: f64,
) -> Vec<f64> {
    let mut out = Vec::with_capacity(daily.len());
    let mut next = 0;
    let mut current: Option<f64> = None;

    for day in daily {
        while next < report_dates.len() && report_dates[next] <= *day {
            if let Some(v) = present(report_values[next]) {
                current = Some(v);
            }
            next += 1;
        }
        out.push(current.unwrap_or(neutral));
    }

    out
}

fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}
