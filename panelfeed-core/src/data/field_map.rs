//! Provider field identifiers → canonical column names.
//!
//! Canonical targets are a closed enumeration: a configuration naming an
//! unknown target fails to deserialize, and duplicate or mis-kinded targets
//! are rejected when the map is built. Lookups are case-insensitive on the
//! provider side; canonical names are always lowercase.

use crate::domain::{RawTable, SeriesError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Which of the two series a canonical field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Market,
    Fundamental,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Market => f.write_str("market"),
            FieldKind::Fundamental => f.write_str("fundamental"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Open,
    High,
    Low,
    Close,
    Volume,
    Amount,
    AdjFactor,
    Vwap,
    Turnover,
    MktCap,
    Earnings,
    Revenue,
    TotalAssets,
    OpCashFlow,
    TotalEquity,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 15] = [
        CanonicalField::Open,
        CanonicalField::High,
        CanonicalField::Low,
        CanonicalField::Close,
        CanonicalField::Volume,
        CanonicalField::Amount,
        CanonicalField::AdjFactor,
        CanonicalField::Vwap,
        CanonicalField::Turnover,
        CanonicalField::MktCap,
        CanonicalField::Earnings,
        CanonicalField::Revenue,
        CanonicalField::TotalAssets,
        CanonicalField::OpCashFlow,
        CanonicalField::TotalEquity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CanonicalField::Open => "open",
            CanonicalField::High => "high",
            CanonicalField::Low => "low",
            CanonicalField::Close => "close",
            CanonicalField::Volume => "volume",
            CanonicalField::Amount => "amount",
            CanonicalField::AdjFactor => "adj_factor",
            CanonicalField::Vwap => "vwap",
            CanonicalField::Turnover => "turnover",
            CanonicalField::MktCap => "mkt_cap",
            CanonicalField::Earnings => "earnings",
            CanonicalField::Revenue => "revenue",
            CanonicalField::TotalAssets => "total_assets",
            CanonicalField::OpCashFlow => "op_cash_flow",
            CanonicalField::TotalEquity => "total_equity",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            CanonicalField::Earnings
            | CanonicalField::Revenue
            | CanonicalField::TotalAssets
            | CanonicalField::OpCashFlow
            | CanonicalField::TotalEquity => FieldKind::Fundamental,
            _ => FieldKind::Market,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Volume-like columns arrive as integers or text from some providers.
    pub fn is_volume_like(&self) -> bool {
        matches!(self, CanonicalField::Volume | CanonicalField::Amount)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldMapError {
    #[error("{kind} field map is empty")]
    Empty { kind: FieldKind },

    #[error("provider field '{0}' is blank")]
    BlankProviderField(String),

    #[error("provider field '{field}' appears more than once (keys are case-insensitive)")]
    DuplicateProviderField { field: String },

    #[error("canonical field '{target}' is mapped from both '{first}' and '{second}'")]
    DuplicateTarget {
        target: CanonicalField,
        first: String,
        second: String,
    },

    #[error("{kind} map targets '{target}', which is a {actual} field")]
    WrongKind {
        kind: FieldKind,
        target: CanonicalField,
        actual: FieldKind,
    },

    #[error("provider field '{field}' shadows canonical field '{shadowed}' but maps to '{target}'")]
    ShadowsCanonical {
        field: String,
        shadowed: CanonicalField,
        target: CanonicalField,
    },
}

/// Validated provider → canonical mapping for one series kind.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMap {
    kind: FieldKind,
    /// Provider keys are stored uppercased.
    entries: Vec<(String, CanonicalField)>,
}

impl FieldMap {
    pub fn new<I, S>(kind: FieldKind, pairs: I) -> Result<Self, FieldMapError>
    where
        I: IntoIterator<Item = (S, CanonicalField)>,
        S: AsRef<str>,
    {
        let mut entries: Vec<(String, CanonicalField)> = Vec::new();
        let mut keys = HashSet::new();

        for (raw_key, target) in pairs {
            let key = raw_key.as_ref().trim().to_uppercase();
            if key.is_empty() {
                return Err(FieldMapError::BlankProviderField(raw_key.as_ref().to_string()));
            }
            if target.kind() != kind {
                return Err(FieldMapError::WrongKind {
                    kind,
                    target,
                    actual: target.kind(),
                });
            }
            if !keys.insert(key.clone()) {
                return Err(FieldMapError::DuplicateProviderField { field: key });
            }
            if let Some((first, _)) = entries.iter().find(|(_, t)| *t == target) {
                return Err(FieldMapError::DuplicateTarget {
                    target,
                    first: first.clone(),
                    second: key,
                });
            }
            if let Some(shadowed) = CanonicalField::from_name(&key.to_lowercase()) {
                if shadowed != target {
                    return Err(FieldMapError::ShadowsCanonical {
                        field: key,
                        shadowed,
                        target,
                    });
                }
            }
            entries.push((key, target));
        }

        if entries.is_empty() {
            return Err(FieldMapError::Empty { kind });
        }

        Ok(Self { kind, entries })
    }

    pub fn from_config(
        kind: FieldKind,
        map: &BTreeMap<String, CanonicalField>,
    ) -> Result<Self, FieldMapError> {
        Self::new(kind, map.iter().map(|(k, v)| (k.as_str(), *v)))
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Provider identifiers in request order.
    pub fn provider_fields(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn canonical_names(&self) -> Vec<String> {
        self.entries.iter().map(|(_, f)| f.name().to_string()).collect()
    }

    pub fn lookup(&self, provider_field: &str) -> Option<CanonicalField> {
        let upper = provider_field.trim().to_uppercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == upper)
            .map(|(_, f)| *f)
    }

    /// Canonical column name for a provider column: the mapped name, or the
    /// lowercase form of the input when it is not in the map.
    pub fn column_name(&self, provider_column: &str) -> String {
        match self.lookup(provider_column) {
            Some(field) => field.name().to_string(),
            None => provider_column.to_lowercase(),
        }
    }

    /// Rename every column of `table`.
    pub fn apply(&self, table: RawTable) -> Result<RawTable, SeriesError> {
        table.rename_columns(|name| self.column_name(name))
    }
}
