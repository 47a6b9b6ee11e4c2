//! Pipeline configuration loaded from TOML.
//!
//! Every section except `[paths]`, `[remote].pool_code`, `[fields]` and
//! `[data_scope]` has defaults. The file is validated as a whole before any
//! work starts, so a bad field map or an inverted date range never reaches
//! the network.

use chrono::NaiveDate;
use panelfeed_core::data::field_map::{CanonicalField, FieldKind, FieldMap, FieldMapError};
use panelfeed_core::data::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("invalid field map '{key}': {source}")]
    FieldMap {
        key: &'static str,
        #[source]
        source: FieldMapError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub remote: RemoteConfig,
    pub fields: FieldsConfig,
    pub data_scope: DataScope,
    #[serde(default)]
    pub dump: DumpConfig,
    #[serde(default)]
    pub convert: ConvertConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Per-instrument Parquet snapshots.
    pub raw_data: PathBuf,
    /// Scratch directory for cleaned CSV exports. Recreated on every conversion.
    pub temp_csv: PathBuf,
    /// Binary dataset root handed to the dump tool.
    pub binary_data: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Constituent-set selector for universe resolution.
    pub pool_code: String,
    /// Total attempts per remote query, including the first.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Pause after each instrument that made remote calls.
    #[serde(default = "default_request_gap_ms")]
    pub request_gap_ms: u64,
    #[serde(default = "default_lookback_days")]
    pub fundamental_lookback_days: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldsConfig {
    pub market_map: BTreeMap<String, CanonicalField>,
    pub financial_map: BTreeMap<String, CanonicalField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataScope {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DumpConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            program: "python".into(),
            args: vec!["scripts/dump_bin.py".into(), "dump_all".into()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConvertConfig {
    /// Cleaning threads. 0 = available parallelism.
    #[serde(default)]
    pub workers: usize,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8808".into()
}
fn default_retry_count() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_request_gap_ms() -> u64 {
    200
}
fn default_lookback_days() -> u32 {
    panelfeed_core::data::align::DEFAULT_LOOKBACK_DAYS
}
fn default_timeout_secs() -> u64 {
    30
}

impl PipelineConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.retry_count < 1 {
            return Err(ConfigError::Invalid {
                key: "remote.retry_count",
                reason: "must be at least 1".into(),
            });
        }
        if self.remote.pool_code.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "remote.pool_code",
                reason: "must not be empty".into(),
            });
        }
        if self.remote.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "remote.timeout_secs",
                reason: "must be positive".into(),
            });
        }
        if self.data_scope.start_date > self.data_scope.end_date {
            return Err(ConfigError::Invalid {
                key: "data_scope",
                reason: format!(
                    "start_date {} is after end_date {}",
                    self.data_scope.start_date, self.data_scope.end_date
                ),
            });
        }
        if self.dump.program.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "dump.program",
                reason: "must not be empty".into(),
            });
        }
        self.market_map()?;
        self.fundamental_map()?;
        Ok(())
    }

    pub fn market_map(&self) -> Result<FieldMap, ConfigError> {
        FieldMap::from_config(FieldKind::Market, &self.fields.market_map).map_err(|e| {
            ConfigError::FieldMap {
                key: "fields.market_map",
                source: e,
            }
        })
    }

    pub fn fundamental_map(&self) -> Result<FieldMap, ConfigError> {
        FieldMap::from_config(FieldKind::Fundamental, &self.fields.financial_map).map_err(|e| {
            ConfigError::FieldMap {
                key: "fields.financial_map",
                source: e,
            }
        })
    }

    /// Canonical columns handed to the binary dump, market fields first.
    pub fn include_fields(&self) -> Vec<String> {
        self.fields
            .market_map
            .values()
            .chain(self.fields.financial_map.values())
            .map(|f| f.name().to_string())
            .collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.remote.retry_count,
            Duration::from_millis(self.remote.retry_delay_ms),
        )
    }

    pub fn request_gap(&self) -> Duration {
        Duration::from_millis(self.remote.request_gap_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }

    /// Worker threads for the conversion pool.
    pub fn worker_count(&self) -> usize {
        match self.convert.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[paths]
raw_data = "data/raw"
temp_csv = "data/csv"
binary_data = "data/qlib"

[remote]
pool_code = "a001030201000000"
retry_count = 4
request_gap_ms = 0

[fields.market_map]
OPEN = "open"
CLOSE = "close"
AMT = "amount"

[fields.financial_map]
NP_BELONGTO_PARCOMSH = "earnings"

[data_scope]
start_date = "2018-01-01"
end_date = "2023-12-31"
"#;

    #[test]
    fn parses_with_defaults() {
        let config = PipelineConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.remote.retry_count, 4);
        assert_eq!(config.remote.retry_delay_ms, 500);
        assert_eq!(config.remote.fundamental_lookback_days, 180);
        assert_eq!(config.remote.endpoint, "http://127.0.0.1:8808");
        assert_eq!(config.dump, DumpConfig::default());
        assert_eq!(config.convert.workers, 0);
        assert!(config.worker_count() >= 1);
        assert_eq!(config.request_gap(), Duration::ZERO);
    }

    #[test]
    fn retry_policy_follows_remote_section() {
        let config = PipelineConfig::from_toml(SAMPLE).unwrap();
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.backoff.delay(1), Duration::from_millis(500));
    }

    #[test]
    fn include_fields_lists_market_then_fundamental() {
        let config = PipelineConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(
            config.include_fields(),
            vec!["amount", "close", "open", "earnings"]
        );
    }

    #[test]
    fn rejects_inverted_date_range() {
        let bad = SAMPLE.replace("start_date = \"2018-01-01\"", "start_date = \"2024-01-01\"");
        let err = PipelineConfig::from_toml(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "data_scope", .. }));
    }

    #[test]
    fn rejects_zero_retry_count() {
        let bad = SAMPLE.replace("retry_count = 4", "retry_count = 0");
        let err = PipelineConfig::from_toml(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "remote.retry_count", .. }));
    }

    #[test]
    fn rejects_unknown_canonical_target() {
        let bad = SAMPLE.replace("AMT = \"amount\"", "AMT = \"turnover_ratio\"");
        assert!(matches!(
            PipelineConfig::from_toml(&bad),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_fundamental_target_in_market_map() {
        let bad = SAMPLE.replace("AMT = \"amount\"", "AMT = \"revenue\"");
        let err = PipelineConfig::from_toml(&bad).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::FieldMap {
                key: "fields.market_map",
                ..
            }
        ));
    }

    #[test]
    fn rejects_empty_financial_map() {
        let bad = SAMPLE.replace("NP_BELONGTO_PARCOMSH = \"earnings\"", "");
        assert!(matches!(
            PipelineConfig::from_toml(&bad),
            Err(ConfigError::FieldMap { .. })
        ));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = PipelineConfig::from_file(Path::new("/nonexistent/panelfeed.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/panelfeed.toml"));
    }
}
