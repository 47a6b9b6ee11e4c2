//! Per-instrument snapshot files.
//!
//! Layout: `{raw_dir}/{INSTRUMENT}.parquet`, snappy-compressed, columns
//! `date`, the panel's value columns, then a constant `instrument` column.
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Skip-if-exists is the only incremental mechanism: a snapshot is never
//!   rewritten in place
//! - Summary reads for status reporting (row count, date range)

use super::provider::DataError;
use crate::domain::{AlignedPanel, Instrument};
use chrono::NaiveDate;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

pub const DATE_COLUMN: &str = "date";
pub const INSTRUMENT_COLUMN: &str = "instrument";
pub const SNAPSHOT_EXTENSION: &str = "parquet";

/// Directory of persisted snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

/// Row count and date range of one snapshot on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotInfo {
    pub instrument: String,
    pub path: PathBuf,
    pub rows: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, instrument: &Instrument) -> PathBuf {
        self.dir
            .join(format!("{}.{SNAPSHOT_EXTENSION}", instrument.code()))
    }

    pub fn exists(&self, instrument: &Instrument) -> bool {
        self.path_for(instrument).exists()
    }

    /// Persist a panel for an instrument. Empty panels are refused.
    pub fn write(&self, instrument: &Instrument, panel: &AlignedPanel) -> Result<PathBuf, DataError> {
        if panel.is_empty() {
            return Err(DataError::Snapshot {
                instrument: instrument.to_string(),
                reason: "refusing to persist an empty panel".into(),
            });
        }

        fs::create_dir_all(&self.dir).map_err(|e| DataError::Snapshot {
            instrument: instrument.to_string(),
            reason: format!("failed to create dir {}: {e}", self.dir.display()),
        })?;

        let mut df = panel_to_dataframe(instrument, panel)?;
        let path = self.path_for(instrument);
        let tmp_path = path.with_extension(format!("{SNAPSHOT_EXTENSION}.tmp"));

        write_parquet(&mut df, &tmp_path)?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::Snapshot {
                instrument: instrument.to_string(),
                reason: format!("atomic rename failed: {e}"),
            }
        })?;

        Ok(path)
    }

    /// All snapshot files in the directory, sorted by path. Leftover `.tmp`
    /// files are ignored.
    pub fn list(&self) -> Result<Vec<PathBuf>, DataError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir)
            .map_err(|e| DataError::ParquetError(format!("read dir {}: {e}", self.dir.display())))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::ParquetError(format!("dir entry: {e}")))?;
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(SNAPSHOT_EXTENSION)
            {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Row count and date range for every snapshot, for status reporting.
    pub fn status(&self) -> Result<Vec<SnapshotInfo>, DataError> {
        self.list()?.iter().map(|p| snapshot_info(p)).collect()
    }
}

/// Instrument code encoded in a snapshot path (the file stem).
pub fn instrument_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}

/// Read a snapshot (or any Parquet file) into a DataFrame.
pub fn read_parquet(path: &Path) -> Result<DataFrame, DataError> {
    let file = fs::File::open(path)
        .map_err(|e| DataError::ParquetError(format!("open {}: {e}", path.display())))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read {}: {e}", path.display())))
}

fn snapshot_info(path: &Path) -> Result<SnapshotInfo, DataError> {
    let df = read_parquet(path)?;
    let (start_date, end_date) = match df.column(DATE_COLUMN) {
        Ok(column) => {
            let as_date = column
                .cast(&DataType::Date)
                .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))?;
            let ca = as_date
                .date()
                .map_err(|e| DataError::ParquetError(format!("date column type: {e}")))?;
            let days: Vec<i32> = (0..ca.len()).filter_map(|i| ca.get(i)).collect();
            (
                days.iter().min().map(|d| from_epoch_days(*d)),
                days.iter().max().map(|d| from_epoch_days(*d)),
            )
        }
        Err(_) => (None, None),
    };

    Ok(SnapshotInfo {
        instrument: instrument_from_path(path).unwrap_or_default(),
        path: path.to_path_buf(),
        rows: df.height(),
        start_date,
        end_date,
    })
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

pub(crate) fn to_epoch_days(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

pub(crate) fn from_epoch_days(days: i32) -> NaiveDate {
    epoch() + chrono::Duration::days(i64::from(days))
}

/// Convert a panel to a DataFrame: `date`, value columns, `instrument`.
fn panel_to_dataframe(instrument: &Instrument, panel: &AlignedPanel) -> Result<DataFrame, DataError> {
    let days: Vec<i32> = panel.dates().iter().map(|d| to_epoch_days(*d)).collect();

    let mut columns = Vec::with_capacity(panel.columns().len() + 2);
    columns.push(
        Column::new(DATE_COLUMN.into(), days)
            .cast(&DataType::Date)
            .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))?,
    );
    for column in panel.columns() {
        if column.name == DATE_COLUMN || column.name == INSTRUMENT_COLUMN {
            return Err(DataError::Snapshot {
                instrument: instrument.to_string(),
                reason: format!("panel column '{}' collides with a key column", column.name),
            });
        }
        columns.push(Column::new(column.name.as_str().into(), column.values.clone()));
    }
    columns.push(Column::new(
        INSTRUMENT_COLUMN.into(),
        vec![instrument.code(); panel.len()],
    ));

    DataFrame::new(columns).map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Snappy)
        .finish(df)
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PanelColumn;
    use std::env;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_snapshot_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("panelfeed_snapshot_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample_panel() -> AlignedPanel {
        AlignedPanel::new(
            vec![
                NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(),
                NaiveDate::from_ymd_opt(2023, 1, 4).unwrap(),
            ],
            vec![
                PanelColumn {
                    name: "close".into(),
                    values: vec![12.5, 12.7],
                },
                PanelColumn {
                    name: "earnings".into(),
                    values: vec![5.0, 5.0],
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn write_then_read_back() {
        let dir = temp_snapshot_dir();
        let store = SnapshotStore::new(&dir);
        let inst = Instrument::new("000001.SZ").unwrap();

        assert!(!store.exists(&inst));
        let path = store.write(&inst, &sample_panel()).unwrap();
        assert!(store.exists(&inst));
        assert_eq!(path, dir.join("000001.SZ.parquet"));

        let df = read_parquet(&path).unwrap();
        assert_eq!(df.height(), 2);
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["date", "close", "earnings", "instrument"]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_panel_is_refused() {
        let dir = temp_snapshot_dir();
        let store = SnapshotStore::new(&dir);
        let inst = Instrument::new("600000.SH").unwrap();

        let result = store.write(&inst, &AlignedPanel::default());
        assert!(matches!(result, Err(DataError::Snapshot { .. })));
        assert!(!store.exists(&inst));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn list_ignores_temp_and_foreign_files() {
        let dir = temp_snapshot_dir();
        let store = SnapshotStore::new(&dir);
        store
            .write(&Instrument::new("600000.SH").unwrap(), &sample_panel())
            .unwrap();
        store
            .write(&Instrument::new("000001.SZ").unwrap(), &sample_panel())
            .unwrap();
        fs::write(dir.join("000002.SZ.parquet.tmp"), b"partial").unwrap();
        fs::write(dir.join("notes.txt"), b"hello").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(
            listed,
            vec![dir.join("000001.SZ.parquet"), dir.join("600000.SH.parquet")]
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn status_reports_range() {
        let dir = temp_snapshot_dir();
        let store = SnapshotStore::new(&dir);
        store
            .write(&Instrument::new("000001.SZ").unwrap(), &sample_panel())
            .unwrap();

        let status = store.status().unwrap();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].instrument, "000001.SZ");
        assert_eq!(status[0].rows, 2);
        assert_eq!(status[0].start_date, NaiveDate::from_ymd_opt(2023, 1, 3));
        assert_eq!(status[0].end_date, NaiveDate::from_ymd_opt(2023, 1, 4));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_dir_lists_nothing() {
        let store = SnapshotStore::new(env::temp_dir().join("panelfeed_does_not_exist_xyz"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn epoch_day_conversion_roundtrips() {
        let date = NaiveDate::from_ymd_opt(2022, 12, 20).unwrap();
        assert_eq!(from_epoch_days(to_epoch_days(date)), date);
    }
}
