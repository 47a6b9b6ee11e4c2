//! Batch conversion: parallel cleaning, failure isolation, single dump call.

use chrono::NaiveDate;
use panelfeed_core::data::snapshot::SnapshotStore;
use panelfeed_core::domain::{AlignedPanel, Instrument, PanelColumn};
use panelfeed_runner::{
    BatchConversionPipeline, BinaryDumper, CleanCause, ConversionPaths, ConvertError, DumpError,
    DumpJob, DumpStatus,
};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// ── Fixtures ─────────────────────────────────────────────────────────

/// Records every job; optionally fails.
#[derive(Default)]
struct RecordingDumper {
    jobs: Mutex<Vec<DumpJob>>,
    fail: bool,
}

impl RecordingDumper {
    fn calls(&self) -> Vec<DumpJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl BinaryDumper for RecordingDumper {
    fn name(&self) -> &str {
        "recording"
    }

    fn dump(&self, job: &DumpJob) -> Result<(), DumpError> {
        self.jobs.lock().unwrap().push(job.clone());
        if self.fail {
            return Err(DumpError::Failed {
                status: "exit status: 1".into(),
                stderr: "dump_bin.py: boom".into(),
            });
        }
        Ok(())
    }
}

struct Workspace {
    _root: tempfile::TempDir,
    paths: ConversionPaths,
}

fn workspace() -> Workspace {
    let root = tempfile::tempdir().unwrap();
    let paths = ConversionPaths {
        raw_dir: root.path().join("raw"),
        temp_dir: root.path().join("csv"),
        binary_dir: root.path().join("qlib"),
    };
    fs::create_dir_all(&paths.raw_dir).unwrap();
    Workspace { _root: root, paths }
}

fn panel(seed: f64) -> AlignedPanel {
    let dates: Vec<NaiveDate> = (3..8)
        .map(|day| NaiveDate::from_ymd_opt(2023, 1, day).unwrap())
        .collect();
    AlignedPanel::new(
        dates,
        vec![
            PanelColumn {
                name: "close".into(),
                values: vec![seed, seed + 0.5, seed + 1.0, seed + 0.25, seed + 2.0],
            },
            PanelColumn {
                name: "earnings".into(),
                values: vec![5.0; 5],
            },
        ],
    )
    .unwrap()
}

fn write_snapshots(raw_dir: &Path, codes: &[&str]) {
    let store = SnapshotStore::new(raw_dir);
    for (i, code) in codes.iter().enumerate() {
        store
            .write(&Instrument::new(*code).unwrap(), &panel(10.0 + i as f64))
            .unwrap();
    }
}

/// Write a snapshot by hand so the instrument column can disagree with the
/// file name.
fn write_raw(raw_dir: &Path, file_code: &str, column_code: &str) {
    let mut df = df!(
        "date" => ["2023-01-03", "2023-01-04"],
        "close" => [10.0, 10.5],
        "instrument" => [column_code, column_code]
    )
    .unwrap();
    let file = fs::File::create(raw_dir.join(format!("{file_code}.parquet"))).unwrap();
    ParquetWriter::new(file).finish(&mut df).unwrap();
}

fn csv_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn include_fields() -> Vec<String> {
    vec!["close".into(), "earnings".into()]
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn malformed_snapshot_is_isolated_and_dump_still_runs() {
    let ws = workspace();
    write_snapshots(&ws.paths.raw_dir, &["000001.SZ", "000002.SZ", "600000.SH"]);
    let bad = ws.paths.raw_dir.join("600036.SH.parquet");
    fs::write(&bad, b"definitely not parquet").unwrap();

    let dumper = RecordingDumper::default();
    let summary = BatchConversionPipeline::new(ws.paths.clone(), include_fields(), 4, &dumper)
        .run()
        .unwrap();

    assert_eq!(summary.exported.len(), 3);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].file, bad);
    assert!(summary.failed[0].to_string().contains("600036.SH.parquet"));
    assert_eq!(summary.dump, DumpStatus::Completed);

    let calls = dumper.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].source_dir, ws.paths.temp_dir);
    assert_eq!(calls[0].dest_dir, ws.paths.binary_dir);
    assert_eq!(calls[0].backup_dir, ws.paths.binary_dir.join("backup"));
    assert_eq!(calls[0].include_fields, include_fields());
    assert_eq!(calls[0].workers, 1);

    for code in ["000001.SZ", "000002.SZ", "600000.SH"] {
        assert!(ws.paths.temp_dir.join(format!("{code}.csv")).exists());
    }
}

#[test]
fn exports_are_named_by_file_and_never_collide() {
    let ws = workspace();
    write_raw(&ws.paths.raw_dir, "000001.SZ", "000001.SZ");
    write_raw(&ws.paths.raw_dir, "000002.SZ", "000001.SZ");
    write_raw(&ws.paths.raw_dir, "600000.SH", "../escaped");

    let dumper = RecordingDumper::default();
    let summary = BatchConversionPipeline::new(ws.paths.clone(), include_fields(), 3, &dumper)
        .run()
        .unwrap();

    assert_eq!(summary.exported.len(), 1);
    assert_eq!(summary.exported[0].instrument, "000001.SZ");
    assert_eq!(summary.failed.len(), 2);
    let mut failed: Vec<PathBuf> = summary.failed.iter().map(|f| f.file.clone()).collect();
    failed.sort();
    assert_eq!(
        failed,
        vec![
            ws.paths.raw_dir.join("000002.SZ.parquet"),
            ws.paths.raw_dir.join("600000.SH.parquet"),
        ]
    );
    assert!(summary.failed.iter().all(|f| matches!(
        f.cause,
        CleanCause::InstrumentMismatch { .. }
    )));

    assert_eq!(csv_files(&ws.paths.temp_dir), vec!["000001.SZ.csv".to_string()]);
    let outside = ws.paths.temp_dir.parent().unwrap().join("escaped.csv");
    assert!(!outside.exists());

    for record in &summary.exported {
        assert!(record.path.exists());
    }
}

#[test]
fn exports_are_byte_deterministic() {
    let ws = workspace();
    write_snapshots(&ws.paths.raw_dir, &["000001.SZ", "600000.SH"]);
    let dumper = RecordingDumper::default();
    let pipeline = BatchConversionPipeline::new(ws.paths.clone(), include_fields(), 2, &dumper);

    let first = pipeline.run().unwrap();
    let first_bytes = fs::read(ws.paths.temp_dir.join("000001.SZ.csv")).unwrap();
    let second = pipeline.run().unwrap();
    let second_bytes = fs::read(ws.paths.temp_dir.join("000001.SZ.csv")).unwrap();

    let digests = |s: &panelfeed_runner::ConversionSummary| {
        let mut d: Vec<(String, String)> = s
            .exported
            .iter()
            .map(|r| (r.instrument.clone(), r.digest.clone()))
            .collect();
        d.sort();
        d
    };
    assert_eq!(digests(&first), digests(&second));
    assert_eq!(first_bytes, second_bytes);

    let text = String::from_utf8(first_bytes).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("date,close,earnings,instrument"));
    assert_eq!(lines.next(), Some("2023-01-03,10,5,000001.SZ"));
}

#[test]
fn temp_dir_is_recreated() {
    let ws = workspace();
    write_snapshots(&ws.paths.raw_dir, &["000001.SZ"]);
    fs::create_dir_all(&ws.paths.temp_dir).unwrap();
    let stale = ws.paths.temp_dir.join("stale.csv");
    fs::write(&stale, "old").unwrap();

    let dumper = RecordingDumper::default();
    BatchConversionPipeline::new(ws.paths.clone(), include_fields(), 1, &dumper)
        .run()
        .unwrap();

    assert!(!stale.exists());
    assert!(ws.paths.binary_dir.exists());
}

#[test]
fn no_snapshots_is_an_error() {
    let ws = workspace();
    let dumper = RecordingDumper::default();
    let result = BatchConversionPipeline::new(ws.paths.clone(), include_fields(), 1, &dumper).run();

    assert!(matches!(result, Err(ConvertError::NoSnapshots(_))));
    assert!(dumper.calls().is_empty());
}

#[test]
fn dump_failure_is_recorded_and_exports_remain() {
    let ws = workspace();
    write_snapshots(&ws.paths.raw_dir, &["000001.SZ"]);
    let dumper = RecordingDumper {
        fail: true,
        ..RecordingDumper::default()
    };

    let summary = BatchConversionPipeline::new(ws.paths.clone(), include_fields(), 1, &dumper)
        .run()
        .unwrap();

    match &summary.dump {
        DumpStatus::Failed(detail) => assert!(detail.contains("boom")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!summary.dump_succeeded());
    assert!(ws.paths.temp_dir.join("000001.SZ.csv").exists());
}

#[test]
fn zero_row_snapshot_is_skipped() {
    let ws = workspace();
    write_snapshots(&ws.paths.raw_dir, &["000001.SZ"]);

    let empty_path: PathBuf = ws.paths.raw_dir.join("000009.SZ.parquet");
    let mut df = DataFrame::new(vec![
        Column::new("close".into(), Vec::<f64>::new()),
        Column::new("instrument".into(), Vec::<String>::new()),
    ])
    .unwrap();
    let file = fs::File::create(&empty_path).unwrap();
    ParquetWriter::new(file).finish(&mut df).unwrap();

    let dumper = RecordingDumper::default();
    let summary = BatchConversionPipeline::new(ws.paths.clone(), include_fields(), 2, &dumper)
        .run()
        .unwrap();

    assert_eq!(summary.exported.len(), 1);
    assert_eq!(summary.empty, vec![empty_path]);
    assert!(summary.failed.is_empty());
    assert!(!ws.paths.temp_dir.join("000009.SZ.csv").exists());
}
