//! PanelFeed CLI — fetch, convert and inspect per-instrument panels.
//!
//! Commands:
//! - `fetch` — resolve the universe and write missing Parquet snapshots
//! - `convert` — clean every snapshot and run the binary dump
//! - `run` — fetch then convert
//! - `status` — list snapshots with row counts and date ranges

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use panelfeed_core::data::snapshot::SnapshotStore;
use panelfeed_core::data::universe::parse_instrument_list;
use panelfeed_core::domain::Instrument;
use panelfeed_runner::{
    open_session, process_dumper, run_convert, run_fetch, run_pipeline, ConversionSummary,
    DumpStatus, FetchSummary, LogProgress, PipelineConfig,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "panelfeed",
    about = "PanelFeed — point-in-time market and fundamental panels for backtesting"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the universe and write a snapshot for every missing instrument.
    Fetch {
        /// Path to the TOML config file.
        #[arg(long, default_value = "panelfeed.toml")]
        config: PathBuf,

        /// Comma-separated instruments to fetch instead of the configured pool.
        #[arg(long)]
        instruments: Option<String>,

        /// Use deterministic synthetic data instead of the remote gateway.
        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
    /// Clean all snapshots into CSV and hand them to the binary dump.
    Convert {
        #[arg(long, default_value = "panelfeed.toml")]
        config: PathBuf,
    },
    /// Fetch, then convert.
    Run {
        #[arg(long, default_value = "panelfeed.toml")]
        config: PathBuf,

        #[arg(long)]
        instruments: Option<String>,

        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
    /// Report snapshot row counts and date ranges.
    Status {
        #[arg(long, default_value = "panelfeed.toml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Fetch {
            config,
            instruments,
            synthetic,
        } => {
            let config = load_config(&config)?;
            let summary = cmd_fetch(&config, instruments.as_deref(), synthetic)?;
            print_fetch_summary(&summary);
        }
        Commands::Convert { config } => {
            let config = load_config(&config)?;
            let summary = cmd_convert(&config)?;
            print_conversion_summary(&summary);
            ensure_dumped(&summary)?;
        }
        Commands::Run {
            config,
            instruments,
            synthetic,
        } => {
            let config = load_config(&config)?;
            let explicit = explicit_instruments(instruments.as_deref())?;
            let mut session =
                open_session(&config, synthetic).context("opening quotation session")?;
            let dumper = process_dumper(&config);
            let report = run_pipeline(
                &config,
                session.as_mut(),
                explicit,
                Local::now().date_naive(),
                &LogProgress,
                &dumper,
            )
            .context("pipeline failed")?;
            print_fetch_summary(&report.fetch);
            print_conversion_summary(&report.conversion);
            ensure_dumped(&report.conversion)?;
        }
        Commands::Status { config } => {
            let config = load_config(&config)?;
            cmd_status(&config.paths.raw_data)?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    let config = PipelineConfig::from_file(path)
        .with_context(|| format!("loading config {}", path.display()))?;
    tracing::debug!(config = %path.display(), "config loaded");
    Ok(config)
}

fn cmd_fetch(
    config: &PipelineConfig,
    instruments: Option<&str>,
    synthetic: bool,
) -> Result<FetchSummary> {
    let explicit = explicit_instruments(instruments)?;
    let mut session = open_session(config, synthetic).context("opening quotation session")?;
    let today = Local::now().date_naive();
    let summary = run_fetch(config, session.as_mut(), explicit, today, &LogProgress)
        .context("fetch failed")?;
    Ok(summary)
}

fn explicit_instruments(list: Option<&str>) -> Result<Option<Vec<Instrument>>> {
    list.map(parse_instrument_list)
        .transpose()
        .context("parsing --instruments")
}

fn cmd_convert(config: &PipelineConfig) -> Result<ConversionSummary> {
    let dumper = process_dumper(config);
    run_convert(config, &dumper).context("conversion failed")
}

fn ensure_dumped(summary: &ConversionSummary) -> Result<()> {
    if let DumpStatus::Failed(detail) = &summary.dump {
        bail!("binary dump failed: {detail}");
    }
    Ok(())
}

fn cmd_status(raw_dir: &Path) -> Result<()> {
    if !raw_dir.exists() {
        println!("Snapshot directory does not exist: {}", raw_dir.display());
        return Ok(());
    }

    let infos = SnapshotStore::new(raw_dir)
        .status()
        .with_context(|| format!("reading snapshots in {}", raw_dir.display()))?;
    if infos.is_empty() {
        println!("No snapshots in {}", raw_dir.display());
        return Ok(());
    }

    let total_rows: usize = infos.iter().map(|i| i.rows).sum();
    println!("Snapshots: {}", raw_dir.display());
    println!("Instruments: {}", infos.len());
    println!("Total rows: {total_rows}");
    println!();
    println!("{:<12} {:<25} {:>8}", "Instrument", "Date Range", "Rows");
    println!("{}", "-".repeat(47));
    for info in &infos {
        let range = match (info.start_date, info.end_date) {
            (Some(s), Some(e)) => format!("{s} .. {e}"),
            _ => "-".to_string(),
        };
        println!("{:<12} {:<25} {:>8}", info.instrument, range, info.rows);
    }
    Ok(())
}

fn print_fetch_summary(summary: &FetchSummary) {
    println!();
    println!("=== Fetch ===");
    println!("Instruments:  {}", summary.total);
    println!("Written:      {} ({} degraded)", summary.written, summary.degraded);
    println!("Skipped:      {}", summary.skipped);
    println!("No data:      {}", summary.no_data);
    println!("Empty:        {}", summary.empty);
    println!("Failed:       {}", summary.failed.len());
    for (instrument, cause) in &summary.failed {
        eprintln!("  {instrument}: {cause}");
    }
}

fn print_conversion_summary(summary: &ConversionSummary) {
    println!();
    println!("=== Convert ===");
    println!("Exported:     {}", summary.exported.len());
    println!("Empty:        {}", summary.empty.len());
    println!("Failed:       {}", summary.failed.len());
    for failure in &summary.failed {
        eprintln!("  {failure}");
    }
    match &summary.dump {
        DumpStatus::Completed => println!("Dump:         ok"),
        DumpStatus::Failed(detail) => println!("Dump:         FAILED ({detail})"),
    }
}
