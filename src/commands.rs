use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::{Args, Parser, Subcommand};
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::data::query::{self, DEFAULT_HISTORY_LIMIT};
use crate::engine::pipeline::{self, RunSummary};
use crate::errors::AppError;
use crate::models::analysis::FourthOscillator;
use crate::models::period::Period;
use crate::utils::export;
use crate::AppState;

// ── CLI ──

/// Multi-timeframe technical indicators and trade signals for listed instruments.
#[derive(Debug, Parser)]
#[command(name = "technicals", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub options: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags that override the environment configuration.
#[derive(Debug, Default, Args)]
pub struct GlobalOptions {
    /// SQLite database holding the source and output tables
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Output table replaced by every run
    #[arg(long, global = true)]
    pub output_table: Option<String>,

    /// Fourth oscillator column: williams_r or momentum
    #[arg(long, global = true)]
    pub fourth_oscillator: Option<String>,

    /// Worker threads (0 = one per core)
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    /// Abort the run after this many seconds
    #[arg(long, global = true)]
    pub max_run_secs: Option<u64>,

    /// Abort on the first failing instrument instead of skipping it
    #[arg(long, global = true)]
    pub fail_fast: bool,
}

impl GlobalOptions {
    pub fn apply(&self, config: &mut AnalysisConfig) -> Result<(), AppError> {
        if let Some(db) = &self.db {
            config.database_path = db.clone();
        }
        if let Some(table) = &self.output_table {
            config.output_table = table.clone();
        }
        if let Some(name) = &self.fourth_oscillator {
            config.indicators.fourth_oscillator = name.parse::<FourthOscillator>()?;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(secs) = self.max_run_secs {
            config.max_run_time = Some(std::time::Duration::from_secs(secs));
        }
        if self.fail_fast {
            config.isolate_failures = false;
        }
        Ok(())
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Recompute every instrument and replace the output table
    Run,
    /// List instrument ids in the source table
    Instruments,
    /// Newest analysis row for an instrument
    Latest { instrument: String, period: String },
    /// Newest-first analysis rows for an instrument
    History {
        instrument: String,
        period: String,
        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },
    /// Dump the output table to CSV
    Export {
        path: PathBuf,
        #[arg(long)]
        instrument: Option<String>,
        #[arg(long)]
        period: Option<String>,
    },
}

// ── Analysis Commands ──

/// Run the full pipeline on a blocking worker. Ctrl-C trips the cancel flag.
pub async fn run_analysis(state: &AppState) -> Result<RunSummary, AppError> {
    info!(
        "Running analysis: db={}, output={}",
        state.config.database_path.display(),
        state.config.output_table
    );

    // Reset cancel flag
    state.cancel_flag.store(false, Ordering::Relaxed);

    let watcher = {
        let cancel_flag = state.cancel_flag.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling analysis");
                cancel_flag.store(true, Ordering::Relaxed);
            }
        })
    };

    let config = state.config.clone();
    let cancel_flag = state.cancel_flag.clone();
    let result = tokio::task::spawn_blocking(move || pipeline::run(&config, &cancel_flag))
        .await
        .map_err(|e| AppError::Internal(format!("Task join error: {}", e)));

    watcher.abort();
    let summary = result??;

    if !summary.failed_instruments.is_empty() {
        warn!(
            "{} instruments skipped: {}",
            summary.failed_instruments.len(),
            summary.failed_instruments.join(", ")
        );
    }
    Ok(summary)
}

// ── Query Commands ──

pub fn list_instruments(state: &AppState) -> Result<Vec<String>, AppError> {
    let conn = open_read_only(&state.config)?;
    query::list_instruments(&conn, &state.config.source)
}

pub fn latest_analysis(state: &AppState, instrument: &str, period: &str) -> Result<Vec<Value>, AppError> {
    let conn = open_read_only(&state.config)?;
    let table = query::latest_analysis(&conn, &state.config.output_table, instrument, period)?;
    Ok(table.to_json_rows())
}

pub fn historical_analysis(
    state: &AppState,
    instrument: &str,
    period: &str,
    limit: usize,
) -> Result<Vec<Value>, AppError> {
    let conn = open_read_only(&state.config)?;
    let table =
        query::historical_analysis(&conn, &state.config.output_table, instrument, period, limit)?;
    Ok(table.to_json_rows())
}

/// Export the output table to CSV. Returns the number of rows written.
pub fn export_analysis(
    state: &AppState,
    path: &std::path::Path,
    instrument: Option<&str>,
    period: Option<&str>,
) -> Result<usize, AppError> {
    let period = period.map(str::parse::<Period>).transpose()?;
    let conn = open_read_only(&state.config)?;
    let table = query::output_rows(&conn, &state.config.output_table, instrument, period)?;
    let written = export::write_analysis_csv(&table, path)?;
    info!("Exported {} rows to {}", written, path.display());
    Ok(written)
}

fn open_read_only(config: &AnalysisConfig) -> Result<Connection, AppError> {
    Connection::open_with_flags(
        &config.database_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| AppError::Database(format!("{}: {}", config.database_path.display(), e)))
}
