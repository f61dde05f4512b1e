pub mod commands;
pub mod config;
pub mod data;
pub mod engine;
pub mod errors;
pub mod models;
pub mod utils;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::commands::{Cli, Command};
use crate::config::AnalysisConfig;

/// Shared application state, handed to every command.
pub struct AppState {
    pub config: AnalysisConfig,
    /// Cancellation flag for the running analysis.
    pub cancel_flag: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Install the global tracing subscriber. Logs go to stderr so command
/// output on stdout stays machine-readable.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = AnalysisConfig::from_env().context("Failed to load configuration")?;
    cli.options
        .apply(&mut config)
        .context("Invalid command-line option")?;

    info!("Starting technicals ({})", env!("CARGO_PKG_VERSION"));
    let state = AppState::new(config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(dispatch(&state, cli.command))
}

async fn dispatch(state: &AppState, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Run => {
            let summary = commands::run_analysis(state)
                .await
                .context("Analysis run failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Instruments => {
            for id in commands::list_instruments(state)? {
                println!("{}", id);
            }
        }
        Command::Latest { instrument, period } => {
            let rows = commands::latest_analysis(state, &instrument, &period)
                .with_context(|| format!("Latest analysis for {} ({})", instrument, period))?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Command::History {
            instrument,
            period,
            limit,
        } => {
            let rows = commands::historical_analysis(state, &instrument, &period, limit)
                .with_context(|| format!("History for {} ({})", instrument, period))?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Command::Export {
            path,
            instrument,
            period,
        } => {
            let written =
                commands::export_analysis(state, &path, instrument.as_deref(), period.as_deref())
                    .with_context(|| format!("Export to {}", path.display()))?;
            println!("{} rows written to {}", written, path.display());
        }
    }
    Ok(())
}
