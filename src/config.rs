use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AppError;
use crate::models::analysis::{FourthOscillator, IndicatorSet};

/// Table and column names of the daily price source.
#[derive(Debug, Clone)]
pub struct SourceSchema {
    pub table: String,
    pub instrument_column: String,
    pub date_column: String,
    pub price_column: String,
    pub high_column: String,
    pub low_column: String,
    pub volume_column: String,
    pub turnover_column: String,
}

impl Default for SourceSchema {
    fn default() -> Self {
        Self {
            table: "stock_data".to_string(),
            instrument_column: "issuer_code".to_string(),
            date_column: "Date".to_string(),
            price_column: "Last Trade Price".to_string(),
            high_column: "Max".to_string(),
            low_column: "Min".to_string(),
            volume_column: "Volume".to_string(),
            turnover_column: "Turnover in BEST (denars)".to_string(),
        }
    }
}

/// Settings for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// SQLite file holding both the source table and the output table.
    pub database_path: PathBuf,
    pub source: SourceSchema,
    /// Table replaced wholesale by every run.
    pub output_table: String,
    pub indicators: IndicatorSet,
    /// Worker threads for per-instrument analysis (0 = one per core).
    pub threads: usize,
    /// Abort the run once this much time has passed.
    pub max_run_time: Option<Duration>,
    /// Log and skip an instrument whose analysis fails instead of aborting.
    pub isolate_failures: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("mse_stocks.db"),
            source: SourceSchema::default(),
            output_table: "technical_indicators".to_string(),
            indicators: IndicatorSet::default(),
            threads: 0,
            max_run_time: None,
            isolate_failures: true,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();

        let fourth_oscillator = match lookup("TECHNICALS_FOURTH_OSCILLATOR") {
            Some(v) => v.parse::<FourthOscillator>()?,
            None => FourthOscillator::default(),
        };

        let threads = match lookup("TECHNICALS_THREADS") {
            Some(v) => v.trim().parse::<usize>().map_err(|_| {
                AppError::InvalidConfig(format!("TECHNICALS_THREADS is not a count: {}", v))
            })?,
            None => defaults.threads,
        };

        let max_run_time = match lookup("TECHNICALS_MAX_RUN_SECS") {
            Some(v) => Some(Duration::from_secs(v.trim().parse::<u64>().map_err(|_| {
                AppError::InvalidConfig(format!("TECHNICALS_MAX_RUN_SECS is not a number: {}", v))
            })?)),
            None => None,
        };

        let mut source = defaults.source;
        if let Some(table) = lookup("TECHNICALS_SOURCE_TABLE") {
            source.table = table;
        }

        Ok(Self {
            database_path: lookup("TECHNICALS_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            source,
            output_table: lookup("TECHNICALS_OUTPUT_TABLE").unwrap_or(defaults.output_table),
            indicators: defaults.indicators.with_fourth_oscillator(fourth_oscillator),
            threads,
            max_run_time,
            isolate_failures: match lookup("TECHNICALS_ISOLATE_FAILURES") {
                Some(v) => parse_flag("TECHNICALS_ISOLATE_FAILURES", &v)?,
                None => defaults.isolate_failures,
            },
        })
    }

    /// Check names before any statement is built from them.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.output_table.trim().is_empty() {
            return Err(AppError::InvalidConfig("output table name is empty".into()));
        }
        // SQLite folds ASCII case in identifiers.
        if self.output_table.eq_ignore_ascii_case(&self.source.table) {
            return Err(AppError::InvalidConfig(format!(
                "output table '{}' would replace the source table '{}'",
                self.output_table, self.source.table
            )));
        }
        if self
            .output_table
            .get(..7)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("sqlite_"))
        {
            return Err(AppError::InvalidConfig(format!(
                "output table '{}' uses the reserved sqlite_ prefix",
                self.output_table
            )));
        }
        self.indicators.validate()
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(AppError::InvalidConfig(format!(
            "{} is not a boolean: {}",
            key, value
        ))),
    }
}
