use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::data::sink::replace_output;
use crate::data::source::{daily_series, load_source, SourceRow};
use crate::errors::AppError;
use crate::models::analysis::{IndicatorSet, OutputRecord};
use crate::models::observation::DailySeries;
use crate::models::period::Period;

use super::indicators::compute_indicators;
use super::resample::resample;
use super::signal::derive_signal;

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub instruments_total: usize,
    pub instruments_analyzed: usize,
    pub failed_instruments: Vec<String>,
    pub rows_written: usize,
    pub elapsed_secs: f64,
}

/// Records for every analysed instrument plus the ids that were skipped.
#[derive(Debug, Default)]
pub struct AnalysisBatch {
    pub records: Vec<OutputRecord>,
    pub analyzed: usize,
    pub failed: Vec<String>,
}

enum InstrumentOutcome {
    Done(Vec<OutputRecord>),
    Failed(AppError),
    Skipped,
}

/// Read the source, analyse every instrument and replace the output table.
///
/// Nothing is written unless every stage before the sink succeeded.
pub fn run(config: &AnalysisConfig, cancel_flag: &AtomicBool) -> Result<RunSummary, AppError> {
    config.validate()?;
    let start = Instant::now();

    let instruments = load_source(&config.database_path, &config.source)?;
    info!(
        "Analysis run: {} instruments, {} threads",
        instruments.len(),
        if config.threads == 0 {
            rayon::current_num_threads()
        } else {
            config.threads
        }
    );

    let batch = analyze_all(&instruments, config, cancel_flag, start)?;

    if cancel_flag.load(Ordering::Relaxed) {
        return Err(AppError::RunCancelled);
    }
    if batch.analyzed == 0 && !batch.failed.is_empty() {
        return Err(AppError::AllInstrumentsFailed {
            failed: batch.failed.len(),
        });
    }

    let rows_written = replace_output(
        &config.database_path,
        &config.output_table,
        config.indicators.fourth_oscillator,
        &batch.records,
    )?;

    let elapsed = start.elapsed();
    info!(
        "Analysis complete: {} rows for {} instruments in {:.1}s",
        rows_written,
        batch.analyzed,
        elapsed.as_secs_f64()
    );

    Ok(RunSummary {
        instruments_total: instruments.len(),
        instruments_analyzed: batch.analyzed,
        failed_instruments: batch.failed,
        rows_written,
        elapsed_secs: elapsed.as_secs_f64(),
    })
}

/// Analyse every instrument on a bounded rayon pool.
///
/// The cancel flag and the optional deadline are checked before each
/// instrument. Records come back in instrument order, then period order.
pub fn analyze_all(
    instruments: &BTreeMap<String, Vec<SourceRow>>,
    config: &AnalysisConfig,
    cancel_flag: &AtomicBool,
    start: Instant,
) -> Result<AnalysisBatch, AppError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()
        .map_err(|e| AppError::Internal(format!("Cannot build worker pool: {}", e)))?;

    let expired = AtomicBool::new(false);
    let aborted = AtomicBool::new(false);

    let outcomes: Vec<(&String, InstrumentOutcome)> = pool.install(|| {
        instruments
            .par_iter()
            .map(|(id, rows)| {
                if cancel_flag.load(Ordering::Relaxed) || aborted.load(Ordering::Relaxed) {
                    return (id, InstrumentOutcome::Skipped);
                }
                if past_deadline(start, config.max_run_time) {
                    expired.store(true, Ordering::Relaxed);
                    return (id, InstrumentOutcome::Skipped);
                }

                match analyze_instrument(id, rows, &config.indicators) {
                    Ok(records) => (id, InstrumentOutcome::Done(records)),
                    Err(e) => {
                        if !config.isolate_failures {
                            aborted.store(true, Ordering::Relaxed);
                        }
                        (id, InstrumentOutcome::Failed(e))
                    }
                }
            })
            .collect()
    });

    if cancel_flag.load(Ordering::Relaxed) {
        return Err(AppError::RunCancelled);
    }
    if expired.load(Ordering::Relaxed) {
        return Err(AppError::RunTimedOut {
            elapsed_secs: start.elapsed().as_secs(),
        });
    }

    let mut batch = AnalysisBatch::default();
    for (id, outcome) in outcomes {
        match outcome {
            InstrumentOutcome::Done(records) => {
                batch.analyzed += 1;
                batch.records.extend(records);
            }
            InstrumentOutcome::Failed(e) if config.isolate_failures => {
                warn!(code = e.code(), "Skipping {}: {}", id, e);
                batch.failed.push(id.clone());
            }
            InstrumentOutcome::Failed(e) => return Err(e),
            InstrumentOutcome::Skipped => {}
        }
    }

    Ok(batch)
}

/// Resample, compute and label one instrument for every period.
pub fn analyze_instrument(
    instrument_id: &str,
    rows: &[SourceRow],
    set: &IndicatorSet,
) -> Result<Vec<OutputRecord>, AppError> {
    let series =
        daily_series(instrument_id, rows).map_err(|e| e.in_context(instrument_id, Period::Daily))?;

    let mut records = Vec::new();
    for period in Period::ALL {
        let analysed =
            analyze_series(&series, period, set).map_err(|e| e.in_context(instrument_id, period))?;
        records.extend(analysed);
    }
    Ok(records)
}

/// One period of one instrument: resample, indicators, signal.
pub fn analyze_series(
    series: &DailySeries,
    period: Period,
    set: &IndicatorSet,
) -> Result<Vec<OutputRecord>, AppError> {
    let resampled = resample(series, period);
    let rows = compute_indicators(&resampled, set)?;
    Ok(rows
        .iter()
        .map(|row| OutputRecord::from_row(&series.instrument_id, period, row, derive_signal(row)))
        .collect())
}

fn past_deadline(start: Instant, limit: Option<Duration>) -> bool {
    limit.is_some_and(|limit| start.elapsed() >= limit)
}
