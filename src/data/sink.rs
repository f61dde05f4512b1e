use std::path::Path;

use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::errors::AppError;
use crate::models::analysis::{indicator_columns, FourthOscillator, OutputRecord};

use super::quote_ident;

pub const INSTRUMENT_COLUMN: &str = "issuer_code";
pub const DATE_COLUMN: &str = "Date";
pub const PERIOD_COLUMN: &str = "time_period";
pub const SIGNAL_COLUMN: &str = "Signal";

/// Replace the output table in the database at `db_path` with `records`.
pub fn replace_output(
    db_path: &Path,
    table: &str,
    oscillator: FourthOscillator,
    records: &[OutputRecord],
) -> Result<usize, AppError> {
    let mut conn = Connection::open(db_path)
        .map_err(|e| AppError::SinkWrite(format!("{}: {}", db_path.display(), e)))?;
    write_replace(&mut conn, table, oscillator, records)
}

/// Write `records` into a fresh staging table and swap it in for `table`.
///
/// Everything happens in one transaction: readers see either the previous
/// table or the complete new one, and any failure leaves the previous table
/// untouched.
pub fn write_replace(
    conn: &mut Connection,
    table: &str,
    oscillator: FourthOscillator,
    records: &[OutputRecord],
) -> Result<usize, AppError> {
    let staging = format!("{}__staging_{}", table, uuid::Uuid::new_v4().simple());
    let columns = indicator_columns(oscillator);

    let tx = conn.transaction().map_err(sink_error)?;

    let indicator_defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} REAL", quote_ident(c)))
        .collect();
    tx.execute(
        &format!(
            "CREATE TABLE {} ({} TEXT NOT NULL, {} TEXT NOT NULL, {} TEXT NOT NULL, {} TEXT NOT NULL, {})",
            quote_ident(&staging),
            quote_ident(INSTRUMENT_COLUMN),
            quote_ident(DATE_COLUMN),
            quote_ident(PERIOD_COLUMN),
            quote_ident(SIGNAL_COLUMN),
            indicator_defs.join(", ")
        ),
        [],
    )
    .map_err(sink_error)?;
    debug!("Created staging table {}", staging);

    {
        let placeholders: Vec<String> = (1..=13).map(|i| format!("?{}", i)).collect();
        let mut stmt = tx
            .prepare(&format!(
                "INSERT INTO {} VALUES ({})",
                quote_ident(&staging),
                placeholders.join(", ")
            ))
            .map_err(sink_error)?;

        for r in records {
            stmt.execute(params![
                r.instrument_id,
                r.bucket_date.format("%Y-%m-%d").to_string(),
                r.period.as_str(),
                r.signal.as_str(),
                r.sma_20,
                r.sma_50,
                r.ema_20,
                r.ema_50,
                r.rsi,
                r.macd,
                r.stoch,
                r.cci,
                r.fourth_oscillator,
            ])
            .map_err(sink_error)?;
        }
    }

    tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)), [])
        .map_err(sink_error)?;
    tx.execute(
        &format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&staging),
            quote_ident(table)
        ),
        [],
    )
    .map_err(sink_error)?;
    tx.execute(
        &format!(
            "CREATE INDEX {} ON {} ({}, {}, {})",
            quote_ident(&format!("idx_{}_instrument_period", table)),
            quote_ident(table),
            quote_ident(INSTRUMENT_COLUMN),
            quote_ident(PERIOD_COLUMN),
            quote_ident(DATE_COLUMN)
        ),
        [],
    )
    .map_err(sink_error)?;

    tx.commit().map_err(sink_error)?;
    info!("Replaced table '{}' with {} rows", table, records.len());
    Ok(records.len())
}

fn sink_error(err: rusqlite::Error) -> AppError {
    AppError::SinkWrite(err.to_string())
}
