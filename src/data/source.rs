use std::collections::BTreeMap;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info};

use crate::config::SourceSchema;
use crate::errors::AppError;
use crate::models::observation::{DailySeries, RawObservation};

use super::quote_ident;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

/// One source row before its date has been parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub instrument_id: String,
    pub trade_date: String,
    pub last_price: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub turnover: f64,
}

/// Read every source row, grouped by instrument id.
///
/// The connection is opened read-only and closed before returning.
pub fn load_source(
    db_path: &Path,
    schema: &SourceSchema,
) -> Result<BTreeMap<String, Vec<SourceRow>>, AppError> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| AppError::SourceRead(format!("{}: {}", db_path.display(), e)))?;

    let rows = read_source_rows(&conn, schema)?;
    let grouped = group_by_instrument(rows);
    info!(
        "Loaded {} instruments from '{}'",
        grouped.len(),
        schema.table
    );
    Ok(grouped)
}

/// Select all rows of the source table.
pub fn read_source_rows(conn: &Connection, schema: &SourceSchema) -> Result<Vec<SourceRow>, AppError> {
    let sql = format!(
        "SELECT {}, {}, {}, {}, {}, {}, {} FROM {} ORDER BY {}, {}",
        quote_ident(&schema.instrument_column),
        quote_ident(&schema.date_column),
        quote_ident(&schema.price_column),
        quote_ident(&schema.high_column),
        quote_ident(&schema.low_column),
        quote_ident(&schema.volume_column),
        quote_ident(&schema.turnover_column),
        quote_ident(&schema.table),
        quote_ident(&schema.instrument_column),
        quote_ident(&schema.date_column),
    );
    debug!("Source query: {}", sql);

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| AppError::SourceRead(format!("table '{}': {}", schema.table, e)))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(SourceRow {
                instrument_id: text_value(row.get_ref(0)?),
                trade_date: text_value(row.get_ref(1)?),
                last_price: numeric_value(row.get_ref(2)?),
                high: numeric_value(row.get_ref(3)?),
                low: numeric_value(row.get_ref(4)?),
                volume: numeric_value(row.get_ref(5)?),
                turnover: numeric_value(row.get_ref(6)?),
            })
        })
        .map_err(|e| AppError::SourceRead(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::SourceRead(e.to_string()))?;

    Ok(rows)
}

/// Group rows by instrument, keeping source order within each group.
pub fn group_by_instrument(rows: Vec<SourceRow>) -> BTreeMap<String, Vec<SourceRow>> {
    let mut grouped: BTreeMap<String, Vec<SourceRow>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.instrument_id.clone()).or_default().push(row);
    }
    grouped
}

/// Parse an instrument's rows into a date-sorted daily series.
pub fn daily_series(instrument_id: &str, rows: &[SourceRow]) -> Result<DailySeries, AppError> {
    let observations = rows
        .iter()
        .map(|row| {
            Ok(RawObservation {
                instrument_id: instrument_id.to_string(),
                trade_date: parse_trade_date(instrument_id, &row.trade_date)?,
                last_price: row.last_price,
                high: row.high,
                low: row.low,
                volume: row.volume,
                turnover: row.turnover,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;
    Ok(DailySeries::new(instrument_id, observations))
}

/// Parse a trade date in any of the accepted layouts.
pub fn parse_trade_date(instrument_id: &str, value: &str) -> Result<NaiveDate, AppError> {
    let trimmed = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(|dt| dt.date())
        })
        .ok_or_else(|| AppError::InvalidDate {
            instrument: instrument_id.to_string(),
            value: value.to_string(),
        })
}

// ── Helpers ──

fn text_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

/// NULL and unparseable text become NaN, a missing value.
fn numeric_value(value: ValueRef<'_>) -> f64 {
    match value {
        ValueRef::Integer(i) => i as f64,
        ValueRef::Real(f) => f,
        ValueRef::Text(t) => String::from_utf8_lossy(t)
            .trim()
            .replace(',', "")
            .parse::<f64>()
            .unwrap_or(f64::NAN),
        ValueRef::Null | ValueRef::Blob(_) => f64::NAN,
    }
}
