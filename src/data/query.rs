//! Read-side queries over the source and output tables.

use rusqlite::types::{ToSql, ValueRef};
use rusqlite::Connection;
use serde_json::{Map, Value};

use crate::config::SourceSchema;
use crate::errors::AppError;
use crate::models::period::Period;

use super::quote_ident;
use super::sink::{DATE_COLUMN, INSTRUMENT_COLUMN, PERIOD_COLUMN};

/// Rows returned by `historical_analysis` when no limit is given.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Column names plus row values of an output-table query.
#[derive(Debug, Clone, Default)]
pub struct AnalysisTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl AnalysisTable {
    /// One JSON object per row, keyed by column name.
    pub fn to_json_rows(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut obj = Map::new();
                for (col, val) in self.columns.iter().zip(row) {
                    obj.insert(col.clone(), val.clone());
                }
                Value::Object(obj)
            })
            .collect()
    }
}

/// Distinct instrument ids present in the source table.
pub fn list_instruments(conn: &Connection, schema: &SourceSchema) -> Result<Vec<String>, AppError> {
    let sql = format!(
        "SELECT DISTINCT {col} FROM {table} WHERE {col} IS NOT NULL ORDER BY {col}",
        col = quote_ident(&schema.instrument_column),
        table = quote_ident(&schema.table),
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| AppError::SourceRead(e.to_string()))?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Newest analysis row for an instrument and period token.
pub fn latest_analysis(
    conn: &Connection,
    table: &str,
    instrument: &str,
    period_token: &str,
) -> Result<AnalysisTable, AppError> {
    historical_analysis(conn, table, instrument, period_token, 1)
}

/// Newest-first analysis rows for an instrument and period token.
pub fn historical_analysis(
    conn: &Connection,
    table: &str,
    instrument: &str,
    period_token: &str,
    limit: usize,
) -> Result<AnalysisTable, AppError> {
    let period: Period = period_token.parse()?;
    let sql = format!(
        "SELECT * FROM {} WHERE {} = ?1 AND {} = ?2 ORDER BY {} DESC LIMIT ?3",
        quote_ident(table),
        quote_ident(INSTRUMENT_COLUMN),
        quote_ident(PERIOD_COLUMN),
        quote_ident(DATE_COLUMN),
    );
    let limit = limit as i64;
    let result = select(conn, &sql, &[&instrument, &period.as_str(), &limit])?;
    if result.rows.is_empty() {
        return Err(AppError::NotFound(format!(
            "No analysis for {} ({})",
            instrument, period
        )));
    }
    Ok(result)
}

/// Every output row, optionally narrowed to one instrument and/or period,
/// ordered by instrument, period and date.
pub fn output_rows(
    conn: &Connection,
    table: &str,
    instrument: Option<&str>,
    period: Option<Period>,
) -> Result<AnalysisTable, AppError> {
    let mut clauses = Vec::new();
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();
    if let Some(id) = instrument {
        args.push(Box::new(id.to_string()));
        clauses.push(format!("{} = ?{}", quote_ident(INSTRUMENT_COLUMN), args.len()));
    }
    if let Some(p) = period {
        args.push(Box::new(p.as_str()));
        clauses.push(format!("{} = ?{}", quote_ident(PERIOD_COLUMN), args.len()));
    }
    let filter = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT * FROM {}{} ORDER BY {}, {}, {}",
        quote_ident(table),
        filter,
        quote_ident(INSTRUMENT_COLUMN),
        quote_ident(PERIOD_COLUMN),
        quote_ident(DATE_COLUMN),
    );
    let refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
    select(conn, &sql, &refs)
}

// ── Helpers ──

fn select(conn: &Connection, sql: &str, args: &[&dyn ToSql]) -> Result<AnalysisTable, AppError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt.query(args)?;
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(value_to_json(row.get_ref(i)?));
        }
        rows.push(values);
    }
    Ok(AnalysisTable { columns, rows })
}

/// Convert a SQLite cell to a JSON value. NULL stays null.
fn value_to_json(val: ValueRef<'_>) -> Value {
    match val {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Number(n.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<{} bytes>", b.len())),
    }
}
