use std::io::Write;
use std::path::Path;

use serde_json::Value;

use crate::data::query::AnalysisTable;
use crate::errors::AppError;

/// Write analysis rows to a CSV file. Returns the number of data rows.
pub fn write_analysis_csv(table: &AnalysisTable, path: &Path) -> Result<usize, AppError> {
    let file = std::fs::File::create(path)
        .map_err(|e| AppError::FileWrite(format!("Cannot create CSV {}: {}", path.display(), e)))?;
    write_analysis(table, file)
}

/// Write analysis rows as CSV to any writer.
///
/// Insufficient-data cells (NULL) are written empty.
pub fn write_analysis<W: Write>(table: &AnalysisTable, writer: W) -> Result<usize, AppError> {
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record(&table.columns)
        .map_err(|e| AppError::FileWrite(e.to_string()))?;

    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(cell).collect();
        wtr.write_record(&cells)
            .map_err(|e| AppError::FileWrite(e.to_string()))?;
    }

    wtr.flush().map_err(|e| AppError::FileWrite(e.to_string()))?;
    Ok(table.rows.len())
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{:.6}", f),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> AnalysisTable {
        AnalysisTable {
            columns: vec!["issuer_code".into(), "Date".into(), "Signal".into(), "SMA_20".into()],
            rows: vec![
                vec![json!("ALK"), json!("2024-01-02"), json!("Hold"), Value::Null],
                vec![json!("ALK"), json!("2024-01-03"), json!("Buy"), json!(101.25)],
            ],
        }
    }

    #[test]
    fn test_nulls_are_empty_cells() {
        let mut buf = Vec::new();
        let written = write_analysis(&table(), &mut buf).unwrap();
        assert_eq!(written, 2);

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "issuer_code,Date,Signal,SMA_20");
        assert_eq!(lines[1], "ALK,2024-01-02,Hold,");
        assert_eq!(lines[2], "ALK,2024-01-03,Buy,101.250000");
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.csv");
        write_analysis_csv(&table(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_column_with_percent_sign_is_kept() {
        let t = AnalysisTable {
            columns: vec!["Williams %R".into()],
            rows: vec![vec![json!(-42.5)]],
        };
        let mut buf = Vec::new();
        write_analysis(&t, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("Williams %R\n"));
    }
}
