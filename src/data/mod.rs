pub mod query;
pub mod sink;
pub mod source;

/// Quote a table or column name for use in a SQL statement.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
