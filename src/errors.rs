/// All application errors, categorized by pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ── Input ──
    #[error("Invalid period '{token}': must be 'daily', 'weekly', or 'monthly'")]
    InvalidPeriod { token: String },

    #[error("Unparseable trade date '{value}' for instrument {instrument}")]
    InvalidDate { instrument: String, value: String },

    #[error("Source read failed: {0}")]
    SourceRead(String),

    // ── Output ──
    #[error("Sink write failed: {0}")]
    SinkWrite(String),

    #[error("Failed to write file: {0}")]
    FileWrite(String),

    // ── Database ──
    #[error("Database error: {0}")]
    Database(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    // ── Indicator ──
    #[error("Invalid indicator parameters: {0}")]
    InvalidIndicatorParams(String),

    // ── Run ──
    #[error("Analysis of {instrument} ({period}) failed: {source}")]
    InstrumentFailed {
        instrument: String,
        period: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Every instrument failed ({failed} skipped); previous output kept")]
    AllInstrumentsFailed { failed: usize },

    #[error("Analysis run cancelled")]
    RunCancelled,

    #[error("Analysis run exceeded its time budget after {elapsed_secs}s")]
    RunTimedOut { elapsed_secs: u64 },

    // ── Configuration ──
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Serialization ──
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ── General ──
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code, used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidPeriod { .. } => "INVALID_PERIOD",
            AppError::InvalidDate { .. } => "INVALID_DATE",
            AppError::SourceRead(_) => "SOURCE_READ",
            AppError::SinkWrite(_) => "SINK_WRITE",
            AppError::FileWrite(_) => "FILE_WRITE",
            AppError::Database(_) => "DATABASE",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidIndicatorParams(_) => "INVALID_INDICATOR_PARAMS",
            AppError::InstrumentFailed { .. } => "INSTRUMENT_FAILED",
            AppError::AllInstrumentsFailed { .. } => "ALL_INSTRUMENTS_FAILED",
            AppError::RunCancelled => "RUN_CANCELLED",
            AppError::RunTimedOut { .. } => "RUN_TIMED_OUT",
            AppError::InvalidConfig(_) => "INVALID_CONFIG",
            AppError::Serialization(_) => "SERIALIZATION",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    /// Wrap a computation error with the instrument and period it came from.
    pub fn in_context(self, instrument: &str, period: impl ToString) -> Self {
        AppError::InstrumentFailed {
            instrument: instrument.to_string(),
            period: period.to_string(),
            source: Box::new(self),
        }
    }
}

// ── Conversions from external errors ──

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::FileWrite(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::FileWrite(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_context_keeps_source() {
        let err = AppError::InvalidDate {
            instrument: "ALK".into(),
            value: "yesterday".into(),
        }
        .in_context("ALK", "daily");

        assert_eq!(err.code(), "INSTRUMENT_FAILED");
        let msg = err.to_string();
        assert!(msg.contains("ALK"));
        assert!(msg.contains("daily"));
        assert!(msg.contains("yesterday"));
    }

    #[test]
    fn test_invalid_period_message() {
        let err = AppError::InvalidPeriod {
            token: "quarterly".into(),
        };
        assert_eq!(err.code(), "INVALID_PERIOD");
        assert!(err.to_string().contains("quarterly"));
    }
}
