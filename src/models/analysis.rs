use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

use super::period::Period;

// ── Indicator parameters ──

/// Which oscillator fills the fourth oscillator slot of a row.
///
/// `Momentum` has no agreed formula upstream; here it is the plain
/// `close[t] - close[t - period]` difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FourthOscillator {
    #[default]
    WilliamsR,
    Momentum,
}

impl FourthOscillator {
    /// Output column name for this oscillator.
    pub fn column_name(&self) -> &'static str {
        match self {
            FourthOscillator::WilliamsR => "Williams %R",
            FourthOscillator::Momentum => "Momentum",
        }
    }
}

impl std::str::FromStr for FourthOscillator {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "williams_r" | "williams_%r" | "williamsr" => Ok(FourthOscillator::WilliamsR),
            "momentum" => Ok(FourthOscillator::Momentum),
            other => Err(AppError::InvalidConfig(format!(
                "Unknown fourth oscillator: {}",
                other
            ))),
        }
    }
}

/// Window lengths of the fixed indicator set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub sma_short: usize,
    pub sma_long: usize,
    pub ema_short: usize,
    pub ema_long: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub stoch_period: usize,
    pub cci_period: usize,
    pub williams_period: usize,
    pub momentum_period: usize,
    pub fourth_oscillator: FourthOscillator,
}

impl Default for IndicatorSet {
    fn default() -> Self {
        Self {
            sma_short: 20,
            sma_long: 50,
            ema_short: 20,
            ema_long: 50,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            stoch_period: 14,
            cci_period: 20,
            williams_period: 14,
            momentum_period: 10,
            fourth_oscillator: FourthOscillator::WilliamsR,
        }
    }
}

impl IndicatorSet {
    pub fn with_fourth_oscillator(mut self, oscillator: FourthOscillator) -> Self {
        self.fourth_oscillator = oscillator;
        self
    }

    /// Reject zero windows and an inverted MACD pair.
    pub fn validate(&self) -> Result<(), AppError> {
        let windows = [
            ("sma_short", self.sma_short),
            ("sma_long", self.sma_long),
            ("ema_short", self.ema_short),
            ("ema_long", self.ema_long),
            ("rsi_period", self.rsi_period),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("stoch_period", self.stoch_period),
            ("cci_period", self.cci_period),
            ("williams_period", self.williams_period),
            ("momentum_period", self.momentum_period),
        ];
        if let Some((name, _)) = windows.iter().find(|(_, w)| *w == 0) {
            return Err(AppError::InvalidIndicatorParams(format!(
                "{} must be at least 1",
                name
            )));
        }
        if self.macd_fast >= self.macd_slow {
            return Err(AppError::InvalidIndicatorParams(format!(
                "MACD fast span {} must be shorter than slow span {}",
                self.macd_fast, self.macd_slow
            )));
        }
        Ok(())
    }
}

// ── Rows ──

/// Categorical trade recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "Buy",
            Signal::Sell => "Sell",
            Signal::Hold => "Hold",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indicator values for one bucket. `None` marks insufficient history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub date: NaiveDate,
    pub last_price: f64,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub ema_20: Option<f64>,
    pub ema_50: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub stoch: Option<f64>,
    pub cci: Option<f64>,
    pub fourth_oscillator: Option<f64>,
}

/// The persisted projection of one analysed bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub instrument_id: String,
    pub bucket_date: NaiveDate,
    pub period: Period,
    pub signal: Signal,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub ema_20: Option<f64>,
    pub ema_50: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub stoch: Option<f64>,
    pub cci: Option<f64>,
    pub fourth_oscillator: Option<f64>,
}

impl OutputRecord {
    pub fn from_row(instrument_id: &str, period: Period, row: &IndicatorRow, signal: Signal) -> Self {
        OutputRecord {
            instrument_id: instrument_id.to_string(),
            bucket_date: row.date,
            period,
            signal,
            sma_20: row.sma_20,
            sma_50: row.sma_50,
            ema_20: row.ema_20,
            ema_50: row.ema_50,
            rsi: row.rsi,
            macd: row.macd,
            stoch: row.stoch,
            cci: row.cci,
            fourth_oscillator: row.fourth_oscillator,
        }
    }
}

/// Indicator column names in output order, ending with the configured oscillator.
pub fn indicator_columns(oscillator: FourthOscillator) -> [&'static str; 9] {
    [
        "SMA_20",
        "SMA_50",
        "EMA_20",
        "EMA_50",
        "RSI",
        "MACD",
        "Stoch",
        "CCI",
        oscillator.column_name(),
    ]
}
