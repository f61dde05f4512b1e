//! Signal derivation.
//!
//! Rules run in a fixed order and each applicable rule overwrites the
//! previous result:
//! 1. Hold
//! 2. RSI < 30 → Buy, RSI > 70 → Sell
//! 3. price > SMA_20 → Buy
//! 4. price < SMA_20 → Sell
//!
//! The SMA comparison therefore dominates; the RSI label only survives when
//! the price equals SMA_20 or SMA_20 is not yet defined.

use crate::models::analysis::{IndicatorRow, Signal};

pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;

/// Derive the categorical signal for one row.
pub fn derive_signal(row: &IndicatorRow) -> Signal {
    let mut signal = Signal::Hold;

    if let Some(rsi) = row.rsi {
        if rsi < RSI_OVERSOLD {
            signal = Signal::Buy;
        }
        if rsi > RSI_OVERBOUGHT {
            signal = Signal::Sell;
        }
    }

    if let Some(sma) = row.sma_20 {
        if row.last_price > sma {
            signal = Signal::Buy;
        }
        if row.last_price < sma {
            signal = Signal::Sell;
        }
    }

    signal
}
