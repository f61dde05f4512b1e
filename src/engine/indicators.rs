use crate::errors::AppError;
use crate::models::analysis::{FourthOscillator, IndicatorRow, IndicatorSet};
use crate::models::observation::ResampledSeries;

/// Compute the full indicator set for every bar of a series.
///
/// Window-based values are NaN internally until their window is satisfied
/// and surface as `None` on the returned rows.
pub fn compute_indicators(
    series: &ResampledSeries,
    set: &IndicatorSet,
) -> Result<Vec<IndicatorRow>, AppError> {
    set.validate()?;

    let close = series.last_prices();
    let high = series.highs();
    let low = series.lows();

    let sma_short = sma(&close, set.sma_short);
    let sma_long = sma(&close, set.sma_long);
    let ema_short = ewm_mean(&close, set.ema_short);
    let ema_long = ewm_mean(&close, set.ema_long);
    let rsi_values = rsi(&close, set.rsi_period);
    let macd_line = macd(&close, set.macd_fast, set.macd_slow);
    let stoch_values = stochastic_k(&high, &low, &close, set.stoch_period);
    let cci_values = cci(&high, &low, &close, set.cci_period);
    let fourth = match set.fourth_oscillator {
        FourthOscillator::WilliamsR => williams_r(&high, &low, &close, set.williams_period),
        FourthOscillator::Momentum => momentum(&close, set.momentum_period),
    };

    let rows = series
        .bars
        .iter()
        .enumerate()
        .map(|(i, bar)| IndicatorRow {
            date: bar.date,
            last_price: bar.last_price,
            sma_20: finite(sma_short[i]),
            sma_50: finite(sma_long[i]),
            ema_20: finite(ema_short[i]),
            ema_50: finite(ema_long[i]),
            rsi: finite(rsi_values[i]),
            macd: finite(macd_line[i]),
            stoch: finite(stoch_values[i]),
            cci: finite(cci_values[i]),
            fourth_oscillator: finite(fourth[i]),
        })
        .collect();

    Ok(rows)
}

// ── Helpers ──

/// NaN and infinities mark values that could not be computed.
fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Rolling (highest high, lowest low). NaN until the window is full or
/// while the window holds a missing value.
fn rolling_extremes(high: &[f64], low: &[f64], period: usize) -> (Vec<f64>, Vec<f64>) {
    let len = high.len();
    let mut highest = vec![f64::NAN; len];
    let mut lowest = vec![f64::NAN; len];
    if period == 0 || len < period {
        return (highest, lowest);
    }
    for i in (period - 1)..len {
        let window_high = &high[i + 1 - period..=i];
        let window_low = &low[i + 1 - period..=i];
        if window_high.iter().chain(window_low).any(|v| v.is_nan()) {
            continue;
        }
        highest[i] = window_high.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        lowest[i] = window_low.iter().cloned().fold(f64::INFINITY, f64::min);
    }
    (highest, lowest)
}

// ── SMA ──

/// Simple Moving Average. First `period-1` values are NaN, as is any
/// window containing a missing value.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    let len = data.len();
    let mut result = vec![f64::NAN; len];
    if period == 0 || len < period {
        return result;
    }
    let mut sum = 0.0f64;
    let mut missing = 0usize;
    for i in 0..len {
        if data[i].is_nan() {
            missing += 1;
        } else {
            sum += data[i];
        }
        if i >= period {
            let leaving = data[i - period];
            if leaving.is_nan() {
                missing -= 1;
            } else {
                sum -= leaving;
            }
        }
        if i + 1 >= period && missing == 0 {
            result[i] = sum / period as f64;
        }
    }
    result
}

// ── EMA ──

/// Adjusted exponentially weighted mean with α = 2/(span+1).
///
/// Every prior observation contributes with weight (1-α)^k, so the value is
/// defined from the first observation. Missing values still age the weights.
pub fn ewm_mean(data: &[f64], span: usize) -> Vec<f64> {
    let len = data.len();
    let mut result = vec![f64::NAN; len];
    if span == 0 {
        return result;
    }
    let decay = 1.0 - 2.0 / (span as f64 + 1.0);
    let mut numerator = 0.0f64;
    let mut denominator = 0.0f64;
    for i in 0..len {
        numerator *= decay;
        denominator *= decay;
        if !data[i].is_nan() {
            numerator += data[i];
            denominator += 1.0;
        }
        if denominator > 0.0 {
            result[i] = numerator / denominator;
        }
    }
    result
}

/// Recursive EMA seeded with the first observation: y = y + α·(x - y).
///
/// NaN until `span` observations have been seen. A missing value carries
/// the previous average forward.
pub fn ema(data: &[f64], span: usize) -> Vec<f64> {
    let len = data.len();
    let mut result = vec![f64::NAN; len];
    if span == 0 {
        return result;
    }
    let multiplier = 2.0 / (span as f64 + 1.0);
    let mut current: Option<f64> = None;
    let mut seen = 0usize;
    for i in 0..len {
        if !data[i].is_nan() {
            seen += 1;
            current = Some(match current {
                Some(prev) => (data[i] - prev) * multiplier + prev,
                None => data[i],
            });
        }
        if seen >= span {
            if let Some(value) = current {
                result[i] = value;
            }
        }
    }
    result
}

// ── RSI ──

/// Relative Strength Index with Wilder smoothing: recursive averages of up
/// and down moves with α = 1/period, seeded with a zero move at index 0.
/// First `period` values are NaN.
///
/// A missing price counts as no move for the averages and is NaN itself.
pub fn rsi(close: &[f64], period: usize) -> Vec<f64> {
    let len = close.len();
    let mut result = vec![f64::NAN; len];
    if period == 0 || len < period + 1 {
        return result;
    }

    let alpha = 1.0 / period as f64;
    let mut avg_gain = 0.0f64;
    let mut avg_loss = 0.0f64;

    for i in 1..len {
        let change = close[i] - close[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else if change < 0.0 {
            (0.0, -change)
        } else {
            (0.0, 0.0)
        };
        avg_gain += alpha * (gain - avg_gain);
        avg_loss += alpha * (loss - avg_loss);

        if i >= period && !close[i].is_nan() {
            result[i] = rsi_value(avg_gain, avg_loss);
        }
    }
    result
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

// ── MACD ──

/// MACD line: fast EMA minus slow EMA.
///
/// NaN until the slow EMA has `slow_period` observations.
pub fn macd(close: &[f64], fast_period: usize, slow_period: usize) -> Vec<f64> {
    let len = close.len();
    let fast_ema = ema(close, fast_period);
    let slow_ema = ema(close, slow_period);

    let mut macd_line = vec![f64::NAN; len];
    for i in 0..len {
        if !fast_ema[i].is_nan() && !slow_ema[i].is_nan() {
            macd_line[i] = fast_ema[i] - slow_ema[i];
        }
    }
    macd_line
}

// ── Stochastic ──

/// Stochastic %K: position of the close within the `k_period` high/low range.
pub fn stochastic_k(high: &[f64], low: &[f64], close: &[f64], k_period: usize) -> Vec<f64> {
    let len = high.len();
    let mut k = vec![f64::NAN; len];
    let (highest, lowest) = rolling_extremes(high, low, k_period);
    for i in 0..len {
        let range = highest[i] - lowest[i];
        if range.is_nan() || range == 0.0 {
            continue;
        }
        k[i] = (close[i] - lowest[i]) / range * 100.0;
    }
    k
}

// ── CCI ──

/// Commodity Channel Index over the typical price (high + low + close) / 3.
pub fn cci(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let len = high.len();
    let mut result = vec![f64::NAN; len];
    if period == 0 || len < period {
        return result;
    }

    // Typical price
    let tp: Vec<f64> = (0..len).map(|i| (high[i] + low[i] + close[i]) / 3.0).collect();

    for i in (period - 1)..len {
        let window = &tp[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = window.iter().sum::<f64>() / period as f64;
        let mean_dev = window.iter().map(|v| (v - mean).abs()).sum::<f64>() / period as f64;
        if mean_dev != 0.0 {
            result[i] = (tp[i] - mean) / (0.015 * mean_dev);
        }
    }
    result
}

// ── Williams %R ──

/// Williams %R, in [-100, 0].
pub fn williams_r(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let len = high.len();
    let mut result = vec![f64::NAN; len];
    let (highest, lowest) = rolling_extremes(high, low, period);
    for i in 0..len {
        let range = highest[i] - lowest[i];
        if range.is_nan() || range == 0.0 {
            continue;
        }
        result[i] = (highest[i] - close[i]) / range * -100.0;
    }
    result
}

// ── Momentum ──

/// Price difference over `period` bars.
pub fn momentum(close: &[f64], period: usize) -> Vec<f64> {
    let len = close.len();
    let mut result = vec![f64::NAN; len];
    for i in period..len {
        result[i] = close[i] - close[i - period];
    }
    result
}

// ══════════════════════════════════════════════════════════════
// Tests
// ══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::observation::PriceBar;
    use crate::models::period::Period;
    use chrono::NaiveDate;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        if a.is_nan() && b.is_nan() {
            return true;
        }
        (a - b).abs() < epsilon
    }

    fn assert_approx(actual: f64, expected: f64, epsilon: f64, msg: &str) {
        assert!(
            approx_eq(actual, expected, epsilon),
            "{}: expected {}, got {}",
            msg,
            expected,
            actual
        );
    }

    fn make_series(closes: &[f64]) -> ResampledSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        ResampledSeries {
            instrument_id: "TEST".into(),
            period: Period::Daily,
            bars: closes
                .iter()
                .enumerate()
                .map(|(i, &c)| PriceBar {
                    date: start + chrono::Duration::days(i as i64),
                    last_price: c,
                    high: c + 1.0,
                    low: c - 1.0,
                    volume: 1000.0,
                    turnover: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_sma_basic() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let result = sma(&data, 3);
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert_approx(result[2], 2.0, 1e-10, "SMA[2]");
        assert_approx(result[3], 3.0, 1e-10, "SMA[3]");
        assert_approx(result[9], 9.0, 1e-10, "SMA[9]");
    }

    #[test]
    fn test_sma_missing_value_blanks_window() {
        let data = vec![10.0, 11.0, f64::NAN, 13.0, 14.0, 15.0];
        let result = sma(&data, 3);
        assert!(result[2].is_nan());
        assert!(result[3].is_nan());
        assert!(result[4].is_nan());
        assert_approx(result[5], 14.0, 1e-10, "SMA[5]");
    }

    #[test]
    fn test_sma_20_warmup() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let result = sma(&closes, 20);
        for i in 0..19 {
            assert!(result[i].is_nan(), "SMA_20[{}] should be NaN", i);
        }
        for i in 19..30 {
            let expected = closes[i + 1 - 20..=i].iter().sum::<f64>() / 20.0;
            assert_approx(result[i], expected, 1e-9, "SMA_20");
        }
    }

    #[test]
    fn test_ewm_mean_defined_from_first_value() {
        let result = ewm_mean(&[1.0, 2.0, 3.0], 3);
        // α = 0.5: y1 = (2 + 0.5·1) / (1 + 0.5)
        assert_approx(result[0], 1.0, 1e-12, "EWM[0]");
        assert_approx(result[1], 2.5 / 1.5, 1e-12, "EWM[1]");
        // y2 = (3 + 0.5·2 + 0.25·1) / (1 + 0.5 + 0.25)
        assert_approx(result[2], 4.25 / 1.75, 1e-12, "EWM[2]");
    }

    #[test]
    fn test_ewm_mean_constant_series() {
        let result = ewm_mean(&[7.0; 60], 50);
        assert!(result.iter().all(|v| approx_eq(*v, 7.0, 1e-12)));
    }

    #[test]
    fn test_ema_seeded_with_first_value() {
        let data = vec![22.27, 22.19, 22.08, 22.17, 22.18, 22.13];
        let result = ema(&data, 5);
        for i in 0..4 {
            assert!(result[i].is_nan(), "EMA[{}] should be NaN during warm-up", i);
        }
        // Recursion runs from index 0, only the output is gated
        let m = 2.0 / 6.0;
        let mut y = data[0];
        for &x in &data[1..5] {
            y += (x - y) * m;
        }
        assert_approx(result[4], y, 1e-12, "EMA[4]");
    }

    #[test]
    fn test_rsi_basic() {
        let data = vec![
            44.0, 44.34, 44.09, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
        ];
        let result = rsi(&data, 14);
        for i in 0..14 {
            assert!(result[i].is_nan(), "RSI[{}] should be NaN", i);
        }
        assert!(result[14] > 50.0 && result[14] < 90.0, "RSI[14] = {} not in expected range", result[14]);
    }

    #[test]
    fn test_rsi_matches_recursive_wilder_reference() {
        let data: Vec<f64> = (0..30)
            .map(|i| 100.0 + 0.5 * i as f64 + 3.0 * (i as f64 * 0.7).sin())
            .collect();
        let result = rsi(&data, 14);
        assert!(result[13].is_nan());
        assert_approx(result[14], 62.49344614522554, 1e-6, "RSI[14]");
        assert_approx(result[20], 76.98941442080444, 1e-6, "RSI[20]");
        assert_approx(result[29], 76.14806897162339, 1e-6, "RSI[29]");
    }

    #[test]
    fn test_rsi_missing_price_is_nan_but_series_continues() {
        let mut data: Vec<f64> = (0..25).map(|i| 100.0 + i as f64).collect();
        data[18] = f64::NAN;
        let result = rsi(&data, 14);
        assert!(result[18].is_nan());
        assert!(result[20].is_finite());
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let data: Vec<f64> = (0..25).map(|i| 100.0 + i as f64).collect();
        let result = rsi(&data, 14);
        for v in &result[14..] {
            assert_approx(*v, 100.0, 1e-12, "RSI all gains");
        }
    }

    #[test]
    fn test_rsi_all_losses_is_0() {
        let data: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let result = rsi(&data, 14);
        assert_approx(result[19], 0.0, 1e-12, "RSI all losses");
    }

    #[test]
    fn test_macd_basic() {
        let data: Vec<f64> = (1..=50).map(|i| 100.0 + (i as f64) * 0.5).collect();
        let macd_line = macd(&data, 12, 26);
        assert_eq!(macd_line.len(), 50);
        assert!(macd_line[24].is_nan());
        assert!(macd_line[25].is_finite());
        assert!(macd_line[49] > 0.0, "MACD should be positive in uptrend");
    }

    #[test]
    fn test_stochastic_k_basic() {
        let high = vec![130.0, 132.0, 131.0, 133.0, 135.0];
        let low = vec![126.0, 128.0, 127.0, 129.0, 131.0];
        let close = vec![128.0, 131.0, 129.0, 132.0, 134.0];
        let k = stochastic_k(&high, &low, &close, 5);
        assert!(k[3].is_nan());
        // highest=135, lowest=126: (134-126)/9*100
        assert_approx(k[4], 8.0 / 9.0 * 100.0, 1e-10, "%K[4]");
    }

    #[test]
    fn test_flat_range_is_undefined() {
        let flat = vec![10.0; 20];
        assert!(stochastic_k(&flat, &flat, &flat, 14).iter().all(|v| v.is_nan()));
        assert!(williams_r(&flat, &flat, &flat, 14).iter().all(|v| v.is_nan()));
        assert!(cci(&flat, &flat, &flat, 5).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_cci_basic() {
        let high = vec![25.0, 25.5, 26.0, 25.5, 25.0, 26.0, 27.0, 26.5, 26.0, 25.5];
        let low = vec![24.0, 24.5, 25.0, 24.5, 24.0, 25.0, 26.0, 25.5, 25.0, 24.5];
        let close = vec![24.5, 25.0, 25.5, 25.0, 24.5, 25.5, 26.5, 26.0, 25.5, 25.0];
        let result = cci(&high, &low, &close, 5);
        assert!(result[3].is_nan());
        assert!(result[4].is_finite(), "CCI[4] should be finite");
        // Rising typical price at index 6 sits above its mean
        assert!(result[6] > 0.0);
    }

    #[test]
    fn test_williams_r_basic() {
        let high = vec![130.0, 132.0, 131.0, 133.0, 135.0];
        let low = vec![126.0, 128.0, 127.0, 129.0, 131.0];
        let close = vec![128.0, 131.0, 129.0, 132.0, 134.0];
        let result = williams_r(&high, &low, &close, 5);
        // At index 4: highest=135, lowest=126, range=9, WR = (135-134)/9 * -100 = -11.11
        assert_approx(result[4], (135.0 - 134.0) / 9.0 * -100.0, 1e-10, "WilliamsR[4]");
    }

    #[test]
    fn test_momentum_basic() {
        let result = momentum(&[100.0, 110.0, 105.0, 115.0], 2);
        assert!(result[1].is_nan());
        assert_approx(result[2], 5.0, 1e-12, "MOM[2]");
        assert_approx(result[3], 5.0, 1e-12, "MOM[3]");
    }

    #[test]
    fn test_compute_indicators_row_per_bar() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let series = make_series(&closes);
        let rows = compute_indicators(&series, &IndicatorSet::default()).unwrap();

        assert_eq!(rows.len(), 60);
        assert!(rows[18].sma_20.is_none());
        assert!(rows[19].sma_20.is_some());
        assert!(rows[48].sma_50.is_none());
        assert!(rows[49].sma_50.is_some());
        assert!(rows[0].ema_20.is_some());
        assert!(rows[0].ema_50.is_some());
        assert!(rows[13].rsi.is_none());
        assert!(rows[14].rsi.is_some());
        assert!(rows[24].macd.is_none());
        assert!(rows[25].macd.is_some());
        assert!(rows[12].stoch.is_none());
        assert!(rows[13].stoch.is_some());
        assert!(rows[18].cci.is_none());
        assert!(rows[19].cci.is_some());
        assert!(rows[12].fourth_oscillator.is_none());
        assert!(rows[13].fourth_oscillator.is_some());
    }

    #[test]
    fn test_compute_indicators_momentum_slot() {
        let closes: Vec<f64> = (0..15).map(|i| 50.0 + i as f64).collect();
        let series = make_series(&closes);
        let set = IndicatorSet::default().with_fourth_oscillator(FourthOscillator::Momentum);
        let rows = compute_indicators(&series, &set).unwrap();
        assert!(rows[9].fourth_oscillator.is_none());
        assert_approx(rows[10].fourth_oscillator.unwrap(), 10.0, 1e-12, "Momentum[10]");
    }

    #[test]
    fn test_compute_indicators_short_series() {
        let series = make_series(&[10.0, 11.0]);
        let rows = compute_indicators(&series, &IndicatorSet::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.sma_20.is_none() && r.rsi.is_none() && r.macd.is_none()));
        assert!(rows.iter().all(|r| r.ema_20.is_some()));
    }

    #[test]
    fn test_compute_indicators_rejects_bad_params() {
        let series = make_series(&[10.0]);
        let set = IndicatorSet {
            sma_short: 0,
            ..Default::default()
        };
        assert!(matches!(
            compute_indicators(&series, &set),
            Err(AppError::InvalidIndicatorParams(_))
        ));
    }
}
