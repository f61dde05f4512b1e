use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::period::Period;

/// One trading day for one instrument, as read from the source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub instrument_id: String,
    pub trade_date: NaiveDate,
    pub last_price: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub turnover: f64,
}

/// All observations of a single instrument, ascending by trade date.
///
/// Duplicate dates are kept as separate observations.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    pub instrument_id: String,
    pub observations: Vec<RawObservation>,
}

impl DailySeries {
    /// Build a series, sorting by date. The sort is stable so same-day
    /// duplicates keep their source order.
    pub fn new(instrument_id: impl Into<String>, mut observations: Vec<RawObservation>) -> Self {
        observations.sort_by_key(|o| o.trade_date);
        Self {
            instrument_id: instrument_id.into(),
            observations,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// A single point of a (possibly aggregated) price series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Trade date for daily bars, bucket end date for weekly/monthly bars.
    pub date: NaiveDate,
    pub last_price: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    /// Only carried by daily bars; aggregation drops it.
    pub turnover: Option<f64>,
}

impl From<&RawObservation> for PriceBar {
    fn from(obs: &RawObservation) -> Self {
        PriceBar {
            date: obs.trade_date,
            last_price: obs.last_price,
            high: obs.high,
            low: obs.low,
            volume: obs.volume,
            turnover: Some(obs.turnover),
        }
    }
}

/// A daily series after bucketing into a reporting period.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledSeries {
    pub instrument_id: String,
    pub period: Period,
    pub bars: Vec<PriceBar>,
}

impl ResampledSeries {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_prices(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.last_price).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(date: &str, price: f64) -> RawObservation {
        RawObservation {
            instrument_id: "KMB".into(),
            trade_date: date.parse().unwrap(),
            last_price: price,
            high: price + 1.0,
            low: price - 1.0,
            volume: 10.0,
            turnover: price * 10.0,
        }
    }

    #[test]
    fn test_series_sorted_and_duplicates_kept() {
        let series = DailySeries::new(
            "KMB",
            vec![
                obs("2024-03-05", 3.0),
                obs("2024-03-01", 1.0),
                obs("2024-03-05", 4.0),
                obs("2024-03-04", 2.0),
            ],
        );
        let prices: Vec<f64> = series.observations.iter().map(|o| o.last_price).collect();
        assert_eq!(prices, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(series.len(), 4);
    }

    #[test]
    fn test_price_bar_from_observation() {
        let bar = PriceBar::from(&obs("2024-03-01", 50.0));
        assert_eq!(bar.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(bar.turnover, Some(500.0));
    }
}
