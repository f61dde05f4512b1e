use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate};

use crate::models::observation::{DailySeries, PriceBar, ResampledSeries};
use crate::models::period::Period;

/// Bucket a daily series into the given reporting period.
///
/// Daily is the identity. Weekly buckets are ISO weeks labelled by their
/// Sunday; monthly buckets are labelled by the last day of the month.
/// Aggregation: mean of last price, max of high, min of low, sum of volume.
/// Missing (NaN) values are skipped by every reducer, and turnover is dropped.
pub fn resample(series: &DailySeries, period: Period) -> ResampledSeries {
    let bars = match period {
        Period::Daily => series.observations.iter().map(PriceBar::from).collect(),
        Period::Weekly => aggregate(series, week_end),
        Period::Monthly => aggregate(series, month_end),
    };
    ResampledSeries {
        instrument_id: series.instrument_id.clone(),
        period,
        bars,
    }
}

/// Sunday closing the ISO week that contains `date`.
pub fn week_end(date: NaiveDate) -> NaiveDate {
    let offset = 6 - date.weekday().num_days_from_monday() as u64;
    date.checked_add_days(Days::new(offset)).unwrap_or(date)
}

/// Last calendar day of the month that contains `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .unwrap_or(date)
}

// ── Helpers ──

#[derive(Default)]
struct Bucket {
    price_sum: f64,
    price_count: usize,
    high: Option<f64>,
    low: Option<f64>,
    volume: f64,
}

impl Bucket {
    fn push(&mut self, price: f64, high: f64, low: f64, volume: f64) {
        if !price.is_nan() {
            self.price_sum += price;
            self.price_count += 1;
        }
        if !high.is_nan() {
            self.high = Some(self.high.map_or(high, |h| h.max(high)));
        }
        if !low.is_nan() {
            self.low = Some(self.low.map_or(low, |l| l.min(low)));
        }
        if !volume.is_nan() {
            self.volume += volume;
        }
    }

    fn into_bar(self, date: NaiveDate) -> PriceBar {
        PriceBar {
            date,
            last_price: if self.price_count == 0 {
                f64::NAN
            } else {
                self.price_sum / self.price_count as f64
            },
            high: self.high.unwrap_or(f64::NAN),
            low: self.low.unwrap_or(f64::NAN),
            volume: self.volume,
            turnover: None,
        }
    }
}

fn aggregate(series: &DailySeries, label: fn(NaiveDate) -> NaiveDate) -> Vec<PriceBar> {
    let mut buckets: BTreeMap<NaiveDate, Bucket> = BTreeMap::new();
    for obs in &series.observations {
        buckets
            .entry(label(obs.trade_date))
            .or_default()
            .push(obs.last_price, obs.high, obs.low, obs.volume);
    }
    buckets
        .into_iter()
        .map(|(date, bucket)| bucket.into_bar(date))
        .collect()
}
