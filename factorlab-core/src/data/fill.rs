//! OHLC completeness and calendar alignment.
//!
//! Assets must expose a value for every field on every trading day before
//! the broker can price them. Two steps guarantee it:
//! 1. `fill_ohlc` synthesizes missing open/high/low fields from the close.
//! 2. `reindex` aligns the rows onto the global calendar, carrying the last
//!    observation forward across gaps. Days before the first observation
//!    stay NaN.

use super::table::PriceBar;
use chrono::NaiveDate;

#[derive(Debug, thiserror::Error)]
pub enum FillError {
    #[error("bar at {0} has no close price; close is required for OHLC synthesis")]
    MissingClose(NaiveDate),

    #[error("cannot fill an empty price table")]
    EmptyTable,
}

/// Synthesize missing O/H/L fields from the close:
/// `open := close`, `high := max(open, high, close)`,
/// `low := min(open, low, close)`.
///
/// A non-NaN close is required on every row.
pub fn fill_ohlc(mut bars: Vec<PriceBar>) -> Result<Vec<PriceBar>, FillError> {
    if bars.is_empty() {
        return Err(FillError::EmptyTable);
    }

    for bar in &mut bars {
        if bar.close.is_nan() {
            return Err(FillError::MissingClose(bar.date));
        }
        if bar.open.is_nan() {
            bar.open = bar.close;
        }
        bar.high = nan_max(nan_max(bar.high, bar.open), bar.close);
        bar.low = nan_min(nan_min(bar.low, bar.open), bar.close);
    }

    Ok(bars)
}

/// Column-wise view of a reindexed table, aligned 1:1 with the calendar.
#[derive(Debug, Clone)]
pub struct AlignedColumns {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
}

/// Align `bars` onto `index` with forward-fill.
///
/// For each calendar date, the most recent bar at or before that date is
/// used. Dates before the first observation produce all-NaN rows.
pub fn reindex(mut bars: Vec<PriceBar>, index: &[NaiveDate]) -> AlignedColumns {
    bars.sort_by_key(|b| b.date);

    let n = index.len();
    let mut out = AlignedColumns {
        open: vec![f64::NAN; n],
        high: vec![f64::NAN; n],
        low: vec![f64::NAN; n],
        close: vec![f64::NAN; n],
    };

    let mut src = 0usize;
    let mut last: Option<PriceBar> = None;
    for (i, date) in index.iter().enumerate() {
        while src < bars.len() && bars[src].date <= *date {
            last = Some(bars[src]);
            src += 1;
        }
        if let Some(bar) = last {
            out.open[i] = bar.open;
            out.high[i] = bar.high;
            out.low[i] = bar.low;
            out.close[i] = bar.close;
        }
    }

    out
}

fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() {
        b
    } else if b.is_nan() {
        a
    } else {
        a.max(b)
    }
}

fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() {
        b
    } else if b.is_nan() {
        a
    } else {
        a.min(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn fill_synthesizes_missing_fields() {
        let bars = fill_ohlc(vec![PriceBar::close_only(d("2024-01-02"), 100.0)]).unwrap();
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[0].high, 100.0);
        assert_eq!(bars[0].low, 100.0);
    }

    #[test]
    fn fill_widens_inconsistent_extremes() {
        // High below the close must be lifted to the close.
        let bars = fill_ohlc(vec![PriceBar::new(d("2024-01-02"), 101.0, 99.0, 100.5, 102.0)])
            .unwrap();
        assert_eq!(bars[0].high, 102.0);
        assert_eq!(bars[0].low, 100.5);
    }

    #[test]
    fn fill_rejects_missing_close() {
        let err = fill_ohlc(vec![PriceBar::new(
            d("2024-01-02"),
            1.0,
            1.0,
            1.0,
            f64::NAN,
        )])
        .unwrap_err();
        assert!(matches!(err, FillError::MissingClose(_)));
    }

    #[test]
    fn reindex_forward_fills_gaps() {
        let index = vec![d("2024-01-02"), d("2024-01-03"), d("2024-01-04")];
        let bars = vec![
            PriceBar::new(d("2024-01-02"), 1.0, 1.0, 1.0, 1.0),
            // 2024-01-03 missing
            PriceBar::new(d("2024-01-04"), 3.0, 3.0, 3.0, 3.0),
        ];
        let cols = reindex(bars, &index);
        assert_eq!(cols.close, vec![1.0, 1.0, 3.0]);
    }

    #[test]
    fn reindex_leaves_leading_nans() {
        let index = vec![d("2024-01-02"), d("2024-01-03")];
        let bars = vec![PriceBar::new(d("2024-01-03"), 2.0, 2.0, 2.0, 2.0)];
        let cols = reindex(bars, &index);
        assert!(cols.close[0].is_nan());
        assert_eq!(cols.close[1], 2.0);
    }

    #[test]
    fn reindex_ignores_dates_off_calendar() {
        // A Saturday observation folds into the following Monday.
        let index = vec![d("2024-01-05"), d("2024-01-08")];
        let bars = vec![
            PriceBar::new(d("2024-01-05"), 1.0, 1.0, 1.0, 1.0),
            PriceBar::new(d("2024-01-06"), 9.0, 9.0, 9.0, 9.0),
        ];
        let cols = reindex(bars, &index);
        assert_eq!(cols.close, vec![1.0, 9.0]);
    }
}
