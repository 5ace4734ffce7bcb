//! Tabular OHLC input rows.
//!
//! `f64::NAN` marks a missing field; the fill policy in [`crate::data::fill`]
//! resolves gaps before an asset is registered.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily OHLC observation as provided by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PriceBar {
    /// A bar carrying only a close; O/H/L to be synthesized by the fill policy.
    pub fn close_only(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: f64::NAN,
            high: f64::NAN,
            low: f64::NAN,
            close,
        }
    }

    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
        }
    }
}
