//! Order tickets and execution records.

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order for {ticker:?} has zero or non-finite size")]
    ZeroSize { ticker: String },

    #[error("order for unregistered ticker {ticker:?}")]
    UnknownTicker { ticker: String },
}

/// A queued order. Fills at the next `beg_of_period`, at `limit` when set,
/// otherwise at that period's open.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub ticker: String,
    /// Signed size: positive buys, negative sells.
    pub size: f64,
    pub limit: Option<f64>,
}

impl Order {
    pub fn new(ticker: &str, size: f64, limit: Option<f64>) -> Result<Self, OrderError> {
        if size == 0.0 || !size.is_finite() {
            return Err(OrderError::ZeroSize {
                ticker: ticker.to_string(),
            });
        }
        Ok(Self {
            ticker: ticker.to_string(),
            size,
            limit,
        })
    }
}

/// One executed fill.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub ticker: String,
    pub size: f64,
    pub price: f64,
    pub commission: f64,
}

/// One end-of-period equity observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuotaRow {
    pub date: NaiveDate,
    pub equity: f64,
    /// Equity rebased to 100 at the starting cash.
    pub quota: f64,
    /// Daily return.
    pub ret: f64,
    /// Cumulative return since inception.
    pub cum_return: f64,
}
