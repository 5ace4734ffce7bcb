//! Frames and the instruments built on them.
//!
//! A `Frame` bundles named `Line<f64>` series over one date line, all moving
//! as a single logical tick. A `Base` is a frame with a ticker (reference
//! data: currency pairs, carry, market index). An `Asset` is a base plus the
//! trading metadata the broker needs to price and charge it.

use super::fill::{fill_ohlc, reindex, FillError};
use super::line::{Line, LineError};
use super::table::PriceBar;
use chrono::NaiveDate;

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("line {name:?} has {got} values, frame index has {expected}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("frame has no line named {name:?}")]
    MissingLine { name: String },

    #[error("no price data supplied for {ticker:?}")]
    NoData { ticker: String },

    #[error(transparent)]
    Line(#[from] LineError),

    #[error(transparent)]
    Fill(#[from] FillError),
}

/// Line names every asset frame carries.
pub const OPEN: &str = "open";
pub const HIGH: &str = "high";
pub const LOW: &str = "low";
pub const CLOSE: &str = "close";

/// Insertion-ordered collection of cursor-synchronized lines over one
/// date line.
#[derive(Debug, Clone)]
pub struct Frame {
    dates: Line<NaiveDate>,
    lines: Vec<(String, Line<f64>)>,
}

impl Frame {
    /// A frame over `index` with the cursor pre-positioned at `cursor`.
    pub fn new(index: Vec<NaiveDate>, cursor: usize) -> Result<Self, DataError> {
        let dates = Line::with_cursor(index, cursor)?;
        Ok(Self {
            dates,
            lines: Vec::new(),
        })
    }

    /// Attach a named line. The line must match the frame's index length;
    /// its cursor is aligned to the frame's. A duplicate name replaces the
    /// existing line.
    pub fn add_line(&mut self, name: &str, values: Vec<f64>) -> Result<(), DataError> {
        if values.len() != self.dates.len() {
            return Err(DataError::ShapeMismatch {
                name: name.to_string(),
                expected: self.dates.len(),
                got: values.len(),
            });
        }
        let mut line = Line::new(values);
        line.seek(self.dates.cursor())?;
        if let Some(slot) = self.lines.iter_mut().find(|(n, _)| n == name) {
            slot.1 = line;
        } else {
            self.lines.push((name.to_string(), line));
        }
        Ok(())
    }

    pub fn line(&self, name: &str) -> Option<&Line<f64>> {
        self.lines.iter().find(|(n, _)| n == name).map(|(_, l)| l)
    }

    pub fn has_line(&self, name: &str) -> bool {
        self.line(name).is_some()
    }

    /// Read `name` at `cursor + offset`; `None` when the line is missing or
    /// the offset falls outside served history.
    pub fn get(&self, name: &str, offset: isize) -> Option<f64> {
        self.line(name).and_then(|l| l.get(offset))
    }

    pub fn date(&self, offset: isize) -> Option<NaiveDate> {
        self.dates.get(offset)
    }

    /// Advance the date line and every data line one step.
    pub fn advance(&mut self) -> Result<(), DataError> {
        self.dates.advance()?;
        for (_, line) in &mut self.lines {
            line.advance()?;
        }
        Ok(())
    }

    pub fn cursor(&self) -> usize {
        self.dates.cursor()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn at_end(&self) -> bool {
        self.dates.at_end()
    }

    pub fn line_names(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|(n, _)| n.as_str())
    }
}

/// Non-tradable reference bundle: a ticker over a frame aligned to the
/// global calendar.
#[derive(Debug, Clone)]
pub struct Base {
    ticker: String,
    frame: Frame,
}

impl Base {
    /// Build a base by reindexing `bars` onto the calendar `index` with
    /// forward-fill. Only the close is required; O/H/L lines are attached
    /// when present in the input.
    pub fn new(
        ticker: &str,
        bars: Vec<PriceBar>,
        index: &[NaiveDate],
        cursor: usize,
    ) -> Result<Self, DataError> {
        if bars.is_empty() {
            return Err(DataError::NoData {
                ticker: ticker.to_string(),
            });
        }
        let cols = reindex(bars, index);
        let mut frame = Frame::new(index.to_vec(), cursor)?;
        frame.add_line(CLOSE, cols.close)?;
        if cols.open.iter().any(|v| !v.is_nan()) {
            frame.add_line(OPEN, cols.open)?;
        }
        Ok(Self {
            ticker: ticker.to_string(),
            frame,
        })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }

    pub fn close(&self, offset: isize) -> Option<f64> {
        self.frame.get(CLOSE, offset)
    }
}

/// How commission is charged on a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommissionKind {
    /// Fraction of traded notional (stock-like instruments).
    Percent,
    /// Flat amount per contract (future-like instruments).
    Absolute,
}

/// Default commission rates by instrument class.
const STOCK_COMMISSION: f64 = 0.0005;
const FUTURE_COMMISSION: f64 = 2.0;

/// Trading metadata supplied at asset registration.
#[derive(Debug, Clone, Default)]
pub struct ContractSpec {
    /// Contract multiplier. `None` marks a stock-like instrument
    /// (multiplier 1, percent commission).
    pub multiplier: Option<f64>,
    /// Denomination currency. `None` means the broker's home currency.
    pub currency: Option<String>,
    /// Expiry date for deliverable contracts (rolling chains).
    pub maturity: Option<NaiveDate>,
    /// Override the class-default commission rate.
    pub commission: Option<f64>,
}

/// A tradable instrument: OHLC frame plus pricing metadata.
///
/// The fill policy runs before registration, so every line is complete over
/// the observed range.
#[derive(Debug, Clone)]
pub struct Asset {
    base: Base,
    multiplier: f64,
    currency: Option<String>,
    maturity: Option<NaiveDate>,
    commission: f64,
    commission_kind: CommissionKind,
    stocklike: bool,
}

impl Asset {
    pub fn new(
        ticker: &str,
        bars: Vec<PriceBar>,
        index: &[NaiveDate],
        cursor: usize,
        spec: ContractSpec,
    ) -> Result<Self, DataError> {
        if bars.is_empty() {
            return Err(DataError::NoData {
                ticker: ticker.to_string(),
            });
        }
        let bars = fill_ohlc(bars)?;
        let cols = reindex(bars, index);

        let mut frame = Frame::new(index.to_vec(), cursor)?;
        frame.add_line(OPEN, cols.open)?;
        frame.add_line(HIGH, cols.high)?;
        frame.add_line(LOW, cols.low)?;
        frame.add_line(CLOSE, cols.close)?;

        let stocklike = spec.multiplier.is_none();
        let (commission, commission_kind) = if stocklike {
            (spec.commission.unwrap_or(STOCK_COMMISSION), CommissionKind::Percent)
        } else {
            (
                spec.commission.unwrap_or(FUTURE_COMMISSION),
                CommissionKind::Absolute,
            )
        };

        Ok(Self {
            base: Base {
                ticker: ticker.to_string(),
                frame,
            },
            multiplier: spec.multiplier.unwrap_or(1.0),
            currency: spec.currency,
            maturity: spec.maturity,
            commission,
            commission_kind,
            stocklike,
        })
    }

    pub fn ticker(&self) -> &str {
        self.base.ticker()
    }

    pub fn frame(&self) -> &Frame {
        self.base.frame()
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        self.base.frame_mut()
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Denomination currency when foreign to the broker.
    pub fn currency(&self) -> Option<&str> {
        self.currency.as_deref()
    }

    pub fn maturity(&self) -> Option<NaiveDate> {
        self.maturity
    }

    pub fn commission(&self) -> f64 {
        self.commission
    }

    pub fn commission_kind(&self) -> CommissionKind {
        self.commission_kind
    }

    pub fn stocklike(&self) -> bool {
        self.stocklike
    }

    pub fn open(&self, offset: isize) -> Option<f64> {
        self.base.frame().get(OPEN, offset)
    }

    pub fn close(&self, offset: isize) -> Option<f64> {
        self.base.frame().get(CLOSE, offset)
    }
}

/// Hedge instruments share the asset representation; the distinction lives
/// in which registry they are placed into.
pub type Hedge = Asset;
