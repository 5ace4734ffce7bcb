//! Trading logic.
//!
//! A strategy is built by the engine from a type parameter bound to
//! [`StrategyBuild`] and holds a [`StrategyCtx`] of shared handles. `init`
//! runs once after all instruments are registered and declares derived
//! lines; `next` runs once per period and places orders through the broker.
//!
//! Unlike the pipeline trait, [`StrategyBuild`] is open: downstream crates
//! implement their own strategies against the same context.

mod expo_hedge;
mod sma_cross;

pub use expo_hedge::ExpoHedge;
pub use sma_cross::SmaCross;

use crate::broker::{OrderError, SharedBroker};
use crate::data::{Asset, Base, DataError, Frame, Line, CLOSE};
use crate::engine::registry::SharedRegistry;
use crate::indicators;
use crate::settings::{Settings, SizingMethod};
use chrono::NaiveDate;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Line name for the trading signal consumed by `sizing`.
pub const SIGNAL: &str = "signal";
/// Line name for the volatility estimate consumed by `sizing`.
pub const VOLATILITY: &str = "volatility";

/// Failures while declaring or consuming derived lines.
///
/// `Computation` wraps a failure inside user indicator code; `Misuse` is a
/// framework-contract violation (line missing, shape mismatch) and points
/// at a bug in the calling strategy.
#[derive(Debug, thiserror::Error)]
pub enum IndicatorError {
    #[error("indicator {name:?} computation failed: {reason}")]
    Computation { name: String, reason: String },

    #[error("indicator misuse: {0}")]
    Misuse(#[from] DataError),
}

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error(transparent)]
    Order(#[from] OrderError),
}

/// Shared handles and helper operations a strategy works through.
///
/// `assets` is whichever registry this strategy trades: the primary one
/// for the primary strategy, the hedge one for the hedge strategy.
#[derive(Clone)]
pub struct StrategyCtx {
    pub main: Rc<RefCell<Line<NaiveDate>>>,
    pub broker: SharedBroker,
    pub bases: SharedRegistry<Base>,
    pub assets: SharedRegistry<Asset>,
    /// Current tradable universe, written by the pipeline each period.
    pub universe: Rc<RefCell<Vec<String>>>,
    pub settings: Rc<Settings>,
    /// Free-form strategy parameters from the run configuration.
    pub params: Rc<BTreeMap<String, f64>>,
}

impl StrategyCtx {
    pub fn today(&self) -> Option<NaiveDate> {
        self.main.borrow().get(0)
    }

    pub fn equity(&self) -> f64 {
        self.broker.borrow().equity()
    }

    pub fn universe(&self) -> Vec<String> {
        self.universe.borrow().clone()
    }

    /// Parameter lookup with a default.
    pub fn param(&self, name: &str, default: f64) -> f64 {
        self.params.get(name).copied().unwrap_or(default)
    }

    /// Declare a derived line on `frame`: `func` maps the full close array
    /// to a same-length output, which is attached under `name` aligned to
    /// the frame's cursor.
    pub fn indicator<F>(
        &self,
        frame: &mut Frame,
        name: &str,
        func: F,
    ) -> Result<(), IndicatorError>
    where
        F: FnOnce(&[f64]) -> Result<Vec<f64>, String>,
    {
        let closes = frame
            .line(CLOSE)
            .ok_or_else(|| {
                IndicatorError::Misuse(DataError::MissingLine {
                    name: CLOSE.to_string(),
                })
            })?
            .values()
            .to_vec();
        let out = func(&closes).map_err(|reason| IndicatorError::Computation {
            name: name.to_string(),
            reason,
        })?;
        frame.add_line(name, out)?;
        Ok(())
    }

    /// Declare the EWMA volatility line on `frame`
    /// (alpha from settings, annualized).
    pub fn volatility(&self, frame: &mut Frame) -> Result<(), IndicatorError> {
        let alpha = self.settings.vparam;
        self.indicator(frame, VOLATILITY, |closes| {
            Ok(indicators::ewma_volatility(closes, alpha))
        })
    }

    /// Copy named lines from a registered base onto every registered asset.
    pub fn broadcast(&self, base_ticker: &str, lines: &[&str]) -> Result<(), IndicatorError> {
        let base = self.bases.borrow().get(base_ticker).ok_or_else(|| {
            IndicatorError::Misuse(DataError::MissingLine {
                name: base_ticker.to_string(),
            })
        })?;
        let base = base.borrow();
        for name in lines {
            let values = base
                .frame()
                .line(name)
                .ok_or_else(|| {
                    IndicatorError::Misuse(DataError::MissingLine {
                        name: name.to_string(),
                    })
                })?
                .values()
                .to_vec();
            let assets = self.assets.borrow();
            for (_, asset) in assets.iter() {
                asset.borrow_mut().frame_mut().add_line(name, values.clone())?;
            }
        }
        Ok(())
    }

    /// Target position for `ticker` from its `signal` and `volatility`
    /// lines. Zero when the signal is absent, NaN, or within the threshold,
    /// or when no usable price or volatility exists yet. Future-like
    /// targets are rounded to whole contracts.
    pub fn sizing(&self, ticker: &str) -> Result<f64, IndicatorError> {
        let asset = self.assets.borrow().get(ticker).ok_or_else(|| {
            IndicatorError::Misuse(DataError::MissingLine {
                name: ticker.to_string(),
            })
        })?;
        let asset = asset.borrow();
        let frame = asset.frame();

        let Some(signal) = frame.get(SIGNAL, 0).filter(|v| !v.is_nan()) else {
            return Ok(0.0);
        };
        if signal.abs() <= self.settings.thresh {
            return Ok(0.0);
        }
        let Some(close) = asset.close(0).filter(|v| !v.is_nan() && *v > 0.0) else {
            return Ok(0.0);
        };

        let broker = self.broker.borrow();
        let unit = close * asset.multiplier() * broker.fx(asset.currency());
        let budget = self.settings.volatility * broker.equity();

        let target = match self.settings.sizing_method {
            SizingMethod::Volatility => {
                let Some(vol) = frame.get(VOLATILITY, 0).filter(|v| !v.is_nan() && *v > 0.0)
                else {
                    return Ok(0.0);
                };
                signal.signum() * budget / (vol * unit)
            }
            SizingMethod::Fixed => signal.signum() * budget / unit,
        };

        Ok(if asset.stocklike() {
            target
        } else {
            target.round()
        })
    }

    /// Queue a buy of `size` (made positive) for the next period.
    pub fn buy(&self, ticker: &str, size: f64) -> Result<(), OrderError> {
        self.broker.borrow_mut().order(ticker, size.abs(), None)
    }

    /// Queue a sell of `size` (made negative) for the next period.
    pub fn sell(&self, ticker: &str, size: f64) -> Result<(), OrderError> {
        self.broker.borrow_mut().order(ticker, -size.abs(), None)
    }

    /// Queue whatever order moves the position to `target`.
    pub fn order_target(&self, ticker: &str, target: f64) -> Result<(), OrderError> {
        self.broker.borrow_mut().order_target(ticker, target)
    }
}

/// Per-period trading logic.
pub trait Strategy {
    /// One-time setup after all instruments are registered; declares
    /// derived lines.
    fn init(&mut self) -> Result<(), StrategyError>;

    /// One period of trading decisions.
    fn next(&mut self) -> Result<(), StrategyError>;

    /// Stable name recorded in the run identity.
    fn name(&self) -> &'static str;

    /// Effective parameters, recorded in the run identity.
    fn params(&self) -> BTreeMap<String, f64>;
}

/// Engine-constructible strategy. Open for downstream implementations.
pub trait StrategyBuild: Strategy + Sized {
    fn build(ctx: StrategyCtx) -> Self;
}
