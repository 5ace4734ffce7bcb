//! Universe selection.
//!
//! A pipeline decides, once per period, which registered assets are
//! tradable. The engine builds it from a type parameter bound to
//! [`PipelineBuild`]; the trait is sealed, so the set of pipelines is
//! closed at compile time and a wrong-kind configuration cannot exist.

mod rolling;
mod single;

pub use rolling::Rolling;
pub use single::Single;

use crate::broker::SharedBroker;
use crate::data::{Asset, Line};
use crate::engine::registry::SharedRegistry;
use chrono::NaiveDate;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("rolling chain asset {ticker:?} has no maturity date")]
    MissingMaturity { ticker: String },

    #[error("maturity {maturity} of {ticker:?} falls outside the calendar")]
    MaturityOffCalendar { ticker: String, maturity: NaiveDate },
}

/// Shared handles a pipeline works through.
///
/// `index` is the full calendar, cursor-independent: roll schedules are a
/// property of the calendar, known before the run starts, so looking up a
/// future maturity date here is not a causality leak.
#[derive(Clone)]
pub struct PipelineCtx {
    pub main: Rc<RefCell<Line<NaiveDate>>>,
    pub index: Rc<Vec<NaiveDate>>,
    pub holidays: Rc<BTreeSet<NaiveDate>>,
    pub broker: SharedBroker,
    pub assets: SharedRegistry<Asset>,
    pub roll_lag: usize,
}

impl PipelineCtx {
    /// Current trading date.
    pub fn today(&self) -> Option<NaiveDate> {
        self.main.borrow().get(0)
    }
}

/// Per-period universe selection.
pub trait Pipeline {
    /// One-time setup after all assets are registered.
    fn init(&mut self) -> Result<(), PipelineError>;

    /// Tickers tradable this period.
    fn next(&mut self) -> Vec<String>;

    /// Stable name recorded in the run identity.
    fn kind(&self) -> &'static str;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Single {}
    impl Sealed for super::Rolling {}
}

/// Engine-constructible pipeline. Sealed: only the pipelines shipped by
/// this crate implement it.
pub trait PipelineBuild: Pipeline + sealed::Sealed + Sized {
    fn build(ctx: PipelineCtx) -> Self;
}
