//! FactorLab Core — calendar-synchronized factor backtesting.
//!
//! This crate contains the whole simulation engine:
//! - Cursor-synchronized data model (lines, frames, bases, assets)
//! - Trading-day calendar and OHLC fill/reindex policy
//! - Daily mark-to-market broker ledger with fx and carry
//! - Universe pipelines (sealed) and strategies (open trait)
//! - The `Backtest` orchestrator with its single-tick run loop
//! - Deterministic run identity and book labelling

pub mod broker;
pub mod calendar;
pub mod data;
pub mod engine;
pub mod fingerprint;
pub mod indicators;
pub mod pipeline;
pub mod settings;
pub mod strategy;

pub use broker::{Broker, QuotaRow, SharedBroker, TradeRecord};
pub use calendar::Calendar;
pub use data::{Asset, Base, ContractSpec, PriceBar};
pub use engine::{Backtest, ConfigError, RunBundle, RunError};
pub use fingerprint::{bookname, RunConfig, RunId, RunMeta};
pub use pipeline::{Pipeline, PipelineBuild, Rolling, Single};
pub use settings::{HedgeMethod, Settings, SizingMethod};
pub use strategy::{ExpoHedge, SmaCross, Strategy, StrategyBuild, StrategyCtx};
