//! Orchestration: registries, the backtest engine, the run loop.

pub mod backtest;
pub mod registry;

pub use backtest::{Backtest, ConfigError, RunBundle, RunError};
pub use registry::{Registry, SharedEntry, SharedRegistry};
