//! Exposure-offset hedge.
//!
//! Runs on the hedge track: each period it reads the signed notional of
//! the primary book and targets the hedge position that offsets it,
//! spread evenly across the current hedge universe.

use super::{Strategy, StrategyBuild, StrategyCtx, StrategyError};
use std::collections::BTreeMap;

pub struct ExpoHedge {
    ctx: StrategyCtx,
}

impl Strategy for ExpoHedge {
    fn init(&mut self) -> Result<(), StrategyError> {
        Ok(())
    }

    fn next(&mut self) -> Result<(), StrategyError> {
        let universe = self.ctx.universe();
        if universe.is_empty() {
            return Ok(());
        }
        let exposure = {
            let broker = self.ctx.broker.borrow();
            broker.primary_exposure()
        };
        let per_leg = exposure / universe.len() as f64;
        for ticker in universe {
            let target = {
                let Some(asset) = self.ctx.assets.borrow().get(&ticker) else {
                    continue;
                };
                let asset = asset.borrow();
                let Some(close) = asset.close(0).filter(|v| !v.is_nan() && *v > 0.0) else {
                    continue;
                };
                let broker = self.ctx.broker.borrow();
                let unit = close * asset.multiplier() * broker.fx(asset.currency());
                let raw = -per_leg / unit;
                if asset.stocklike() {
                    raw
                } else {
                    raw.round()
                }
            };
            self.ctx.order_target(&ticker, target)?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ExpoHedge"
    }

    fn params(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }
}

impl StrategyBuild for ExpoHedge {
    fn build(ctx: StrategyCtx) -> Self {
        Self { ctx }
    }
}
