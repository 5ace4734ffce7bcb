//! SMA crossover trend strategy.
//!
//! Signal is the sign of fast SMA minus slow SMA over the close; sizing is
//! delegated to the context (volatility target by default).

use super::{Strategy, StrategyBuild, StrategyCtx, StrategyError, SIGNAL};
use crate::indicators;
use std::collections::BTreeMap;

const DEFAULT_FAST: f64 = 10.0;
const DEFAULT_SLOW: f64 = 100.0;

pub struct SmaCross {
    ctx: StrategyCtx,
    fast: usize,
    slow: usize,
}

impl Strategy for SmaCross {
    fn init(&mut self) -> Result<(), StrategyError> {
        let (fast, slow) = (self.fast, self.slow);
        let assets = self.ctx.assets.borrow();
        for (_, asset) in assets.iter() {
            let mut asset = asset.borrow_mut();
            let frame = asset.frame_mut();
            self.ctx.indicator(frame, SIGNAL, |closes| {
                Ok(indicators::sma_cross(closes, fast, slow))
            })?;
            self.ctx.volatility(frame)?;
        }
        Ok(())
    }

    fn next(&mut self) -> Result<(), StrategyError> {
        for ticker in self.ctx.universe() {
            let target = self.ctx.sizing(&ticker)?;
            self.ctx.order_target(&ticker, target)?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "SmaCross"
    }

    fn params(&self) -> BTreeMap<String, f64> {
        [
            ("fast".to_string(), self.fast as f64),
            ("slow".to_string(), self.slow as f64),
        ]
        .into()
    }
}

impl StrategyBuild for SmaCross {
    fn build(ctx: StrategyCtx) -> Self {
        let fast = ctx.param("fast", DEFAULT_FAST).max(1.0) as usize;
        let slow = ctx.param("slow", DEFAULT_SLOW).max(1.0) as usize;
        Self { ctx, fast, slow }
    }
}
