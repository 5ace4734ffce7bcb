//! Front-month futures roll.
//!
//! Registered assets form a maturity-sorted chain. The front contract is
//! the tradable universe until `roll_lag` trading days before its maturity;
//! at the roll date the expiring position is closed through the broker and
//! the chain advances.

use super::{Pipeline, PipelineBuild, PipelineCtx, PipelineError};
use chrono::NaiveDate;

struct Leg {
    ticker: String,
    /// First trading day on which this leg is no longer the front.
    roll_date: NaiveDate,
}

pub struct Rolling {
    ctx: PipelineCtx,
    chain: Vec<Leg>,
    front: usize,
}

impl Rolling {
    /// The calendar date `lag` trading days before `maturity`.
    fn roll_date(
        ticker: &str,
        maturity: NaiveDate,
        index: &[NaiveDate],
        lag: usize,
    ) -> Result<NaiveDate, PipelineError> {
        // Position of the last trading day at or before maturity.
        let pos = index.partition_point(|d| *d <= maturity);
        if pos == 0 {
            return Err(PipelineError::MaturityOffCalendar {
                ticker: ticker.to_string(),
                maturity,
            });
        }
        Ok(index[(pos - 1).saturating_sub(lag)])
    }
}

impl Pipeline for Rolling {
    fn init(&mut self) -> Result<(), PipelineError> {
        let mut chain = Vec::new();
        {
            let assets = self.ctx.assets.borrow();
            for (ticker, asset) in assets.iter() {
                let maturity = asset.borrow().maturity().ok_or_else(|| {
                    PipelineError::MissingMaturity {
                        ticker: ticker.to_string(),
                    }
                })?;
                let roll_date =
                    Self::roll_date(ticker, maturity, &self.ctx.index, self.ctx.roll_lag)?;
                chain.push((maturity, Leg {
                    ticker: ticker.to_string(),
                    roll_date,
                }));
            }
        }
        chain.sort_by_key(|(maturity, _)| *maturity);
        self.chain = chain.into_iter().map(|(_, leg)| leg).collect();
        self.front = 0;
        Ok(())
    }

    fn next(&mut self) -> Vec<String> {
        let Some(today) = self.ctx.today() else {
            return Vec::new();
        };
        while self.front < self.chain.len() && today >= self.chain[self.front].roll_date {
            let expiring = self.chain[self.front].ticker.clone();
            // Ignore the close result: a leg that never traded has no
            // position to flatten.
            let _ = self.ctx.broker.borrow_mut().close(&expiring);
            self.front += 1;
        }
        match self.chain.get(self.front) {
            Some(leg) => vec![leg.ticker.clone()],
            None => Vec::new(),
        }
    }

    fn kind(&self) -> &'static str {
        "Rolling"
    }
}

impl PipelineBuild for Rolling {
    fn build(ctx: PipelineCtx) -> Self {
        Self {
            ctx,
            chain: Vec::new(),
            front: 0,
        }
    }
}
