//! Degenerate pipeline: every registered asset is always tradable.

use super::{Pipeline, PipelineBuild, PipelineCtx, PipelineError};

pub struct Single {
    ctx: PipelineCtx,
}

impl Pipeline for Single {
    fn init(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    fn next(&mut self) -> Vec<String> {
        self.ctx.assets.borrow().tickers()
    }

    fn kind(&self) -> &'static str {
        "Single"
    }
}

impl PipelineBuild for Single {
    fn build(ctx: PipelineCtx) -> Self {
        Self { ctx }
    }
}
