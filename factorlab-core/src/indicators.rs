//! Pure indicator functions over value slices.
//!
//! Each takes the full backing array of a line and returns a same-length
//! vector: position `i` depends only on positions `0..=i`, with NaN over
//! the warmup prefix. Strategies attach the result to a frame through
//! `StrategyCtx::indicator`, which re-aligns the cursor.

/// Trading days per year, for annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// Simple moving average over `period` values.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut sum = 0.0;
    let mut nans = 0usize;
    for i in 0..values.len() {
        if values[i].is_nan() {
            nans += 1;
        } else {
            sum += values[i];
        }
        if i >= period {
            let old = values[i - period];
            if old.is_nan() {
                nans -= 1;
            } else {
                sum -= old;
            }
        }
        if i + 1 >= period && nans == 0 {
            out[i] = sum / period as f64;
        }
    }
    out
}

/// Exponential moving average with span-style smoothing
/// (alpha = 2 / (period + 1)), seeded on the first non-NaN value.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev: Option<f64> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        let next = match prev {
            Some(p) => alpha * v + (1.0 - alpha) * p,
            None => v,
        };
        out[i] = next;
        prev = Some(next);
    }
    out
}

/// Crossover signal: +1 where the fast SMA sits above the slow, -1 below,
/// NaN while either side is warming up.
pub fn sma_cross(values: &[f64], fast: usize, slow: usize) -> Vec<f64> {
    let f = sma(values, fast);
    let s = sma(values, slow);
    f.iter()
        .zip(&s)
        .map(|(a, b)| {
            if a.is_nan() || b.is_nan() {
                f64::NAN
            } else if a >= b {
                1.0
            } else {
                -1.0
            }
        })
        .collect()
}

/// Annualized EWMA volatility of simple returns:
/// `var[i] = alpha * r[i]^2 + (1 - alpha) * var[i-1]`, scaled by √252.
pub fn ewma_volatility(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    let mut var: Option<f64> = None;
    for i in 1..values.len() {
        let (prev, cur) = (values[i - 1], values[i]);
        if prev.is_nan() || cur.is_nan() || prev == 0.0 {
            continue;
        }
        let r = cur / prev - 1.0;
        let next = match var {
            Some(v) => alpha * r * r + (1.0 - alpha) * v,
            None => r * r,
        };
        var = Some(next);
        out[i] = next.sqrt() * TRADING_DAYS.sqrt();
    }
    out
}

/// Constant long signal from the first valid value onward.
pub fn buy_n_hold(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .map(|v| if v.is_nan() { f64::NAN } else { 1.0 })
        .collect()
}
