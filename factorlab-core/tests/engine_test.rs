//! End-to-end engine behavior: loop bounds, circuit breaker, init/next
//! ordering across the hedge pair, broker hook forwarding, book labels,
//! and run determinism.

use chrono::NaiveDate;
use factorlab_core::settings::{HedgeMethod, SizingMethod};
use factorlab_core::strategy::{
    Strategy, StrategyBuild, StrategyCtx, StrategyError, SIGNAL, VOLATILITY,
};
use factorlab_core::{
    Backtest, Calendar, ContractSpec, ExpoHedge, PriceBar, RunConfig, Settings, Single, SmaCross,
};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

const BUFFER: usize = 5;

fn calendar(days: i64) -> Calendar {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    Calendar::new(start, start + chrono::Duration::days(days), []).unwrap()
}

/// Deterministic pseudo-random walk (teacher of all price fixtures: an LCG).
fn make_closes(n: usize, start: f64) -> Vec<f64> {
    let mut price = start;
    (0..n)
        .map(|i| {
            let seed = (i as u64).wrapping_mul(6364136223846793005).wrapping_add(1);
            price += ((seed % 200) as f64 - 100.0) * 0.01;
            price = price.max(10.0);
            price
        })
        .collect()
}

fn bars_from(closes: &[f64], index: &[NaiveDate]) -> Vec<PriceBar> {
    index
        .iter()
        .zip(closes)
        .map(|(d, c)| PriceBar::close_only(*d, *c))
        .collect()
}

fn settings() -> Settings {
    Settings {
        buffer: BUFFER,
        // Fixed sizing keeps leverage at the budget fraction, so these
        // scenarios never trip the breaker unless a test collapses prices
        // on purpose.
        sizing_method: SizingMethod::Fixed,
        ..Default::default()
    }
}

fn config(hedge: Option<&str>) -> RunConfig {
    RunConfig {
        factor: "RISKPAR".to_string(),
        market: "COMMODITIES".to_string(),
        asset: "BIAU39".to_string(),
        hedge: hedge.map(str::to_string),
        vertices: vec![1],
        // Short SMA periods so the crossover trades on these small
        // calendars.
        params: [("fast".to_string(), 5.0), ("slow".to_string(), 20.0)].into(),
    }
}

fn populated_backtest(days: i64) -> Backtest {
    let cal = calendar(days);
    let index = cal.index().to_vec();
    let closes = make_closes(index.len(), 100.0);
    let mut bt = Backtest::new::<SmaCross, Single>(cal, config(None), settings()).unwrap();
    bt.add_asset("BIAU39", bars_from(&closes, &index), ContractSpec::default())
        .unwrap();
    bt
}

#[test]
fn quota_rows_match_the_loop_bound() {
    let cal = calendar(60);
    let n = cal.index().len();
    let mut bt = populated_backtest(60);
    let bundle = bt.run().unwrap().unwrap();
    // One advance (and one settlement) per remaining calendar position.
    assert_eq!(bundle.quotas.len(), n - 1 - BUFFER);
}

#[test]
fn empty_registry_is_a_silent_skip() {
    let mut bt = Backtest::new::<SmaCross, Single>(calendar(60), config(None), settings()).unwrap();
    assert!(bt.run().unwrap().is_none());
}

/// Always-long strategy with fixed unit volatility, so drawdowns track the
/// price path directly.
struct AlwaysLong {
    ctx: StrategyCtx,
}

impl Strategy for AlwaysLong {
    fn init(&mut self) -> Result<(), StrategyError> {
        let assets = self.ctx.assets.borrow();
        for (_, asset) in assets.iter() {
            let mut asset = asset.borrow_mut();
            let frame = asset.frame_mut();
            self.ctx
                .indicator(frame, SIGNAL, |closes| Ok(vec![1.0; closes.len()]))?;
            self.ctx
                .indicator(frame, VOLATILITY, |closes| Ok(vec![1.0; closes.len()]))?;
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
        "AlwaysLong"
    }

    fn params(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }
}

impl StrategyBuild for AlwaysLong {
    fn build(ctx: StrategyCtx) -> Self {
        Self { ctx }
    }
}

#[test]
fn circuit_breaker_halts_in_the_breaching_iteration() {
    let cal = calendar(60);
    let index = cal.index().to_vec();
    let n = index.len();
    // Flat, then a collapse to near-zero a third of the way in.
    let mut closes = vec![100.0; n];
    for c in closes.iter_mut().skip(BUFFER + n / 3) {
        *c = 0.01;
    }

    let mut s = settings();
    s.max_loss = -0.05;
    let mut bt = Backtest::new::<AlwaysLong, Single>(cal, config(None), s).unwrap();
    let spec = ContractSpec {
        multiplier: Some(1.0),
        commission: Some(0.0),
        ..Default::default()
    };
    bt.add_asset("BIAU39", bars_from(&closes, &index), spec).unwrap();

    let bundle = bt.run().unwrap().unwrap();
    assert!(bundle.quotas.len() < n - 1 - BUFFER, "breaker never tripped");
    let last = bundle.quotas.last().unwrap();
    assert!(last.cum_return < -0.05);
    // Exactly the final row breaches: the halt happens in the same
    // iteration, with no trailing settlement rows.
    for row in &bundle.quotas[..bundle.quotas.len() - 1] {
        assert!(row.cum_return >= -0.05);
    }
}

/// Leaves a marker line on the shared primary base at init, so the hedge
/// track can verify the primary strategy initialized first.
struct MarkerPrimary {
    ctx: StrategyCtx,
}

impl Strategy for MarkerPrimary {
    fn init(&mut self) -> Result<(), StrategyError> {
        let bases = self.ctx.bases.borrow();
        let (_, base) = bases.iter().next().expect("a base is registered");
        let mut base = base.borrow_mut();
        let n = base.frame().len();
        base.frame_mut()
            .add_line("marker", vec![1.0; n])
            .map_err(factorlab_core::strategy::IndicatorError::Misuse)?;
        Ok(())
    }

    fn next(&mut self) -> Result<(), StrategyError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "MarkerPrimary"
    }

    fn params(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }
}

impl StrategyBuild for MarkerPrimary {
    fn build(ctx: StrategyCtx) -> Self {
        Self { ctx }
    }
}

/// Fails at init when the primary marker line is absent, proving the
/// primary strategy initialized before the hedge strategy.
struct MarkerHedge {
    ctx: StrategyCtx,
}

impl Strategy for MarkerHedge {
    fn init(&mut self) -> Result<(), StrategyError> {
        let bases = self.ctx.bases.borrow();
        let (_, base) = bases.iter().next().expect("a base is registered");
        assert!(
            base.borrow().frame().has_line("marker"),
            "hedge init ran before primary init"
        );
        Ok(())
    }

    fn next(&mut self) -> Result<(), StrategyError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "MarkerHedge"
    }

    fn params(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }
}

impl StrategyBuild for MarkerHedge {
    fn build(ctx: StrategyCtx) -> Self {
        Self { ctx }
    }
}

#[test]
fn primary_initializes_before_the_hedge_track() {
    let cal = calendar(40);
    let index = cal.index().to_vec();
    let closes = make_closes(index.len(), 100.0);
    let mut bt =
        Backtest::new::<MarkerPrimary, Single>(cal, config(Some("DOL")), settings()).unwrap();
    bt.config_hedge::<MarkerHedge, Single>().unwrap();
    bt.add_base("USDBRL", bars_from(&closes, &index)).unwrap();
    bt.add_asset("BIAU39", bars_from(&closes, &index), ContractSpec::default())
        .unwrap();
    bt.add_hedge("DOL", bars_from(&closes, &index), ContractSpec::default())
        .unwrap();
    // The MarkerHedge assertion fires inside run() if the order is wrong.
    assert!(bt.run().unwrap().is_some());
}

thread_local! {
    static PRIMARY_TICKS: Cell<usize> = Cell::new(0);
    static HEDGE_TICKS: Cell<usize> = Cell::new(0);
}

/// Counts its `next` calls into a thread-local, one per period.
struct CountingPrimary {
    _ctx: StrategyCtx,
}

impl Strategy for CountingPrimary {
    fn init(&mut self) -> Result<(), StrategyError> {
        Ok(())
    }

    fn next(&mut self) -> Result<(), StrategyError> {
        PRIMARY_TICKS.with(|c| c.set(c.get() + 1));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "CountingPrimary"
    }

    fn params(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }
}

impl StrategyBuild for CountingPrimary {
    fn build(ctx: StrategyCtx) -> Self {
        Self { _ctx: ctx }
    }
}

/// Checks, every period, that the primary track already ticked this
/// period before the hedge track runs.
struct CountingHedge {
    _ctx: StrategyCtx,
}

impl Strategy for CountingHedge {
    fn init(&mut self) -> Result<(), StrategyError> {
        Ok(())
    }

    fn next(&mut self) -> Result<(), StrategyError> {
        let primary = PRIMARY_TICKS.with(Cell::get);
        let hedge = HEDGE_TICKS.with(Cell::get);
        assert_eq!(
            primary,
            hedge + 1,
            "hedge next ran before the primary next this period"
        );
        HEDGE_TICKS.with(|c| c.set(c.get() + 1));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "CountingHedge"
    }

    fn params(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }
}

impl StrategyBuild for CountingHedge {
    fn build(ctx: StrategyCtx) -> Self {
        Self { _ctx: ctx }
    }
}

#[test]
fn each_period_calls_next_exactly_once_primary_first() {
    let cal = calendar(60);
    let index = cal.index().to_vec();
    let n = index.len();
    let closes = make_closes(n, 100.0);
    let mut bt =
        Backtest::new::<CountingPrimary, Single>(cal, config(Some("DOL")), settings()).unwrap();
    bt.config_hedge::<CountingHedge, Single>().unwrap();
    bt.add_asset("BIAU39", bars_from(&closes, &index), ContractSpec::default())
        .unwrap();
    bt.add_hedge("DOL", bars_from(&closes, &index), ContractSpec::default())
        .unwrap();
    bt.run().unwrap().unwrap();

    // Every remaining calendar position ticks both tracks once.
    let primary = PRIMARY_TICKS.with(Cell::get);
    let hedge = HEDGE_TICKS.with(Cell::get);
    assert_eq!(primary, n - 1 - BUFFER);
    assert_eq!(hedge, primary);
}

#[test]
fn bundle_exposes_the_live_broker_ledger() {
    let mut bt = populated_backtest(90);
    let bundle = bt.run().unwrap().unwrap();
    assert!(Rc::ptr_eq(&bundle.broker, &bt.broker()));
    let broker = bundle.broker.borrow();
    assert_eq!(broker.quotas(), bundle.quotas.as_slice());
    assert_eq!(broker.records(), bundle.records.as_slice());
}

#[test]
fn base_classification_forwards_exactly_one_hook() {
    let cal = calendar(40);
    let index = cal.index().to_vec();
    let closes = make_closes(index.len(), 5.0);
    let mut bt = Backtest::new::<SmaCross, Single>(cal, config(None), settings()).unwrap();

    bt.add_base("usdbrl", bars_from(&closes, &index)).unwrap();
    bt.add_base("Carry", bars_from(&closes, &index)).unwrap();
    bt.add_base("IBOV", bars_from(&closes, &index)).unwrap();
    bt.add_base("SOMETHING", bars_from(&closes, &index)).unwrap();

    let broker = bt.broker();
    let broker = broker.borrow();
    assert!(broker.has_curr("USD"));
    assert!(broker.has_carry());
    assert!(broker.has_market());
    assert!(!broker.has_curr("SOM"));
}

#[test]
fn book_label_follows_the_hedge_method() {
    let cal = calendar(40);
    let index = cal.index().to_vec();
    let closes = make_closes(index.len(), 100.0);

    let mut bt =
        Backtest::new::<SmaCross, Single>(cal.clone(), config(Some("DOL")), settings()).unwrap();
    bt.add_asset("BIAU39", bars_from(&closes, &index), ContractSpec::default())
        .unwrap();
    let bundle = bt.run().unwrap().unwrap();
    assert_eq!(bundle.meta.bookname, "RISKPAR-COMMODITIES-BIAU39/DOL");

    let mut beta = settings();
    beta.hedge_method = HedgeMethod::Beta;
    let mut bt = Backtest::new::<SmaCross, Single>(cal.clone(), config(Some("DOL")), beta).unwrap();
    bt.add_asset("BIAU39", bars_from(&closes, &index), ContractSpec::default())
        .unwrap();
    let bundle = bt.run().unwrap().unwrap();
    assert_eq!(bundle.meta.bookname, "RISKPAR-COMMODITIES-BIAU39#DOL");

    let mut bt = Backtest::new::<SmaCross, Single>(cal, config(None), settings()).unwrap();
    bt.add_asset("BIAU39", bars_from(&closes, &index), ContractSpec::default())
        .unwrap();
    let bundle = bt.run().unwrap().unwrap();
    assert_eq!(bundle.meta.bookname, "RISKPAR-COMMODITIES-BIAU39");
}

#[test]
fn identical_configurations_replay_identically() {
    let run = || {
        let mut bt = populated_backtest(90);
        bt.run().unwrap().unwrap()
    };
    let a = run();
    let b = run();
    assert_eq!(a.meta.uid, b.meta.uid);
    assert_eq!(a.quotas, b.quotas);
    assert_eq!(a.records, b.records);
}

#[test]
fn hedge_offsets_primary_exposure() {
    let cal = calendar(90);
    let index = cal.index().to_vec();
    let closes = make_closes(index.len(), 100.0);
    let mut bt =
        Backtest::new::<AlwaysLong, Single>(cal, config(Some("DOL")), settings()).unwrap();
    bt.config_hedge::<ExpoHedge, Single>().unwrap();
    bt.add_asset("BIAU39", bars_from(&closes, &index), ContractSpec::default())
        .unwrap();
    bt.add_hedge("DOL", bars_from(&closes, &index), ContractSpec::default())
        .unwrap();
    bt.run().unwrap().unwrap();

    let broker = bt.broker();
    let broker = broker.borrow();
    let long = broker.position_size("BIAU39");
    let hedge = broker.position_size("DOL");
    assert!(long > 0.0, "primary never went long");
    assert!(hedge < 0.0, "hedge never offset the long book");
}
