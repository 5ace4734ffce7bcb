//! The backtest orchestrator.
//!
//! `Backtest` owns the main clock and wires the shared handles together:
//! pipeline and strategy are built first (bound to empty registries), then
//! instruments are registered, then `run` drives the period loop. One call
//! to `advance` per period moves the clock, the broker, and every
//! registered frame as a single logical tick, so every read inside a
//! period sees exactly the state after that tick.

use crate::broker::{Broker, QuotaRow, SharedBroker, TradeRecord};
use crate::calendar::Calendar;
use crate::data::{Asset, Base, ContractSpec, DataError, Line, LineError, PriceBar};
use crate::engine::registry::{Registry, SharedRegistry};
use crate::fingerprint::{bookname, identity_map, RunConfig, RunId, RunMeta};
use crate::pipeline::{Pipeline, PipelineBuild, PipelineCtx, PipelineError};
use crate::settings::Settings;
use crate::strategy::{Strategy, StrategyBuild, StrategyCtx, StrategyError};
use chrono::{NaiveDate, Utc};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("run coordinate {name:?} is empty")]
    MissingField { name: &'static str },

    #[error("warmup buffer {buffer} does not fit a calendar of {len} trading days")]
    BufferTooLarge { buffer: usize, len: usize },

    #[error("asset {ticker:?} is denominated in {currency:?} but no {currency}{home} pair is configured")]
    UnknownCurrency {
        ticker: String,
        currency: String,
        home: String,
    },

    #[error("hedge collaborators configured but the run has no hedge ticker")]
    NoHedgeTicker,

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Line(#[from] LineError),
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Line(#[from] LineError),
}

/// Everything a finished run exports. `broker` is the live ledger handle,
/// for callers that want to inspect positions or exposure after the run.
#[derive(Debug, Clone)]
pub struct RunBundle {
    pub meta: RunMeta,
    pub quotas: Vec<QuotaRow>,
    pub records: Vec<TradeRecord>,
    pub broker: SharedBroker,
}

/// One configured backtest: clock, ledger, registries, collaborators.
pub struct Backtest {
    calendar: Calendar,
    config: RunConfig,
    settings: Rc<Settings>,
    main: Rc<RefCell<Line<NaiveDate>>>,
    broker: SharedBroker,
    bases: SharedRegistry<Base>,
    assets: SharedRegistry<Asset>,
    hedges: SharedRegistry<Asset>,
    universe: Rc<RefCell<Vec<String>>>,
    huniverse: Rc<RefCell<Vec<String>>>,
    pipeline: Box<dyn Pipeline>,
    strategy: Box<dyn Strategy>,
    hpipeline: Option<Box<dyn Pipeline>>,
    hstrategy: Option<Box<dyn Strategy>>,
}

impl std::fmt::Debug for Backtest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backtest").finish_non_exhaustive()
    }
}

impl Backtest {
    /// Validate the configuration and wire the primary collaborators.
    ///
    /// Construction is atomic: any failure here leaves nothing behind.
    pub fn new<S: StrategyBuild + 'static, P: PipelineBuild + 'static>(
        calendar: Calendar,
        config: RunConfig,
        settings: Settings,
    ) -> Result<Self, ConfigError> {
        for (name, value) in [
            ("factor", &config.factor),
            ("market", &config.market),
            ("asset", &config.asset),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField { name });
            }
        }
        if settings.buffer >= calendar.len() {
            return Err(ConfigError::BufferTooLarge {
                buffer: settings.buffer,
                len: calendar.len(),
            });
        }

        let settings = Rc::new(settings);
        let index = calendar.index().to_vec();
        let main = Rc::new(RefCell::new(Line::with_cursor(
            index.clone(),
            settings.buffer,
        )?));

        let bases: SharedRegistry<Base> = Registry::shared();
        let assets: SharedRegistry<Asset> = Registry::shared();
        let hedges: SharedRegistry<Asset> = Registry::shared();
        let broker = Broker::new(
            index.clone(),
            settings.buffer,
            Rc::clone(&assets),
            Rc::clone(&hedges),
            settings.echo,
        )?
        .shared();

        let universe = Rc::new(RefCell::new(Vec::new()));
        let pipeline = P::build(PipelineCtx {
            main: Rc::clone(&main),
            index: Rc::new(index),
            holidays: Rc::new(calendar.holidays().clone()),
            broker: Rc::clone(&broker),
            assets: Rc::clone(&assets),
            roll_lag: settings.roll_lag,
        });
        let strategy = S::build(StrategyCtx {
            main: Rc::clone(&main),
            broker: Rc::clone(&broker),
            bases: Rc::clone(&bases),
            assets: Rc::clone(&assets),
            universe: Rc::clone(&universe),
            settings: Rc::clone(&settings),
            params: Rc::new(config.params.clone()),
        });

        Ok(Self {
            calendar,
            config,
            settings,
            main,
            broker,
            bases,
            assets,
            hedges,
            universe,
            huniverse: Rc::new(RefCell::new(Vec::new())),
            pipeline: Box::new(pipeline),
            strategy: Box::new(strategy),
            hpipeline: None,
            hstrategy: None,
        })
    }

    /// Wire the hedge collaborators: a second pipeline/strategy pair over
    /// the hedge registry, sharing the clock and the broker.
    pub fn config_hedge<S: StrategyBuild + 'static, P: PipelineBuild + 'static>(
        &mut self,
    ) -> Result<(), ConfigError> {
        if self.config.hedge.is_none() {
            return Err(ConfigError::NoHedgeTicker);
        }
        let pipeline = P::build(PipelineCtx {
            main: Rc::clone(&self.main),
            index: Rc::new(self.calendar.index().to_vec()),
            holidays: Rc::new(self.calendar.holidays().clone()),
            broker: Rc::clone(&self.broker),
            assets: Rc::clone(&self.hedges),
            roll_lag: self.settings.roll_lag,
        });
        let strategy = S::build(StrategyCtx {
            main: Rc::clone(&self.main),
            broker: Rc::clone(&self.broker),
            bases: Rc::clone(&self.bases),
            assets: Rc::clone(&self.hedges),
            universe: Rc::clone(&self.huniverse),
            settings: Rc::clone(&self.settings),
            params: Rc::new(self.config.params.clone()),
        });
        self.hpipeline = Some(Box::new(pipeline));
        self.hstrategy = Some(Box::new(strategy));
        Ok(())
    }

    // ─── Registration ───

    /// Register a reference base and classify it for the broker: a ticker
    /// in the pair universe becomes the fx source for its currency, the
    /// carry ticker becomes the accrual source, the market ticker the
    /// index. Classification is case-insensitive and forwards exactly one
    /// hook per base.
    pub fn add_base(&mut self, ticker: &str, bars: Vec<PriceBar>) -> Result<(), ConfigError> {
        let base = Base::new(ticker, bars, self.calendar.index(), self.settings.buffer)?;
        let entry = self.bases.borrow_mut().insert(ticker, base);

        let upper = ticker.to_uppercase();
        let mut broker = self.broker.borrow_mut();
        if self.settings.pairs.contains(&upper) {
            broker.add_curr(entry);
        } else if upper == self.settings.carry.to_uppercase() {
            broker.add_carry(entry);
        } else if upper == self.settings.market.to_uppercase() {
            broker.add_market(entry);
        }
        Ok(())
    }

    /// Register a tradable asset.
    pub fn add_asset(
        &mut self,
        ticker: &str,
        bars: Vec<PriceBar>,
        spec: ContractSpec,
    ) -> Result<(), ConfigError> {
        self.check_currency(ticker, &spec)?;
        let asset = Asset::new(ticker, bars, self.calendar.index(), self.settings.buffer, spec)?;
        self.assets.borrow_mut().insert(ticker, asset);
        Ok(())
    }

    /// Register a hedge instrument.
    pub fn add_hedge(
        &mut self,
        ticker: &str,
        bars: Vec<PriceBar>,
        spec: ContractSpec,
    ) -> Result<(), ConfigError> {
        self.check_currency(ticker, &spec)?;
        let hedge = Asset::new(ticker, bars, self.calendar.index(), self.settings.buffer, spec)?;
        self.hedges.borrow_mut().insert(ticker, hedge);
        Ok(())
    }

    fn check_currency(&self, ticker: &str, spec: &ContractSpec) -> Result<(), ConfigError> {
        let Some(currency) = &spec.currency else {
            return Ok(());
        };
        if *currency == self.settings.currency {
            return Ok(());
        }
        let pair = format!("{currency}{}", self.settings.currency);
        if !self.settings.pairs.contains(&pair) {
            return Err(ConfigError::UnknownCurrency {
                ticker: ticker.to_string(),
                currency: currency.clone(),
                home: self.settings.currency.clone(),
            });
        }
        Ok(())
    }

    // ─── Views ───

    /// Primary base: the first one registered.
    pub fn base_ticker(&self) -> Option<String> {
        self.bases.borrow().tickers().first().cloned()
    }

    /// Hedge base: the last one registered.
    pub fn hbase_ticker(&self) -> Option<String> {
        self.bases.borrow().tickers().last().cloned()
    }

    pub fn broker(&self) -> SharedBroker {
        Rc::clone(&self.broker)
    }

    /// Deterministic identity of this configuration.
    pub fn run_id(&self) -> RunId {
        RunId::derive(&self.identity())
    }

    fn identity(&self) -> BTreeMap<String, serde_json::Value> {
        identity_map(
            &self.config,
            self.base_ticker().as_deref(),
            self.hbase_ticker().as_deref(),
            self.pipeline.kind(),
            self.strategy.name(),
            &self.strategy.params(),
            &self.settings,
        )
    }

    // ─── The run loop ───

    /// Execute the backtest.
    ///
    /// An empty asset registry returns `Ok(None)`: a configured-but-empty
    /// run is a skip, not an error, so sweeps over many books can leave
    /// gaps without failing.
    pub fn run(&mut self) -> Result<Option<RunBundle>, RunError> {
        if self.assets.borrow().is_empty() {
            return Ok(None);
        }

        let uid = self.run_id();

        self.pipeline.init()?;
        self.strategy.init()?;
        if let Some(p) = self.hpipeline.as_mut() {
            p.init()?;
        }
        if let Some(s) = self.hstrategy.as_mut() {
            s.init()?;
        }

        while !self.main.borrow().at_end() {
            self.advance()?;
            self.broker.borrow_mut().beg_of_period();

            *self.universe.borrow_mut() = self.pipeline.next();
            self.strategy.next()?;
            if let (Some(p), Some(s)) = (self.hpipeline.as_mut(), self.hstrategy.as_mut()) {
                *self.huniverse.borrow_mut() = p.next();
                s.next()?;
            }

            self.broker.borrow_mut().end_of_period();
            if self.broker.borrow().cum_return() < self.settings.max_loss {
                break;
            }
        }

        let meta = self.meta(uid);
        let (quotas, records) = {
            let broker = self.broker.borrow();
            (broker.quotas().to_vec(), broker.records().to_vec())
        };
        Ok(Some(RunBundle {
            meta,
            quotas,
            records,
            broker: Rc::clone(&self.broker),
        }))
    }

    /// One logical tick: clock, broker clock, every registered frame.
    fn advance(&mut self) -> Result<(), RunError> {
        self.main.borrow_mut().advance()?;
        self.broker.borrow_mut().next()?;
        for (_, base) in self.bases.borrow().iter() {
            base.borrow_mut().frame_mut().advance()?;
        }
        for (_, asset) in self.assets.borrow().iter() {
            asset.borrow_mut().frame_mut().advance()?;
        }
        for (_, hedge) in self.hedges.borrow().iter() {
            hedge.borrow_mut().frame_mut().advance()?;
        }
        Ok(())
    }

    fn meta(&self, uid: RunId) -> RunMeta {
        let index = self.calendar.index();
        RunMeta {
            uid,
            bookname: bookname(&self.config, self.settings.hedge_method),
            updtime: Utc::now().naive_utc(),
            factor: self.config.factor.clone(),
            market: self.config.market.clone(),
            asset: self.config.asset.clone(),
            hedge: self.config.hedge.clone(),
            base: self.base_ticker(),
            hbase: self.hbase_ticker(),
            vertices: self.config.vertices.clone(),
            pipeline: self.pipeline.kind().to_string(),
            strategy: self.strategy.name().to_string(),
            params: self.strategy.params(),
            sizing: self.settings.sizing_method.name().to_string(),
            thresh: self.settings.thresh,
            vparam: self.settings.vparam,
            volatility: self.settings.volatility,
            buffer: self.settings.buffer,
            // The span starts at the first simulated day, past the warmup
            // buffer, rather than at the calendar's first date.
            sdate: index[self.settings.buffer],
            edate: index[index.len() - 1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Single;
    use crate::strategy::SmaCross;

    fn calendar(days: u32) -> Calendar {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        Calendar::new(start, start + chrono::Duration::days(days as i64), []).unwrap()
    }

    fn config() -> RunConfig {
        RunConfig {
            factor: "TREND".to_string(),
            market: "EQUITIES".to_string(),
            asset: "PETR4".to_string(),
            hedge: None,
            vertices: vec![],
            params: BTreeMap::new(),
        }
    }

    fn small_settings() -> Settings {
        Settings {
            buffer: 2,
            ..Default::default()
        }
    }

    #[test]
    fn rejects_empty_coordinates() {
        let mut bad = config();
        bad.market = "  ".to_string();
        let err = Backtest::new::<SmaCross, Single>(calendar(30), bad, small_settings())
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { name: "market" }));
    }

    #[test]
    fn rejects_buffer_not_smaller_than_calendar() {
        let err =
            Backtest::new::<SmaCross, Single>(calendar(30), config(), Settings::default())
                .unwrap_err();
        assert!(matches!(err, ConfigError::BufferTooLarge { .. }));
    }

    #[test]
    fn hedge_wiring_requires_a_hedge_ticker() {
        let mut bt =
            Backtest::new::<SmaCross, Single>(calendar(30), config(), small_settings()).unwrap();
        assert!(matches!(
            bt.config_hedge::<SmaCross, Single>(),
            Err(ConfigError::NoHedgeTicker)
        ));
    }

    #[test]
    fn foreign_asset_requires_a_configured_pair() {
        let mut bt =
            Backtest::new::<SmaCross, Single>(calendar(30), config(), small_settings()).unwrap();
        let bars = vec![PriceBar::close_only(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            10.0,
        )];
        let spec = ContractSpec {
            multiplier: Some(1.0),
            currency: Some("JPY".to_string()),
            ..Default::default()
        };
        let err = bt.add_asset("NKY", bars, spec).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCurrency { .. }));
    }

    #[test]
    fn empty_asset_registry_is_a_silent_skip() {
        let mut bt =
            Backtest::new::<SmaCross, Single>(calendar(30), config(), small_settings()).unwrap();
        assert!(bt.run().unwrap().is_none());
        assert!(bt.broker().borrow().quotas().is_empty());
    }

    #[test]
    fn base_order_fixes_primary_and_hedge_base() {
        let mut bt =
            Backtest::new::<SmaCross, Single>(calendar(30), config(), small_settings()).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        bt.add_base("USDBRL", vec![PriceBar::close_only(day, 5.0)]).unwrap();
        bt.add_base("CARRY", vec![PriceBar::close_only(day, 0.0004)]).unwrap();
        bt.add_base("DOL", vec![PriceBar::close_only(day, 5000.0)]).unwrap();
        assert_eq!(bt.base_ticker().as_deref(), Some("USDBRL"));
        assert_eq!(bt.hbase_ticker().as_deref(), Some("DOL"));
    }
}
