//! Capital and position accounting.
//!
//! The engine drives the broker three times per period: `next` moves the
//! internal clock, `beg_of_period` fills the orders queued on the previous
//! period, `end_of_period` settles open positions against the close and
//! appends one quota row.
//!
//! Accounting is daily mark-to-market: every fill realizes PnL against the
//! last settlement mark, and every settlement folds the day's price move
//! into cash. Equity therefore equals cash at all times after settlement.

pub mod order;

pub use order::{Order, OrderError, QuotaRow, TradeRecord};

use crate::data::{Asset, Base, CommissionKind, Line, LineError};
use crate::engine::registry::{SharedEntry, SharedRegistry};
use chrono::NaiveDate;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Default notional the ledger starts with.
pub const DEFAULT_CASH: f64 = 100_000_000.0;

/// Shared handle over the broker.
pub type SharedBroker = Rc<RefCell<Broker>>;

#[derive(Debug, Clone, Copy)]
struct Position {
    size: f64,
    /// Last settlement price (or fill price before the first settlement).
    mark: f64,
}

/// The settlement ledger.
#[derive(Debug)]
pub struct Broker {
    clock: Line<NaiveDate>,
    starting_cash: f64,
    cash: f64,
    assets: SharedRegistry<Asset>,
    hedges: SharedRegistry<Asset>,
    /// Currency-pair bases keyed by the foreign currency code
    /// (first three characters of the pair ticker).
    currs: BTreeMap<String, SharedEntry<Base>>,
    carry: Option<SharedEntry<Base>>,
    market: Option<SharedEntry<Base>>,
    pending: Vec<Order>,
    positions: Vec<(String, Position)>,
    records: Vec<TradeRecord>,
    quotas: Vec<QuotaRow>,
    echo: bool,
}

impl Broker {
    pub fn new(
        index: Vec<NaiveDate>,
        cursor: usize,
        assets: SharedRegistry<Asset>,
        hedges: SharedRegistry<Asset>,
        echo: bool,
    ) -> Result<Self, LineError> {
        let clock = Line::with_cursor(index, cursor)?;
        Ok(Self {
            clock,
            starting_cash: DEFAULT_CASH,
            cash: DEFAULT_CASH,
            assets,
            hedges,
            currs: BTreeMap::new(),
            carry: None,
            market: None,
            pending: Vec::new(),
            positions: Vec::new(),
            records: Vec::new(),
            quotas: Vec::new(),
            echo,
        })
    }

    pub fn shared(self) -> SharedBroker {
        Rc::new(RefCell::new(self))
    }

    // ─── Registration hooks ───

    /// Register a currency-pair base. The pair ticker's first three
    /// characters name the foreign currency it converts from.
    pub fn add_curr(&mut self, base: SharedEntry<Base>) {
        let code: String = base.borrow().ticker().chars().take(3).collect();
        self.currs.insert(code, base);
    }

    /// Register the cost-of-carry proxy; its close is the daily accrual
    /// rate applied to cash at settlement.
    pub fn add_carry(&mut self, base: SharedEntry<Base>) {
        self.carry = Some(base);
    }

    /// Register the market index base.
    pub fn add_market(&mut self, base: SharedEntry<Base>) {
        self.market = Some(base);
    }

    pub fn has_curr(&self, code: &str) -> bool {
        self.currs.contains_key(code)
    }

    pub fn has_carry(&self) -> bool {
        self.carry.is_some()
    }

    pub fn has_market(&self) -> bool {
        self.market.is_some()
    }

    // ─── Period phases ───

    /// Advance the internal clock one step.
    pub fn next(&mut self) -> Result<(), LineError> {
        self.clock.advance()
    }

    /// Fill every queued order at its limit price, or at the current open
    /// when no limit is set. Charges commission and realizes PnL against
    /// the last settlement mark.
    pub fn beg_of_period(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for order in pending {
            let Some(asset) = self.lookup(&order.ticker) else {
                continue;
            };
            let (price, commission) = {
                let asset = asset.borrow();
                let open = asset.open(0).filter(|v| !v.is_nan());
                let close = asset.close(0).filter(|v| !v.is_nan());
                let Some(price) = order.limit.or(open).or(close) else {
                    // No price yet for this instrument; drop the ticket.
                    continue;
                };
                let fx = self.fx(asset.currency());
                let commission = match asset.commission_kind() {
                    CommissionKind::Percent => {
                        order.size.abs() * price * asset.multiplier() * fx * asset.commission()
                    }
                    CommissionKind::Absolute => order.size.abs() * asset.commission(),
                };
                (price, commission)
            };

            self.cash -= commission;
            {
                let asset = asset.borrow();
                let pnl_unit = asset.multiplier() * self.fx(asset.currency());
                self.apply_fill(&order.ticker, order.size, price, pnl_unit);
            }

            let date = self.clock.get(0).unwrap_or_default();
            if self.echo {
                eprintln!(
                    "{date} {ticker} {size:+.2} @ {price:.4} (comm {commission:.2})",
                    ticker = order.ticker,
                    size = order.size,
                );
            }
            self.records.push(TradeRecord {
                date,
                ticker: order.ticker,
                size: order.size,
                price,
                commission,
            });
        }
    }

    /// Settle every open position against the current close, apply carry
    /// accrual, and append one quota row.
    pub fn end_of_period(&mut self) {
        let mut i = 0;
        while i < self.positions.len() {
            let (ticker, mut pos) = {
                let (t, p) = &self.positions[i];
                (t.clone(), *p)
            };
            if let Some(asset) = self.lookup(&ticker) {
                let asset = asset.borrow();
                if let Some(close) = asset.close(0).filter(|v| !v.is_nan()) {
                    let fx = self.fx(asset.currency());
                    self.cash += pos.size * asset.multiplier() * fx * (close - pos.mark);
                    pos.mark = close;
                    self.positions[i].1 = pos;
                }
            }
            if self.positions[i].1.size == 0.0 {
                self.positions.remove(i);
            } else {
                i += 1;
            }
        }

        if let Some(carry) = &self.carry {
            if let Some(rate) = carry.borrow().close(0).filter(|v| !v.is_nan()) {
                self.cash *= 1.0 + rate;
            }
        }

        let equity = self.cash;
        let date = self.clock.get(0).unwrap_or_default();
        let prev = self.quotas.last().map(|q| q.equity).unwrap_or(self.starting_cash);
        self.quotas.push(QuotaRow {
            date,
            equity,
            quota: 100.0 * equity / self.starting_cash,
            ret: equity / prev - 1.0,
            cum_return: equity / self.starting_cash - 1.0,
        });
    }

    // ─── Order entry ───

    /// Queue an order for the next `beg_of_period`.
    pub fn order(&mut self, ticker: &str, size: f64, limit: Option<f64>) -> Result<(), OrderError> {
        if self.lookup(ticker).is_none() {
            return Err(OrderError::UnknownTicker {
                ticker: ticker.to_string(),
            });
        }
        self.pending.push(Order::new(ticker, size, limit)?);
        Ok(())
    }

    /// Queue whatever order moves the position to `target`. A target equal
    /// to the current size queues nothing.
    pub fn order_target(&mut self, ticker: &str, target: f64) -> Result<(), OrderError> {
        let delta = target - self.position_size(ticker);
        if delta == 0.0 {
            return Ok(());
        }
        self.order(ticker, delta, None)
    }

    /// Flatten an open position (rolling chains close the expiring leg
    /// through this).
    pub fn close(&mut self, ticker: &str) -> Result<(), OrderError> {
        let size = self.position_size(ticker);
        if size == 0.0 {
            return Ok(());
        }
        self.order(ticker, -size, None)
    }

    // ─── Views ───

    pub fn date(&self) -> Option<NaiveDate> {
        self.clock.get(0)
    }

    /// Equity after the last settlement.
    pub fn equity(&self) -> f64 {
        self.cash
    }

    pub fn starting_cash(&self) -> f64 {
        self.starting_cash
    }

    pub fn cum_return(&self) -> f64 {
        self.cash / self.starting_cash - 1.0
    }

    pub fn position_size(&self, ticker: &str) -> f64 {
        self.positions
            .iter()
            .find(|(t, _)| t == ticker)
            .map(|(_, p)| p.size)
            .unwrap_or(0.0)
    }

    /// Signed notional of positions held in the primary asset registry,
    /// in home currency. Hedge sizing offsets this.
    pub fn primary_exposure(&self) -> f64 {
        let assets = self.assets.borrow();
        self.positions
            .iter()
            .filter_map(|(ticker, pos)| {
                let asset = assets.get(ticker)?;
                let asset = asset.borrow();
                let close = asset.close(0).filter(|v| !v.is_nan())?;
                Some(pos.size * asset.multiplier() * self.fx(asset.currency()) * close)
            })
            .sum()
    }

    pub fn quotas(&self) -> &[QuotaRow] {
        &self.quotas
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // ─── Internals ───

    fn lookup(&self, ticker: &str) -> Option<SharedEntry<Asset>> {
        let hit = self.assets.borrow().get(ticker);
        hit.or_else(|| self.hedges.borrow().get(ticker))
    }

    /// Conversion rate from `currency` into home currency; 1.0 for home
    /// or when the pair has no observation yet.
    pub fn fx(&self, currency: Option<&str>) -> f64 {
        let Some(code) = currency else {
            return 1.0;
        };
        self.currs
            .get(code)
            .and_then(|base| base.borrow().close(0))
            .filter(|v| !v.is_nan())
            .unwrap_or(1.0)
    }

    fn apply_fill(&mut self, ticker: &str, fill: f64, price: f64, pnl_unit: f64) {
        let slot = self.positions.iter_mut().find(|(t, _)| t == ticker);
        let Some((_, pos)) = slot else {
            self.positions
                .push((ticker.to_string(), Position { size: fill, mark: price }));
            return;
        };

        if pos.size.signum() == fill.signum() {
            // Scaling in: size-weighted mark.
            let total = pos.size + fill;
            pos.mark = (pos.mark * pos.size + price * fill) / total;
            pos.size = total;
            return;
        }

        // Closing (possibly flipping): realize against the mark.
        let closed = fill.abs().min(pos.size.abs());
        self.cash += closed * pnl_unit * (price - pos.mark) * pos.size.signum();
        let remaining = pos.size + fill;
        if remaining == 0.0 {
            pos.size = 0.0;
        } else if remaining.signum() == pos.size.signum() {
            pos.size = remaining;
        } else {
            // Flip: the surplus opens a fresh position at the fill price.
            pos.size = remaining;
            pos.mark = price;
        }
        self.positions.retain(|(_, p)| p.size != 0.0);
    }
}
