//! Process-wide run settings.
//!
//! One immutable `Settings` value replaces scattered environment-derived
//! constants. It is read once at construction time and threaded through the
//! engine by shared handle; nothing re-validates it per call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How the hedge overlay sizes itself, and which separator the book label
/// uses (`/` for exposure hedging, `#` for beta hedging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HedgeMethod {
    Expo,
    Beta,
}

impl HedgeMethod {
    /// Book-label separator between the asset and hedge tickers.
    pub fn separator(&self) -> char {
        match self {
            HedgeMethod::Expo => '/',
            HedgeMethod::Beta => '#',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HedgeMethod::Expo => "EXPO",
            HedgeMethod::Beta => "BETA",
        }
    }
}

/// Position sizing style used by `StrategyCtx::sizing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SizingMethod {
    /// Volatility-target: budget × equity / (vol × price × multiplier).
    Volatility,
    /// Fixed notional fraction of equity.
    Fixed,
}

impl SizingMethod {
    pub fn name(&self) -> &'static str {
        match self {
            SizingMethod::Volatility => "VOLATILITY",
            SizingMethod::Fixed => "FIXED",
        }
    }
}

/// Immutable run-wide configuration constants.
///
/// Each field is consumed at exactly one call site:
/// - `buffer`: initial clock cursor (warmup history available at tick one).
/// - `hedge_method`: book-label separator and hedge sizing style.
/// - `sizing_method` / `thresh` / `vparam` / `volatility`:
///   `StrategyCtx::sizing` and `StrategyCtx::volatility`.
/// - `max_loss`: the run-loop circuit breaker.
/// - `carry` / `market` / `pairs`: base-ticker classification in
///   `Backtest::add_base`.
/// - `currency`: the broker's home currency for PnL conversion.
/// - `roll_lag`: days before maturity at which `Rolling` rolls the chain.
/// - `echo`: broker trade echo to stderr.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub buffer: usize,
    pub hedge_method: HedgeMethod,
    pub sizing_method: SizingMethod,
    pub thresh: f64,
    pub vparam: f64,
    pub max_loss: f64,
    pub volatility: f64,
    pub carry: String,
    pub market: String,
    pub currency: String,
    pub pairs: BTreeSet<String>,
    pub roll_lag: usize,
    pub echo: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            buffer: 200,
            hedge_method: HedgeMethod::Expo,
            sizing_method: SizingMethod::Volatility,
            thresh: 0.0,
            vparam: 0.05,
            max_loss: -0.30,
            volatility: 0.10,
            carry: "CARRY".to_string(),
            market: "IBOV".to_string(),
            currency: "BRL".to_string(),
            pairs: ["USDBRL", "EURBRL"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            roll_lag: 2,
            echo: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl Settings {
    /// Parse settings from a TOML document. Missing keys fall back to
    /// defaults; present keys are validated.
    pub fn from_toml_str(s: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if !(0.0..=1.0).contains(&self.vparam) {
            return Err(SettingsError::Invalid {
                name: "vparam",
                reason: format!("EWMA alpha must be in [0, 1], got {}", self.vparam),
            });
        }
        if self.volatility <= 0.0 {
            return Err(SettingsError::Invalid {
                name: "volatility",
                reason: format!("volatility budget must be positive, got {}", self.volatility),
            });
        }
        if self.max_loss >= 0.0 {
            return Err(SettingsError::Invalid {
                name: "max_loss",
                reason: format!("max-loss threshold must be negative, got {}", self.max_loss),
            });
        }
        Ok(())
    }
}
