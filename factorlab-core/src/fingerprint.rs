//! Run identity — deterministic fingerprinting of backtest configurations.
//!
//! - `RunConfig`: the user-supplied run coordinates (factor, market, asset,
//!   hedge, vertices, strategy parameters).
//! - `RunId`: content hash of the canonical identity map; equal inputs give
//!   equal ids across builds and platforms.
//! - `RunMeta`: complete record of a run for export.

use crate::settings::{HedgeMethod, Settings};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Domain-separation context for run-id derivation. Changing it invalidates
/// every previously computed id, so it is versioned.
const RUN_ID_CONTEXT: &str = "factorlab 2024-06-01 run identity v1";

/// User-supplied coordinates of a run.
///
/// `BTreeMap` params for deterministic key ordering during hashing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub factor: String,
    pub market: String,
    pub asset: String,
    pub hedge: Option<String>,
    /// Vertex schedule (e.g. futures chain months). Identity-only: it is
    /// hashed into the run id and echoed in the meta, but the shipped
    /// pipelines derive their chains from registered contract maturities,
    /// not from this field.
    pub vertices: Vec<i64>,
    /// Requested strategy parameters; the strategy reports the effective
    /// set back through `Strategy::params`.
    pub params: BTreeMap<String, f64>,
}

/// Deterministic run identifier: namespace-scoped BLAKE3 over the canonical
/// identity map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId([u8; 32]);

impl RunId {
    /// Derive the id from a canonical identity map.
    ///
    /// Canonical serialization: BTreeMap gives sorted keys and serde_json
    /// renders them deterministically.
    pub fn derive(identity: &BTreeMap<String, serde_json::Value>) -> Self {
        let canonical =
            serde_json::to_string(identity).expect("identity map must serialize");
        Self(blake3::derive_key(RUN_ID_CONTEXT, canonical.as_bytes()))
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// First 16 hex characters, for logs and filenames.
    pub fn short(&self) -> String {
        self.to_hex()[..16].to_string()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for RunId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Build the canonical identity map: run coordinates, resolved base
/// tickers, pipeline and strategy names, effective strategy parameters,
/// and the identity-bearing settings (volatility budget, buffer).
#[allow(clippy::too_many_arguments)]
pub fn identity_map(
    config: &RunConfig,
    base: Option<&str>,
    hbase: Option<&str>,
    pipeline: &str,
    strategy: &str,
    params: &BTreeMap<String, f64>,
    settings: &Settings,
) -> BTreeMap<String, serde_json::Value> {
    use serde_json::json;

    let mut map = BTreeMap::new();
    map.insert("factor".to_string(), json!(config.factor));
    map.insert("market".to_string(), json!(config.market));
    map.insert("asset".to_string(), json!(config.asset));
    map.insert("hedge".to_string(), json!(config.hedge));
    map.insert("base".to_string(), json!(base));
    map.insert("hbase".to_string(), json!(hbase));
    map.insert("vertices".to_string(), json!(config.vertices));
    map.insert("pipeline".to_string(), json!(pipeline));
    map.insert("strategy".to_string(), json!(strategy));
    map.insert("params".to_string(), json!(params));
    map.insert("volatility".to_string(), json!(settings.volatility));
    map.insert("buffer".to_string(), json!(settings.buffer));
    map
}

/// Book label: `FACTOR-MARKET-ASSET`, plus the hedge ticker behind the
/// method separator (`/` exposure, `#` beta) when a hedge is configured.
pub fn bookname(config: &RunConfig, method: HedgeMethod) -> String {
    let head = format!("{}-{}-{}", config.factor, config.market, config.asset);
    match &config.hedge {
        Some(hedge) => format!("{head}{}{hedge}", method.separator()),
        None => head,
    }
}

/// Complete exportable record of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    // ── Identity ──
    pub uid: RunId,
    pub bookname: String,
    pub updtime: NaiveDateTime,

    // ── Coordinates ──
    pub factor: String,
    pub market: String,
    pub asset: String,
    pub hedge: Option<String>,
    pub base: Option<String>,
    pub hbase: Option<String>,
    pub vertices: Vec<i64>,

    // ── Components ──
    pub pipeline: String,
    pub strategy: String,
    pub params: BTreeMap<String, f64>,

    // ── Settings snapshot ──
    pub sizing: String,
    pub thresh: f64,
    pub vparam: f64,
    pub volatility: f64,
    pub buffer: usize,

    // ── Span ──
    /// First simulated trading day: the calendar date at the warmup
    /// cursor, not the calendar's first date.
    pub sdate: NaiveDate,
    pub edate: NaiveDate,
}
