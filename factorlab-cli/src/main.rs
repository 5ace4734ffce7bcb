//! FactorLab CLI — run configured factor backtests and export results.
//!
//! Commands:
//! - `run` — execute a backtest from a TOML run file, write meta.json,
//!   quotas.csv, and records.csv under the output directory
//! - `id` — print the deterministic run id for a run file without running

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use factorlab_core::{
    Backtest, Calendar, ContractSpec, ExpoHedge, PriceBar, Rolling, RunBundle, RunConfig,
    Settings, Single, SmaCross,
};

#[derive(Parser)]
#[command(name = "factorlab", about = "FactorLab CLI — factor backtesting engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML run file.
    Run {
        /// Path to the TOML run file.
        #[arg(long)]
        config: PathBuf,

        /// Output directory for meta.json, quotas.csv, records.csv.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Print the deterministic run id for a run file.
    Id {
        /// Path to the TOML run file.
        #[arg(long)]
        config: PathBuf,
    },
}

// ── Run file schema ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct RunFile {
    factor: String,
    market: String,
    asset: String,
    hedge: Option<String>,
    #[serde(default)]
    vertices: Vec<i64>,
    #[serde(default)]
    params: BTreeMap<String, f64>,

    /// "single" or "rolling".
    #[serde(default = "default_pipeline")]
    pipeline: String,
    /// Currently "sma_cross".
    #[serde(default = "default_strategy")]
    strategy: String,
    /// Hedge pipeline, when a hedge is configured.
    #[serde(default = "default_pipeline")]
    hedge_pipeline: String,

    calendar: CalendarSection,
    #[serde(default)]
    settings: toml::Table,

    #[serde(default)]
    bases: Vec<BaseSection>,
    #[serde(default)]
    assets: Vec<InstrumentSection>,
    #[serde(default)]
    hedges: Vec<InstrumentSection>,
}

fn default_pipeline() -> String {
    "single".to_string()
}

fn default_strategy() -> String {
    "sma_cross".to_string()
}

#[derive(Deserialize)]
struct CalendarSection {
    start: NaiveDate,
    end: NaiveDate,
    #[serde(default)]
    holidays: Vec<NaiveDate>,
}

#[derive(Deserialize)]
struct BaseSection {
    ticker: String,
    csv: PathBuf,
}

#[derive(Deserialize)]
struct InstrumentSection {
    ticker: String,
    csv: PathBuf,
    multiplier: Option<f64>,
    currency: Option<String>,
    maturity: Option<NaiveDate>,
    commission: Option<f64>,
}

impl InstrumentSection {
    fn spec(&self) -> ContractSpec {
        ContractSpec {
            multiplier: self.multiplier,
            currency: self.currency.clone(),
            maturity: self.maturity,
            commission: self.commission,
        }
    }
}

// ── CSV loading ──────────────────────────────────────────────────────

/// One CSV row; empty open/high/low cells become NaN.
#[derive(Deserialize)]
struct CsvBar {
    date: NaiveDate,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: f64,
}

fn load_bars(path: &Path) -> Result<Vec<PriceBar>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut bars = Vec::new();
    for row in reader.deserialize() {
        let row: CsvBar = row.with_context(|| format!("parsing {}", path.display()))?;
        bars.push(PriceBar::new(
            row.date,
            row.open.unwrap_or(f64::NAN),
            row.high.unwrap_or(f64::NAN),
            row.low.unwrap_or(f64::NAN),
            row.close,
        ));
    }
    if bars.is_empty() {
        bail!("{} contains no rows", path.display());
    }
    Ok(bars)
}

// ── Assembly ─────────────────────────────────────────────────────────

fn load_run_file(path: &Path) -> Result<RunFile> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn build_backtest(file: &RunFile) -> Result<Backtest> {
    let calendar = Calendar::new(
        file.calendar.start,
        file.calendar.end,
        file.calendar.holidays.iter().copied(),
    )?;
    let settings: Settings = Settings::from_toml_str(&file.settings.to_string())?;
    let config = RunConfig {
        factor: file.factor.clone(),
        market: file.market.clone(),
        asset: file.asset.clone(),
        hedge: file.hedge.clone(),
        vertices: file.vertices.clone(),
        params: file.params.clone(),
    };

    let mut bt = match (file.strategy.as_str(), file.pipeline.as_str()) {
        ("sma_cross", "single") => Backtest::new::<SmaCross, Single>(calendar, config, settings)?,
        ("sma_cross", "rolling") => Backtest::new::<SmaCross, Rolling>(calendar, config, settings)?,
        (strategy, pipeline) => {
            bail!("unknown strategy/pipeline combination {strategy:?} + {pipeline:?}")
        }
    };

    if file.hedge.is_some() {
        match file.hedge_pipeline.as_str() {
            "single" => bt.config_hedge::<ExpoHedge, Single>()?,
            "rolling" => bt.config_hedge::<ExpoHedge, Rolling>()?,
            other => bail!("unknown hedge pipeline {other:?}"),
        }
    }

    for base in &file.bases {
        bt.add_base(&base.ticker, load_bars(&base.csv)?)?;
    }
    for asset in &file.assets {
        bt.add_asset(&asset.ticker, load_bars(&asset.csv)?, asset.spec())?;
    }
    for hedge in &file.hedges {
        bt.add_hedge(&hedge.ticker, load_bars(&hedge.csv)?, hedge.spec())?;
    }

    Ok(bt)
}

// ── Export ───────────────────────────────────────────────────────────

fn save_bundle(bundle: &RunBundle, output_dir: &Path) -> Result<PathBuf> {
    let dir = output_dir.join(bundle.meta.uid.short());
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let meta_path = dir.join("meta.json");
    fs::write(&meta_path, serde_json::to_string_pretty(&bundle.meta)?)?;

    let mut quotas = csv::Writer::from_path(dir.join("quotas.csv"))?;
    for row in &bundle.quotas {
        quotas.serialize(row)?;
    }
    quotas.flush()?;

    let mut records = csv::Writer::from_path(dir.join("records.csv"))?;
    for record in &bundle.records {
        records.serialize(record)?;
    }
    records.flush()?;

    Ok(dir)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, output_dir } => {
            let file = load_run_file(&config)?;
            let mut bt = build_backtest(&file)?;
            match bt.run()? {
                Some(bundle) => {
                    let dir = save_bundle(&bundle, &output_dir)?;
                    println!("{} {}", bundle.meta.uid.short(), bundle.meta.bookname);
                    println!(
                        "{} periods, cum return {:+.2}%  ->  {}",
                        bundle.quotas.len(),
                        bundle.quotas.last().map(|q| q.cum_return * 100.0).unwrap_or(0.0),
                        dir.display()
                    );
                }
                None => println!("no assets registered; nothing to run"),
            }
        }
        Commands::Id { config } => {
            let file = load_run_file(&config)?;
            let bt = build_backtest(&file)?;
            println!("{}", bt.run_id());
        }
    }
    Ok(())
}
