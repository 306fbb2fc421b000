//! Backtest configuration.
//!
//! Loaded from a TOML file and overridable through `AIP__`-prefixed
//! environment variables, e.g. `AIP__DEPOSITS__AMOUNT=250`.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::assets::AssetSource;
use crate::error::AipResult;
use crate::logging::LogConfig;
use crate::schedule::{self, DepositInterval};
use crate::types::{CashDeposits, TargetWeights};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub start_date: NaiveDate,
    /// Defaults to today.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub logging: LogConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub assets: Vec<AssetSource>,
    #[serde(default)]
    pub deposits: Option<DepositConfig>,
    pub portfolios: Vec<PortfolioConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    #[default]
    Yahoo,
    Csv,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub source: DataSource,
    /// Price table for the `csv` source.
    #[serde(default)]
    pub csv_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositConfig {
    pub amount: f64,
    pub interval: DepositInterval,
    /// Defaults to the backtest start date.
    #[serde(default)]
    pub start: Option<NaiveDate>,
    /// Defaults to the backtest end date.
    #[serde(default)]
    pub end: Option<NaiveDate>,
    #[serde(default = "default_shift_weekends")]
    pub shift_weekends: bool,
    #[serde(default)]
    pub extra: Vec<ExtraDeposit>,
}

fn default_shift_weekends() -> bool {
    true
}

/// A one-off deposit on top of the regular schedule.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ExtraDeposit {
    pub date: NaiveDate,
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioConfig {
    pub name: String,
    pub allocations: Vec<Allocation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Allocation {
    pub ticker: String,
    pub weight: f64,
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("AIP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// The regular schedule plus one-off deposits; empty without a `[deposits]` table.
    pub fn deposit_schedule(&self) -> AipResult<CashDeposits> {
        let Some(deposits) = &self.deposits else {
            return Ok(CashDeposits::default());
        };

        let mut schedule = schedule::generate(
            deposits.start.unwrap_or(self.start_date),
            deposits.end.unwrap_or_else(|| self.end_date()),
            deposits.interval,
            deposits.amount,
            deposits.shift_weekends,
        )?;
        for extra in &deposits.extra {
            schedule.add(extra.date, extra.amount)?;
        }
        Ok(schedule)
    }

    /// Validated target weights for every configured portfolio, in file order.
    pub fn portfolio_weights(&self) -> AipResult<Vec<(String, TargetWeights)>> {
        self.portfolios
            .iter()
            .map(|portfolio| {
                let weights = TargetWeights::new(
                    portfolio
                        .allocations
                        .iter()
                        .map(|a| (a.ticker.as_str(), a.weight)),
                )?;
                Ok((portfolio.name.clone(), weights))
            })
            .collect()
    }
}
