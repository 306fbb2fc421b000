use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Ok, Result};
use clap::Parser;
use polars::prelude::{DataFrame, NamedFrom, Series};
use tracing::info;

use aip_backtest::assets::fetch_close_prices;
use aip_backtest::config::{AppConfig, DataSource};
use aip_backtest::frame::{positions_to_dataframe, read_price_csv, report_to_dataframe};
use aip_backtest::logging::init_logging;
use aip_backtest::sweep::run_portfolios;

/// Backtest fixed-weight periodic investment plans.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Print the daily position table of every portfolio.
    #[arg(long)]
    positions: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    init_logging(&config.logging).map_err(|e| anyhow!(e))?;

    let (start, end) = (config.start_date, config.end_date());
    let prices = match config.data.source {
        DataSource::Yahoo => fetch_close_prices(&config.assets, start, end).await?,
        DataSource::Csv => {
            let path = config
                .data
                .csv_path
                .as_ref()
                .context("data.csv_path is required for the csv source")?;
            read_price_csv(path)?.between(start, end)
        }
    };
    info!(dates = prices.len(), tickers = prices.tickers().len(), "prices ready");

    let deposits = config.deposit_schedule()?;
    let portfolios = config.portfolio_weights()?;

    let start_time = std::time::Instant::now();
    let runs = run_portfolios(Arc::new(prices), Arc::new(deposits), portfolios).await?;
    info!(elapsed = ?start_time.elapsed(), "sweep finished");

    let mut summary: Option<DataFrame> = None;
    for run in &runs {
        println!("== {} ==\n{}\n", run.name, run.report);
        if cli.positions {
            println!("{}\n", positions_to_dataframe(&run.positions)?);
        }

        let row = report_to_dataframe(&run.report)?;
        summary = Some(match summary {
            Some(acc) => acc.vstack(&row)?,
            None => row,
        });
    }

    if let Some(mut summary) = summary {
        let names: Vec<&str> = runs.iter().map(|r| r.name.as_str()).collect();
        summary.with_column(Series::new("Portfolio", names))?;
        println!("{}", summary);
    }
    Ok(())
}
