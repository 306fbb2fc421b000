use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::error::AipResult;
use crate::types::{CashDeposits, PositionRecord, PositionSeries, PriceSeries, TargetWeights};

/// An allocation rule that turns a price history into a position time series.
pub trait Strategy {
    fn run(&self, prices: &PriceSeries) -> AipResult<PositionSeries>;
}

/// Fixed-weight periodic investment plan.
#[derive(Debug, Clone)]
pub struct BasicAip {
    pub target_weights: TargetWeights,
    pub cash_deposit: CashDeposits,
}

impl BasicAip {
    pub fn new(target_weights: TargetWeights, cash_deposit: CashDeposits) -> Self {
        Self {
            target_weights,
            cash_deposit,
        }
    }

    pub fn builder() -> BasicAipBuilder {
        BasicAipBuilder::new()
    }
}

impl Strategy for BasicAip {
    fn run(&self, prices: &PriceSeries) -> AipResult<PositionSeries> {
        simulate(prices, &self.cash_deposit, &self.target_weights)
    }
}

#[derive(Default)]
pub struct BasicAipBuilder {
    weights: Vec<(String, f64)>,
    deposits: Vec<(NaiveDate, f64)>,
}

impl BasicAipBuilder {
    pub fn new() -> BasicAipBuilder {
        BasicAipBuilder::default()
    }

    pub fn weight(mut self, ticker: &str, weight: f64) -> Self {
        self.weights.push((ticker.to_string(), weight));
        self
    }

    pub fn deposit(mut self, date: NaiveDate, amount: f64) -> Self {
        self.deposits.push((date, amount));
        self
    }

    pub fn deposits(mut self, schedule: &CashDeposits) -> Self {
        self.deposits.extend(schedule.iter());
        self
    }

    pub fn build(self) -> AipResult<BasicAip> {
        Ok(BasicAip {
            target_weights: TargetWeights::new(self.weights)?,
            cash_deposit: CashDeposits::new(self.deposits)?,
        })
    }
}

/// Simulates periodic fixed-weight purchases over the price timeline.
///
/// The price dates are the timeline. Each date's deposit (0 if none) is split
/// by weight and converted into whole units at that date's price; the
/// remainder of every bucket is left uninvested. Deposits on dates outside
/// the timeline are dropped.
pub fn simulate(
    prices: &PriceSeries,
    deposits: &CashDeposits,
    weights: &TargetWeights,
) -> AipResult<PositionSeries> {
    let tickers = weights.tickers();
    let prices = prices.select(&tickers)?;
    let timeline = prices.dates();

    info!(
        tickers = ?tickers,
        dates = timeline.len(),
        deposits = deposits.len(),
        "simulating periodic investment plan"
    );
    log_dropped_deposits(timeline, deposits);

    let weight_by_index: Vec<f64> = tickers
        .iter()
        .map(|t| weights.get(t).unwrap_or(0.0))
        .collect();
    let columns: Vec<&[Option<f64>]> = tickers
        .iter()
        .map(|t| prices.column(t).unwrap_or(&[]))
        .collect();

    let mut shares = vec![0u64; tickers.len()];
    let mut last_price = vec![0.0f64; tickers.len()];
    let mut total_invested = 0.0;
    let mut records = Vec::with_capacity(timeline.len());

    for (row, &date) in timeline.iter().enumerate() {
        let cash_deposit = deposits.get(date);
        total_invested += cash_deposit;

        let mut units_bought = vec![0u64; tickers.len()];
        let mut values = vec![0.0f64; tickers.len()];

        for (i, column) in columns.iter().enumerate() {
            let price = column.get(row).copied().flatten();
            if let Some(p) = price {
                if p > 0.0 {
                    let bucket = cash_deposit * weight_by_index[i];
                    units_bought[i] = (bucket / p).floor() as u64;
                }
                last_price[i] = p;
            }
            shares[i] += units_bought[i];
            values[i] = shares[i] as f64 * last_price[i];
        }

        records.push(PositionRecord {
            date,
            units_bought,
            shares: shares.clone(),
            total_position: values.iter().sum(),
            values,
            cash_deposit,
            total_invested,
        });
    }

    debug!(records = records.len(), total_invested, "simulation finished");
    Ok(PositionSeries::new(tickers, records))
}

fn log_dropped_deposits(timeline: &[NaiveDate], deposits: &CashDeposits) {
    let dropped: Vec<(NaiveDate, f64)> = deposits
        .iter()
        .filter(|(date, _)| timeline.binary_search(date).is_err())
        .collect();
    if !dropped.is_empty() {
        let amount: f64 = dropped.iter().map(|(_, a)| a).sum();
        warn!(
            count = dropped.len(),
            amount,
            first = %dropped[0].0,
            "deposits on dates without prices are dropped"
        );
    }
}
