use std::sync::Arc;

use futures::{stream::FuturesUnordered, StreamExt};
use tracing::{debug, info};

use crate::error::{AipError, AipResult};
use crate::pnl::{analyze, MetricsReport};
use crate::portfolio::simulate;
use crate::types::{CashDeposits, PositionSeries, PriceSeries, TargetWeights};

/// Outcome of one weight set in a sweep.
#[derive(Debug, Clone)]
pub struct PortfolioRun {
    pub name: String,
    pub positions: PositionSeries,
    pub report: MetricsReport,
}

/// Simulates and analyzes every named weight set against the same prices and deposits.
///
/// Runs execute concurrently on the blocking pool. Results come back in the
/// order of `portfolios`; the first failing run fails the whole sweep.
pub async fn run_portfolios(
    prices: Arc<PriceSeries>,
    deposits: Arc<CashDeposits>,
    portfolios: Vec<(String, TargetWeights)>,
) -> AipResult<Vec<PortfolioRun>> {
    info!(portfolios = portfolios.len(), dates = prices.len(), "starting sweep");
    let count = portfolios.len();

    let mut futures = FuturesUnordered::new();
    for (index, (name, weights)) in portfolios.into_iter().enumerate() {
        let prices = Arc::clone(&prices);
        let deposits = Arc::clone(&deposits);
        futures.push(async move {
            let joined = tokio::task::spawn_blocking(move || {
                let positions = simulate(&prices, &deposits, &weights)?;
                let report = analyze(positions.records())?;
                Ok::<_, AipError>(PortfolioRun {
                    name,
                    positions,
                    report,
                })
            })
            .await;
            (index, joined)
        });
    }

    let mut runs: Vec<Option<PortfolioRun>> = vec![None; count];
    while let Some((index, joined)) = futures.next().await {
        let run = joined.map_err(|e| AipError::Internal(format!("portfolio task: {}", e)))??;
        debug!(portfolio = %run.name, "portfolio finished");
        runs[index] = Some(run);
    }

    Ok(runs.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn inputs() -> (Arc<PriceSeries>, Arc<CashDeposits>) {
        let prices = PriceSeries::from_rows(
            (1..=5).map(|d| (date(d), vec![("SPY", 100.0 + d as f64), ("AGG", 50.0)])),
        )
        .unwrap();
        let deposits = CashDeposits::new([(date(1), 1000.0), (date(3), 1000.0)]).unwrap();
        (Arc::new(prices), Arc::new(deposits))
    }

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let (prices, deposits) = inputs();
        let portfolios = vec![
            ("bonds".to_string(), TargetWeights::new([("AGG", 1.0)]).unwrap()),
            ("stocks".to_string(), TargetWeights::new([("SPY", 1.0)]).unwrap()),
            (
                "mixed".to_string(),
                TargetWeights::new([("SPY", 0.5), ("AGG", 0.5)]).unwrap(),
            ),
        ];

        let runs = run_portfolios(prices, deposits, portfolios).await.unwrap();
        let names: Vec<&str> = runs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["bonds", "stocks", "mixed"]);
        assert_eq!(runs[0].report.final_value, 2000.0);
        assert_eq!(runs[1].report.total_invested, 2000.0);
    }

    #[tokio::test]
    async fn test_matches_sequential_run() {
        let (prices, deposits) = inputs();
        let weights = TargetWeights::new([("SPY", 0.3), ("AGG", 0.7)]).unwrap();

        let expected = analyze(simulate(&prices, &deposits, &weights).unwrap().records()).unwrap();
        let runs = run_portfolios(prices, deposits, vec![("p".to_string(), weights)])
            .await
            .unwrap();
        assert_eq!(runs[0].report, expected);
    }

    #[tokio::test]
    async fn test_failing_portfolio_fails_sweep() {
        let (prices, deposits) = inputs();
        let portfolios = vec![
            ("ok".to_string(), TargetWeights::new([("SPY", 1.0)]).unwrap()),
            ("missing".to_string(), TargetWeights::new([("QQQ", 1.0)]).unwrap()),
        ];

        let result = run_portfolios(prices, deposits, portfolios).await;
        assert!(matches!(result, Err(AipError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_empty_sweep() {
        let (prices, deposits) = inputs();
        assert!(run_portfolios(prices, deposits, vec![]).await.unwrap().is_empty());
    }
}
