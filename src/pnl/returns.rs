//! Return and downside-risk metrics derived from a position series.

use crate::types::PositionRecord;

/// Trading periods per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// End-of-run value figures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleReturns {
    pub final_value: f64,
    pub total_invested: f64,
    pub total_return: f64,
    /// `None` when nothing was invested.
    pub return_pct: Option<f64>,
}

/// Computes final value, invested capital and total return from the last record.
pub fn simple_returns(last: &PositionRecord) -> SimpleReturns {
    let final_value = last.total_position;
    let total_invested = last.total_invested;
    let total_return = final_value - total_invested;
    let return_pct = (total_invested > 0.0).then(|| total_return / total_invested * 100.0);

    SimpleReturns {
        final_value,
        total_invested,
        total_return,
        return_pct,
    }
}

/// Deposit-adjusted daily returns.
///
/// `(pos_t - pos_{t-1} - deposit_t) / pos_{t-1}`; the first date, and any
/// date whose previous position is 0, yields 0.
pub fn daily_returns(records: &[PositionRecord]) -> Vec<f64> {
    let mut returns = Vec::with_capacity(records.len());
    if records.is_empty() {
        return returns;
    }
    returns.push(0.0);

    for pair in records.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        let r = if prev.total_position > 0.0 {
            (curr.total_position - prev.total_position - curr.cash_deposit) / prev.total_position
        } else {
            0.0
        };
        returns.push(r);
    }
    returns
}

/// Sample standard deviation (n - 1) of the strictly negative returns.
///
/// `Some(0.0)` without losses; `None` for a single loss, where the sample
/// deviation is undefined.
pub fn semi_deviation(returns: &[f64]) -> Option<f64> {
    let losses: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    match losses.len() {
        0 => return Some(0.0),
        1 => return None,
        _ => {}
    }
    let n = losses.len() as f64;
    let mean = losses.iter().sum::<f64>() / n;
    let variance = losses.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

/// Annualized mean return over annualized semi-deviation.
///
/// `None` when the semi-deviation is 0 or undefined.
pub fn sortino_ratio(returns: &[f64], semi_deviation: Option<f64>) -> Option<f64> {
    let semi_deviation = semi_deviation?;
    if returns.is_empty() || semi_deviation <= 0.0 || !semi_deviation.is_finite() {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    Some((mean * TRADING_DAYS_PER_YEAR) / (semi_deviation * TRADING_DAYS_PER_YEAR.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(
        day: u32,
        total_position: f64,
        cash_deposit: f64,
        total_invested: f64,
    ) -> PositionRecord {
        let date = NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        PositionRecord::totals(date, total_position, cash_deposit, total_invested)
    }

    #[test]
    fn test_simple_returns() {
        let metrics = simple_returns(&record(1, 1250.0, 0.0, 1000.0));
        assert_eq!(metrics.final_value, 1250.0);
        assert_eq!(metrics.total_return, 250.0);
        assert_eq!(metrics.return_pct, Some(25.0));
    }

    #[test]
    fn test_return_pct_undefined_without_capital() {
        let metrics = simple_returns(&record(1, 0.0, 0.0, 0.0));
        assert_eq!(metrics.return_pct, None);
    }

    #[test]
    fn test_daily_returns_back_out_deposits() {
        let records = vec![
            record(1, 1000.0, 1000.0, 1000.0),
            record(2, 1100.0, 0.0, 1000.0),
            // 500 of the increase is the new deposit
            record(3, 1650.0, 500.0, 1500.0),
        ];
        let returns = daily_returns(&records);
        assert_eq!(returns.len(), 3);
        assert_eq!(returns[0], 0.0);
        assert!((returns[1] - 0.10).abs() < 1e-12);
        assert!((returns[2] - (50.0 / 1100.0)).abs() < 1e-12);
    }

    #[test]
    fn test_daily_returns_zero_basis() {
        let records = vec![record(1, 0.0, 0.0, 0.0), record(2, 1000.0, 1000.0, 1000.0)];
        assert_eq!(daily_returns(&records), vec![0.0, 0.0]);
    }

    #[test]
    fn test_semi_deviation_uses_losses_only() {
        let returns = [0.0, 0.05, -0.01, 0.02, -0.03];
        // losses -0.01, -0.03: mean -0.02, sample variance 0.0002
        assert!((semi_deviation(&returns).unwrap() - 0.0002f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_single_loss_is_undefined_not_zero() {
        let returns = [0.0, 0.04, -0.02, 0.01];
        let semi = semi_deviation(&returns);
        assert_eq!(semi, None);
        assert_eq!(sortino_ratio(&returns, semi), None);
    }

    #[test]
    fn test_sortino_undefined_without_losses() {
        let returns = [0.0, 0.01, 0.0, 0.02];
        let semi = semi_deviation(&returns);
        assert_eq!(semi, Some(0.0));
        assert_eq!(sortino_ratio(&returns, semi), None);
    }

    #[test]
    fn test_sortino_annualizes() {
        let returns = [0.0, 0.02, -0.01, 0.01, -0.02];
        let semi = semi_deviation(&returns);
        assert_eq!(sortino_ratio(&returns, semi), Some(0.0));

        let returns = [0.03, -0.01, -0.03];
        let semi = semi_deviation(&returns);
        let mean = returns.iter().sum::<f64>() / 3.0;
        let expected = (mean * 252.0) / (semi.unwrap() * 252.0f64.sqrt());
        let ratio = sortino_ratio(&returns, semi).unwrap();
        assert!((ratio - expected).abs() < 1e-12);
    }
}
