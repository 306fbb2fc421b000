//! Performance analysis of a simulated position series.
//!
//! [`analyze`] combines the money-weighted return, simple return figures,
//! deposit-adjusted daily-return risk ratios and drawdown statistics into a
//! single [`MetricsReport`]. Degenerate inputs (nothing invested, no losses,
//! no solvable rate) produce `None` metrics instead of errors.

pub mod drawdown;
pub mod returns;
pub mod xirr;

use std::borrow::Cow;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{AipError, AipResult};
use crate::types::PositionRecord;

pub use drawdown::{drawdown_series, drawdown_stats, DrawdownPoint, DrawdownStats};
pub use returns::{daily_returns, semi_deviation, simple_returns, sortino_ratio, SimpleReturns};
pub use xirr::{xirr, xnpv, CashFlow};

/// Metrics for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub xirr: Option<f64>,
    pub final_value: f64,
    pub total_invested: f64,
    pub total_return: f64,
    pub return_pct: Option<f64>,
    /// `None` when only one daily loss occurred.
    pub semi_deviation: Option<f64>,
    pub sortino_ratio: Option<f64>,
    pub max_drawdown_pct: f64,
    pub max_drawdown_date: NaiveDate,
    pub max_drawdown_duration: usize,
    pub avg_drawdown_duration: Option<f64>,
}

/// Deposits as outflows plus the final position value as the liquidation inflow.
pub fn cash_flows(records: &[PositionRecord]) -> Vec<CashFlow> {
    let mut flows: Vec<CashFlow> = records
        .iter()
        .filter(|r| r.cash_deposit > 0.0)
        .map(|r| CashFlow::new(r.date, -r.cash_deposit))
        .collect();
    if let Some(last) = records.last() {
        flows.push(CashFlow::new(last.date, last.total_position));
    }
    flows
}

/// Computes the metrics report for a position series.
///
/// Records are re-sorted by date if the caller did not supply them in order.
pub fn analyze(positions: &[PositionRecord]) -> AipResult<MetricsReport> {
    if positions.is_empty() {
        return Err(AipError::Validation(
            "cannot analyze an empty position series".to_string(),
        ));
    }

    let sorted = positions.windows(2).all(|w| w[0].date <= w[1].date);
    let records: Cow<'_, [PositionRecord]> = if sorted {
        Cow::Borrowed(positions)
    } else {
        let mut sorted = positions.to_vec();
        sorted.sort_by_key(|r| r.date);
        Cow::Owned(sorted)
    };

    let flows = cash_flows(&records);
    let xirr = match xirr::xirr(&flows) {
        Ok(rate) => Some(rate),
        Err(err) => {
            warn!(error = %err, flows = flows.len(), "xirr is undefined for this run");
            None
        }
    };

    let last = &records[records.len() - 1];
    let simple = simple_returns(last);

    let returns = daily_returns(&records);
    let semi = semi_deviation(&returns);
    let sortino = sortino_ratio(&returns, semi);

    let points = drawdown_series(&records);
    let stats = drawdown_stats(&points).ok_or_else(|| {
        AipError::Internal("drawdown series is empty for a non-empty input".to_string())
    })?;

    debug!(
        dates = records.len(),
        xirr = ?xirr,
        max_drawdown_pct = stats.max_drawdown_pct,
        "performance analyzed"
    );

    Ok(MetricsReport {
        xirr,
        final_value: simple.final_value,
        total_invested: simple.total_invested,
        total_return: simple.total_return,
        return_pct: simple.return_pct,
        semi_deviation: semi,
        sortino_ratio: sortino,
        max_drawdown_pct: stats.max_drawdown_pct,
        max_drawdown_date: stats.max_drawdown_date,
        max_drawdown_duration: stats.max_duration,
        avg_drawdown_duration: stats.avg_duration,
    })
}

struct Metric(Option<f64>);

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{:.2}", v),
            None => write!(f, "undefined"),
        }
    }
}

impl fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let xirr_pct = self.xirr.map(|r| r * 100.0);
        writeln!(f, "XIRR %:                    {}", Metric(xirr_pct))?;
        writeln!(f, "Final Value:               {:.2}", self.final_value)?;
        writeln!(f, "Total Invested:            {:.2}", self.total_invested)?;
        writeln!(f, "Total Return:              {:.2}", self.total_return)?;
        writeln!(f, "Return %:                  {}", Metric(self.return_pct))?;
        match self.semi_deviation {
            Some(semi) => writeln!(f, "Semi-Deviation:            {:.6}", semi)?,
            None => writeln!(f, "Semi-Deviation:            undefined")?,
        }
        writeln!(f, "Sortino Ratio:             {}", Metric(self.sortino_ratio))?;
        writeln!(f, "Max Drawdown %:            {:.2}", self.max_drawdown_pct)?;
        writeln!(f, "Max Drawdown Date:         {}", self.max_drawdown_date)?;
        writeln!(f, "Max Drawdown Duration:     {}", self.max_drawdown_duration)?;
        write!(f, "Average Drawdown Duration: {}", Metric(self.avg_drawdown_duration))
    }
}
