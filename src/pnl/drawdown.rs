//! Drawdown of the equity ratio (position value over invested capital).
//!
//! Measuring against invested capital rather than raw position value keeps
//! new deposits from registering as new peaks.

use chrono::NaiveDate;
use serde::Serialize;

use crate::types::PositionRecord;

/// Drawdown state on one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DrawdownPoint {
    pub date: NaiveDate,
    /// `total_position / total_invested`, 0 before any capital is invested.
    pub equity_ratio: f64,
    /// Running maximum of `equity_ratio`.
    pub rolling_peak: f64,
    /// `1 - equity_ratio / rolling_peak`, 0 while the peak is 0.
    pub drawdown: f64,
    /// Date of the most recent new peak.
    pub peak_date: NaiveDate,
    /// Dates elapsed since `peak_date`.
    pub duration: usize,
}

impl DrawdownPoint {
    pub fn is_peak(&self) -> bool {
        self.drawdown == 0.0
    }
}

/// Summary of a drawdown series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawdownStats {
    pub max_drawdown_pct: f64,
    /// Earliest date reaching the maximum drawdown.
    pub max_drawdown_date: NaiveDate,
    pub max_duration: usize,
    /// Mean duration over dates in drawdown; `None` if there are none.
    pub avg_duration: Option<f64>,
}

/// Computes the per-date drawdown series in a single pass.
pub fn drawdown_series(records: &[PositionRecord]) -> Vec<DrawdownPoint> {
    let mut points = Vec::with_capacity(records.len());
    let mut rolling_peak = f64::NEG_INFINITY;
    let mut peak_date = records.first().map(|r| r.date);
    let mut duration = 0usize;

    for record in records {
        let equity_ratio = if record.total_invested > 0.0 {
            record.total_position / record.total_invested
        } else {
            0.0
        };
        rolling_peak = rolling_peak.max(equity_ratio);

        let drawdown = if rolling_peak > 0.0 {
            1.0 - equity_ratio / rolling_peak
        } else {
            0.0
        };

        if drawdown == 0.0 {
            peak_date = Some(record.date);
            duration = 0;
        } else {
            duration += 1;
        }

        points.push(DrawdownPoint {
            date: record.date,
            equity_ratio,
            rolling_peak,
            drawdown,
            peak_date: peak_date.unwrap_or(record.date),
            duration,
        });
    }
    points
}

/// Reduces a drawdown series to its maximum depth and duration figures.
///
/// Returns `None` for an empty series.
pub fn drawdown_stats(points: &[DrawdownPoint]) -> Option<DrawdownStats> {
    let first = points.first()?;

    let mut deepest = first;
    for point in points {
        if point.drawdown > deepest.drawdown {
            deepest = point;
        }
    }

    let max_duration = points.iter().map(|p| p.duration).max().unwrap_or(0);
    let in_drawdown: Vec<usize> = points
        .iter()
        .filter(|p| !p.is_peak())
        .map(|p| p.duration)
        .collect();
    let avg_duration = (!in_drawdown.is_empty())
        .then(|| in_drawdown.iter().sum::<usize>() as f64 / in_drawdown.len() as f64);

    Some(DrawdownStats {
        max_drawdown_pct: deepest.drawdown * 100.0,
        max_drawdown_date: deepest.date,
        max_duration,
        avg_duration,
    })
}
