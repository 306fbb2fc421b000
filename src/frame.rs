//! Conversions between pipeline values and polars data frames.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::debug;

use crate::error::{AipError, AipResult};
use crate::pnl::MetricsReport;
use crate::types::{PositionSeries, PriceSeries};

pub const DATE_COLUMN: &str = "Date";

/// Reads a `Date` column plus every numeric column as ticker prices.
///
/// Nulls become missing quotes. Datetime date columns are truncated to dates.
pub fn price_series_from_dataframe(df: &DataFrame) -> AipResult<PriceSeries> {
    let date_column = df
        .column(DATE_COLUMN)
        .map_err(|_| AipError::Data(format!("price table has no {} column", DATE_COLUMN)))?;
    let date_column = match date_column.dtype() {
        DataType::Date => date_column.clone(),
        DataType::Datetime(_, _) => date_column.cast(&DataType::Date)?,
        other => {
            return Err(AipError::Data(format!(
                "{} column has type {}, expected a date",
                DATE_COLUMN, other
            )))
        }
    };

    let mut dates = Vec::with_capacity(df.height());
    for (row, date) in date_column.date()?.as_date_iter().enumerate() {
        let date = date.ok_or_else(|| AipError::Data(format!("row {} has no date", row)))?;
        dates.push(date);
    }

    let mut columns = BTreeMap::new();
    for series in df.get_columns() {
        if series.name() == DATE_COLUMN || !series.dtype().is_numeric() {
            continue;
        }
        let prices = series.cast(&DataType::Float64)?;
        let prices: Vec<Option<f64>> = prices.f64()?.into_iter().collect();
        columns.insert(series.name().to_string(), prices);
    }

    debug!(rows = dates.len(), tickers = columns.len(), "price table loaded");
    PriceSeries::new(dates, columns)
}

/// Inverse of [`price_series_from_dataframe`].
pub fn price_series_to_dataframe(prices: &PriceSeries) -> AipResult<DataFrame> {
    let mut columns = vec![Series::new(DATE_COLUMN, prices.dates())];
    for ticker in prices.tickers() {
        let values = prices.column(ticker).unwrap_or(&[]);
        columns.push(Series::new(ticker, values));
    }
    Ok(DataFrame::new(columns)?)
}

/// Loads a price table from a CSV file with a header row and a `Date` column.
pub fn read_price_csv<P: AsRef<Path>>(path: P) -> AipResult<PriceSeries> {
    let df = CsvReader::from_path(path.as_ref())?
        .has_header(true)
        .with_try_parse_dates(true)
        .finish()?;
    price_series_from_dataframe(&df)
}

/// One row per date: cumulative shares and value per ticker plus portfolio totals.
pub fn positions_to_dataframe(positions: &PositionSeries) -> AipResult<DataFrame> {
    let records = positions.records();
    let dates: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
    let mut columns = vec![Series::new(DATE_COLUMN, dates)];

    for (i, ticker) in positions.tickers().iter().enumerate() {
        let shares: Vec<u64> = records.iter().map(|r| r.shares[i]).collect();
        let values: Vec<f64> = records.iter().map(|r| r.values[i]).collect();
        columns.push(Series::new(ticker, shares));
        columns.push(Series::new(&format!("{}_value", ticker), values));
    }

    let total_position: Vec<f64> = records.iter().map(|r| r.total_position).collect();
    let cash_deposit: Vec<f64> = records.iter().map(|r| r.cash_deposit).collect();
    let total_invested: Vec<f64> = records.iter().map(|r| r.total_invested).collect();
    columns.push(Series::new("total_position", total_position));
    columns.push(Series::new("cash_deposit", cash_deposit));
    columns.push(Series::new("total_invested", total_invested));

    Ok(DataFrame::new(columns)?)
}

/// A single-row table of the metrics; undefined metrics are null.
pub fn report_to_dataframe(report: &MetricsReport) -> AipResult<DataFrame> {
    Ok(df!(
        "XIRR" => [report.xirr],
        "Final Value" => [report.final_value],
        "Total Invested" => [report.total_invested],
        "Total Return" => [report.total_return],
        "Return %" => [report.return_pct],
        "Semi-Deviation" => [report.semi_deviation],
        "Sortino Ratio" => [report.sortino_ratio],
        "Max Drawdown %" => [report.max_drawdown_pct],
        "Max Drawdown Date" => [report.max_drawdown_date],
        "Max Drawdown Duration" => [report.max_drawdown_duration as u64],
        "Average Drawdown Duration" => [report.avg_drawdown_duration]
    )?)
}
