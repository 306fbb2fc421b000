use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{AipError, AipResult};

/// Allowed distance of the weight sum from 1.0, relative to the sum.
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Date-indexed closing prices, one column per ticker.
///
/// Dates are strictly increasing. A `None` cell is a missing quote.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    columns: Vec<Vec<Option<f64>>>,
}

impl PriceSeries {
    /// Rows are sorted ascending by date; duplicate dates are rejected.
    pub fn new(
        dates: Vec<NaiveDate>,
        columns: BTreeMap<String, Vec<Option<f64>>>,
    ) -> AipResult<Self> {
        for (ticker, column) in &columns {
            if column.len() != dates.len() {
                return Err(AipError::Data(format!(
                    "column {} has {} rows, date index has {}",
                    ticker,
                    column.len(),
                    dates.len()
                )));
            }
        }

        let mut order: Vec<usize> = (0..dates.len()).collect();
        order.sort_by_key(|&i| dates[i]);
        if let Some(pair) = order.windows(2).find(|w| dates[w[0]] == dates[w[1]]) {
            return Err(AipError::Data(format!(
                "duplicate price date {}",
                dates[pair[0]]
            )));
        }

        let sorted_dates = order.iter().map(|&i| dates[i]).collect();
        let (tickers, columns): (Vec<String>, Vec<Vec<Option<f64>>>) = columns
            .into_iter()
            .map(|(ticker, column)| {
                let sorted = order
                    .iter()
                    .map(|&i| column[i].filter(|p| p.is_finite()))
                    .collect();
                (ticker, sorted)
            })
            .unzip();

        Ok(Self {
            dates: sorted_dates,
            tickers,
            columns,
        })
    }

    /// Tickers absent from a row are missing on that date.
    pub fn from_rows<I, R, S>(rows: I) -> AipResult<Self>
    where
        I: IntoIterator<Item = (NaiveDate, R)>,
        R: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let rows: Vec<(NaiveDate, Vec<(String, f64)>)> = rows
            .into_iter()
            .map(|(date, quotes)| {
                let quotes = quotes.into_iter().map(|(t, p)| (t.into(), p)).collect();
                (date, quotes)
            })
            .collect();

        let tickers: BTreeSet<&String> = rows
            .iter()
            .flat_map(|(_, quotes)| quotes.iter().map(|(t, _)| t))
            .collect();
        let mut columns: BTreeMap<String, Vec<Option<f64>>> = tickers
            .into_iter()
            .map(|t| (t.clone(), vec![None; rows.len()]))
            .collect();

        for (row, (_, quotes)) in rows.iter().enumerate() {
            for (ticker, price) in quotes {
                if let Some(column) = columns.get_mut(ticker) {
                    column[row] = Some(*price);
                }
            }
        }

        let dates = rows.iter().map(|(date, _)| *date).collect();
        Self::new(dates, columns)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column(&self, ticker: &str) -> Option<&[Option<f64>]> {
        self.tickers
            .iter()
            .position(|t| t == ticker)
            .map(|i| self.columns[i].as_slice())
    }

    /// Restricts the series to `tickers`, in the given order.
    ///
    /// Fails with [`AipError::Configuration`] naming every ticker the table lacks.
    pub fn select(&self, tickers: &[String]) -> AipResult<PriceSeries> {
        let mut missing: Vec<String> = tickers
            .iter()
            .filter(|t| !self.tickers.contains(t))
            .cloned()
            .collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(AipError::Configuration { missing });
        }

        let columns = tickers
            .iter()
            .filter_map(|t| self.column(t).map(|c| c.to_vec()))
            .collect();
        Ok(PriceSeries {
            dates: self.dates.clone(),
            tickers: tickers.to_vec(),
            columns,
        })
    }

    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> PriceSeries {
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end).max(lo);
        PriceSeries {
            dates: self.dates[lo..hi].to_vec(),
            tickers: self.tickers.clone(),
            columns: self.columns.iter().map(|c| c[lo..hi].to_vec()).collect(),
        }
    }

    /// Outer-joins two series on date. Cells with no quote become missing.
    pub fn merge(self, other: PriceSeries) -> AipResult<PriceSeries> {
        if let Some(dup) = other.tickers.iter().find(|t| self.tickers.contains(t)) {
            return Err(AipError::Data(format!("ticker {} appears twice", dup)));
        }

        let dates: Vec<NaiveDate> = self
            .dates
            .iter()
            .chain(other.dates.iter())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut columns = BTreeMap::new();
        for series in [&self, &other] {
            let index: BTreeMap<NaiveDate, usize> = series
                .dates
                .iter()
                .enumerate()
                .map(|(i, d)| (*d, i))
                .collect();
            for (ticker, column) in series.tickers.iter().zip(&series.columns) {
                let aligned = dates
                    .iter()
                    .map(|d| index.get(d).and_then(|&i| column[i]))
                    .collect();
                columns.insert(ticker.clone(), aligned);
            }
        }

        PriceSeries::new(dates, columns)
    }
}

/// Scheduled cash deposits keyed by date. Amounts are finite and non-negative.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CashDeposits {
    entries: BTreeMap<NaiveDate, f64>,
}

impl CashDeposits {
    /// Builds a schedule; deposits sharing a date are summed.
    pub fn new<I>(entries: I) -> AipResult<Self>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let mut deposits = Self::default();
        for (date, amount) in entries {
            deposits.add(date, amount)?;
        }
        Ok(deposits)
    }

    pub fn add(&mut self, date: NaiveDate, amount: f64) -> AipResult<()> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(AipError::Validation(format!(
                "deposit on {} must be a non-negative amount, got {}",
                date, amount
            )));
        }
        *self.entries.entry(date).or_insert(0.0) += amount;
        Ok(())
    }

    pub fn extend(&mut self, other: &CashDeposits) {
        for (date, amount) in &other.entries {
            *self.entries.entry(*date).or_insert(0.0) += amount;
        }
    }

    pub fn get(&self, date: NaiveDate) -> f64 {
        self.entries.get(&date).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.entries.iter().map(|(d, a)| (*d, *a))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.entries.values().sum()
    }
}

/// Fraction of each deposit allocated per ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetWeights {
    weights: BTreeMap<String, f64>,
}

impl TargetWeights {
    /// Each weight must lie in [0, 1] and the sum must equal 1.0 within
    /// [`WEIGHT_TOLERANCE`]. Weights are never renormalized.
    pub fn new<I, S>(weights: I) -> AipResult<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (ticker, weight) in weights {
            let ticker = ticker.into();
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(AipError::Validation(format!(
                    "weight for {} must be within [0, 1], got {}",
                    ticker, weight
                )));
            }
            if map.insert(ticker.clone(), weight).is_some() {
                return Err(AipError::Validation(format!(
                    "ticker {} has more than one weight",
                    ticker
                )));
            }
        }

        let sum: f64 = map.values().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE * sum.abs().max(1.0) {
            return Err(AipError::Validation(format!(
                "target weights must sum to 1.0, got {}",
                sum
            )));
        }

        Ok(Self { weights: map })
    }

    pub fn tickers(&self) -> Vec<String> {
        self.weights.keys().cloned().collect()
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.weights.get(ticker).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.weights.iter().map(|(t, w)| (t.as_str(), *w))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Holdings on one timeline date. Per-ticker vectors follow [`PositionSeries::tickers`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRecord {
    pub date: NaiveDate,
    pub units_bought: Vec<u64>,
    pub shares: Vec<u64>,
    /// `shares * price` per ticker. A date without a quote uses the ticker's
    /// last observed price.
    pub values: Vec<f64>,
    pub total_position: f64,
    pub cash_deposit: f64,
    pub total_invested: f64,
}

impl PositionRecord {
    pub fn totals(
        date: NaiveDate,
        total_position: f64,
        cash_deposit: f64,
        total_invested: f64,
    ) -> Self {
        Self {
            date,
            units_bought: Vec::new(),
            shares: Vec::new(),
            values: Vec::new(),
            total_position,
            cash_deposit,
            total_invested,
        }
    }
}

/// Simulation output: one record per timeline date, ascending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionSeries {
    tickers: Vec<String>,
    records: Vec<PositionRecord>,
}

impl PositionSeries {
    pub fn new(tickers: Vec<String>, records: Vec<PositionRecord>) -> Self {
        Self { tickers, records }
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn records(&self) -> &[PositionRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PositionRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&PositionRecord> {
        self.records.last()
    }

    pub fn ticker_index(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_price_series_sorts_rows() {
        let prices =
            PriceSeries::from_rows(vec![(d(3), vec![("SPY", 3.0)]), (d(1), vec![("SPY", 1.0)])])
                .unwrap();
        assert_eq!(prices.dates(), &[d(1), d(3)]);
        assert_eq!(prices.column("SPY").unwrap(), &[Some(1.0), Some(3.0)]);
    }

    #[test]
    fn test_price_series_rejects_duplicate_dates() {
        let result =
            PriceSeries::from_rows(vec![(d(1), vec![("SPY", 1.0)]), (d(1), vec![("SPY", 2.0)])]);
        assert!(matches!(result, Err(AipError::Data(_))));
    }

    #[test]
    fn test_price_series_missing_cells() {
        let prices = PriceSeries::from_rows(vec![
            (d(1), vec![("SPY", 1.0), ("AGG", 2.0)]),
            (d(2), vec![("SPY", 1.5)]),
        ])
        .unwrap();
        assert_eq!(prices.column("AGG").unwrap(), &[Some(2.0), None]);
    }

    #[test]
    fn test_select_reports_missing_tickers() {
        let prices = PriceSeries::from_rows(vec![(d(1), vec![("SPY", 1.0)])]).unwrap();
        let err = prices
            .select(&["QQQ".to_string(), "SPY".to_string(), "BND".to_string()])
            .unwrap_err();
        match err {
            AipError::Configuration { missing } => assert_eq!(missing, vec!["BND", "QQQ"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_merge_outer_joins_dates() {
        let stocks = PriceSeries::from_rows(vec![
            (d(1), vec![("SPY", 10.0)]),
            (d(2), vec![("SPY", 11.0)]),
        ])
        .unwrap();
        let crypto = PriceSeries::from_rows(vec![
            (d(2), vec![("ETH", 100.0)]),
            (d(3), vec![("ETH", 101.0)]),
        ])
        .unwrap();

        let merged = stocks.merge(crypto).unwrap();
        assert_eq!(merged.dates(), &[d(1), d(2), d(3)]);
        assert_eq!(merged.column("SPY").unwrap(), &[Some(10.0), Some(11.0), None]);
        assert_eq!(merged.column("ETH").unwrap(), &[None, Some(100.0), Some(101.0)]);
    }

    #[test]
    fn test_between_clips_rows() {
        let prices = PriceSeries::from_rows((1..=5).map(|day| (d(day), vec![("SPY", day as f64)])))
            .unwrap();
        let clipped = prices.between(d(2), d(4));
        assert_eq!(clipped.dates(), &[d(2), d(3), d(4)]);
        assert_eq!(clipped.column("SPY").unwrap(), &[Some(2.0), Some(3.0), Some(4.0)]);
        assert!(prices.between(d(4), d(2)).is_empty());
    }

    #[test]
    fn test_weights_sum_tolerance() {
        assert!(TargetWeights::new([("A", 0.6), ("B", 0.4)]).is_ok());
        assert!(TargetWeights::new([("A", 0.6), ("B", 0.3999999999)]).is_ok());
        assert!(matches!(
            TargetWeights::new([("A", 0.6), ("B", 0.38)]),
            Err(AipError::Validation(_))
        ));
        assert!(matches!(
            TargetWeights::new([("A", 0.6), ("B", 0.42)]),
            Err(AipError::Validation(_))
        ));
    }

    #[test]
    fn test_weights_out_of_range() {
        assert!(matches!(
            TargetWeights::new([("A", 1.5), ("B", -0.5)]),
            Err(AipError::Validation(_))
        ));
        assert!(matches!(
            TargetWeights::new(Vec::<(&str, f64)>::new()),
            Err(AipError::Validation(_))
        ));
    }

    #[test]
    fn test_deposits_sum_same_date() {
        let deposits = CashDeposits::new([(d(1), 100.0), (d(1), 50.0), (d(2), 10.0)]).unwrap();
        assert_eq!(deposits.get(d(1)), 150.0);
        assert_eq!(deposits.get(d(5)), 0.0);
        assert_eq!(deposits.total(), 160.0);
    }

    #[test]
    fn test_deposits_reject_negative() {
        assert!(matches!(
            CashDeposits::new([(d(1), -1.0)]),
            Err(AipError::Validation(_))
        ));
    }
}
