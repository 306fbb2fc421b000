use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use futures::{stream::FuturesUnordered, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};
use yahoo_finance_api::YahooConnector;

use crate::error::{AipError, AipResult};
use crate::types::PriceSeries;

/// Where a ticker's daily closes come from.
///
/// Assets with a CoinGecko id are fetched from CoinGecko, all others from Yahoo Finance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetSource {
    pub ticker: String,
    #[serde(default)]
    pub coingecko_id: Option<String>,
}

impl AssetSource {
    pub fn stock(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            coingecko_id: None,
        }
    }

    pub fn crypto(ticker: &str, coingecko_id: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            coingecko_id: Some(coingecko_id.to_string()),
        }
    }
}

pub struct Stock {
    pub ticker: String,
    pub client: YahooConnector,
}

impl std::fmt::Debug for Stock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Stock {{ ticker: {} }}", self.ticker)
    }
}

impl Stock {
    pub fn new(ticker: &str) -> AipResult<Self> {
        let client = YahooConnector::new()
            .map_err(|e| AipError::Fetch(format!("yahoo finance client: {}", e)))?;
        Ok(Self {
            ticker: ticker.to_string(),
            client,
        })
    }

    /// Adjusted daily closes between `start` and `end` inclusive.
    pub async fn fetch_history(&self, start: NaiveDate, end: NaiveDate) -> AipResult<PriceSeries> {
        let from = to_offset_datetime(start)?;
        let to = to_offset_datetime(end + Days::new(1))?;
        let res = self
            .client
            .get_quote_history(&self.ticker, from, to)
            .await
            .map_err(|e| AipError::Fetch(format!("yahoo finance ({}): {}", self.ticker, e)))?;
        let quotes = res
            .quotes()
            .map_err(|e| AipError::Fetch(format!("yahoo finance quotes ({}): {}", self.ticker, e)))?;

        let closes = quotes.iter().map(|q| (q.timestamp as i64, q.adjclose));
        daily_closes(&self.ticker, closes, start, end)
    }
}

#[derive(Debug, Clone)]
pub struct Crypto {
    /// CoinGecko coin id, e.g. "ethereum".
    pub name: String,
    pub token: String,
}

impl Crypto {
    pub fn new(name: &str, token: &str) -> Self {
        Self {
            name: name.to_owned(),
            token: token.to_owned(),
        }
    }

    /// Daily USD closes from CoinGecko between `start` and `end` inclusive.
    pub async fn fetch_history(&self, start: NaiveDate, end: NaiveDate) -> AipResult<PriceSeries> {
        let today = Utc::now().date_naive();
        let number_of_days = (today - start).num_days().max(1);
        let id = self.name.clone();
        let res = tokio::task::spawn_blocking(move || {
            rust_gecko::coins::market_chart(
                &id,
                "usd",
                number_of_days.to_string().as_str(),
                Some("daily"),
            )
        })
        .await
        .map_err(|e| AipError::Internal(format!("coingecko task: {}", e)))?;

        let json = res
            .json
            .ok_or_else(|| AipError::Fetch(format!("coingecko ({}): no data received", self.name)))?;
        let closes = market_chart_closes(&json)?;
        daily_closes(&self.token, closes, start, end)
    }
}

/// Extracts `(unix seconds, price)` pairs from a CoinGecko market chart body.
pub fn market_chart_closes(json: &serde_json::Value) -> AipResult<Vec<(i64, f64)>> {
    let prices = json
        .get("prices")
        .and_then(|p| p.as_array())
        .ok_or_else(|| AipError::Fetch("coingecko response has no prices".to_string()))?;

    prices
        .iter()
        .map(|point| {
            let pair = point.as_array().filter(|a| a.len() == 2);
            let ts = pair.and_then(|a| a[0].as_f64());
            let price = pair.and_then(|a| a[1].as_f64());
            match (ts, price) {
                (Some(ts), Some(price)) => Ok(((ts / 1000.0) as i64, price)),
                _ => Err(AipError::Fetch(format!("malformed price point {}", point))),
            }
        })
        .collect()
}

/// Buckets timestamped closes into UTC dates within `[start, end]`.
///
/// The last observation of a date wins.
pub fn daily_closes<I>(
    ticker: &str,
    closes: I,
    start: NaiveDate,
    end: NaiveDate,
) -> AipResult<PriceSeries>
where
    I: IntoIterator<Item = (i64, f64)>,
{
    let mut by_date = std::collections::BTreeMap::new();
    for (ts, price) in closes {
        let date = DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| AipError::Fetch(format!("invalid timestamp {} for {}", ts, ticker)))?
            .date_naive();
        if date >= start && date <= end {
            by_date.insert(date, price);
        }
    }
    debug!(ticker, rows = by_date.len(), "daily closes collected");

    PriceSeries::from_rows(
        by_date
            .into_iter()
            .map(|(date, price)| (date, [(ticker.to_string(), price)])),
    )
}

fn to_offset_datetime(date: NaiveDate) -> AipResult<time::OffsetDateTime> {
    let month = time::Month::try_from(date.month() as u8)
        .map_err(|e| AipError::Data(format!("invalid month in {}: {}", date, e)))?;
    let day = time::Date::from_calendar_date(date.year(), month, date.day() as u8)
        .map_err(|e| AipError::Data(format!("invalid date {}: {}", date, e)))?;
    Ok(day.midnight().assume_utc())
}

async fn fetch_history(
    source: &AssetSource,
    start: NaiveDate,
    end: NaiveDate,
) -> AipResult<PriceSeries> {
    match &source.coingecko_id {
        Some(id) => Crypto::new(id, &source.ticker).fetch_history(start, end).await,
        None => Stock::new(&source.ticker)?.fetch_history(start, end).await,
    }
}

/// Fetches every asset concurrently and outer-joins the histories on date.
pub async fn fetch_close_prices(
    sources: &[AssetSource],
    start: NaiveDate,
    end: NaiveDate,
) -> AipResult<PriceSeries> {
    info!(assets = sources.len(), %start, %end, "fetching close prices");
    let mut futures: FuturesUnordered<_> = sources
        .iter()
        .map(|source| fetch_history(source, start, end))
        .collect();

    let mut merged: Option<PriceSeries> = None;
    while let Some(result) = futures.next().await {
        let series = result?;
        merged = Some(match merged {
            Some(acc) => acc.merge(series)?,
            None => series,
        });
    }

    merged.ok_or_else(|| AipError::Data("no assets configured".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_market_chart_closes() {
        let body = json!({
            "prices": [[1704067200000.0, 2300.5], [1704153600000.0, 2350.0]],
            "market_caps": [],
        });
        let closes = market_chart_closes(&body).unwrap();
        assert_eq!(closes, vec![(1704067200, 2300.5), (1704153600, 2350.0)]);
    }

    #[test]
    fn test_market_chart_rejects_malformed() {
        assert!(market_chart_closes(&json!({})).is_err());
        assert!(market_chart_closes(&json!({"prices": [[1.0]]})).is_err());
    }

    #[test]
    fn test_daily_closes_keep_last_and_clip() {
        // 2024-01-01 00:00 UTC, 2024-01-01 23:00 UTC, 2024-01-02, 2024-01-05
        let closes = vec![
            (1704067200, 1.0),
            (1704150000, 2.0),
            (1704153600, 3.0),
            (1704412800, 4.0),
        ];
        let series = daily_closes("ETH", closes, date(2024, 1, 1), date(2024, 1, 2)).unwrap();
        assert_eq!(series.dates(), &[date(2024, 1, 1), date(2024, 1, 2)]);
        assert_eq!(series.column("ETH").unwrap(), &[Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_offset_datetime_conversion() {
        let dt = to_offset_datetime(date(2024, 2, 29)).unwrap();
        assert_eq!(dt.unix_timestamp(), 1709164800);
    }

    #[test]
    fn test_asset_source_from_toml_shape() {
        let source: AssetSource = serde_json::from_value(json!({"ticker": "ETH", "coingecko_id": "ethereum"})).unwrap();
        assert_eq!(source, AssetSource::crypto("ETH", "ethereum"));
        let source: AssetSource = serde_json::from_value(json!({"ticker": "SPY"})).unwrap();
        assert_eq!(source, AssetSource::stock("SPY"));
    }
}
