//! Yahoo Finance data provider.
//!
//! Fetches daily OHLCV bars from the v8 chart API. Timestamps are shifted by
//! the exchange's reported GMT offset before truncating to a date, so a
//! Sydney session is not filed under the previous UTC day.
//!
//! No retry is performed; a failed symbol is reported to the caller.

use async_trait::async_trait;
use chrono::NaiveDate;
use polars::prelude::*;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;

use super::{MarketDataProvider, SERIES_COLUMNS};
use crate::error::FetchError;
use crate::pull::windows::DateWindow;

const BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart/";
const TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// One parsed daily row.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub adj_close: Option<f64>,
    pub volume: Option<u64>,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct YahooProvider {
    client: Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_base_url(BASE_URL)
    }

    /// Provider against another chart endpoint, e.g. a mirror or a local stub.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Chart URL for `symbol` over `window`; `period2` is exclusive.
    fn chart_url(&self, symbol: &str, window: &DateWindow) -> Result<Url, FetchError> {
        let malformed = |message: &str| FetchError::Malformed {
            symbol: symbol.to_string(),
            message: message.to_string(),
        };

        let mut url = Url::parse(&self.base_url).map_err(|e| malformed(&e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| malformed("base URL cannot take path segments"))?
            .pop_if_empty()
            .push(symbol);

        let period1 = window
            .start
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| malformed("invalid window start"))?
            .and_utc()
            .timestamp();
        let period2 = window
            .end
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| malformed("invalid window end"))?
            .and_utc()
            .timestamp();

        url.query_pairs_mut()
            .append_pair("period1", &period1.to_string())
            .append_pair("period2", &period2.to_string())
            .append_pair("interval", "1d")
            .append_pair("includeAdjustedClose", "true");
        Ok(url)
    }
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    async fn fetch(&self, symbol: &str, window: &DateWindow) -> Result<DataFrame, FetchError> {
        let url = self.chart_url(symbol, window)?;
        tracing::debug!(%symbol, %url, "Requesting chart");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                symbol: symbol.to_string(),
                source,
            })?;

        let status = resp.status();
        // Yahoo answers unknown symbols with 404 and an error payload.
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::Status {
                symbol: symbol.to_string(),
                status: status.as_u16(),
            });
        }

        let chart: ChartResponse = resp.json().await.map_err(|e| FetchError::Malformed {
            symbol: symbol.to_string(),
            message: e.to_string(),
        })?;

        let bars = parse_response(symbol, chart)?;
        let df = bars_to_frame(&bars)?;
        tracing::debug!(%symbol, rows = df.height(), "Parsed chart");
        Ok(df)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse_response(symbol: &str, resp: ChartResponse) -> Result<Vec<Bar>, FetchError> {
    if let Some(err) = resp.chart.error {
        return Err(FetchError::Provider {
            symbol: symbol.to_string(),
            message: format!("{}: {}", err.code, err.description),
        });
    }

    let Some(data) = resp.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };

    // No trading days in the window.
    let Some(timestamps) = data.timestamp else {
        return Ok(Vec::new());
    };

    let offset = data.meta.and_then(|m| m.gmtoffset).unwrap_or(0);
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
    let adj_closes = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose);

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let date = chrono::DateTime::from_timestamp(ts + offset, 0)
            .map(|dt| dt.naive_utc().date())
            .ok_or_else(|| FetchError::Malformed {
                symbol: symbol.to_string(),
                message: format!("invalid timestamp: {ts}"),
            })?;

        let bar = Bar {
            date,
            open: quote.open.get(i).copied().flatten(),
            high: quote.high.get(i).copied().flatten(),
            low: quote.low.get(i).copied().flatten(),
            close: quote.close.get(i).copied().flatten(),
            adj_close: adj_closes.as_ref().and_then(|v| v.get(i).copied().flatten()),
            volume: quote.volume.get(i).copied().flatten(),
        };

        // Holidays come back as all-null rows
        if bar.open.is_none() && bar.high.is_none() && bar.low.is_none() && bar.close.is_none() {
            continue;
        }
        bars.push(bar);
    }

    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    Ok(bars)
}

/// Build a series table with the columns of [`SERIES_COLUMNS`].
pub fn bars_to_frame(bars: &[Bar]) -> PolarsResult<DataFrame> {
    let open: Vec<Option<f64>> = bars.iter().map(|b| b.open).collect();
    let high: Vec<Option<f64>> = bars.iter().map(|b| b.high).collect();
    let low: Vec<Option<f64>> = bars.iter().map(|b| b.low).collect();
    let close: Vec<Option<f64>> = bars.iter().map(|b| b.close).collect();
    let adj_close: Vec<Option<f64>> = bars.iter().map(|b| b.adj_close).collect();
    let volume: Vec<Option<u64>> = bars.iter().map(|b| b.volume).collect();

    let df = df! {
        "open" => &open,
        "high" => &high,
        "low" => &low,
        "close" => &close,
        "adj_close" => &adj_close,
        "volume" => &volume,
    }?;

    let dates =
        DateChunked::from_naive_date(PlSmallStr::from("date"), bars.iter().map(|b| b.date))
            .into_column();
    df.hstack(&[dates])?.select(SERIES_COLUMNS)
}
