#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Weekday};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use index_dash::data::{MarketDataProvider, SERIES_COLUMNS};
use index_dash::error::FetchError;
use index_dash::pull::windows::DateWindow;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// The first `n` weekdays on or after `start`.
pub fn weekdays(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    start
        .iter_days()
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .take(n)
        .collect()
}

/// Synthetic daily OHLC table in the provider's column order.
///
/// Close rises by 1.0 per row from `base`; open/high/low sit around it and
/// volume is `1000 * (row + 1)`.
pub fn make_ohlc_df(start: NaiveDate, rows: usize, base: f64) -> DataFrame {
    let dates = weekdays(start, rows);
    let close: Vec<f64> = (0..rows).map(|i| base + i as f64).collect();
    let open: Vec<f64> = close.iter().map(|c| c - 0.5).collect();
    let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
    let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
    let volume: Vec<i64> = (0..rows).map(|i| 1000 * (i as i64 + 1)).collect();

    let mut df = df! {
        "open" => open,
        "high" => high,
        "low" => low,
        "close" => close.clone(),
        "adj_close" => close,
        "volume" => volume,
    }
    .unwrap();
    df.with_column(DateChunked::from_naive_date(PlSmallStr::from("date"), dates).into_column())
        .unwrap();
    df.select(SERIES_COLUMNS).unwrap()
}

/// Provider double serving canned tables per symbol.
///
/// Symbols in `failing` return an error; unknown symbols return an empty
/// table with the series columns.
pub struct StubProvider {
    tables: HashMap<String, DataFrame>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            failing: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_table(mut self, symbol: &str, df: DataFrame) -> Self {
        self.tables.insert(symbol.to_string(), df);
        self
    }

    pub fn failing(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn fetch(&self, symbol: &str, _window: &DateWindow) -> Result<DataFrame, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(symbol) {
            return Err(FetchError::Provider {
                symbol: symbol.to_string(),
                message: "No data found, symbol may be delisted".to_string(),
            });
        }
        match self.tables.get(symbol) {
            Some(df) => Ok(df.clone()),
            None => Ok(make_ohlc_df(date(2020, 1, 1), 0, 0.0)),
        }
    }
}
