use futures::future::join_all;
use polars::prelude::*;

use super::registry::TickerRegistry;
use super::windows::DateWindow;
use crate::data::{index_first_sorted, MarketDataProvider, DATE_COL};

/// A symbol that could not be retrieved for a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub name: String,
    pub symbol: String,
    pub error: String,
}

/// Everything fetched for one window, in registry order.
#[derive(Debug)]
pub struct SeriesBatch {
    pub window: DateWindow,
    pub series: Vec<(String, DataFrame)>,
    pub failures: Vec<FetchFailure>,
}

impl SeriesBatch {
    pub fn get(&self, name: &str) -> Option<&DataFrame> {
        self.series
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, df)| df)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// `(name, table)` pairs for the writer.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataFrame)> {
        self.series.iter().map(|(n, df)| (n.as_str(), df))
    }
}

/// Fetch every ticker of `registry` over `window`.
///
/// Tickers are requested concurrently; results and log lines keep registry
/// order. A failed symbol is logged and recorded in `failures` and is absent
/// from `series`; the other symbols are unaffected. Nothing is retried.
pub async fn fetch_window(
    provider: &dyn MarketDataProvider,
    registry: &TickerRegistry,
    window: &DateWindow,
) -> SeriesBatch {
    let results = join_all(
        registry
            .iter()
            .map(|entry| async move { (entry, provider.fetch(&entry.symbol, window).await) }),
    )
    .await;

    let mut batch = SeriesBatch {
        window: *window,
        series: Vec::with_capacity(registry.len()),
        failures: Vec::new(),
    };

    for (entry, result) in results {
        let sorted = match result {
            Ok(df) => sort_by_date(df).await,
            Err(e) => Err(e.to_string()),
        };

        match sorted {
            Ok(df) => {
                tracing::info!(
                    name = %entry.name,
                    symbol = %entry.symbol,
                    rows = df.height(),
                    "Fetched series"
                );
                batch.series.push((entry.name.clone(), df));
            }
            Err(error) => {
                tracing::warn!(
                    name = %entry.name,
                    symbol = %entry.symbol,
                    "Failed to fetch {} for {window}: {error}",
                    entry.symbol
                );
                batch.failures.push(FetchFailure {
                    name: entry.name.clone(),
                    symbol: entry.symbol.clone(),
                    error,
                });
            }
        }
    }

    batch
}

/// Polars collects on its own runtime, which needs a blocking thread.
async fn sort_by_date(df: DataFrame) -> Result<DataFrame, String> {
    if !df.schema().contains(DATE_COL) {
        return Ok(df);
    }
    tokio::task::spawn_blocking(move || index_first_sorted(df, DATE_COL))
        .await
        .map_err(|e| format!("sort task failed: {e}"))?
        .map_err(|e| e.to_string())
}
