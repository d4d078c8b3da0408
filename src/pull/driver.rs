use indicatif::ProgressBar;
use polars::prelude::DataFrame;
use std::path::PathBuf;
use std::sync::Arc;

use super::fetcher::{fetch_window, FetchFailure};
use super::windows::DateWindow;
use crate::config::PullConfig;
use crate::data::csv_store::{CsvStore, WriteReport};
use crate::data::MarketDataProvider;

/// Totals for a whole backfill run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub windows: usize,
    pub written: Vec<PathBuf>,
    pub fetch_failures: Vec<FetchFailure>,
    /// `(ticker, error)` pairs.
    pub write_failures: Vec<(String, String)>,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.fetch_failures.is_empty() && self.write_failures.is_empty()
    }
}

/// Runs the fetch → write cycle for every configured window, in order.
pub struct Driver {
    config: PullConfig,
    provider: Arc<dyn MarketDataProvider>,
    store: CsvStore,
}

impl Driver {
    pub fn new(config: PullConfig, provider: Arc<dyn MarketDataProvider>) -> Self {
        let store = CsvStore::new(config.data_root.clone());
        Self {
            config,
            provider,
            store,
        }
    }

    pub fn config(&self) -> &PullConfig {
        &self.config
    }

    /// Process windows strictly in sequence. Per-ticker failures are logged
    /// and collected; the run itself always completes.
    pub async fn run(&self, progress: &ProgressBar) -> RunSummary {
        let mut summary = RunSummary::default();
        progress.set_length(self.config.windows.len() as u64);

        tracing::info!(
            provider = self.provider.name(),
            tickers = self.config.tickers.len(),
            windows = self.config.windows.len(),
            data_root = %self.config.data_root.display(),
            "Starting backfill"
        );

        for window in &self.config.windows {
            tracing::info!("Pulling data from {} to {}", window.start_str(), window.end_str());
            progress.set_message(window.to_string());

            let batch = fetch_window(self.provider.as_ref(), &self.config.tickers, window).await;
            let report = self.write(batch.window, batch.series).await;

            summary.windows += 1;
            summary.written.extend(report.written);
            summary.fetch_failures.extend(batch.failures);
            summary.write_failures.extend(report.failed);
            progress.inc(1);
        }

        progress.finish_with_message("done");
        tracing::info!(
            windows = summary.windows,
            files = summary.written.len(),
            fetch_failures = summary.fetch_failures.len(),
            write_failures = summary.write_failures.len(),
            "Backfill finished"
        );
        summary
    }

    /// Write a window's tables on the blocking pool.
    async fn write(&self, window: DateWindow, series: Vec<(String, DataFrame)>) -> WriteReport {
        let names: Vec<String> = series.iter().map(|(name, _)| name.clone()).collect();
        let store = self.store.clone();
        let task = tokio::task::spawn_blocking(move || {
            store.write_window(&window, series.iter().map(|(n, df)| (n.as_str(), df)))
        });
        match task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(%window, "Write task failed: {e}");
                WriteReport {
                    written: Vec::new(),
                    failed: names
                        .into_iter()
                        .map(|name| (name, format!("write task failed: {e}")))
                        .collect(),
                }
            }
        }
    }
}
