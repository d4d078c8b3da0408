use anyhow::{Context, Result};
use polars::prelude::*;
use std::path::{Path, PathBuf};

use super::{index_first_sorted, DATE_COL};
use crate::pull::registry::validate_name;
use crate::pull::windows::DateWindow;

/// Per-window CSV files laid out as `{data_root}/{ticker}/{ticker}_{start}_{end}.csv`.
#[derive(Debug, Clone)]
pub struct CsvStore {
    data_root: PathBuf,
}

/// Outcome of writing one window's batch.
#[derive(Debug, Default)]
pub struct WriteReport {
    pub written: Vec<PathBuf>,
    /// `(ticker, error)` for every file that could not be written.
    pub failed: Vec<(String, String)>,
}

impl CsvStore {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Directory holding every window file of `ticker`.
    pub fn ticker_dir(&self, ticker: &str) -> Result<PathBuf> {
        validate_name(ticker).with_context(|| format!("Invalid ticker: {ticker}"))?;
        Ok(self.data_root.join(ticker))
    }

    /// Output path for `(ticker, window)`.
    pub fn output_path(&self, ticker: &str, window: &DateWindow) -> Result<PathBuf> {
        Ok(self.ticker_dir(ticker)?.join(format!(
            "{ticker}_{}_{}.csv",
            window.start_str(),
            window.end_str()
        )))
    }

    /// Write one ticker's table, replacing any previous file at the same path.
    ///
    /// The date column is written first and rows are sorted ascending.
    pub fn write_series(&self, ticker: &str, window: &DateWindow, df: &DataFrame) -> Result<PathBuf> {
        let path = self.output_path(ticker, window)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut out = if df.schema().contains(DATE_COL) {
            index_first_sorted(df.clone(), DATE_COL)?
        } else {
            df.clone()
        };

        let tmp_path = path.with_extension("csv.tmp");
        let written = write_csv(&tmp_path, &mut out).and_then(|()| {
            std::fs::rename(&tmp_path, &path).with_context(|| {
                format!("Failed to rename {} → {}", tmp_path.display(), path.display())
            })
        });
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }

        Ok(path)
    }

    /// Write every table of a window. One ticker's failure does not stop the others.
    pub fn write_window<'a, I>(&self, window: &DateWindow, series: I) -> WriteReport
    where
        I: IntoIterator<Item = (&'a str, &'a DataFrame)>,
    {
        let mut report = WriteReport::default();
        for (ticker, df) in series {
            match self.write_series(ticker, window, df) {
                Ok(path) => {
                    tracing::info!(%ticker, path = %path.display(), rows = df.height(), "Wrote file");
                    report.written.push(path);
                }
                Err(e) => {
                    tracing::warn!(%ticker, "Failed to write file: {e:#}");
                    report.failed.push((ticker.to_string(), format!("{e:#}")));
                }
            }
        }
        report
    }

    /// All CSV files of `ticker`, sorted by name (and therefore by window).
    pub fn list_series_files(&self, ticker: &str) -> Result<Vec<PathBuf>> {
        let dir = self.ticker_dir(ticker)?;
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "csv") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Ticker directories present under the data root, sorted.
    pub fn list_tickers(&self) -> Result<Vec<String>> {
        if !self.data_root.exists() {
            return Ok(vec![]);
        }

        let mut tickers = Vec::new();
        for entry in std::fs::read_dir(&self.data_root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if validate_name(&name).is_ok() {
                tickers.push(name);
            }
        }
        tickers.sort();
        Ok(tickers)
    }
}

fn write_csv(path: &Path, df: &mut DataFrame) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create temp file: {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .with_context(|| format!("Failed to write CSV: {}", path.display()))
}

/// Read a series CSV back with the date column parsed.
pub fn read_series(path: &Path) -> Result<DataFrame> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open CSV: {}", path.display()))?;
    CsvReadOptions::default()
        .with_has_header(true)
        .map_parse_options(|opts| opts.with_try_parse_dates(true))
        .into_reader_with_file_handle(file)
        .finish()
        .with_context(|| format!("Failed to parse CSV: {}", path.display()))
}
