use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::pull::registry::{TickerEntry, TickerRegistry};
use crate::pull::windows::{
    default_history_span, parse_date, windows_from_bounds, yearly_windows, DateWindow,
};
use crate::query::sql::{Ident, TableRef};

const DEFAULT_DATA_ROOT: &str = "./data";

// ---------------------------------------------------------------------------
// Batch retrieval
// ---------------------------------------------------------------------------

/// Everything the batch driver needs: what to pull, over which windows, and where to.
#[derive(Debug, Clone)]
pub struct PullConfig {
    pub tickers: TickerRegistry,
    pub windows: Vec<DateWindow>,
    pub data_root: PathBuf,
}

/// On-disk shape of a `PULL_CONFIG` TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PullFile {
    data_root: Option<PathBuf>,
    #[serde(default)]
    tickers: Vec<TickerEntry>,
    history_start: Option<String>,
    history_end: Option<String>,
    window_starts: Option<Vec<String>>,
    window_ends: Option<Vec<String>>,
}

impl PullConfig {
    pub fn new(
        tickers: TickerRegistry,
        windows: Vec<DateWindow>,
        data_root: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        if windows.is_empty() {
            return Err(ConfigError::NoWindows);
        }
        crate::pull::windows::validate_contiguous(&windows)?;
        Ok(Self {
            tickers,
            windows,
            data_root: data_root.into(),
        })
    }

    /// Default tickers over the default span, written under `data_root`.
    pub fn defaults(data_root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let (start, end) = default_history_span();
        Self::new(
            TickerRegistry::default_indices()?,
            yearly_windows(start, end)?,
            data_root,
        )
    }

    /// Build from environment variables.
    ///
    /// | Env Var | Default | Purpose |
    /// |---------|---------|---------|
    /// | `DATA_ROOT` | `./data` | Output root for CSV files |
    /// | `PULL_CONFIG` | (none) | TOML file overriding tickers, windows and data root |
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_root = std::env::var("DATA_ROOT").ok().map(PathBuf::from);
        match std::env::var("PULL_CONFIG") {
            Ok(path) if !path.is_empty() => {
                let mut config = Self::from_toml_file(Path::new(&path))?;
                // An explicit env var wins over the file.
                if let Some(root) = env_root {
                    config.data_root = root;
                }
                Ok(config)
            }
            _ => Self::defaults(env_root.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_ROOT))),
        }
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|e| match e {
            ConfigError::Toml { source, .. } => ConfigError::Toml {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    /// Parse a TOML document.
    ///
    /// Windows come from `window_starts`/`window_ends` when both are given,
    /// otherwise yearly windows between `history_start` and `history_end`
    /// (each defaulting to the built-in span).
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: PullFile = toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: "<inline>".to_string(),
            source,
        })?;

        let tickers = if file.tickers.is_empty() {
            TickerRegistry::default_indices()?
        } else {
            TickerRegistry::new(file.tickers)?
        };

        let windows = match (file.window_starts, file.window_ends) {
            (Some(starts), Some(ends)) => {
                let starts = parse_dates(&starts)?;
                let ends = parse_dates(&ends)?;
                windows_from_bounds(&starts, &ends)?
            }
            (Some(starts), None) => {
                return Err(ConfigError::MismatchedBounds {
                    starts: starts.len(),
                    ends: 0,
                })
            }
            (None, Some(ends)) => {
                return Err(ConfigError::MismatchedBounds {
                    starts: 0,
                    ends: ends.len(),
                })
            }
            (None, None) => {
                let (default_start, default_end) = default_history_span();
                let start = file
                    .history_start
                    .as_deref()
                    .map(parse_date)
                    .transpose()?
                    .unwrap_or(default_start);
                let end = file
                    .history_end
                    .as_deref()
                    .map(parse_date)
                    .transpose()?
                    .unwrap_or(default_end);
                yearly_windows(start, end)?
            }
        };

        Self::new(
            tickers,
            windows,
            file.data_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_ROOT)),
        )
    }
}

fn parse_dates(values: &[String]) -> Result<Vec<NaiveDate>, ConfigError> {
    values.iter().map(|v| parse_date(v)).collect()
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// Connection and presentation settings for the dashboard.
///
/// Identifiers are validated here, so a malformed table or column name stops
/// the process at startup instead of failing every query.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub region: String,
    pub bucket: String,
    /// Database-qualified partitioned table.
    pub table: TableRef,
    pub index_column: Ident,
    pub partition_column: Ident,
    pub db_path: PathBuf,
    pub cache_capacity: NonZeroUsize,
    /// Lower bound of the date picker and start of the default range.
    pub date_min: NaiveDate,
    pub port: u16,
}

impl DashboardConfig {
    /// Build from environment variables.
    ///
    /// | Env Var | Default | Purpose |
    /// |---------|---------|---------|
    /// | `REGION` | `ap-southeast-2` | Query engine region |
    /// | `BUCKET` | `market-index-dashboard` | Staging bucket for query results |
    /// | `DATABASE` | `main` | Database qualifier of the table |
    /// | `TABLE` | `market_index` | Partitioned table |
    /// | `INDEX_COLUMN_NAME` | `date` | Time index column |
    /// | `PARTITION_COLUMN` | `partition_0` | Partition key column |
    /// | `DASHBOARD_DB` | `./data/market_index.db` | SQLite file behind the engine |
    /// | `QUERY_CACHE_CAPACITY` | `64` | Memoized results kept (LRU) |
    /// | `DATE_MIN` | `2006-05-01` | Earliest selectable date |
    /// | `PORT` | `8501` | HTTP listen port |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|var| std::env::var(var).ok())
    }

    /// Same as [`Self::from_env`] with variables looked up through `lookup`.
    /// Blank values count as unset.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let cache_capacity = match var("QUERY_CACHE_CAPACITY") {
            Some(v) => v
                .parse::<usize>()
                .ok()
                .and_then(NonZeroUsize::new)
                .ok_or_else(|| ConfigError::InvalidEnv {
                    var: "QUERY_CACHE_CAPACITY".into(),
                    reason: format!("expected a positive integer, got {v:?}"),
                })?,
            None => defaults.cache_capacity,
        };

        let port = match var("PORT") {
            Some(v) => v.parse::<u16>().map_err(|e| ConfigError::InvalidEnv {
                var: "PORT".into(),
                reason: e.to_string(),
            })?,
            None => defaults.port,
        };

        let date_min = match var("DATE_MIN") {
            Some(v) => parse_date(&v)?,
            None => defaults.date_min,
        };

        let ident = |name: &str, default: Ident| match var(name) {
            Some(v) => Ident::new(v.trim()).map_err(|e| ConfigError::InvalidEnv {
                var: name.into(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        };

        let table = TableRef {
            database: Some(ident("DATABASE", Ident::from_static("main"))?),
            table: ident("TABLE", defaults.table.table)?,
        };

        Ok(Self {
            region: var("REGION").unwrap_or(defaults.region),
            bucket: var("BUCKET").unwrap_or(defaults.bucket),
            table,
            index_column: ident("INDEX_COLUMN_NAME", defaults.index_column)?,
            partition_column: ident("PARTITION_COLUMN", defaults.partition_column)?,
            db_path: var("DASHBOARD_DB").map_or(defaults.db_path, PathBuf::from),
            cache_capacity,
            date_min,
            port,
        })
    }

    /// Name of the database holding the table, `main` when unqualified.
    pub fn database(&self) -> &str {
        self.table.database.as_ref().map_or("main", Ident::as_str)
    }

    /// Staging location for query results, e.g. `s3://bucket/tmp/`.
    pub fn staging_dir(&self) -> String {
        format!("s3://{}/tmp/", self.bucket)
    }

    /// Upper bound of the date picker and end of the default range.
    pub fn date_max(&self) -> NaiveDate {
        Utc::now().date_naive().max(self.date_min)
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            region: "ap-southeast-2".to_string(),
            bucket: "market-index-dashboard".to_string(),
            table: TableRef {
                database: Some(Ident::from_static("main")),
                table: Ident::from_static("market_index"),
            },
            index_column: Ident::from_static("date"),
            partition_column: Ident::from_static("partition_0"),
            db_path: PathBuf::from(DEFAULT_DATA_ROOT).join("market_index.db"),
            cache_capacity: NonZeroUsize::new(64).unwrap_or(NonZeroUsize::MIN),
            date_min: NaiveDate::from_ymd_opt(2006, 5, 1).unwrap_or(NaiveDate::MIN),
            port: 8501,
        }
    }
}
