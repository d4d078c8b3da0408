pub mod cache;
pub mod ingest;
pub mod sql;
pub mod sqlite;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::data::index_first_sorted;
use crate::error::QueryError;
use crate::pull::windows::DATE_FORMAT;
use cache::{CacheStats, QueryCache, QueryKey};
use sql::{BoundQuery, Dialect, Ident, TableRef};

pub const DEFAULT_PARTITION_COLUMN: &str = "partition_0";
pub const DEFAULT_KEY_WORD: &str = "AUDUSD";
pub const DEFAULT_RANGE_START: (i32, u32, u32) = (2006, 5, 1);
pub const DEFAULT_RANGE_END: (i32, u32, u32) = (2021, 2, 28);

/// Inclusive date range of a series query. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Endpoints are put in order, so `new(b, a) == new(a, b)`.
    pub fn new(a: NaiveDate, b: NaiveDate) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn start_str(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

/// Executes SQL and hands back a table.
///
/// Implementations are blocking; async callers should go through
/// `spawn_blocking`.
pub trait QueryEngine: Send + Sync {
    fn dialect(&self) -> Dialect;

    fn execute(&self, query: &BoundQuery) -> Result<DataFrame, QueryError>;
}

/// Arguments of a series query. Equal requests share one cached result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesRequest {
    pub table: TableRef,
    pub date_range: DateRange,
    pub partition_column: Ident,
    pub key_word: String,
    pub index_column: Ident,
}

impl SeriesRequest {
    pub fn new(
        table: TableRef,
        date_range: DateRange,
        partition_column: &str,
        key_word: impl Into<String>,
        index_column: &str,
    ) -> Result<Self, QueryError> {
        Ok(Self {
            table,
            date_range,
            partition_column: Ident::new(partition_column)?,
            key_word: key_word.into(),
            index_column: Ident::new(index_column)?,
        })
    }

    /// `AUDUSD` in `partition_0` over 2006-05-01..2021-02-28, indexed by `date`.
    pub fn with_defaults(table: TableRef) -> Result<Self, QueryError> {
        let (sy, sm, sd) = DEFAULT_RANGE_START;
        let (ey, em, ed) = DEFAULT_RANGE_END;
        let start = NaiveDate::from_ymd_opt(sy, sm, sd).unwrap_or(NaiveDate::MIN);
        let end = NaiveDate::from_ymd_opt(ey, em, ed).unwrap_or(NaiveDate::MAX);
        Self::new(
            table,
            DateRange::new(start, end),
            DEFAULT_PARTITION_COLUMN,
            DEFAULT_KEY_WORD,
            crate::data::DATE_COL,
        )
    }

    fn cache_key(&self) -> QueryKey {
        QueryKey::Series {
            table: self.table.clone(),
            range: self.date_range,
            partition: self.partition_column.clone(),
            key_word: self.key_word.clone(),
            index: self.index_column.clone(),
        }
    }
}

/// Memoizing front of a [`QueryEngine`].
pub struct QueryLayer {
    engine: Arc<dyn QueryEngine>,
    cache: QueryCache,
}

impl QueryLayer {
    pub fn new(engine: Arc<dyn QueryEngine>, cache_capacity: NonZeroUsize) -> Self {
        Self {
            engine,
            cache: QueryCache::new(cache_capacity),
        }
    }

    /// Rows whose partition contains `key_word` and whose index falls in the
    /// range, with the index parsed to dates, moved first and sorted ascending.
    pub fn query_series(&self, request: &SeriesRequest) -> Result<Arc<DataFrame>, QueryError> {
        self.cache.get_or_try_insert(request.cache_key(), || {
            let query = sql::select_series(
                &request.table,
                &request.partition_column,
                &request.key_word,
                &request.index_column,
                &request.date_range,
            );
            tracing::debug!(sql = %query, "Series query");
            let df = self.engine.execute(&query)?;
            date_indexed(df, request.index_column.as_str())
        })
    }

    /// Distinct values of `partition`, ordered.
    pub fn partitions(&self, table: &TableRef, partition: &Ident) -> Result<Vec<String>, QueryError> {
        let key = QueryKey::Partitions {
            table: table.clone(),
            partition: partition.clone(),
        };
        let df = self.cache.get_or_try_insert(key, || {
            let query = sql::select_partitions(table, partition);
            tracing::debug!(sql = %query, "Partition query");
            self.engine.execute(&query)
        })?;
        first_column_strings(&df)
    }

    /// Column names of `table` in declaration order.
    pub fn table_columns(&self, table: &TableRef) -> Result<Vec<String>, QueryError> {
        let key = QueryKey::Columns {
            table: table.clone(),
        };
        let df = self.cache.get_or_try_insert(key, || {
            let query = sql::select_column_names(table, self.engine.dialect());
            tracing::debug!(sql = %query, "Schema query");
            self.engine.execute(&query)
        })?;
        first_column_strings(&df)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) -> CacheStats {
        self.cache.clear();
        tracing::info!("Query cache cleared");
        self.cache.stats()
    }
}

/// Parse `index_col` to `Date` (text, date or datetime input) and sort by it.
pub fn date_indexed(mut df: DataFrame, index_col: &str) -> Result<DataFrame, QueryError> {
    let column = df
        .column(index_col)
        .map_err(|_| QueryError::MissingColumn(index_col.to_string()))?;

    if *column.dtype() != DataType::Date {
        let text = column.cast(&DataType::String)?;
        let mut dates = Vec::with_capacity(text.len());
        for value in text.str()? {
            let Some(value) = value else {
                dates.push(None);
                continue;
            };
            // Datetime renderings carry a time suffix after the date.
            let head = value.get(..10).unwrap_or(value);
            let date = NaiveDate::parse_from_str(head, DATE_FORMAT).map_err(|_| {
                QueryError::UnparseableIndex {
                    column: index_col.to_string(),
                    value: value.to_string(),
                }
            })?;
            dates.push(Some(date));
        }
        df.with_column(
            DateChunked::from_naive_date_options(PlSmallStr::from(index_col), dates).into_column(),
        )?;
    }

    Ok(index_first_sorted(df, index_col)?)
}

fn first_column_strings(df: &DataFrame) -> Result<Vec<String>, QueryError> {
    let Some(column) = df.columns().first() else {
        return Ok(Vec::new());
    };
    let text = column.cast(&DataType::String)?;
    Ok(text
        .str()?
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect())
}
