pub mod csv_store;
pub mod yahoo;

use async_trait::async_trait;
use polars::prelude::*;

use crate::error::FetchError;
use crate::pull::windows::DateWindow;

/// Date index column of every series table.
pub const DATE_COL: &str = "date";

/// Column order of a series table as produced by the providers.
pub const SERIES_COLUMNS: [&str; 7] = ["date", "open", "high", "low", "close", "adj_close", "volume"];

/// Source of daily OHLC series.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Daily rows for `symbol` in `[window.start, window.end)`.
    ///
    /// An empty table is a valid answer.
    async fn fetch(&self, symbol: &str, window: &DateWindow) -> Result<DataFrame, FetchError>;
}

/// Move `index_col` to the front and sort ascending by it.
pub fn index_first_sorted(df: DataFrame, index_col: &str) -> PolarsResult<DataFrame> {
    let mut order: Vec<PlSmallStr> = vec![PlSmallStr::from(index_col)];
    order.extend(
        df.get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != index_col)
            .cloned(),
    );
    df.select(order)?
        .lazy()
        .sort([index_col], SortMultipleOptions::default())
        .collect()
}

/// Whether a column holds plain numbers the dashboard can plot.
pub fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
    )
}

/// Names of the numeric columns, excluding `index_col`, in table order.
pub fn numeric_columns(df: &DataFrame, index_col: &str) -> Vec<String> {
    df.columns()
        .iter()
        .filter(|c| c.name().as_str() != index_col && is_numeric(c.dtype()))
        .map(|c| c.name().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn index_moved_first_and_sorted() {
        let dates = vec![
            NaiveDate::from_ymd_opt(2020, 1, 3).unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
        ];
        let mut df = df! { "close" => &[3.0, 1.0, 2.0] }.unwrap();
        df.with_column(
            DateChunked::from_naive_date(PlSmallStr::from("date"), dates).into_column(),
        )
        .unwrap();

        let out = index_first_sorted(df, "date").unwrap();
        assert_eq!(out.get_column_names()[0].as_str(), "date");
        let close: Vec<f64> = out
            .column("close")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(close, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn numeric_columns_skip_index_and_text() {
        let df = df! {
            "date" => &["2020-01-01"],
            "open" => &[1.0],
            "partition_0" => &["SP500"],
            "volume" => &[10_i64],
        }
        .unwrap();
        assert_eq!(numeric_columns(&df, "date"), vec!["open", "volume"]);
    }
}
