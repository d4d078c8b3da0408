use anyhow::{Context, Result};
use polars::prelude::*;
use rusqlite::{params_from_iter, Transaction};
use std::path::{Path, PathBuf};

use super::sql::{Ident, SqlValue, TableRef};
use super::sqlite::SqliteEngine;
use crate::data::csv_store::{read_series, CsvStore};
use crate::data::{DATE_COL, SERIES_COLUMNS};

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub files: usize,
    pub rows: usize,
    pub failed: Vec<(PathBuf, String)>,
}

/// Where ingested rows land.
pub struct IngestTarget {
    pub table: TableRef,
    pub partition_column: Ident,
    pub index_column: Ident,
}

impl IngestTarget {
    pub fn new(table: TableRef, partition_column: &str, index_column: &str) -> Result<Self> {
        Ok(Self {
            table,
            partition_column: Ident::new(partition_column)?,
            index_column: Ident::new(index_column)?,
        })
    }
}

/// Ingest every series file under the store's data root.
///
/// Each ticker directory becomes a partition value. Rows are upserted on
/// `(partition, index)`, so ingesting the same files twice is a no-op. A file
/// that cannot be read or inserted is logged and skipped.
pub fn ingest_csv_tree(
    engine: &SqliteEngine,
    store: &CsvStore,
    target: &IngestTarget,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();
    let tickers = store
        .list_tickers()
        .with_context(|| format!("Failed to list {}", store.data_root().display()))?;

    for ticker in tickers {
        for path in store.list_series_files(&ticker)? {
            match ingest_file(engine, target, &ticker, &path) {
                Ok(rows) => {
                    tracing::info!(%ticker, path = %path.display(), rows, "Ingested file");
                    summary.files += 1;
                    summary.rows += rows;
                }
                Err(e) => {
                    tracing::warn!(%ticker, path = %path.display(), "Failed to ingest file: {e:#}");
                    summary.failed.push((path, format!("{e:#}")));
                }
            }
        }
    }

    tracing::info!(
        files = summary.files,
        rows = summary.rows,
        failed = summary.failed.len(),
        "Ingest finished"
    );
    Ok(summary)
}

/// Upsert one CSV file as partition `partition`. Returns the row count.
pub fn ingest_file(
    engine: &SqliteEngine,
    target: &IngestTarget,
    partition: &str,
    path: &Path,
) -> Result<usize> {
    let df = read_series(path)?;
    // A header-only file carries no types worth declaring.
    if df.height() == 0 {
        return Ok(0);
    }
    let columns = value_columns(&df, target)?;

    let mut conn = engine.connection();
    let tx = conn.transaction()?;
    ensure_table(&tx, target, &columns)?;

    let names: Vec<String> = columns.iter().map(|c| c.ident.to_string()).collect();
    let placeholders = vec!["?"; names.len() + 1].join(", ");
    let insert = format!(
        "INSERT OR REPLACE INTO {} ({}, {}) VALUES ({placeholders})",
        target.table,
        target.partition_column,
        names.join(", "),
    );

    let partition_value = Some(SqlValue::Text(partition.to_string()));
    let mut rows = 0;
    {
        let mut stmt = tx.prepare(&insert)?;
        for i in 0..df.height() {
            let row = std::iter::once(&partition_value).chain(columns.iter().map(|c| &c.values[i]));
            stmt.execute(params_from_iter(row))
                .with_context(|| format!("Failed to insert row {i} of {}", path.display()))?;
            rows += 1;
        }
    }
    tx.commit()?;
    Ok(rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Affinity {
    Integer,
    Real,
    Text,
}

impl Affinity {
    /// Declared type of the known series columns, whatever the CSV reader
    /// inferred. A header-only file reads as all-text, for instance.
    fn of_series_column(name: &str) -> Option<Self> {
        match name {
            "volume" => Some(Self::Integer),
            DATE_COL => None,
            other if SERIES_COLUMNS.contains(&other) => Some(Self::Real),
            _ => None,
        }
    }

    fn of_dtype(dtype: &DataType) -> Self {
        match dtype {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32 => Self::Integer,
            dtype if crate::data::is_numeric(dtype) => Self::Real,
            _ => Self::Text,
        }
    }

    fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }
}

struct ValueColumn {
    ident: Ident,
    affinity: Affinity,
    values: Vec<Option<SqlValue>>,
}

/// Columns of `df` as bindable values. The CSV `date` column is renamed to
/// the target's index column.
fn value_columns(df: &DataFrame, target: &IngestTarget) -> Result<Vec<ValueColumn>> {
    let mut out = Vec::with_capacity(df.width());
    for column in df.columns() {
        let name = column.name().as_str();
        let ident = if name == DATE_COL {
            target.index_column.clone()
        } else {
            Ident::new(name)?
        };
        if ident == target.partition_column {
            continue;
        }

        let affinity =
            Affinity::of_series_column(name).unwrap_or_else(|| Affinity::of_dtype(column.dtype()));
        let values = match affinity {
            Affinity::Integer => column
                .cast(&DataType::Int64)?
                .i64()?
                .into_iter()
                .map(|v| v.map(SqlValue::Integer))
                .collect(),
            Affinity::Real => column
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .map(|v| v.map(SqlValue::Real))
                .collect(),
            Affinity::Text => column
                .cast(&DataType::String)?
                .str()?
                .into_iter()
                .map(|v| v.map(|s| SqlValue::Text(s.to_string())))
                .collect(),
        };
        out.push(ValueColumn {
            ident,
            affinity,
            values,
        });
    }

    if !out.iter().any(|c| c.ident == target.index_column) {
        anyhow::bail!("CSV has no {DATE_COL:?} column");
    }
    Ok(out)
}

fn ensure_table(tx: &Transaction<'_>, target: &IngestTarget, columns: &[ValueColumn]) -> Result<()> {
    let mut defs = vec![format!("{} TEXT NOT NULL", target.partition_column)];
    for c in columns {
        if c.ident == target.index_column {
            defs.push(format!("{} TEXT NOT NULL", c.ident));
        } else {
            defs.push(format!("{} {}", c.ident, c.affinity.sql_type()));
        }
    }
    defs.push(format!(
        "PRIMARY KEY ({}, {})",
        target.partition_column, target.index_column
    ));
    tx.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        target.table,
        defs.join(", ")
    ))
    .with_context(|| format!("Failed to create table {}", target.table))
}
