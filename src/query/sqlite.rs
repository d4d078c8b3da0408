use polars::prelude::*;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::sql::{BoundQuery, Dialect, Ident};
use super::QueryEngine;
use crate::error::QueryError;

pub struct SqliteEngine {
    conn: Mutex<Connection>,
}

impl SqliteEngine {
    /// Open `path`, exposing it under the `database` qualifier.
    ///
    /// `main` opens the file directly; any other name attaches it to an
    /// in-memory connection so `"database"."table"` resolves.
    pub fn open(path: &Path, database: &str) -> Result<Self, QueryError> {
        let conn = if database == "main" {
            Connection::open(path)?
        } else {
            let db = Ident::new(database)?;
            let conn = Connection::open_in_memory()?;
            conn.execute(
                &format!("ATTACH DATABASE ? AS {db}"),
                [path.to_string_lossy().as_ref()],
            )?;
            conn
        };
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database; `main` is the only qualifier.
    pub fn open_in_memory() -> Result<Self, QueryError> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    pub(crate) fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl QueryEngine for SqliteEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&self, query: &BoundQuery) -> Result<DataFrame, QueryError> {
        tracing::debug!(sql = %query, "Executing query");
        let conn = self.connection();
        let mut stmt = conn.prepare(query.sql())?;
        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut values: Vec<Vec<Value>> = vec![Vec::new(); names.len()];
        let mut height = 0;
        let mut rows = stmt.query(params_from_iter(query.params()))?;
        while let Some(row) = rows.next()? {
            for (i, column) in values.iter_mut().enumerate() {
                column.push(row.get::<_, Value>(i)?);
            }
            height += 1;
        }

        let columns: Vec<Column> = names
            .iter()
            .zip(values)
            .map(|(name, vals)| to_column(name, &vals))
            .collect();
        Ok(DataFrame::new(height, columns)?)
    }
}

/// Infer a column type from SQLite's dynamic values.
///
/// All-integer → Int64, all-numeric → Float64, anything else → String.
/// A column without a single non-null value is String.
fn to_column(name: &str, values: &[Value]) -> Column {
    let has_value = values.iter().any(|v| !matches!(v, Value::Null));
    let all_int = has_value
        && values
            .iter()
            .all(|v| matches!(v, Value::Integer(_) | Value::Null));
    let all_num = has_value
        && values
            .iter()
            .all(|v| matches!(v, Value::Integer(_) | Value::Real(_) | Value::Null));

    let name = PlSmallStr::from(name);
    if all_int {
        let ints: Vec<Option<i64>> = values
            .iter()
            .map(|v| match v {
                Value::Integer(i) => Some(*i),
                _ => None,
            })
            .collect();
        Column::new(name, ints)
    } else if all_num {
        let reals: Vec<Option<f64>> = values
            .iter()
            .map(|v| match v {
                Value::Integer(i) => Some(*i as f64),
                Value::Real(f) => Some(*f),
                _ => None,
            })
            .collect();
        Column::new(name, reals)
    } else {
        let texts: Vec<Option<String>> = values
            .iter()
            .map(|v| match v {
                Value::Text(s) => Some(s.clone()),
                Value::Integer(i) => Some(i.to_string()),
                Value::Real(f) => Some(f.to_string()),
                Value::Null | Value::Blob(_) => None,
            })
            .collect();
        Column::new(name, texts)
    }
}
