//! Parameterized query construction.
//!
//! Identifiers (database, table, column names) cannot be bound, so they are
//! validated against a strict pattern and double-quoted. Every value is a
//! bound parameter; the SQL text never contains user-supplied literals.

use std::fmt;

use super::DateRange;
use crate::error::QueryError;

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Real(f64),
}

impl SqlValue {
    fn render(&self) -> String {
        match self {
            SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Real(f) => f.to_string(),
        }
    }
}

impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::ToSqlOutput;
        Ok(match self {
            SqlValue::Text(s) => ToSqlOutput::from(s.as_str()),
            SqlValue::Integer(i) => ToSqlOutput::from(*i),
            SqlValue::Real(f) => ToSqlOutput::from(*f),
        })
    }
}

/// SQL text with `?` placeholders plus the values bound to them, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    sql: String,
    params: Vec<SqlValue>,
}

impl BoundQuery {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// The query with literals inlined. For logs and tests only; never executed.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.sql.len() + 16 * self.params.len());
        let mut params = self.params.iter();
        for ch in self.sql.chars() {
            if ch == '?' {
                match params.next() {
                    Some(p) => out.push_str(&p.render()),
                    None => out.push(ch),
                }
            } else {
                out.push(ch);
            }
        }
        out
    }
}

impl fmt::Display for BoundQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// A validated SQL identifier, rendered double-quoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    /// Accepts `[A-Za-z_][A-Za-z0-9_]*`, at most 128 characters.
    pub fn new(name: &str) -> Result<Self, QueryError> {
        let mut chars = name.chars();
        let valid_head = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_head || !valid_tail || name.len() > 128 {
            return Err(QueryError::InvalidIdentifier(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    /// For compile-time names. Falls back to `_` if `name` is not a valid identifier.
    pub(crate) fn from_static(name: &'static str) -> Self {
        Self::new(name).unwrap_or_else(|_| Self("_".to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

/// A table, optionally qualified by its database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub database: Option<Ident>,
    pub table: Ident,
}

impl TableRef {
    pub fn new(database: Option<&str>, table: &str) -> Result<Self, QueryError> {
        Ok(Self {
            database: database.map(Ident::new).transpose()?,
            table: Ident::new(table)?,
        })
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(db) => write!(f, "{db}.{}", self.table),
            None => write!(f, "{}", self.table),
        }
    }
}

/// How an engine exposes its catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `information_schema.columns` (Athena, Trino, Postgres, DuckDB).
    Ansi,
    /// `pragma_table_info`.
    Sqlite,
}

/// Escape `LIKE` wildcards so `key` only matches literally.
fn like_contains(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len() + 2);
    escaped.push('%');
    for ch in key.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Rows whose partition contains `key` and whose index lies in `range` (inclusive).
pub fn select_series(
    table: &TableRef,
    partition: &Ident,
    key: &str,
    index: &Ident,
    range: &DateRange,
) -> BoundQuery {
    BoundQuery::new(
        format!(
            "SELECT * FROM {table} WHERE {partition} LIKE ? ESCAPE '\\' AND {index} BETWEEN ? AND ?"
        ),
        vec![
            SqlValue::Text(like_contains(key)),
            SqlValue::Text(range.start_str()),
            SqlValue::Text(range.end_str()),
        ],
    )
}

/// Distinct partition values, ordered.
pub fn select_partitions(table: &TableRef, partition: &Ident) -> BoundQuery {
    BoundQuery::new(
        format!("SELECT DISTINCT {partition} FROM {table} ORDER BY {partition}"),
        vec![],
    )
}

/// Column names of `table`, in declaration order, as a single `column_name` column.
pub fn select_column_names(table: &TableRef, dialect: Dialect) -> BoundQuery {
    match dialect {
        Dialect::Ansi => {
            let mut params = Vec::new();
            let mut sql = String::from(
                "SELECT column_name FROM information_schema.columns WHERE table_name = ?",
            );
            params.push(SqlValue::Text(table.table.as_str().to_string()));
            if let Some(db) = &table.database {
                sql.push_str(" AND table_schema = ?");
                params.push(SqlValue::Text(db.as_str().to_string()));
            }
            sql.push_str(" ORDER BY ordinal_position");
            BoundQuery::new(sql, params)
        }
        Dialect::Sqlite => BoundQuery::new(
            "SELECT name AS column_name FROM pragma_table_info(?, ?) ORDER BY cid",
            vec![
                SqlValue::Text(table.table.as_str().to_string()),
                SqlValue::Text(
                    table
                        .database
                        .as_ref()
                        .map_or("main", Ident::as_str)
                        .to_string(),
                ),
            ],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(),
        )
    }

    #[test]
    fn series_query_binds_values() {
        let table = TableRef::new(Some("markets"), "market_index").unwrap();
        let q = select_series(
            &table,
            &Ident::new("partition_0").unwrap(),
            "AUDUSD",
            &Ident::new("date").unwrap(),
            &range(),
        );

        assert_eq!(
            q.sql(),
            "SELECT * FROM \"markets\".\"market_index\" WHERE \"partition_0\" LIKE ? ESCAPE '\\' \
             AND \"date\" BETWEEN ? AND ?"
        );
        assert_eq!(q.params().len(), 3);
        assert!(!q.sql().contains("AUDUSD"));

        let rendered = q.render();
        assert!(rendered.contains("LIKE '%AUDUSD%'"));
        assert!(rendered.contains("BETWEEN '2020-01-01' AND '2020-01-31'"));
    }

    #[test]
    fn hostile_key_stays_a_value() {
        let table = TableRef::new(None, "t").unwrap();
        let key = "x' OR '1'='1";
        let q = select_series(
            &table,
            &Ident::new("p").unwrap(),
            key,
            &Ident::new("d").unwrap(),
            &range(),
        );
        assert!(!q.sql().contains("OR"));
        assert_eq!(q.params()[0], SqlValue::Text(format!("%{key}%")));
        assert!(q.render().contains("'%x'' OR ''1''=''1%'"));
    }

    #[test]
    fn like_wildcards_escaped() {
        assert_eq!(like_contains("AUD_USD"), "%AUD\\_USD%");
        assert_eq!(like_contains("50%"), "%50\\%%");
    }

    #[test]
    fn identifiers_validated() {
        assert!(Ident::new("partition_0").is_ok());
        assert!(Ident::new("_x").is_ok());
        for bad in ["", "0abc", "a b", "a\"b", "a;drop", "tbl--"] {
            assert!(Ident::new(bad).is_err(), "{bad:?} should be rejected");
        }
        assert_eq!(Ident::new("date").unwrap().to_string(), "\"date\"");
    }

    #[test]
    fn partitions_query() {
        let table = TableRef::new(None, "market_index").unwrap();
        let q = select_partitions(&table, &Ident::new("partition_0").unwrap());
        assert_eq!(
            q.sql(),
            "SELECT DISTINCT \"partition_0\" FROM \"market_index\" ORDER BY \"partition_0\""
        );
        assert!(q.params().is_empty());
    }

    #[test]
    fn column_names_per_dialect() {
        let table = TableRef::new(Some("markets"), "market_index").unwrap();

        let ansi = select_column_names(&table, Dialect::Ansi);
        assert!(ansi.sql().contains("information_schema.columns"));
        assert_eq!(
            ansi.render(),
            "SELECT column_name FROM information_schema.columns WHERE table_name = 'market_index' \
             AND table_schema = 'markets' ORDER BY ordinal_position"
        );

        let sqlite = select_column_names(&table, Dialect::Sqlite);
        assert!(sqlite.sql().contains("pragma_table_info"));
        assert_eq!(sqlite.params().len(), 2);
    }
}
