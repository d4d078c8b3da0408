use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

/// Malformed configuration. Always fatal; nothing downstream runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ticker registry is empty")]
    EmptyRegistry,

    #[error("invalid ticker {name:?}: {reason}")]
    InvalidTicker { name: String, reason: String },

    #[error("duplicate ticker name: {0}")]
    DuplicateTicker(String),

    #[error("window bounds mismatch: {starts} start dates but {ends} end dates")]
    MismatchedBounds { starts: usize, ends: usize },

    #[error("no date windows configured")]
    NoWindows,

    #[error("window {index} is inverted: {start} is after {end}")]
    InvertedWindow {
        index: usize,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("window {index} ends on {end} but the next window starts on {next_start}")]
    NonContiguous {
        index: usize,
        end: NaiveDate,
        next_start: NaiveDate,
    },

    #[error("invalid date {value:?}: expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("invalid value for {var}: {reason}")]
    InvalidEnv { var: String, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// A single symbol's retrieval failed. Recovered by the fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {symbol} failed: {source}")]
    Http {
        symbol: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("provider returned HTTP {status} for {symbol}")]
    Status { symbol: String, status: u16 },

    #[error("provider error for {symbol}: {message}")]
    Provider { symbol: String, message: String },

    #[error("malformed response for {symbol}: {message}")]
    Malformed { symbol: String, message: String },

    #[error("failed to build series table: {0}")]
    Frame(#[from] polars::error::PolarsError),
}

/// Failure inside the query layer or the engine behind it.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid SQL identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("query engine error: {0}")]
    Engine(#[from] rusqlite::Error),

    #[error("dataframe error: {0}")]
    Frame(#[from] polars::error::PolarsError),

    #[error("result has no column {0:?}")]
    MissingColumn(String),

    #[error("cannot parse {value:?} in index column {column:?} as a date")]
    UnparseableIndex { column: String, value: String },

    #[error("query task failed: {0}")]
    Task(String),
}

/// Error returned by the JSON endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Query(#[from] QueryError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Query(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}
