use axum::{
    extract::{Query, State},
    response::Html,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use garde::Validate;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::DashboardConfig;
use crate::dashboard::{page, DashboardController, DashboardEvent, DashboardState};
use crate::error::{ApiError, QueryError};
use crate::pull::windows::DATE_FORMAT;
use crate::query::cache::CacheStats;
use crate::query::QueryLayer;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub layer: Arc<QueryLayer>,
    pub config: Arc<DashboardConfig>,
    pub controller: Arc<DashboardController>,
}

impl AppState {
    pub fn new(layer: Arc<QueryLayer>, config: Arc<DashboardConfig>) -> Self {
        let controller = Arc::new(DashboardController::new(Arc::clone(&layer), Arc::clone(&config)));
        Self {
            layer,
            config,
            controller,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/health", get(|| async { "ok" }))
        .route("/api/partitions", get(list_partitions))
        .route("/api/schema", get(table_schema))
        .route("/api/cache/clear", post(clear_cache))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Query string of the dashboard page.
///
/// Collected from raw pairs because `columns` may repeat.
#[derive(Debug, Default, Validate)]
pub struct DashboardParams {
    /// Start date (YYYY-MM-DD)
    #[garde(inner(pattern(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$")))]
    pub start: Option<String>,
    /// End date (YYYY-MM-DD)
    #[garde(inner(pattern(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$")))]
    pub end: Option<String>,
    /// Selected partition value, e.g. "AUDUSD"
    #[garde(inner(length(min = 1, max = 128)))]
    pub index: Option<String>,
    #[garde(length(max = 64), inner(length(min = 1, max = 128)))]
    pub columns: Vec<String>,
    /// A date field was submitted, possibly blank.
    #[garde(skip)]
    pub dates_given: bool,
    /// The column picker was submitted, possibly with nothing selected.
    #[garde(skip)]
    pub columns_set: bool,
    #[garde(skip)]
    pub show_table: bool,
    #[garde(skip)]
    pub reset: bool,
}

impl DashboardParams {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let value = value.trim().to_string();
            match key.as_str() {
                "start" => {
                    params.dates_given = true;
                    params.start = Some(value).filter(|v| !v.is_empty());
                }
                "end" => {
                    params.dates_given = true;
                    params.end = Some(value).filter(|v| !v.is_empty());
                }
                "index" => params.index = Some(value).filter(|v| !v.is_empty()),
                "columns" => params.columns.push(value),
                "columns_set" => params.columns_set = is_truthy(&value),
                "show_table" => params.show_table = is_truthy(&value),
                "reset" => params.reset = is_truthy(&value),
                _ => {}
            }
        }
        params
    }

    /// Translate into controller events. Reset comes after the date change
    /// so it wins when both are submitted together.
    pub fn events(&self) -> Result<Vec<DashboardEvent>, ApiError> {
        let mut events = Vec::new();
        if self.dates_given {
            let dates = [&self.start, &self.end]
                .into_iter()
                .flatten()
                .map(|d| {
                    NaiveDate::parse_from_str(d, DATE_FORMAT)
                        .map_err(|_| ApiError::BadRequest(format!("Invalid date: {d}")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            events.push(DashboardEvent::DateRangeChanged(dates));
        }
        if self.reset {
            events.push(DashboardEvent::Reset);
        }
        if let Some(index) = &self.index {
            events.push(DashboardEvent::PartitionSelected(index.clone()));
        }
        if self.columns_set || !self.columns.is_empty() {
            events.push(DashboardEvent::ColumnsSelected(self.columns.clone()));
        }
        events.push(DashboardEvent::ShowTable(self.show_table));
        Ok(events)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "on" | "yes")
}

async fn dashboard(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Html<String>, ApiError> {
    let params = DashboardParams::from_pairs(pairs);
    params
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {e}")))?;
    let events = params.events()?;

    let controller = Arc::clone(&state.controller);
    let html = tokio::task::spawn_blocking(move || {
        let bounds = controller.bounds();
        let dashboard = DashboardState::from_events(&bounds, events);
        page::render_page(&controller.render(&dashboard))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Render task failed: {e}")))?;
    Ok(Html(html))
}

async fn list_partitions(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let partitions = tokio::task::spawn_blocking(move || {
        let config = &state.config;
        state.layer.partitions(&config.table, &config.partition_column)
    })
    .await
    .map_err(|e| QueryError::Task(e.to_string()))??;
    Ok(Json(partitions))
}

async fn table_schema(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let columns = tokio::task::spawn_blocking(move || {
        state.layer.table_columns(&state.config.table)
    })
    .await
    .map_err(|e| QueryError::Task(e.to_string()))??;
    Ok(Json(columns))
}

async fn clear_cache(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.layer.clear_cache())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn repeated_columns_are_collected() {
        let params = DashboardParams::from_pairs(pairs(&[
            ("columns", "open"),
            ("columns", "close"),
            ("index", "SP500"),
        ]));
        assert_eq!(params.columns, vec!["open", "close"]);
        assert_eq!(params.index.as_deref(), Some("SP500"));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn malformed_date_fails_validation() {
        let params = DashboardParams::from_pairs(pairs(&[("start", "01/02/2020")]));
        assert!(params.validate().is_err());
    }

    #[test]
    fn impossible_date_is_bad_request() {
        let params = DashboardParams::from_pairs(pairs(&[("start", "2020-13-45")]));
        assert!(params.validate().is_ok());
        assert!(matches!(params.events(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn reset_follows_date_change() {
        let params = DashboardParams::from_pairs(pairs(&[
            ("start", "2020-01-01"),
            ("end", "2020-02-01"),
            ("reset", "1"),
        ]));
        let events = params.events().unwrap();
        assert!(matches!(events[0], DashboardEvent::DateRangeChanged(ref d) if d.len() == 2));
        assert_eq!(events[1], DashboardEvent::Reset);
    }

    #[test]
    fn first_visit_has_no_date_event() {
        let events = DashboardParams::from_pairs(vec![]).events().unwrap();
        assert_eq!(events, vec![DashboardEvent::ShowTable(false)]);
    }

    #[test]
    fn submitted_empty_picker_selects_nothing() {
        let params = DashboardParams::from_pairs(pairs(&[("columns_set", "1")]));
        let events = params.events().unwrap();
        assert!(events.contains(&DashboardEvent::ColumnsSelected(vec![])));
    }
}
