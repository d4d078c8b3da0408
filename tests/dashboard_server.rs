//! Dashboard HTTP surface against an embedded SQLite engine.
//!
//! The engine is filled through the same path as production: CSV tree →
//! ingest → partitioned table.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use index_dash::config::DashboardConfig;
use index_dash::dashboard::{DashboardController, DashboardEvent, DashboardState, Stage};
use index_dash::data::csv_store::CsvStore;
use index_dash::data::SERIES_COLUMNS;
use index_dash::pull::windows::DateWindow;
use index_dash::query::ingest::{ingest_csv_tree, IngestTarget};
use index_dash::query::sql::TableRef;
use index_dash::query::sqlite::SqliteEngine;
use index_dash::query::QueryLayer;
use index_dash::server::{router, AppState};

mod common;
use common::{date, make_ohlc_df};

fn loaded_layer() -> Arc<QueryLayer> {
    let tmp = TempDir::new().unwrap();
    let store = CsvStore::new(tmp.path());
    let window = DateWindow::new(date(2020, 1, 1), date(2020, 2, 1)).unwrap();
    store
        .write_series("SP500", &window, &make_ohlc_df(date(2020, 1, 2), 20, 3200.0))
        .unwrap();
    store
        .write_series("AUDUSD", &window, &make_ohlc_df(date(2020, 1, 2), 20, 0.7))
        .unwrap();
    ingested_layer(&store, 40)
}

fn ingested_layer(store: &CsvStore, expected_rows: usize) -> Arc<QueryLayer> {
    let engine = SqliteEngine::open_in_memory().unwrap();
    let target = IngestTarget::new(
        TableRef::new(Some("main"), "market_index").unwrap(),
        "partition_0",
        "date",
    )
    .unwrap();
    let summary = ingest_csv_tree(&engine, store, &target).unwrap();
    assert!(summary.failed.is_empty());
    assert_eq!(summary.rows, expected_rows);

    Arc::new(QueryLayer::new(Arc::new(engine), NonZeroUsize::new(16).unwrap()))
}

fn state_with(config: DashboardConfig) -> AppState {
    AppState::new(loaded_layer(), Arc::new(config))
}

async fn get(state: &AppState, uri: &str) -> (StatusCode, String) {
    let response = router(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_is_ok() {
    let state = state_with(DashboardConfig::default());
    let (status, body) = get(&state, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partitions_endpoint_lists_tickers() {
    let state = state_with(DashboardConfig::default());
    let (status, body) = get(&state, "/api/partitions").await;
    assert_eq!(status, StatusCode::OK);
    let parts: Vec<String> = serde_json::from_str(&body).unwrap();
    assert_eq!(parts, vec!["AUDUSD", "SP500"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn schema_endpoint_lists_columns() {
    let state = state_with(DashboardConfig::default());
    let (status, body) = get(&state, "/api/schema").await;
    assert_eq!(status, StatusCode::OK);
    let columns: Vec<String> = serde_json::from_str(&body).unwrap();
    assert_eq!(columns[0], "partition_0");
    assert!(columns.contains(&"date".to_string()));
    assert!(columns.contains(&"adj_close".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn first_visit_renders_default_chart() {
    let state = state_with(DashboardConfig::default());
    let (status, body) = get(&state, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("vegaEmbed('#chart'"));
    assert!(body.contains("<option value=\"AUDUSD\" selected>AUDUSD</option>"));
    assert!(body.contains("<option value=\"open\" selected>open</option>"));
    assert!(body.contains("name=\"start\" value=\"2006-05-01\""));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn selection_with_table_and_export() {
    let state = state_with(DashboardConfig::default());
    let (status, body) = get(
        &state,
        "/?start=2020-01-01&end=2020-01-31&index=SP500&columns=close&columns=volume&columns_set=1&show_table=1",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<option value=\"SP500\" selected>SP500</option>"));
    assert!(body.contains("<option value=\"close\" selected>close</option>"));
    assert!(body.contains("<option value=\"volume\" selected>volume</option>"));
    assert!(body.contains("<option value=\"open\">open</option>"));
    assert!(body.contains("download=\"dataframe.xlsx\""));
    assert!(body.contains("<td>2020-01-02</td>"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_wins_over_picked_dates() {
    let state = state_with(DashboardConfig::default());
    let (_, body) = get(&state, "/?start=2020-01-06&end=2020-01-10&reset=1").await;
    assert!(body.contains("name=\"start\" value=\"2006-05-01\""));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_date_is_rejected() {
    let state = state_with(DashboardConfig::default());
    let (status, body) = get(&state, "/?start=06%2F01%2F2020").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Validation error"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_column_selection_waits() {
    let state = state_with(DashboardConfig::default());
    let (status, body) = get(&state, "/?columns_set=1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Select at least one column"));
    assert!(!body.contains("vegaEmbed('#chart'"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn query_failure_renders_error_panel() {
    let config = DashboardConfig {
        table: TableRef::new(Some("main"), "no_such_table").unwrap(),
        ..DashboardConfig::default()
    };
    let state = state_with(config);
    let (status, body) = get(&state, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Query failed."));
    assert!(body.contains("no_such_table"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_page_loads_reuse_cached_queries() {
    let state = state_with(DashboardConfig::default());
    get(&state, "/?index=SP500").await;
    let before = state.layer.cache_stats();
    get(&state, "/?index=SP500").await;
    let after = state.layer.cache_stats();

    assert_eq!(after.misses, before.misses);
    assert_eq!(after.hits, before.hits + 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clearing_cache_empties_it() {
    let state = state_with(DashboardConfig::default());
    get(&state, "/").await;
    assert!(state.layer.cache_stats().entries > 0);

    let response = router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/cache/clear")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let stats: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(stats["entries"], 0);
    assert_eq!(stats["capacity"], 16);
}

#[test]
fn controller_falls_back_to_first_partition() {
    let controller = DashboardController::new(loaded_layer(), Arc::new(DashboardConfig::default()));
    let bounds = controller.bounds();
    let state = DashboardState::from_events(
        &bounds,
        [DashboardEvent::PartitionSelected("NOT_A_TICKER".into())],
    );

    let view = controller.render(&state);
    assert_eq!(view.stage, Stage::Rendering);
    assert_eq!(view.partition.as_deref(), Some("AUDUSD"));
    assert_eq!(view.columns, vec!["open"]);
}

#[test]
fn controller_stage_follows_input() {
    let controller = DashboardController::new(loaded_layer(), Arc::new(DashboardConfig::default()));
    let bounds = controller.bounds();

    let no_dates = DashboardState::from_events(&bounds, [DashboardEvent::DateRangeChanged(vec![])]);
    assert_eq!(controller.render(&no_dates).stage, Stage::AwaitingDateRange);

    let no_columns = DashboardState::from_events(&bounds, [DashboardEvent::ColumnsSelected(vec![])]);
    let view = controller.render(&no_columns);
    assert_eq!(view.stage, Stage::AwaitingColumnSelection);
    assert!(view.chart.is_none());
    assert_eq!(view.numeric_columns.len(), 6);

    let outside = DashboardState::from_events(
        &bounds,
        [DashboardEvent::DateRangeChanged(vec![date(2010, 1, 1), date(2010, 2, 1)])],
    );
    let view = controller.render(&outside);
    assert_eq!(view.stage, Stage::AwaitingColumnSelection);
    assert!(view.numeric_columns.is_empty());
}

#[test]
fn empty_leading_window_keeps_columns_plottable() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("AUDCNY");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("AUDCNY_2006-05-16_2007-01-01.csv"),
        format!("{}\n", SERIES_COLUMNS.join(",")),
    )
    .unwrap();

    let store = CsvStore::new(tmp.path());
    let window = DateWindow::new(date(2020, 1, 1), date(2020, 2, 1)).unwrap();
    store
        .write_series("AUDCNY", &window, &make_ohlc_df(date(2020, 1, 2), 20, 4.8))
        .unwrap();
    store
        .write_series("SP500", &window, &make_ohlc_df(date(2020, 1, 2), 20, 3200.0))
        .unwrap();

    let controller = DashboardController::new(ingested_layer(&store, 40), Arc::new(DashboardConfig::default()));
    let view = controller.render(&DashboardState::initial(&controller.bounds()));

    assert_eq!(view.partition.as_deref(), Some("AUDCNY"));
    assert_eq!(view.stage, Stage::Rendering);
    assert_eq!(view.numeric_columns.len(), 6);
    assert!(view.error.is_none());
}
