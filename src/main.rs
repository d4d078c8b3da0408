use anyhow::{Context, Result};
use std::sync::Arc;

use index_dash::config::DashboardConfig;
use index_dash::query::sqlite::SqliteEngine;
use index_dash::query::QueryLayer;
use index_dash::server::{router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    index_dash::init_tracing();

    let config = DashboardConfig::from_env()?;
    tracing::info!(
        region = %config.region,
        staging_dir = %config.staging_dir(),
        table = %config.table,
        "Query engine configured"
    );

    let engine = SqliteEngine::open(&config.db_path, config.database())
        .with_context(|| format!("Failed to open {}", config.db_path.display()))?;
    let layer = Arc::new(QueryLayer::new(Arc::new(engine), config.cache_capacity));

    let addr = format!("0.0.0.0:{}", config.port);
    let app = router(AppState::new(layer, Arc::new(config)));

    tracing::info!("Starting index-dash HTTP server on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
