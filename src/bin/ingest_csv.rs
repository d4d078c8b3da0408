use anyhow::{Context, Result};
use std::path::PathBuf;

use index_dash::config::DashboardConfig;
use index_dash::data::csv_store::CsvStore;
use index_dash::query::ingest::{ingest_csv_tree, IngestTarget};
use index_dash::query::sqlite::SqliteEngine;

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    index_dash::init_tracing();

    let config = DashboardConfig::from_env()?;
    let data_root = std::env::var("DATA_ROOT").map_or_else(|_| PathBuf::from("./data"), PathBuf::from);

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let engine = SqliteEngine::open(&config.db_path, config.database())
        .with_context(|| format!("Failed to open {}", config.db_path.display()))?;
    let target = IngestTarget {
        table: config.table.clone(),
        partition_column: config.partition_column.clone(),
        index_column: config.index_column.clone(),
    };

    tracing::info!(
        data_root = %data_root.display(),
        db = %config.db_path.display(),
        table = %config.table,
        "Ingesting CSV tree"
    );
    let summary = ingest_csv_tree(&engine, &CsvStore::new(data_root), &target)?;
    if !summary.failed.is_empty() {
        tracing::warn!(failed = summary.failed.len(), "Some files were not ingested");
    }
    Ok(())
}
