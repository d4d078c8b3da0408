use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::sync::Arc;

use index_dash::config::PullConfig;
use index_dash::data::yahoo::YahooProvider;
use index_dash::pull::driver::Driver;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    index_dash::init_tracing();

    let config = PullConfig::from_env().context("Invalid pull configuration")?;
    let provider = YahooProvider::new().context("Failed to build HTTP client")?;
    let driver = Driver::new(config, Arc::new(provider));

    let progress = ProgressBar::new(driver.config().windows.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("  {prefix:.bold} [{bar:30.cyan/dim}] {pos}/{len} windows  {msg}")
            .context("Invalid progress template")?
            .progress_chars("=> "),
    );
    progress.set_prefix("pull");
    if !std::io::stderr().is_terminal() {
        progress.set_draw_target(ProgressDrawTarget::hidden());
    }

    let summary = driver.run(&progress).await;
    if !summary.is_complete() {
        for failure in &summary.fetch_failures {
            tracing::warn!(ticker = %failure.name, symbol = %failure.symbol, "Not fetched: {}", failure.error);
        }
        for (ticker, error) in &summary.write_failures {
            tracing::warn!(%ticker, "Not written: {error}");
        }
    }
    Ok(())
}
