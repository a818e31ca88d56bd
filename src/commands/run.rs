//! Long-running screener with alerts and auto-scalp monitoring

use anyhow::{Context, Result};
use tracing::info;

use perp_screener::{runtime, Config};

pub fn run(config_path: String) -> Result<()> {
    dotenv::dotenv().ok();

    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    info!("Loaded config from {}", config_path);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(runtime::run(config))
}
