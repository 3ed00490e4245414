//! Cosmos WFM Platform client - Main Entry Point
//!
//! Loads settings, restores any persisted session, starts push updates and
//! runs until Ctrl-C.
//!
//! The configuration file is taken from the first argument or `COSMOS_CONFIG`;
//! `COSMOS__<SECTION>__<KEY>` variables override it.

use std::path::PathBuf;

use cosmos_infrastructure::{CosmosPlatform, SettingsLoader};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_PATH_ENV: &str = "COSMOS_CONFIG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut loader = SettingsLoader::new();
    if let Some(path) = config_path() {
        loader = loader.with_file(path);
    }
    let settings = loader.load()?;

    tracing::info!(
        base_url = %settings.api.base_url,
        "Starting Cosmos WFM client v{}",
        env!("CARGO_PKG_VERSION")
    );

    let platform = CosmosPlatform::new(settings)?;
    let running = platform.start();

    match platform.session().restore().await {
        Ok(true) => tracing::info!("previous session restored"),
        Ok(false) => tracing::info!("no stored session, waiting for login"),
        Err(error) => tracing::warn!(%error, "platform unreachable, stored session kept"),
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    platform.shutdown(running).await;

    Ok(())
}

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV))
        .map(PathBuf::from)
}
