use anyhow::{Context, Result};
use config::{Config, Environment, File};
use core_logic::CrawlerConfig;
use std::path::Path;
use url::Url;

/// Environment overrides: `HOLDERS__CHAINBASE__BASE_URL`, `HOLDERS__THREADS__MAX_WORKERS`, ...
pub const ENV_PREFIX: &str = "HOLDERS";

/// Loads the TOML file at `path` (optional; missing means all defaults)
/// layered with `HOLDERS__*` environment variables.
pub fn load_settings(path: &str) -> Result<CrawlerConfig> {
    if !Path::new(path).exists() {
        tracing::info!("{} not found, using defaults", path);
    }

    let settings = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to read settings from {}", path))?;

    let config: CrawlerConfig = settings
        .try_deserialize()
        .with_context(|| format!("Invalid settings in {}", path))?;
    config.validate()?;

    let holders_url = config.chainbase.holders_url();
    Url::parse(&holders_url)
        .with_context(|| format!("chainbase.base_url does not form a valid URL: {}", holders_url))?;

    Ok(config)
}
