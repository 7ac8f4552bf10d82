use std::time::Duration;

use anyhow::{ensure, Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

pub const DEFAULT_SHEET_URL: &str =
    "https://docs.google.com/spreadsheets/d/1OELmrzg_nTghtK52_YbZ-I-pCntdeuxqHxWfF8W4EZU/gviz/tq?tqx=out:json";

const ENV_PREFIX: &str = "ICUNI";

/// Runtime settings. Every field has a default; `ICUNI_*` environment
/// variables override them (e.g. `ICUNI_CONCURRENCY=8`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sheet_url: String,
    /// How long scraped page metadata stays fresh.
    pub metadata_ttl_secs: u64,
    /// How long a loaded catalog is served before the sheet is fetched again.
    pub revalidate_secs: u64,
    /// Enrichment workers running at once.
    pub concurrency: usize,
    pub http_timeout_secs: u64,
    pub host: String,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            sheet_url: DEFAULT_SHEET_URL.to_string(),
            metadata_ttl_secs: 6 * 60 * 60,
            revalidate_secs: 30 * 60,
            concurrency: 4,
            http_timeout_secs: 20,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.concurrency >= 1, "concurrency must be at least 1");
        ensure!(!self.sheet_url.trim().is_empty(), "sheet_url must not be empty");
        Ok(())
    }

    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl_secs)
    }

    pub fn revalidate_window(&self) -> Duration {
        Duration::from_secs(self.revalidate_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
