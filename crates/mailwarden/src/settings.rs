//! Daemon configuration file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use mailwarden_core::PriorityKeywords;

/// Runtime settings, loaded from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Directory holding the shared and per-tenant databases.
    pub data_dir: PathBuf,
    /// Bot token for chat delivery.
    pub bot_token: String,
    /// Keyword sets driving priority classification.
    #[serde(default)]
    pub keywords: PriorityKeywords,
    /// How often the scheduler looks for due mailbox configurations.
    #[serde(default = "default_scheduler_tick_secs")]
    pub scheduler_tick_secs: u64,
    /// How often the orphan reconciler sweeps.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// Report orphans without deleting them.
    #[serde(default)]
    pub reconcile_dry_run: bool,
}

const fn default_scheduler_tick_secs() -> u64 {
    30
}

const fn default_reconcile_interval_secs() -> u64 {
    3600
}

impl Settings {
    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        let settings: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing settings file {}", path.display()))?;
        Ok(settings)
    }

    /// Settings file path: first argument, `MAILWARDEN_CONFIG`, or the
    /// default `mailwarden.json` in the working directory.
    pub fn resolve_path() -> PathBuf {
        std::env::args()
            .nth(1)
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("MAILWARDEN_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("mailwarden.json"))
    }
}
