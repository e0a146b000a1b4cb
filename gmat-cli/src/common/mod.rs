//! Common utilities shared between the sparsify and prune commands.

mod logging;

pub use logging::init_logging;

use anyhow::{Context, Result};
use graph_storage::VarDesc;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::config::prune_config::{PruneConfig, PRUNE_CONFIG_FILE};

/// Load a JSON config file, requiring it to exist.
pub fn load_config<T: DeserializeOwned>(config_path: Option<&str>, config_name: &str) -> Result<T> {
    let path = config_path.ok_or_else(|| {
        anyhow::anyhow!("--config is required. Use --generate-config to create {}", config_name)
    })?;

    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path))?;

    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse config: {}", path))
}

/// Build the effective config from `--config` and `--ratio`.
///
/// `--ratio` overrides the config file's ratio. Without a config file the
/// defaults are used, but then `--ratio` is required.
pub fn resolve_config(config_path: Option<&str>, ratio: Option<f64>) -> Result<PruneConfig> {
    let mut config = match (config_path, ratio) {
        (None, None) => anyhow::bail!(
            "--ratio or --config is required. Use --generate-config to create {}",
            PRUNE_CONFIG_FILE
        ),
        (None, Some(_)) => PruneConfig::default(),
        (Some(_), _) => load_config(config_path, PRUNE_CONFIG_FILE)?,
    };

    if let Some(ratio) = ratio {
        config.ratio = ratio;
    }
    gmat_machete::check_ratio(config.ratio)?;
    debug!(?config, "resolved prune config");
    Ok(config)
}

/// Write `config` as pretty JSON to `prune_config.json` in `dir`.
pub fn write_config(config: &PruneConfig, dir: &Path) -> Result<()> {
    let path = dir.join(PRUNE_CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    fs::write(&path, json).with_context(|| format!("Failed to write config: {}", path.display()))
}

/// Print the `[i/n] name [shape]` listing of candidate tensors.
pub fn print_candidates(candidates: &[&VarDesc]) {
    let total = candidates.len();
    for (i, var) in candidates.iter().enumerate() {
        println!("[{}/{}] {} {:?}", i + 1, total, var.name, var.shape);
    }
}
