pub mod run;
pub mod variants;

use std::path::PathBuf;

use anyhow::{Context, Result};
use movenet_core::SyncConfig;

/// Resolve [`SyncConfig`] from the environment, with command-line overrides
/// taking precedence over the matching environment keys.
pub fn load_config(overrides: &[(&str, Option<String>)]) -> Result<SyncConfig> {
    SyncConfig::from_lookup(|key| {
        overrides
            .iter()
            .find(|(name, value)| *name == key && value.is_some())
            .and_then(|(_, value)| value.clone())
            .or_else(|| std::env::var(key).ok())
    })
    .context("invalid configuration")
}

pub fn path_override(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.to_string_lossy().into_owned())
}

/// `s3://bucket` or `file://root`, whichever the run writes to.
pub fn destination(config: &SyncConfig) -> String {
    match &config.object_store_root {
        Some(root) => format!("file://{}", root.display()),
        None => format!("s3://{}", config.bucket),
    }
}
