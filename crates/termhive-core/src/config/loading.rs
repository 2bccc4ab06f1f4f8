//! Configuration loading and merging logic.
//!
//! Files are merged as raw TOML tables before deserializing, so a key is
//! only overridden when the later file actually sets it.

use crate::config::types::TermhiveConfig;
use crate::config::validation::validate_config;
use crate::errors::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Load configuration from the hierarchy of config files.
///
/// Loads and merges configuration from:
/// 1. Default values
/// 2. User config (`~/.termhive/config.toml`)
/// 3. Project config (`./.termhive/config.toml`)
///
/// # Errors
///
/// Returns an error if a present file fails to parse or validation fails.
/// Missing config files are not errors.
pub fn load_hierarchy() -> Result<TermhiveConfig, ConfigError> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".termhive").join("config.toml"));
    }
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".termhive").join("config.toml"));
    }
    load_from_paths(&paths)
}

/// Load and merge the given files in order, skipping missing ones.
pub fn load_from_paths(paths: &[PathBuf]) -> Result<TermhiveConfig, ConfigError> {
    let mut merged = toml::Value::Table(toml::map::Map::new());

    for path in paths {
        match read_config_value(path) {
            Ok(value) => {
                debug!(event = "core.config.file_loaded", path = %path.display());
                merge_values(&mut merged, value);
            }
            Err(ConfigError::ConfigNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
    }

    let config: TermhiveConfig =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ConfigParseError {
                path: "<merged>".to_string(),
                message: e.to_string(),
            })?;

    validate_config(&config)?;
    Ok(config)
}

fn read_config_value(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        Err(e) => return Err(ConfigError::IoError { source: e }),
    };

    toml::from_str(&content).map_err(|e| ConfigError::ConfigParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Deep-merge `overlay` into `base`. Tables merge key by key; any other
/// value in `overlay` replaces the one in `base`.
pub fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
