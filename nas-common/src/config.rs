//! Configuration file resolution and loading

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "NAS_CONFIG";

/// Configuration file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. User config file (`~/.config/nas/config.toml`)
/// 4. System config file (`/etc/nas/config.toml`)
///
/// Returns `Ok(None)` when no file exists anywhere; callers fall back to
/// built-in defaults in that case. An explicitly requested file (CLI or
/// environment) that does not exist is an error.
pub fn resolve_config_file(cli_arg: Option<&Path>, env_var_name: &str) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return require_existing(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return require_existing(PathBuf::from(path));
        }
    }

    // Priority 3/4: Platform locations
    Ok(default_config_locations().into_iter().find(|p| p.exists()))
}

fn require_existing(path: PathBuf) -> Result<Option<PathBuf>> {
    if path.exists() {
        Ok(Some(path))
    } else {
        Err(Error::NotFound(format!("Config file not found: {}", path.display())))
    }
}

/// Platform config file candidates, most specific first
fn default_config_locations() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("nas").join("config.toml"));
    }
    if cfg!(unix) {
        candidates.push(PathBuf::from("/etc/nas/config.toml"));
    }
    candidates
}

/// Load and deserialize a TOML file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    debug!("Loading configuration from {}", path.display());
    let content = std::fs::read_to_string(path)?;
    parse_toml(&content)
}

/// Deserialize TOML text
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    Ok(toml::from_str(content)?)
}

/// Resolve and load a configuration, falling back to `T::default()`
pub fn load_or_default<T>(cli_arg: Option<&Path>, env_var_name: &str) -> Result<(T, Option<PathBuf>)>
where
    T: DeserializeOwned + Default,
{
    match resolve_config_file(cli_arg, env_var_name)? {
        Some(path) => {
            let config = load_toml(&path)?;
            Ok((config, Some(path)))
        }
        None => Ok((T::default(), None)),
    }
}
