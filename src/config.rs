//! User configuration.
//!
//! Settings live in a small JSON file so tool locations and scratch policy
//! do not have to be repeated on every command line. Command-line options
//! always win over anything loaded here.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "DWI2RESPONSE_CONFIG";
/// Environment variable overriding `tool_dir`.
pub const TOOL_DIR_ENV: &str = "DWI2RESPONSE_TOOL_DIR";

const CONFIG_DIR_NAME: &str = "dwi2response";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory searched for the MRtrix executables before `PATH`.
    #[serde(default)]
    pub tool_dir: Option<PathBuf>,
    /// Parent directory for scratch workspaces.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    /// Keep scratch workspaces after every run.
    #[serde(default)]
    pub keep_scratch: bool,
}

/// Default config location under the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load config from `$DWI2RESPONSE_CONFIG` or the default location, then
/// apply environment overrides.
pub fn load() -> Result<Config> {
    let path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .or_else(default_config_path);
    let mut config = match path {
        Some(path) => load_from(&path)?,
        None => Config::default(),
    };
    if let Some(tool_dir) = std::env::var_os(TOOL_DIR_ENV).filter(|value| !value.is_empty()) {
        config.tool_dir = Some(PathBuf::from(tool_dir));
    }
    Ok(config)
}

/// Load config from `path`; a missing file yields the defaults.
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: Config = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}
