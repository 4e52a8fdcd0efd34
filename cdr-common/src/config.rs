//! Configuration loading and output root resolution
//!
//! Bootstrap settings live in a small TOML file. The output root (where run
//! directories are created) is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `CDR_OUTPUT_ROOT`
//! 3. TOML config file (`output_root`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the output root
pub const OUTPUT_ROOT_ENV: &str = "CDR_OUTPUT_ROOT";

/// Application directory name under the platform config/data dirs
const APP_DIR: &str = "crash-refiner";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Directory holding per-run output folders
    #[serde(default)]
    pub output_root: Option<PathBuf>,

    /// HTTP bind address for the web service
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted upload body, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Refinement config file (TOML or JSON) applied to every run
    #[serde(default)]
    pub refinement_config: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            output_root: None,
            bind_addr: default_bind_addr(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
            logging: LoggingConfig::default(),
            refinement_config: None,
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_max_upload_bytes() -> usize {
    200 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Locate the configuration file for the platform, if one exists
///
/// Linux checks `~/.config/crash-refiner/config.toml` then
/// `/etc/crash-refiner/config.toml`; other platforms use the user config dir.
pub fn config_file_path() -> Option<PathBuf> {
    if let Some(path) = user_config_path() {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join("config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Per-user config location, whether or not it exists yet
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

/// Load a TOML config from an explicit path
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let config_error = |reason: String| Error::Config {
        path: path.to_path_buf(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
    toml::from_str(&content).map_err(|e| config_error(e.to_string()))
}

/// Load the platform config file, falling back to defaults when absent
pub fn load_default_toml_config() -> Result<TomlConfig> {
    match config_file_path() {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            load_toml_config(&path)
        }
        None => {
            debug!("No configuration file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Load `path`, writing the defaults there first if it does not exist
///
/// A failed first-run write is logged and the defaults are still returned.
pub fn load_or_create_toml_config(path: &Path) -> Result<TomlConfig> {
    if path.exists() {
        info!("Loading configuration from {}", path.display());
        return load_toml_config(path);
    }

    let config = TomlConfig::default();
    match write_toml_config(&config, path) {
        Ok(()) => info!("Wrote default configuration to {}", path.display()),
        Err(e) => warn!("Could not write default configuration to {}: {}", path.display(), e),
    }
    Ok(config)
}

/// Write a TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    std::fs::write(&temp_path, content)?;
    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(Error::Io(e));
    }

    Ok(())
}

/// Resolve the output root following the documented priority order
pub fn resolve_output_root(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(OUTPUT_ROOT_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &toml_config.output_root {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_output_root()
}

/// OS-dependent default output root
pub fn default_output_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR).join("runs"))
        .unwrap_or_else(|| PathBuf::from("./crash_refiner_runs"))
}

/// Create the output root if missing and return it
pub fn ensure_directory(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        info!("Creating directory {}", path.display());
        std::fs::create_dir_all(path)?;
    } else if !path.is_dir() {
        return Err(Error::NotADirectory(path.to_path_buf()));
    }
    Ok(path.to_path_buf())
}
