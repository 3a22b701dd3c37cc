//! Configuration loading for trace-blame
//!
//! Loads settings from a `trace-blame.toml` file, found by walking up from the
//! working directory or given explicitly. A missing file means defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "trace-blame.toml";

pub const DEFAULT_WRAPPER_MARKER: &str = "(wrapper dynamic-method)";
pub const DEFAULT_GENERATOR_NAMESPACE: &str = "MonoMod.Utils.DynamicMethodDefinition.";
pub const DEFAULT_TRAMPOLINE_SUFFIX: &str = "_Patch";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid trampoline suffix {suffix:?}: {source}")]
    InvalidSuffix {
        suffix: String,
        source: regex::Error,
    },
}

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Background resolution threads (0 lets the pool pick)
    pub worker_threads: usize,

    /// Literal prefix marking generated wrapper frames
    pub wrapper_marker: String,

    /// Namespace the patch generator prepends to wrapper method names
    pub generator_namespace: String,

    /// Suffix (followed by digits) appended to trampoline method names
    pub trampoline_suffix: String,

    /// File name prefix for saved reports
    pub report_file_prefix: String,

    /// Headings used in the compact summary
    pub labels: Labels,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            wrapper_marker: DEFAULT_WRAPPER_MARKER.to_string(),
            generator_namespace: DEFAULT_GENERATOR_NAMESPACE.to_string(),
            trampoline_suffix: DEFAULT_TRAMPOLINE_SUFFIX.to_string(),
            report_file_prefix: "BugReport-".to_string(),
            labels: Labels::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Labels {
    pub affected: String,
    pub affected_candidate: String,
    pub not_found: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            affected: "Affected Mods".to_string(),
            affected_candidate: "Affected Candidate Mods".to_string(),
            not_found: "Not Found Methods".to_string(),
        }
    }
}

/// Find the config file starting from a path and walking up
pub fn find_config_file(start_path: &Path) -> Option<PathBuf> {
    let mut current = if start_path.is_file() {
        start_path.parent()?
    } else {
        start_path
    };

    loop {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }

        current = current.parent()?;
    }
}

/// Load configuration from an explicit file, or search upward from the
/// working directory when `path` is `None`.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let found = std::env::current_dir()
                .ok()
                .and_then(|cwd| find_config_file(&cwd));
            match found {
                Some(p) => p,
                None => return Ok(Config::default()),
            }
        }
    };

    parse_config_file(&config_path)
}

pub fn parse_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
