//! Layered TOML configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::constants::{DEFAULT_COMPILER_NAME, DEFAULT_WORKING_DIRECTORY};

/// Files read when no explicit config is given, lowest priority first.
pub const CONFIG_SEARCH_PATHS: &[&str] = &[
    "/etc/typstwriter/typstwriter.toml",
    "/usr/local/etc/typstwriter/typstwriter.toml",
    "~/.config/typstwriter/typstwriter.toml",
    "~/.typstwriter.toml",
    "./typstwriter.toml",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Invalid config file `{0}`")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub compiler: CompilerConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneralConfig {
    pub working_directory: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            working_directory: DEFAULT_WORKING_DIRECTORY.to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompilerConfig {
    /// Program to run, looked up in `PATH` unless it is a path.
    pub name: String,
    /// Kept verbatim; an unknown mode disables compilation instead of failing here.
    pub mode: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_COMPILER_NAME.to_string(),
            mode: crate::core::domain::CompilerMode::default().as_str().to_string(),
        }
    }
}

impl Config {
    /// Reads `explicit` if given, the default search paths otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_files(&[path.to_path_buf()]),
            None => Self::from_files(&search_paths()),
        }
    }

    /// Merges every existing file in `paths` over the defaults, later files
    /// winning key by key. Missing files are skipped.
    pub fn from_files(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();
        let mut used = Vec::new();

        for path in paths {
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(ConfigError::Io(path.clone(), e)),
            };
            let layer: toml::Table =
                toml::from_str(&content).map_err(|e| ConfigError::Parse(path.clone(), e))?;
            merge(&mut merged, layer);
            used.push(path);
        }

        if used.is_empty() {
            tracing::warn!("No valid config file found in {:?}, using defaults", paths);
        } else {
            tracing::debug!("Read config from {:?}", used);
        }

        Ok(toml::Value::Table(merged).try_into()?)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// The configured working directory with `~` expanded.
    pub fn working_directory(&self) -> PathBuf {
        expand(&self.general.working_directory)
    }
}

pub fn search_paths() -> Vec<PathBuf> {
    CONFIG_SEARCH_PATHS.iter().map(|path| expand(path)).collect()
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn merge(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        if let toml::Value::Table(layer) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge(existing, layer);
                continue;
            }
            base.insert(key, toml::Value::Table(layer));
        } else {
            base.insert(key, value);
        }
    }
}
