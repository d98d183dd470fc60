// src/core/config.rs

//! Job configuration: DD name allocations, the operator console source and
//! relay tuning.
//!
//! A DD name resolves to a path from the `DD_<NAME>` environment variable
//! first, then from the `[datasets]` table of the config file. Anything
//! else is unallocated.

use crate::constants::{CONFIG_ENV_VAR, DD_ENV_PREFIX, RELAY_BUFFER_SIZE};
use crate::models::StopPolicy;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Error reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Error parsing config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Error expanding '{value}': {source}")]
    Expand {
        value: String,
        #[source]
        source: shellexpand::LookupError<env::VarError>,
    },
    #[error("relay.buffer_size must be greater than zero")]
    InvalidBufferSize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleSection {
    /// FIFO or file the operator writes commands to.
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelaySection {
    pub stop_policy: StopPolicy,
    pub buffer_size: usize,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            stop_policy: StopPolicy::default(),
            buffer_size: RELAY_BUFFER_SIZE,
        }
    }
}

/// Contents of an `rktbatch` TOML file.
///
/// ```toml
/// [datasets]
/// STDIN = "~/jobs/input.txt"
/// SYSOUT = "$JOBDIR/sysout.log"
///
/// [console]
/// path = "/tmp/rktbatch.console"
///
/// [relay]
/// stop_policy = "drain-to-eof"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub datasets: HashMap<String, String>,
    pub console: ConsoleSection,
    pub relay: RelaySection,
}

impl Config {
    /// Parses and validates the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        log::debug!(
            "Loaded config {} ({} dataset allocations)",
            path.display(),
            config.datasets.len()
        );
        Ok(config)
    }

    /// Loads `explicit`, else the file named by `RKTBATCH_CONFIG`, else
    /// returns the defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => {
                log::debug!("No config file; using defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize);
        }
        Ok(())
    }

    /// Resolves DD `name` against the process environment and this config.
    pub fn dataset_path(&self, name: &str) -> Result<Option<PathBuf>, ConfigError> {
        self.dataset_path_with(name, |key| env::var(key).ok())
    }

    /// Resolves DD `name`, reading `DD_<NAME>` allocations through `lookup`.
    pub fn dataset_path_with(
        &self,
        name: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<PathBuf>, ConfigError> {
        let key = format!("{}{}", DD_ENV_PREFIX, name.to_ascii_uppercase());
        let raw = lookup(&key)
            .filter(|value| !value.is_empty())
            .or_else(|| self.datasets.get(name).cloned())
            .or_else(|| self.datasets.get(&name.to_ascii_uppercase()).cloned());

        match raw {
            Some(raw) => {
                let path = expand(&raw)?;
                log::debug!("DD {} allocated to {}", name, path.display());
                Ok(Some(path))
            }
            None => Ok(None),
        }
    }

    pub fn console_path(&self) -> Result<Option<PathBuf>, ConfigError> {
        self.console.path.as_deref().map(expand).transpose()
    }
}

fn expand(raw: &str) -> Result<PathBuf, ConfigError> {
    let expanded = shellexpand::full(raw).map_err(|source| ConfigError::Expand {
        value: raw.to_string(),
        source,
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}

// MARK: --- UNIT TESTS ---
