//! Host configuration loaded from `config.toml`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading the host configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config at {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The configuration file is not valid TOML.
    #[error("invalid config at {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

/// Host-level configuration (`<home>/config.toml`).
///
/// Every field is optional; a missing file yields the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Override for the managed plugins directory.
    ///
    /// `$TRELLIS_PLUGINS_DIR` still wins over this when set.
    pub plugins_dir: Option<PathBuf>,

    /// Hex-encoded Ed25519 verifying key used to gate plugin signatures.
    ///
    /// When unset, signature checking is skipped entirely.
    pub trusted_key: Option<String>,

    /// Log level filter (`trace` through `error`).
    pub log_level: Option<String>,
}

impl HostConfig {
    /// Load the configuration from `path`.
    ///
    /// A missing file is not an error; it yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(ConfigError::Read { path: path.to_path_buf(), source: err });
            }
        };
        toml::from_str(&raw)
            .map_err(|err| ConfigError::Parse { path: path.to_path_buf(), source: err })
    }
}
