//! Plugin metadata files.
//!
//! An installed plugin directory carries a metadata file, `plugin.json`
//! or `plugin.yaml`, with at least a `name` key. The contract is
//! additive: unknown fields are preserved verbatim and surfaced by
//! `plugins info`, not rejected.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PluginError, PluginResult};

/// File names probed for plugin metadata, in priority order.
pub const METADATA_FILES: [&str; 2] = ["plugin.json", "plugin.yaml"];

/// A plugin metadata file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginManifest {
    /// Plugin name.
    pub name: String,
    /// Declared version, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Semver range the running host must satisfy for this plugin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_host_version: Option<String>,
    /// Any further fields, carried verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PluginManifest {
    /// Synthesize a minimal manifest from a directory name.
    ///
    /// Used when an installed plugin has no metadata file at all.
    #[must_use]
    pub fn synthesized(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            description: None,
            author: None,
            requires_host_version: None,
            extra: BTreeMap::new(),
        }
    }

    /// Parse a metadata file. The format is chosen by extension:
    /// `.json` parses as JSON, anything else as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::MetadataInvalid`] if the file is not UTF-8
    /// or does not parse, [`PluginError::Io`] if it cannot be read.
    pub fn load(path: &Path) -> PluginResult<Self> {
        let bytes = std::fs::read(path)?;
        let text = std::str::from_utf8(&bytes).map_err(|e| PluginError::MetadataInvalid {
            path: path.to_path_buf(),
            message: format!("not valid UTF-8: {e}"),
        })?;

        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if is_json {
            serde_json::from_str(text).map_err(|e| PluginError::MetadataInvalid {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        } else {
            serde_yaml::from_str(text).map_err(|e| PluginError::MetadataInvalid {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
    }

    /// Locate and parse the metadata file in a plugin directory.
    ///
    /// Returns `Ok(None)` when no metadata file exists.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load) when a file is present but unusable.
    pub fn load_from_dir(dir: &Path) -> PluginResult<Option<(PathBuf, Self)>> {
        for file in METADATA_FILES {
            let path = dir.join(file);
            if path.is_file() {
                let manifest = Self::load(&path)?;
                return Ok(Some((path, manifest)));
            }
        }
        Ok(None)
    }

    /// The manifest re-serialized as a JSON value, extras included.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
