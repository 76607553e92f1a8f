//! `plugins info` and `plugins list`: inspect installed plugins.

use std::path::PathBuf;

use serde::Serialize;
use tracing::warn;

use crate::error::PluginResult;
use crate::loader::signature_path;
use crate::manifest::PluginManifest;
use crate::paths::{installed_dir, ENTRY_FILE};

use super::Installer;

/// Everything known about one installed plugin directory.
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    /// Plugin name, from the metadata file or the directory name.
    pub name: String,
    /// The installed directory.
    pub dir: PathBuf,
    /// Parsed metadata; synthesized when no metadata file exists.
    pub manifest: PluginManifest,
    /// Path of the metadata file, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<PathBuf>,
    /// Whether the entry executable is present.
    pub entry_present: bool,
    /// Whether a detached signature sits next to the entry.
    pub signed: bool,
}

impl PluginInfo {
    fn from_dir(dir: PathBuf) -> PluginResult<Self> {
        let entry = dir.join(ENTRY_FILE);
        let (manifest_path, manifest) = match PluginManifest::load_from_dir(&dir)? {
            Some((path, manifest)) => (Some(path), manifest),
            None => {
                let fallback = dir
                    .file_name()
                    .map_or_else(|| "unknown".to_string(), |n| n.to_string_lossy().into_owned());
                (None, PluginManifest::synthesized(fallback))
            }
        };

        Ok(Self {
            name: manifest.name.clone(),
            entry_present: entry.is_file(),
            signed: signature_path(&entry).is_file(),
            dir,
            manifest,
            manifest_path,
        })
    }
}

impl Installer {
    /// Describe an installed plugin.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PluginError::NotInstalled`] when no directory
    /// matches the name and [`crate::PluginError::MetadataInvalid`]
    /// when a metadata file is present but unusable.
    pub fn info(&self, name: &str) -> PluginResult<PluginInfo> {
        let dir = installed_dir(self.plugins_dir(), name)?;
        PluginInfo::from_dir(dir)
    }

    /// Enumerate every installed plugin, sorted by directory name.
    ///
    /// Unreadable or corrupt entries are skipped with a warning; an
    /// absent plugins root yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PluginError::Io`] only when the plugins root
    /// itself exists but cannot be listed.
    pub fn list(&self) -> PluginResult<Vec<PluginInfo>> {
        let entries = match std::fs::read_dir(self.plugins_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .map(|e| e.path())
            .collect();
        dirs.sort();

        let mut plugins = Vec::new();
        for dir in dirs {
            match PluginInfo::from_dir(dir.clone()) {
                Ok(info) => plugins.push(info),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping unreadable plugin directory");
                }
            }
        }
        Ok(plugins)
    }
}
