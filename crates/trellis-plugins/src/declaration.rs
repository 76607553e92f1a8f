//! Plugin self-declarations.
//!
//! A plugin's entry executable answers `describe` with a JSON document
//! whose top level carries a `plugin` object. That object is the plugin's
//! declaration: identity, version gates, command surface, and the hooks
//! it implements.

use std::path::Path;
use std::str::FromStr;

use serde_json::Value;
use tracing::warn;

use trellis_core::coerce_version;

use crate::error::{PluginError, PluginResult};
use crate::hooks::HookKind;

/// The parsed declaration of a plugin.
#[derive(Debug, Clone)]
pub struct PluginDeclaration {
    /// Declared name, if any.
    pub name: Option<String>,
    /// Declared version, normalized to a string.
    pub version: Option<String>,
    /// Semver range the running host must satisfy.
    pub requires_host_version: Option<String>,
    /// Names of the commands the plugin contributes.
    pub commands: Vec<String>,
    /// Hooks the plugin implements.
    pub hooks: Vec<HookKind>,
    /// The raw `plugin` object as declared.
    pub raw: Value,
}

impl PluginDeclaration {
    /// Parse the stdout of a `describe` invocation.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ExecutionFailed`] if the output is not
    /// JSON, and [`PluginError::MissingPluginDeclaration`] if the top
    /// level has no `plugin` object.
    pub fn parse(output: &str, entry: &Path) -> PluginResult<Self> {
        let document: Value = serde_json::from_str(output.trim()).map_err(|e| {
            PluginError::ExecutionFailed(format!(
                "unparsable describe output from {}: {e}",
                entry.display()
            ))
        })?;

        let Some(plugin) = document.get("plugin").filter(|v| v.is_object()) else {
            return Err(PluginError::MissingPluginDeclaration {
                path: entry.to_path_buf(),
            });
        };

        let name = plugin
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string);
        // Sloppy metadata may declare the version as a bare number.
        let version = plugin.get("version").and_then(coerce_version);
        let requires_host_version = plugin
            .get("requires_host_version")
            .and_then(Value::as_str)
            .map(str::to_string);

        let commands = string_list(plugin.get("commands"));

        let mut hooks = Vec::new();
        for hook_name in string_list(plugin.get("hooks")) {
            match HookKind::from_str(&hook_name) {
                Ok(kind) => {
                    if !hooks.contains(&kind) {
                        hooks.push(kind);
                    }
                }
                Err(_) => {
                    warn!(
                        entry = %entry.display(),
                        hook = %hook_name,
                        "Plugin declares unknown hook; ignoring"
                    );
                }
            }
        }

        Ok(Self {
            name,
            version,
            requires_host_version,
            commands,
            hooks,
            raw: plugin.clone(),
        })
    }

    /// The name used to identify this plugin in telemetry and the
    /// registry: the declared name, falling back to the entry file's
    /// directory name.
    #[must_use]
    pub fn effective_name(&self, entry: &Path) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        entry
            .parent()
            .and_then(Path::file_name)
            .map_or_else(|| "unknown".to_string(), |n| n.to_string_lossy().into_owned())
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
