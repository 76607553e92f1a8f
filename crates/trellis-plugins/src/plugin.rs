//! Plugin trait and name validation.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};
use crate::hooks::HookSurface;

/// Longest accepted plugin name.
pub const MAX_NAME_LEN: usize = 64;

/// A validated plugin name.
///
/// Names are non-empty, at most 64 characters, and contain only ASCII
/// alphanumerics, hyphens, and underscores. The same rules gate scaffold
/// names and install destinations, so a valid name is always a safe
/// single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PluginName(String);

/// Deserialize with validation so crafted metadata cannot smuggle path
/// separators into install destinations.
impl<'de> Deserialize<'de> for PluginName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl PluginName {
    /// Create a new `PluginName`, validating the format.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidName`] if the name is empty, too
    /// long, or contains a character outside `[A-Za-z0-9_-]`.
    pub fn new(name: impl Into<String>) -> PluginResult<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether a string is a valid plugin name.
    #[must_use]
    pub fn is_valid(name: &str) -> bool {
        Self::validate(name).is_ok()
    }

    fn validate(name: &str) -> PluginResult<()> {
        if name.is_empty() {
            return Err(PluginError::InvalidName(
                "plugin name must not be empty".into(),
            ));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(PluginError::InvalidName(format!(
                "plugin name must be at most {MAX_NAME_LEN} characters, got {}",
                name.len()
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(PluginError::InvalidName(format!(
                "plugin name must contain only ASCII alphanumerics, hyphens, and underscores, got: {name}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for PluginName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PluginName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A plugin instance the host can register and dispatch hooks to.
///
/// Implementors describe their identity and expose their hook surface;
/// the registry wires the surface into per-hook implementer lists at
/// registration time.
pub trait HostPlugin: Send + Sync {
    /// The plugin's declared name.
    fn name(&self) -> &str;

    /// The plugin's declared version, if any.
    fn version(&self) -> Option<&str> {
        None
    }

    /// Names of the commands this plugin contributes.
    fn commands(&self) -> Vec<String> {
        Vec::new()
    }

    /// The hooks this plugin implements.
    ///
    /// Takes `Arc<Self>` so implementors can hand out clones of
    /// themselves as the hook implementers.
    fn hook_surface(self: Arc<Self>) -> HookSurface {
        HookSurface::default()
    }
}

impl fmt::Debug for dyn HostPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostPlugin")
            .field("name", &self.name())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}
