//! `plugins check`: load an installed plugin and probe its health hook.

use serde::Serialize;
use tracing::{info, warn};

use trellis_telemetry::EventRecord;

use crate::error::PluginResult;
use crate::hooks::HookKind;
use crate::loader::PluginLoader;
use crate::paths::installed_dir;
use crate::plugin::HostPlugin;

use super::Installer;

/// Outcome of a health check.
///
/// A misbehaving plugin yields an unhealthy report, never a host
/// failure: process crashes, timeouts, and nonsense replies all land in
/// `detail`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    /// Plugin name.
    pub plugin: String,
    /// Whether the plugin reported itself healthy.
    pub healthy: bool,
    /// What went wrong, for unhealthy reports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckReport {
    fn healthy(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            healthy: true,
            detail: None,
        }
    }

    fn unhealthy(plugin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            healthy: false,
            detail: Some(detail.into()),
        }
    }
}

impl Installer {
    /// Check the health of an installed plugin.
    ///
    /// The plugin is located, loaded through the given loader, and its
    /// `health` hook invoked. Any failure along the way, a missing
    /// hook, or a `false` reply produces an unhealthy report.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PluginError::NotInstalled`] when no directory
    /// matches the name; everything after that point is folded into the
    /// report.
    pub async fn check(&self, name: &str, loader: &PluginLoader) -> PluginResult<CheckReport> {
        let dir = installed_dir(self.plugins_dir(), name)?;

        let report = match loader.load_dir(&dir).await {
            Err(e) => {
                warn!(plugin = %name, error = %e, "Plugin failed to load during check");
                CheckReport::unhealthy(name, format!("failed to load: {e}"))
            }
            Ok(plugin) => {
                let surface = std::sync::Arc::clone(&plugin).hook_surface();
                match surface.health {
                    None => CheckReport::unhealthy(
                        plugin.name(),
                        format!("plugin declares no {} hook", HookKind::Health),
                    ),
                    Some(hook) => match hook.on_health().await {
                        Ok(true) => CheckReport::healthy(plugin.name()),
                        Ok(false) => {
                            CheckReport::unhealthy(plugin.name(), "plugin reported unhealthy")
                        }
                        Err(e) => CheckReport::unhealthy(plugin.name(), e.to_string()),
                    },
                }
            }
        };

        info!(plugin = %report.plugin, healthy = report.healthy, "Checked plugin");
        self.emit(
            EventRecord::new("plugin_checked")
                .with_field("plugin", report.plugin.as_str())
                .with_field("healthy", report.healthy),
        );
        Ok(report)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::PluginError;
    use crate::process::test_support::{describe_script, write_entry_script};
    use tempfile::TempDir;

    fn installed(root: &std::path::Path, name: &str, script: &str) {
        let dir = root.join(format!("{name}-00000000"));
        std::fs::create_dir_all(&dir).unwrap();
        write_entry_script(&dir, script);
    }

    fn health_script(health_action: &str) -> String {
        format!(
            r#"case "$1" in
  describe) echo '{{"plugin": {{"name": "greeter", "hooks": ["health"]}}}}' ;;
  health) {health_action} ;;
  *) exit 0 ;;
esac"#
        )
    }

    #[tokio::test]
    async fn healthy_plugin_reports_healthy() {
        let root = TempDir::new().unwrap();
        installed(root.path(), "greeter", &health_script("echo true"));

        let report = Installer::quiet(root.path())
            .check("greeter", &PluginLoader::unsigned())
            .await
            .unwrap();
        assert!(report.healthy);
        assert!(report.detail.is_none());
    }

    #[tokio::test]
    async fn false_reply_is_unhealthy() {
        let root = TempDir::new().unwrap();
        installed(root.path(), "greeter", &health_script("echo false"));

        let report = Installer::quiet(root.path())
            .check("greeter", &PluginLoader::unsigned())
            .await
            .unwrap();
        assert!(!report.healthy);
    }

    #[tokio::test]
    async fn crashing_health_hook_is_unhealthy_not_fatal() {
        let root = TempDir::new().unwrap();
        installed(root.path(), "greeter", &health_script("exit 9"));

        let report = Installer::quiet(root.path())
            .check("greeter", &PluginLoader::unsigned())
            .await
            .unwrap();
        assert!(!report.healthy);
        assert!(report.detail.is_some());
    }

    #[tokio::test]
    async fn plugin_without_health_hook_is_unhealthy() {
        let root = TempDir::new().unwrap();
        installed(
            root.path(),
            "greeter",
            &describe_script(r#"{"name": "greeter"}"#),
        );

        let report = Installer::quiet(root.path())
            .check("greeter", &PluginLoader::unsigned())
            .await
            .unwrap();
        assert!(!report.healthy);
        assert!(report.detail.unwrap().contains("health"));
    }

    #[tokio::test]
    async fn unloadable_plugin_is_unhealthy() {
        let root = TempDir::new().unwrap();
        installed(root.path(), "greeter", "echo not json");

        let report = Installer::quiet(root.path())
            .check("greeter", &PluginLoader::unsigned())
            .await
            .unwrap();
        assert!(!report.healthy);
    }

    #[tokio::test]
    async fn missing_plugin_is_not_installed() {
        let root = TempDir::new().unwrap();
        let err = Installer::quiet(root.path())
            .check("ghost", &PluginLoader::unsigned())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::NotInstalled(_)));
    }
}
