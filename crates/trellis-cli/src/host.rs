//! Host bootstrap: home layout, config, logging, services, discovery.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use trellis_core::{HostConfig, TrellisHome, PLUGINS_DIR_ENV};
use trellis_crypto::PublicKey;
use trellis_di::ServiceContainer;
use trellis_plugins::{discover, EntryPointDescriptor, Installer, PluginLoader, PluginRegistry};
use trellis_telemetry::{LogConfig, LogFormat, TelemetrySink, TracingSink};

/// A fully bootstrapped host: resolved directories, loaded config,
/// telemetry, service container, and the plugin machinery.
pub(crate) struct Host {
    pub(crate) plugins_dir: PathBuf,
    pub(crate) signing_key_path: PathBuf,
    pub(crate) container: ServiceContainer,
    pub(crate) registry: Arc<PluginRegistry>,
    pub(crate) loader: PluginLoader,
    pub(crate) installer: Installer,
}

impl Host {
    /// Resolve the home, load config, initialize logging, populate the
    /// service container, and run the entry-point discovery pass.
    pub(crate) async fn bootstrap(verbose: bool, json_output: bool) -> Result<Self> {
        let home = TrellisHome::resolve().context("failed to resolve the Trellis home")?;
        let config = HostConfig::load(&home.config_path())
            .with_context(|| format!("failed to load {}", home.config_path().display()))?;

        setup_logging(&config, verbose, json_output);

        let plugins_dir = resolve_plugins_dir(&home, &config);
        debug!(plugins_dir = %plugins_dir.display(), "Resolved plugins directory");

        let sink: Arc<dyn TelemetrySink> = Arc::new(TracingSink);
        let registry = Arc::new(PluginRegistry::with_sink(Arc::clone(&sink)));

        let mut loader = PluginLoader::new(Arc::clone(&sink));
        if let Some(hex) = &config.trusted_key {
            let key = PublicKey::from_hex(hex)
                .context("config: trusted_key is not a valid ed25519 public key")?;
            loader = loader.with_trusted_key(key);
        }

        let installer = Installer::new(&plugins_dir, Arc::clone(&sink));

        let container = ServiceContainer::new();
        container.register_service::<PluginRegistry>(Arc::clone(&registry));
        container.register_service::<dyn TelemetrySink>(Arc::clone(&sink));

        let outcome = discover(&built_in_entry_points(), &registry, &container, &*sink).await;
        for failure in &outcome.failures {
            warn!(
                entry_point = %failure.name,
                error = %failure.error,
                "Entry point failed during startup"
            );
        }

        Ok(Self {
            plugins_dir,
            signing_key_path: home.signing_key_path(),
            container,
            registry,
            loader,
            installer,
        })
    }

    /// Dispatch `pre_execute` to registered plugins before a host
    /// command runs. Hook failures are logged, never fatal.
    pub(crate) async fn pre_execute(&self, command: &str) {
        let payload = serde_json::json!({ "command": command });
        if let Err(e) = self
            .registry
            .call_hook("pre_execute", &payload, &self.container)
            .await
        {
            warn!(command, error = %e, "pre_execute hook failed");
        }
    }

    /// Dispatch `post_execute` after a host command finished.
    pub(crate) async fn post_execute(&self, command: &str, success: bool) {
        let payload = serde_json::json!({ "command": command, "success": success });
        if let Err(e) = self
            .registry
            .call_hook("post_execute", &payload, &self.container)
            .await
        {
            warn!(command, error = %e, "post_execute hook failed");
        }
    }

    /// Dispatch shutdown hooks to every registered plugin. Failures are
    /// logged, never propagated.
    pub(crate) async fn shutdown(&self) {
        for (plugin, error) in self.registry.shutdown_all().await {
            warn!(plugin = %plugin, error = %error, "Shutdown hook failed");
        }
    }
}

/// Entry points compiled into the host binary. Plugins linked in at
/// build time add their descriptors here.
fn built_in_entry_points() -> Vec<EntryPointDescriptor> {
    Vec::new()
}

/// Precedence: `$TRELLIS_PLUGINS_DIR`, then the config file, then
/// `<home>/plugins/`.
fn resolve_plugins_dir(home: &TrellisHome, config: &HostConfig) -> PathBuf {
    if std::env::var(PLUGINS_DIR_ENV).is_ok_and(|v| !v.is_empty()) {
        return home.plugins_dir();
    }
    config
        .plugins_dir
        .clone()
        .unwrap_or_else(|| home.plugins_dir())
}

fn setup_logging(config: &HostConfig, verbose: bool, json_output: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or("info")
    };
    let mut log_config = LogConfig::new(level);
    if json_output {
        log_config = log_config.with_format(LogFormat::Json);
    }
    if let Err(e) = trellis_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugins_dir_prefers_config_over_default() {
        std::env::remove_var(PLUGINS_DIR_ENV);
        let home = TrellisHome::at("/home/u/.trellis");

        let mut config = HostConfig::default();
        assert_eq!(
            resolve_plugins_dir(&home, &config),
            PathBuf::from("/home/u/.trellis/plugins")
        );

        config.plugins_dir = Some(PathBuf::from("/srv/plugins"));
        assert_eq!(
            resolve_plugins_dir(&home, &config),
            PathBuf::from("/srv/plugins")
        );
    }
}
