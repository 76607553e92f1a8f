//! Plugin loading.
//!
//! Loading takes an entry executable through a fixed sequence of gates:
//! existence, readability, the signature gate (when a trusted key is
//! configured), the `describe` handshake, declaration shape, and the
//! host version requirement. A plugin that clears every gate becomes a
//! [`ProcessPlugin`]; a rejected one leaves nothing behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use semver::VersionReq;
use serde_json::Value;
use tracing::{debug, info, warn};

use trellis_core::host_version;
use trellis_crypto::{PublicKey, Signature};
use trellis_telemetry::{EventRecord, NullSink, TelemetrySink};

use crate::declaration::PluginDeclaration;
use crate::error::{PluginError, PluginResult};
use crate::paths::SIGNATURE_FILE;
use crate::process::{run_entry, ProcessPlugin, DEFAULT_HOOK_TIMEOUT};

/// Loads plugins from their entry executables.
pub struct PluginLoader {
    trusted_key: Option<PublicKey>,
    sink: Arc<dyn TelemetrySink>,
    hook_timeout: Duration,
}

impl PluginLoader {
    /// Loader without a signature gate, reporting to a sink.
    #[must_use]
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            trusted_key: None,
            sink,
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    /// Loader with neither signature gate nor telemetry.
    #[must_use]
    pub fn unsigned() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Enable the signature gate with a trusted verifying key.
    #[must_use]
    pub fn with_trusted_key(mut self, key: PublicKey) -> Self {
        self.trusted_key = Some(key);
        self
    }

    /// Override the per-invocation subprocess timeout.
    #[must_use]
    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = timeout;
        self
    }

    /// Load the plugin whose entry executable is at `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] when the entry is absent,
    /// [`PluginError::ImportFailed`] when it cannot be read,
    /// [`PluginError::SignatureInvalid`] when a present detached
    /// signature does not verify against the trusted key,
    /// [`PluginError::ExecutionFailed`] when the `describe` run fails,
    /// [`PluginError::MissingPluginDeclaration`] when the output has no
    /// `plugin` object, and [`PluginError::IncompatibleVersion`] when
    /// the declared host requirement rejects the running host.
    pub async fn load(&self, entry: &Path) -> PluginResult<Arc<ProcessPlugin>> {
        debug!(entry = %entry.display(), "Loading plugin");

        if !entry.is_file() {
            return Err(PluginError::NotFound(entry.display().to_string()));
        }

        let entry_bytes = std::fs::read(entry).map_err(|e| PluginError::ImportFailed {
            path: entry.to_path_buf(),
            message: e.to_string(),
        })?;

        if let Some(key) = &self.trusted_key {
            self.check_signature(entry, &entry_bytes, key)?;
        }

        let output = run_entry(entry, "describe", &Value::Null, self.hook_timeout)
            .await?
            .ok_or_else(|| {
                PluginError::ExecutionFailed(format!(
                    "empty describe output from {}",
                    entry.display()
                ))
            })?;

        let declaration = PluginDeclaration::parse(&output, entry)?;
        check_host_requirement(declaration.requires_host_version.as_deref())?;

        let name = declaration.effective_name(entry);
        if declaration.commands.is_empty() {
            warn!(plugin = %name, "Plugin declares no commands");
        }

        info!(
            plugin = %name,
            version = declaration.version.as_deref().unwrap_or("unknown"),
            hooks = ?declaration.hooks,
            "Loaded plugin"
        );
        let mut event = EventRecord::new("plugin_loaded").with_field("plugin", name.as_str());
        if let Some(version) = &declaration.version {
            event = event.with_field("version", version.as_str());
        }
        self.sink.emit(event);

        Ok(Arc::new(ProcessPlugin::new(
            entry.to_path_buf(),
            declaration,
            self.hook_timeout,
        )))
    }

    /// Load the plugin installed in `dir` (its entry executable plus
    /// metadata live directly inside).
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub async fn load_dir(&self, dir: &Path) -> PluginResult<Arc<ProcessPlugin>> {
        self.load(&dir.join(crate::paths::ENTRY_FILE)).await
    }

    fn check_signature(
        &self,
        entry: &Path,
        entry_bytes: &[u8],
        key: &PublicKey,
    ) -> PluginResult<()> {
        let sig_path = signature_path(entry);
        if !sig_path.exists() {
            warn!(entry = %entry.display(), "Plugin entry is unsigned");
            self.sink.emit(
                EventRecord::new("plugin_unsigned")
                    .with_field("entry", entry.display().to_string()),
            );
            return Ok(());
        }

        let payload = std::fs::read(&sig_path).map_err(|e| PluginError::ImportFailed {
            path: sig_path.clone(),
            message: e.to_string(),
        })?;
        let signature =
            Signature::parse_detached(&payload).map_err(|e| PluginError::SignatureInvalid {
                path: entry.to_path_buf(),
                message: e.to_string(),
            })?;
        key.verify(entry_bytes, &signature)
            .map_err(|e| PluginError::SignatureInvalid {
                path: entry.to_path_buf(),
                message: e.to_string(),
            })?;
        debug!(entry = %entry.display(), "Plugin signature verified");
        Ok(())
    }
}

/// Sibling detached-signature path for an entry executable.
#[must_use]
pub fn signature_path(entry: &Path) -> PathBuf {
    entry
        .parent()
        .map_or_else(|| PathBuf::from(SIGNATURE_FILE), |d| d.join(SIGNATURE_FILE))
}

/// Check a declared `requires_host_version` range against the running
/// host.
///
/// # Errors
///
/// Returns [`PluginError::IncompatibleVersion`] when the range is
/// unparsable or rejects the host version.
pub(crate) fn check_host_requirement(required: Option<&str>) -> PluginResult<()> {
    let Some(required) = required else {
        return Ok(());
    };
    let running = host_version();
    let satisfied = VersionReq::parse(required)
        .map(|req| req.matches(running))
        .unwrap_or(false);
    if satisfied {
        Ok(())
    } else {
        Err(PluginError::IncompatibleVersion {
            required: required.to_string(),
            running: running.to_string(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::plugin::HostPlugin;
    use crate::process::test_support::{describe_script, write_entry_script};
    use tempfile::TempDir;
    use trellis_crypto::KeyPair;
    use trellis_telemetry::RecordingSink;

    fn loader_with_sink() -> (PluginLoader, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        (PluginLoader::new(sink.clone()), sink)
    }

    #[tokio::test]
    async fn loads_a_declared_plugin() {
        let dir = TempDir::new().unwrap();
        let entry = write_entry_script(
            dir.path(),
            &describe_script(
                r#"{"name": "greeter", "version": "1.2.0", "commands": ["greet"], "hooks": ["health"]}"#,
            ),
        );

        let (loader, sink) = loader_with_sink();
        let plugin = loader.load(&entry).await.unwrap();
        assert_eq!(plugin.name(), "greeter");
        assert_eq!(plugin.version(), Some("1.2.0"));
        assert_eq!(plugin.commands(), vec!["greet"]);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "plugin_loaded");
        assert_eq!(events[0].field_str("plugin"), Some("greeter"));
        assert_eq!(events[0].field_str("version"), Some("1.2.0"));
    }

    #[tokio::test]
    async fn missing_entry_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = PluginLoader::unsigned()
            .load(&dir.path().join("plugin.run"))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::NotFound(_)));
    }

    #[tokio::test]
    async fn describe_without_plugin_object_is_rejected() {
        let dir = TempDir::new().unwrap();
        let entry = write_entry_script(dir.path(), r#"echo '{"name": "bare"}'"#);

        let (loader, sink) = loader_with_sink();
        let err = loader.load(&entry).await.unwrap_err();
        assert!(matches!(err, PluginError::MissingPluginDeclaration { .. }));
        // A failed load reports nothing.
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn impossible_host_requirement_is_rejected() {
        let dir = TempDir::new().unwrap();
        let entry = write_entry_script(
            dir.path(),
            &describe_script(r#"{"name": "demo", "requires_host_version": ">9999"}"#),
        );

        let err = PluginLoader::unsigned().load(&entry).await.unwrap_err();
        assert!(matches!(
            err,
            PluginError::IncompatibleVersion { required, .. } if required == ">9999"
        ));
    }

    #[tokio::test]
    async fn garbage_host_requirement_is_rejected() {
        assert!(check_host_requirement(Some("not-a-range")).is_err());
        assert!(check_host_requirement(None).is_ok());
        assert!(check_host_requirement(Some(">=0.0.1")).is_ok());
    }

    #[tokio::test]
    async fn failed_describe_is_execution_failure() {
        let dir = TempDir::new().unwrap();
        let entry = write_entry_script(dir.path(), "exit 7");

        let err = PluginLoader::unsigned().load(&entry).await.unwrap_err();
        assert!(matches!(err, PluginError::ExecutionFailed(_)));
    }

    #[tokio::test]
    async fn unsigned_entry_loads_with_event_when_key_configured() {
        let dir = TempDir::new().unwrap();
        let entry = write_entry_script(dir.path(), &describe_script(r#"{"name": "demo"}"#));

        let sink = Arc::new(RecordingSink::new());
        let key = KeyPair::generate();
        let loader =
            PluginLoader::new(sink.clone()).with_trusted_key(key.export_public_key());

        let plugin = loader.load(&entry).await.unwrap();
        assert_eq!(plugin.name(), "demo");
        assert_eq!(sink.event_names(), vec!["plugin_unsigned", "plugin_loaded"]);
    }

    #[tokio::test]
    async fn valid_signature_passes_the_gate() {
        let dir = TempDir::new().unwrap();
        let entry = write_entry_script(dir.path(), &describe_script(r#"{"name": "demo"}"#));

        let key = KeyPair::generate();
        let signature = key.sign(&std::fs::read(&entry).unwrap());
        std::fs::write(signature_path(&entry), signature.to_hex()).unwrap();

        let (loader, sink) = loader_with_sink();
        let loader = loader.with_trusted_key(key.export_public_key());
        loader.load(&entry).await.unwrap();
        assert_eq!(sink.event_names(), vec!["plugin_loaded"]);
    }

    #[tokio::test]
    async fn tampered_entry_fails_the_gate() {
        let dir = TempDir::new().unwrap();
        let entry = write_entry_script(dir.path(), &describe_script(r#"{"name": "demo"}"#));

        let key = KeyPair::generate();
        let signature = key.sign(&std::fs::read(&entry).unwrap());
        std::fs::write(signature_path(&entry), signature.to_hex()).unwrap();

        // Tamper after signing.
        write_entry_script(dir.path(), &describe_script(r#"{"name": "evil"}"#));

        let err = PluginLoader::unsigned()
            .with_trusted_key(key.export_public_key())
            .load(&entry)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::SignatureInvalid { .. }));
    }

    #[tokio::test]
    async fn garbage_signature_file_fails_the_gate() {
        let dir = TempDir::new().unwrap();
        let entry = write_entry_script(dir.path(), &describe_script(r#"{"name": "demo"}"#));
        std::fs::write(signature_path(&entry), "not a signature").unwrap();

        let err = PluginLoader::unsigned()
            .with_trusted_key(KeyPair::generate().export_public_key())
            .load(&entry)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::SignatureInvalid { .. }));
    }
}
