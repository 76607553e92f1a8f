//! Entry-point discovery.
//!
//! The host binary assembles [`EntryPointDescriptor`] values for every
//! built-in or linked-in plugin. A discovery pass filters them by
//! capability group, gates on the host API version, constructs and
//! registers each plugin, and runs its startup hook. Failures are
//! isolated per entry point; one broken descriptor never blocks the
//! rest of the pass.

use std::sync::Arc;

use semver::VersionReq;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use trellis_core::{api_version, coerce_version, ENTRY_POINT_GROUP};
use trellis_di::ServiceContainer;
use trellis_telemetry::{EventRecord, TelemetrySink};

use crate::error::{PluginError, PluginResult};
use crate::plugin::HostPlugin;
use crate::registry::PluginRegistry;

/// Constructor for an entry-point plugin.
pub type PluginConstructor =
    Arc<dyn Fn(&ServiceContainer) -> PluginResult<Arc<dyn HostPlugin>> + Send + Sync>;

/// A registered entry point: where a plugin comes from and how to
/// construct it.
#[derive(Clone)]
pub struct EntryPointDescriptor {
    /// Capability group, e.g. `trellis.plugins.v1`.
    pub group: String,
    /// Entry-point name, used for telemetry before construction.
    pub name: String,
    /// Declared version; strings and bare numbers are both accepted.
    pub version: Option<Value>,
    /// Semver range the host API version must satisfy.
    pub requires_api_version: Option<String>,
    /// Builds the plugin instance.
    pub constructor: PluginConstructor,
}

impl EntryPointDescriptor {
    /// Descriptor in the host's plugin group with no version gates.
    pub fn new(name: impl Into<String>, constructor: PluginConstructor) -> Self {
        Self {
            group: ENTRY_POINT_GROUP.to_string(),
            name: name.into(),
            version: None,
            requires_api_version: None,
            constructor,
        }
    }

    /// Set the capability group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Set the declared version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<Value>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the required host API version range.
    #[must_use]
    pub fn with_requires_api_version(mut self, req: impl Into<String>) -> Self {
        self.requires_api_version = Some(req.into());
        self
    }
}

impl std::fmt::Debug for EntryPointDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryPointDescriptor")
            .field("group", &self.group)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("requires_api_version", &self.requires_api_version)
            .finish_non_exhaustive()
    }
}

/// One entry point that did not make it into the registry, or whose
/// startup hook failed after registration.
#[derive(Debug)]
pub struct DiscoveryFailure {
    /// Entry-point name.
    pub name: String,
    /// What went wrong.
    pub error: PluginError,
}

/// Result of a discovery pass.
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    /// Names registered by this pass, in pass order.
    pub registered: Vec<String>,
    /// Per-entry-point failures; the pass itself always completes.
    pub failures: Vec<DiscoveryFailure>,
}

/// Run a discovery pass over the given descriptors.
///
/// Descriptors outside the host's plugin group are ignored. Each
/// remaining descriptor is version-gated, constructed, registered, and
/// has its startup hook invoked. Every failure is captured in the
/// outcome; none aborts the pass.
pub async fn discover(
    descriptors: &[EntryPointDescriptor],
    registry: &PluginRegistry,
    container: &ServiceContainer,
    sink: &dyn TelemetrySink,
) -> DiscoveryOutcome {
    let mut outcome = DiscoveryOutcome::default();

    for descriptor in descriptors {
        if descriptor.group != ENTRY_POINT_GROUP {
            debug!(
                entry_point = %descriptor.name,
                group = %descriptor.group,
                "Skipping entry point outside the plugin group"
            );
            continue;
        }

        let version = descriptor.version.as_ref().and_then(coerce_version);

        if let Err(error) = check_api_requirement(descriptor.requires_api_version.as_deref()) {
            warn!(
                entry_point = %descriptor.name,
                error = %error,
                "Entry point is incompatible with the host API"
            );
            sink.emit(failure_event(&descriptor.name, &error));
            outcome.failures.push(DiscoveryFailure {
                name: descriptor.name.clone(),
                error,
            });
            continue;
        }

        let plugin = match (descriptor.constructor)(container) {
            Ok(plugin) => plugin,
            Err(error) => {
                warn!(
                    entry_point = %descriptor.name,
                    error = %error,
                    "Entry-point construction failed"
                );
                sink.emit(failure_event(&descriptor.name, &error));
                outcome.failures.push(DiscoveryFailure {
                    name: descriptor.name.clone(),
                    error,
                });
                continue;
            }
        };

        let name = plugin.name().to_string();
        let mut meta = Map::new();
        if let Some(version) = &version {
            meta.insert("version".into(), Value::String(version.clone()));
        }

        if let Err(error) = registry.register_with(Arc::clone(&plugin), Vec::new(), meta) {
            warn!(
                entry_point = %descriptor.name,
                error = %error,
                "Entry-point registration failed"
            );
            // Registration is atomic, so a failed register leaves no
            // state behind. Notably a DuplicateName failure must not
            // evict the existing holder of the name.
            sink.emit(failure_event(&descriptor.name, &error));
            outcome.failures.push(DiscoveryFailure {
                name: descriptor.name.clone(),
                error,
            });
            continue;
        }

        info!(entry_point = %descriptor.name, plugin = %name, "Entry-point plugin registered");
        let mut event =
            EventRecord::new("entrypoint_plugin_loaded").with_field("plugin", name.as_str());
        if let Some(version) = &version {
            event = event.with_field("version", version.as_str());
        }
        sink.emit(event);
        outcome.registered.push(name.clone());

        // Startup failures are captured; the plugin stays registered.
        if let Some(startup) = Arc::clone(&plugin).hook_surface().startup {
            if let Err(error) = startup.on_startup(container).await {
                warn!(plugin = %name, error = %error, "Startup hook failed");
                outcome.failures.push(DiscoveryFailure { name, error });
            }
        }
    }

    outcome
}

fn failure_event(name: &str, error: &PluginError) -> EventRecord {
    EventRecord::new("entrypoint_plugin_failed")
        .with_field("entry_point", name)
        .with_field("reason", error.failure_kind())
        .with_field("error", error.to_string())
}

fn check_api_requirement(required: Option<&str>) -> PluginResult<()> {
    let Some(required) = required else {
        return Ok(());
    };
    let running = api_version();
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
