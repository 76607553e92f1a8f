//! Plugin registry and hook bus.
//!
//! The registry owns every registered plugin, keeps registration order,
//! and dispatches hook calls to implementers. All methods take `&self`;
//! interior locking makes the registry shareable behind an `Arc`.

use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use trellis_di::ServiceContainer;
use trellis_telemetry::{EventRecord, TelemetrySink};

use crate::error::{PluginError, PluginResult};
use crate::hooks::{HookKind, HookSurface};
use crate::plugin::{HostPlugin, PluginName};

/// One registered plugin.
struct PluginRecord {
    name: String,
    aliases: Vec<String>,
    plugin: Arc<dyn HostPlugin>,
    meta: Map<String, Value>,
    hooks: HookSurface,
}

impl PluginRecord {
    fn answers_to(&self, name_or_alias: &str) -> bool {
        self.name == name_or_alias || self.aliases.iter().any(|a| a == name_or_alias)
    }
}

/// Registry of active plugins.
///
/// Records are kept in registration order; hook dispatch walks them in
/// that order.
pub struct PluginRegistry {
    records: RwLock<Vec<PluginRecord>>,
    sink: Option<Arc<dyn TelemetrySink>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            sink: None,
        }
    }

    /// Create a registry that reports changes to a telemetry sink.
    #[must_use]
    pub fn with_sink(sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            sink: Some(sink),
        }
    }

    fn emit(&self, event: EventRecord) {
        if let Some(sink) = &self.sink {
            sink.emit(event);
        }
    }

    /// Register a plugin under its declared name, with no aliases.
    ///
    /// # Errors
    ///
    /// See [`register_with`](Self::register_with).
    pub fn register(&self, plugin: Arc<dyn HostPlugin>) -> PluginResult<()> {
        self.register_with(plugin, Vec::new(), Map::new())
    }

    /// Register a plugin with aliases and attached metadata.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidName`] for a malformed name or
    /// alias, [`PluginError::DuplicateName`] when the name is taken,
    /// [`PluginError::DuplicateAlias`] when an alias collides with any
    /// existing name or alias, and
    /// [`PluginError::DuplicateImplementation`] when the same instance
    /// is already registered.
    pub fn register_with(
        &self,
        plugin: Arc<dyn HostPlugin>,
        aliases: Vec<String>,
        meta: Map<String, Value>,
    ) -> PluginResult<()> {
        let name = PluginName::new(plugin.name())?.as_str().to_string();
        for alias in &aliases {
            PluginName::new(alias.as_str())?;
        }

        let hooks = Arc::clone(&plugin).hook_surface();

        let mut records = self
            .records
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        for record in records.iter() {
            if Arc::ptr_eq(&record.plugin, &plugin) {
                return Err(PluginError::DuplicateImplementation(record.name.clone()));
            }
            if record.answers_to(&name) {
                return Err(PluginError::DuplicateName(name));
            }
            for alias in &aliases {
                if record.answers_to(alias) {
                    return Err(PluginError::DuplicateAlias(alias.clone()));
                }
            }
        }
        // An alias may not shadow the new name or repeat within the set.
        for (i, alias) in aliases.iter().enumerate() {
            if *alias == name || aliases[..i].contains(alias) {
                return Err(PluginError::DuplicateAlias(alias.clone()));
            }
        }

        info!(
            plugin = %name,
            hooks = ?hooks.kinds(),
            aliases = ?aliases,
            "Registered plugin"
        );
        self.emit(EventRecord::new("registry_registered").with_field("plugin", name.as_str()));

        records.push(PluginRecord {
            name,
            aliases,
            plugin,
            meta,
            hooks,
        });
        Ok(())
    }

    /// Remove a plugin by name or alias.
    ///
    /// Removing a name that is not registered is a no-op. Returns
    /// whether a plugin was removed.
    pub fn deregister(&self, name_or_alias: &str) -> bool {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let Some(pos) = records.iter().position(|r| r.answers_to(name_or_alias)) else {
            debug!(plugin = %name_or_alias, "Deregister of unknown plugin ignored");
            return false;
        };

        let record = records.remove(pos);
        info!(plugin = %record.name, "Deregistered plugin");
        self.emit(
            EventRecord::new("registry_deregistered").with_field("plugin", record.name.as_str()),
        );
        true
    }

    /// Look up a plugin by name or alias.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] when nothing answers to the
    /// name.
    pub fn get(&self, name_or_alias: &str) -> PluginResult<Arc<dyn HostPlugin>> {
        self.find(name_or_alias)
            .ok_or_else(|| PluginError::NotFound(name_or_alias.to_string()))
    }

    fn find(&self, name_or_alias: &str) -> Option<Arc<dyn HostPlugin>> {
        self.records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .find(|r| r.answers_to(name_or_alias))
            .map(|r| Arc::clone(&r.plugin))
    }

    /// Whether a plugin answers to this name or alias.
    #[must_use]
    pub fn has(&self, name_or_alias: &str) -> bool {
        self.find(name_or_alias).is_some()
    }

    /// Registered plugin names, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }

    /// Metadata attached to a plugin at registration time, empty when
    /// nothing answers to the name.
    #[must_use]
    pub fn meta(&self, name_or_alias: &str) -> Map<String, Value> {
        self.records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .find(|r| r.answers_to(name_or_alias))
            .map(|r| r.meta.clone())
            .unwrap_or_default()
    }

    /// Number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch a hook to every implementer, in registration order.
    ///
    /// A known hook with no implementers yields `Ok(vec![])`. Results
    /// are the non-empty replies; health replies appear as booleans.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::HookNotFound`] for an unknown hook name.
    /// The first implementer failure aborts dispatch and is returned.
    pub async fn call_hook(
        &self,
        name: &str,
        payload: &Value,
        container: &ServiceContainer,
    ) -> PluginResult<Vec<Value>> {
        let kind: HookKind = name.parse()?;
        debug!(hook = %kind, "Dispatching hook");

        // Snapshot implementers so no lock is held across awaits.
        let implementers: Vec<(String, HookSurface)> = {
            self.records
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .iter()
                .filter(|r| r.hooks.implements(kind))
                .map(|r| (r.name.clone(), r.hooks.clone()))
                .collect()
        };

        let mut results = Vec::new();
        for (plugin, surface) in implementers {
            let reply = match kind {
                HookKind::Startup => match &surface.startup {
                    Some(hook) => hook.on_startup(container).await,
                    None => continue,
                },
                HookKind::Shutdown => match &surface.shutdown {
                    Some(hook) => hook.on_shutdown().await,
                    None => continue,
                },
                HookKind::PreExecute => match &surface.pre_execute {
                    Some(hook) => hook.on_pre_execute(payload).await,
                    None => continue,
                },
                HookKind::PostExecute => match &surface.post_execute {
                    Some(hook) => hook.on_post_execute(payload).await,
                    None => continue,
                },
                HookKind::Health => match &surface.health {
                    Some(hook) => hook.on_health().await.map(|b| Some(Value::Bool(b))),
                    None => continue,
                },
            };

            match reply {
                Ok(Some(value)) => results.push(value),
                Ok(None) => {}
                Err(e) => {
                    warn!(plugin = %plugin, hook = %kind, error = %e, "Hook failed");
                    return Err(e);
                }
            }
        }
        Ok(results)
    }

    /// Run every startup hook, capturing failures per plugin instead of
    /// aborting.
    pub async fn startup_all(&self, container: &ServiceContainer) -> Vec<(String, PluginError)> {
        let mut failures = Vec::new();
        for (plugin, hook) in self.hooks_of(|s| s.startup.clone()) {
            if let Err(e) = hook.on_startup(container).await {
                warn!(plugin = %plugin, error = %e, "Startup hook failed");
                failures.push((plugin, e));
            }
        }
        failures
    }

    /// Run every shutdown hook, capturing failures per plugin instead of
    /// aborting.
    pub async fn shutdown_all(&self) -> Vec<(String, PluginError)> {
        let mut failures = Vec::new();
        for (plugin, hook) in self.hooks_of(|s| s.shutdown.clone()) {
            if let Err(e) = hook.on_shutdown().await {
                warn!(plugin = %plugin, error = %e, "Shutdown hook failed");
                failures.push((plugin, e));
            }
        }
        failures
    }

    fn hooks_of<H>(&self, slot: impl Fn(&HookSurface) -> Option<Arc<H>>) -> Vec<(String, Arc<H>)>
    where
        H: ?Sized,
    {
        self.records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter_map(|r| slot(&r.hooks).map(|h| (r.name.clone(), h)))
            .collect()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{HealthHook, PreExecuteHook};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use trellis_telemetry::RecordingSink;

    struct TestPlugin {
        name: String,
        healthy: bool,
        calls: Mutex<Vec<String>>,
    }

    impl TestPlugin {
        fn named(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                healthy: true,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl HostPlugin for TestPlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn hook_surface(self: Arc<Self>) -> HookSurface {
            let pre: Arc<dyn PreExecuteHook> = self.clone();
            let health: Arc<dyn HealthHook> = self.clone();
            HookSurface {
                pre_execute: Some(pre),
                health: Some(health),
                ..HookSurface::default()
            }
        }
    }

    #[async_trait]
    impl PreExecuteHook for TestPlugin {
        async fn on_pre_execute(&self, payload: &Value) -> PluginResult<Option<Value>> {
            self.calls.lock().unwrap().push(payload.to_string());
            Ok(Some(serde_json::json!({ "seen_by": self.name })))
        }
    }

    #[async_trait]
    impl HealthHook for TestPlugin {
        async fn on_health(&self) -> PluginResult<bool> {
            Ok(self.healthy)
        }
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let registry = PluginRegistry::new();
        registry.register(TestPlugin::named("alpha")).unwrap();

        let err = registry.register(TestPlugin::named("alpha")).unwrap_err();
        assert!(matches!(err, PluginError::DuplicateName(name) if name == "alpha"));
    }

    #[test]
    fn same_instance_is_rejected_under_any_name() {
        let registry = PluginRegistry::new();
        let plugin = TestPlugin::named("alpha");
        registry.register(plugin.clone()).unwrap();

        let err = registry
            .register_with(plugin, vec!["other".into()], Map::new())
            .unwrap_err();
        assert!(matches!(err, PluginError::DuplicateImplementation(name) if name == "alpha"));
    }

    #[test]
    fn alias_collides_with_names_and_aliases() {
        let registry = PluginRegistry::new();
        registry
            .register_with(TestPlugin::named("alpha"), vec!["al".into()], Map::new())
            .unwrap();

        // Alias colliding with an existing name.
        let err = registry
            .register_with(TestPlugin::named("beta"), vec!["alpha".into()], Map::new())
            .unwrap_err();
        assert!(matches!(err, PluginError::DuplicateAlias(a) if a == "alpha"));

        // Alias colliding with an existing alias.
        let err = registry
            .register_with(TestPlugin::named("gamma"), vec!["al".into()], Map::new())
            .unwrap_err();
        assert!(matches!(err, PluginError::DuplicateAlias(a) if a == "al"));

        // Name colliding with an existing alias.
        let err = registry.register(TestPlugin::named("al")).unwrap_err();
        assert!(matches!(err, PluginError::DuplicateName(n) if n == "al"));
    }

    #[test]
    fn malformed_names_are_rejected() {
        let registry = PluginRegistry::new();
        let err = registry.register(TestPlugin::named("bad name")).unwrap_err();
        assert!(matches!(err, PluginError::InvalidName(_)));

        let err = registry
            .register_with(
                TestPlugin::named("fine"),
                vec!["../evil".into()],
                Map::new(),
            )
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidName(_)));
    }

    #[test]
    fn alias_lookup_and_idempotent_deregister() {
        let registry = PluginRegistry::new();
        registry
            .register_with(TestPlugin::named("alpha"), vec!["al".into()], Map::new())
            .unwrap();

        assert!(registry.has("al"));
        assert_eq!(registry.get("al").unwrap().name(), "alpha");

        assert!(registry.deregister("al"));
        assert!(!registry.has("alpha"));
        assert!(matches!(
            registry.get("alpha").unwrap_err(),
            PluginError::NotFound(_)
        ));

        // Deregistering again is a no-op.
        assert!(!registry.deregister("al"));
        assert!(!registry.deregister("alpha"));
    }

    #[test]
    fn names_keep_registration_order() {
        let registry = PluginRegistry::new();
        registry.register(TestPlugin::named("charlie")).unwrap();
        registry.register(TestPlugin::named("alpha")).unwrap();
        registry.register(TestPlugin::named("bravo")).unwrap();
        assert_eq!(registry.names(), vec!["charlie", "alpha", "bravo"]);
    }

    #[test]
    fn meta_round_trips() {
        let registry = PluginRegistry::new();
        let mut meta = Map::new();
        meta.insert("version".into(), Value::String("1.0.0".into()));
        registry
            .register_with(TestPlugin::named("alpha"), Vec::new(), meta)
            .unwrap();

        let got = registry.meta("alpha");
        assert_eq!(got.get("version").unwrap(), "1.0.0");
        assert!(registry.meta("missing").is_empty());
    }

    #[tokio::test]
    async fn unknown_hook_differs_from_no_implementers() {
        let registry = PluginRegistry::new();
        let container = ServiceContainer::new();

        let err = registry
            .call_hook("reboot", &Value::Null, &container)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::HookNotFound(_)));

        // Known hook, nobody implements it.
        let results = registry
            .call_hook("shutdown", &Value::Null, &container)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn hooks_dispatch_in_registration_order() {
        let registry = PluginRegistry::new();
        registry.register(TestPlugin::named("second")).unwrap();
        registry.register(TestPlugin::named("first")).unwrap();

        let container = ServiceContainer::new();
        let results = registry
            .call_hook("pre_execute", &serde_json::json!({"command": "x"}), &container)
            .await
            .unwrap();

        assert_eq!(
            results,
            vec![
                serde_json::json!({"seen_by": "second"}),
                serde_json::json!({"seen_by": "first"}),
            ]
        );
    }

    #[tokio::test]
    async fn health_replies_surface_as_booleans() {
        let registry = PluginRegistry::new();
        registry.register(TestPlugin::named("ok")).unwrap();
        registry
            .register(Arc::new(TestPlugin {
                name: "sick".into(),
                healthy: false,
                calls: Mutex::new(Vec::new()),
            }))
            .unwrap();

        let container = ServiceContainer::new();
        let results = registry
            .call_hook("health", &Value::Null, &container)
            .await
            .unwrap();
        assert_eq!(results, vec![Value::Bool(true), Value::Bool(false)]);
    }

    #[test]
    fn registry_changes_are_reported() {
        let sink = Arc::new(RecordingSink::new());
        let registry = PluginRegistry::with_sink(sink.clone());

        registry.register(TestPlugin::named("alpha")).unwrap();
        registry.deregister("alpha");
        registry.deregister("alpha");

        assert_eq!(
            sink.event_names(),
            vec!["registry_registered", "registry_deregistered"]
        );
        assert_eq!(sink.events()[0].field_str("plugin"), Some("alpha"));
    }
}
