//! Hook extension points.
//!
//! The host exposes a fixed set of named extension points. Each point has
//! its own trait; a plugin opts in by populating the matching slot of its
//! [`HookSurface`]. All hooks are async and are awaited sequentially in
//! registration order during dispatch.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use trellis_di::ServiceContainer;

use crate::error::{PluginError, PluginResult};

/// The named extension points a plugin may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Invoked after registration, with the service container.
    Startup,
    /// Invoked at host teardown.
    Shutdown,
    /// Invoked before a host command executes.
    PreExecute,
    /// Invoked after a host command executes.
    PostExecute,
    /// Invoked by `plugins check`; must answer with a boolean.
    Health,
}

impl HookKind {
    /// All known hook kinds.
    pub const ALL: [Self; 5] = [
        Self::Startup,
        Self::Shutdown,
        Self::PreExecute,
        Self::PostExecute,
        Self::Health,
    ];

    /// Wire name of this hook (`startup`, `pre_execute`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::PreExecute => "pre_execute",
            Self::PostExecute => "post_execute",
            Self::Health => "health",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookKind {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startup" => Ok(Self::Startup),
            "shutdown" => Ok(Self::Shutdown),
            "pre_execute" => Ok(Self::PreExecute),
            "post_execute" => Ok(Self::PostExecute),
            "health" => Ok(Self::Health),
            other => Err(PluginError::HookNotFound(other.to_string())),
        }
    }
}

/// Startup extension point.
#[async_trait]
pub trait StartupHook: Send + Sync {
    /// Run the plugin's startup logic. Receives the host's service
    /// container so the plugin can resolve host services.
    async fn on_startup(&self, container: &ServiceContainer) -> PluginResult<Option<Value>>;
}

/// Shutdown extension point.
#[async_trait]
pub trait ShutdownHook: Send + Sync {
    /// Run the plugin's teardown logic.
    async fn on_shutdown(&self) -> PluginResult<Option<Value>>;
}

/// Pre-execution extension point.
#[async_trait]
pub trait PreExecuteHook: Send + Sync {
    /// Observe or annotate a command about to run.
    async fn on_pre_execute(&self, payload: &Value) -> PluginResult<Option<Value>>;
}

/// Post-execution extension point.
#[async_trait]
pub trait PostExecuteHook: Send + Sync {
    /// Observe the outcome of a command that just ran.
    async fn on_post_execute(&self, payload: &Value) -> PluginResult<Option<Value>>;
}

/// Health extension point.
#[async_trait]
pub trait HealthHook: Send + Sync {
    /// Report whether the plugin is healthy.
    async fn on_health(&self) -> PluginResult<bool>;
}

/// The set of hooks a plugin implements.
///
/// Every slot is optional; an empty surface is a plugin that implements
/// no extension points.
#[derive(Default, Clone)]
pub struct HookSurface {
    /// Startup implementer, if any.
    pub startup: Option<Arc<dyn StartupHook>>,
    /// Shutdown implementer, if any.
    pub shutdown: Option<Arc<dyn ShutdownHook>>,
    /// Pre-execute implementer, if any.
    pub pre_execute: Option<Arc<dyn PreExecuteHook>>,
    /// Post-execute implementer, if any.
    pub post_execute: Option<Arc<dyn PostExecuteHook>>,
    /// Health implementer, if any.
    pub health: Option<Arc<dyn HealthHook>>,
}

impl HookSurface {
    /// An empty surface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the surface implements the given hook.
    #[must_use]
    pub fn implements(&self, kind: HookKind) -> bool {
        match kind {
            HookKind::Startup => self.startup.is_some(),
            HookKind::Shutdown => self.shutdown.is_some(),
            HookKind::PreExecute => self.pre_execute.is_some(),
            HookKind::PostExecute => self.post_execute.is_some(),
            HookKind::Health => self.health.is_some(),
        }
    }

    /// Kinds this surface implements, in declaration order.
    #[must_use]
    pub fn kinds(&self) -> Vec<HookKind> {
        HookKind::ALL
            .into_iter()
            .filter(|k| self.implements(*k))
            .collect()
    }
}

impl fmt::Debug for HookSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSurface")
            .field("hooks", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_names_round_trip() {
        for kind in HookKind::ALL {
            assert_eq!(kind.as_str().parse::<HookKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_hook_name_is_rejected() {
        let err = "restart".parse::<HookKind>().unwrap_err();
        assert!(matches!(err, PluginError::HookNotFound(name) if name == "restart"));
    }

    #[test]
    fn empty_surface_implements_nothing() {
        let surface = HookSurface::new();
        for kind in HookKind::ALL {
            assert!(!surface.implements(kind));
        }
        assert!(surface.kinds().is_empty());
    }

    #[test]
    fn surface_reports_populated_slots() {
        struct AlwaysHealthy;

        #[async_trait]
        impl HealthHook for AlwaysHealthy {
            async fn on_health(&self) -> PluginResult<bool> {
                Ok(true)
            }
        }

        let surface = HookSurface {
            health: Some(Arc::new(AlwaysHealthy)),
            ..HookSurface::default()
        };
        assert!(surface.implements(HookKind::Health));
        assert_eq!(surface.kinds(), vec![HookKind::Health]);
    }
}
