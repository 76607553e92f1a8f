//! Type-keyed service container.
//!
//! The host wires its services (registry, telemetry, loader, installer)
//! through a [`ServiceContainer`] instead of threading each one through
//! every call site. Services are keyed by their Rust type, so a lookup is
//! `container.resolve::<dyn TelemetrySink>()` rather than a stringly-typed
//! map. Trait-object services are supported directly: register an
//! `Arc<dyn Trait>` under the trait type.
//!
//! Registration is last-write-wins. Factories receive the container, may
//! resolve their own dependencies from it, and run at most once per
//! registration; the constructed instance is cached.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::debug;

/// Errors raised by service resolution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiError {
    /// No service or factory is registered under the requested type.
    #[error("no service registered for type {type_name}")]
    ResolutionFailed {
        /// Name of the requested type.
        type_name: &'static str,
    },
}

/// Result alias for container operations.
pub type DiResult<T> = Result<T, DiError>;

type BoxedService = Box<dyn Any + Send + Sync>;
type SharedFactory = Arc<dyn Fn(&ServiceContainer) -> BoxedService + Send + Sync>;

enum Slot {
    Instance(BoxedService),
    Factory(SharedFactory),
}

/// Thread-safe, type-keyed service container.
///
/// Stores `Arc<T>` handles keyed by `TypeId::of::<T>()`. `T` may be a
/// trait object (`dyn Trait + Send + Sync`). Share the container itself
/// behind an `Arc`.
#[derive(Default)]
pub struct ServiceContainer {
    slots: RwLock<HashMap<TypeId, Slot>>,
}

impl ServiceContainer {
    /// Create an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service instance under its type.
    ///
    /// Replaces any existing instance or factory for the same type.
    pub fn register_service<T>(&self, service: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        debug!(service = type_name::<T>(), "Registered service");
        self.insert(TypeId::of::<T>(), Slot::Instance(Box::new(service)));
    }

    /// Register a factory invoked lazily on first resolution.
    ///
    /// The factory receives the container and may resolve its own
    /// dependencies from it. The constructed instance is cached, so the
    /// factory runs at most once. Replaces any existing instance or
    /// factory for the same type.
    pub fn register_factory<T, F>(&self, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceContainer) -> Arc<T> + Send + Sync + 'static,
    {
        debug!(service = type_name::<T>(), "Registered service factory");
        let factory: SharedFactory = Arc::new(move |container| Box::new(factory(container)));
        self.insert(TypeId::of::<T>(), Slot::Factory(factory));
    }

    /// Resolve a service, constructing it from its factory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DiError::ResolutionFailed`] if nothing is registered under
    /// the requested type.
    pub fn resolve<T>(&self) -> DiResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.try_resolve::<T>().ok_or(DiError::ResolutionFailed {
            type_name: type_name::<T>(),
        })
    }

    /// Resolve a service, returning `None` if it is not registered.
    ///
    /// This is the degrade-gracefully path for optional services such as
    /// telemetry; it never errors.
    #[must_use]
    pub fn try_resolve<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = TypeId::of::<T>();
        let factory = {
            let slots = self
                .slots
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            match slots.get(&key) {
                Some(Slot::Instance(boxed)) => {
                    return boxed.downcast_ref::<Arc<T>>().cloned();
                }
                Some(Slot::Factory(factory)) => Arc::clone(factory),
                None => return None,
            }
        };

        // Construct outside the lock so the factory can resolve its own
        // dependencies through this container without deadlocking.
        let built = factory(self);
        let handle = built.downcast_ref::<Arc<T>>().cloned();

        let mut slots = self
            .slots
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match slots.get(&key) {
            // A concurrent resolution already cached an instance; keep it.
            Some(Slot::Instance(boxed)) => boxed.downcast_ref::<Arc<T>>().cloned(),
            _ => {
                slots.insert(key, Slot::Instance(built));
                handle
            }
        }
    }

    /// Whether anything is registered under the given type.
    #[must_use]
    pub fn contains<T>(&self) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.slots
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(&TypeId::of::<T>())
    }

    fn insert(&self, key: TypeId, slot: Slot) {
        self.slots
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key, slot);
    }
}

impl std::fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self
            .slots
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len();
        f.debug_struct("ServiceContainer")
            .field("services", &len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn registers_and_resolves_concrete_type() {
        let container = ServiceContainer::new();
        container.register_service(Arc::new(42_u32));
        assert_eq!(*container.resolve::<u32>().unwrap(), 42);
    }

    #[test]
    fn registers_and_resolves_trait_object() {
        let container = ServiceContainer::new();
        let greeter: Arc<dyn Greeter> = Arc::new(English);
        container.register_service(greeter);
        assert_eq!(container.resolve::<dyn Greeter>().unwrap().greet(), "hello");
    }

    #[test]
    fn missing_service_fails_resolution() {
        let container = ServiceContainer::new();
        assert_eq!(
            container.resolve::<String>().unwrap_err(),
            DiError::ResolutionFailed {
                type_name: type_name::<String>()
            }
        );
        assert!(container.try_resolve::<String>().is_none());
    }

    #[test]
    fn later_registration_wins() {
        let container = ServiceContainer::new();
        container.register_service(Arc::new("first".to_string()));
        container.register_service(Arc::new("second".to_string()));
        assert_eq!(*container.resolve::<String>().unwrap(), "second");
    }

    #[test]
    fn factory_runs_once_and_caches() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let container = ServiceContainer::new();
        container.register_factory(|_| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Arc::new(7_u64)
        });
        assert_eq!(*container.resolve::<u64>().unwrap(), 7);
        assert_eq!(*container.resolve::<u64>().unwrap(), 7);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn factory_can_resolve_its_dependencies() {
        let container = ServiceContainer::new();
        container.register_service(Arc::new(20_u32));
        container.register_factory(|c| {
            let base = c.resolve::<u32>().unwrap_or_else(|_| Arc::new(0));
            Arc::new(u64::from(*base) + 1)
        });
        assert_eq!(*container.resolve::<u64>().unwrap(), 21);
    }

    #[test]
    fn contains_reports_factories_before_construction() {
        let container = ServiceContainer::new();
        container.register_factory(|_| Arc::new(1_i32));
        assert!(container.contains::<i32>());
        assert!(!container.contains::<i64>());
    }
}
