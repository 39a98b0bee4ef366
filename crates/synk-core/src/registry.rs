//! Process-wide component registry.
//!
//! Components (resources, agents, data modules) register themselves at
//! construction so that loosely-coupled parts of a simulation can find one
//! another by `(type_tag, name)`.
//!
//! # Ownership model
//!
//! The registry keeps two maps behind one lock:
//!
//! - a **holder** map `(type_tag, name) -> Arc<dyn Component>` that owns
//!   each registered component, and
//! - a **lookup** index `type_tag -> name -> Weak<dyn Component>` used for
//!   enumeration.
//!
//! A lookup entry is only ever reported while its holder entry exists.
//! Removal is explicit: a component stays reachable until
//! [`ComponentRegistry::unregister`] is called, regardless of how many
//! other handles to it are alive.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use heck::ToSnakeCase;
use synk_types::ComponentKey;

/// Type tag conventionally used for shared simulation resources.
pub const RESOURCE: &str = "resource";

/// Type tag conventionally used for agents.
pub const AGENT: &str = "agent";

/// Errors raised by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No live component is registered under the key.
    #[error("component not found: {key}")]
    NotFound {
        /// The key that was looked up.
        key: ComponentKey,
    },

    /// A different component instance already holds the key.
    #[error("duplicate registration: {key} is held by another instance")]
    Duplicate {
        /// The contested key.
        key: ComponentKey,
    },

    /// The component exists but is not of the requested concrete type.
    #[error("component {key} is not a {expected}")]
    TypeMismatch {
        /// The key that was looked up.
        key: ComponentKey,
        /// Name of the requested type.
        expected: &'static str,
    },
}

/// Upcast helper so registered trait objects can be downcast to their
/// concrete type. Implemented for every sized `Send + Sync` type.
pub trait AsAnyArc {
    /// Convert an `Arc<Self>` into an `Arc<dyn Any>`.
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAnyArc for T {
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A registrable unit of simulation behavior or state.
pub trait Component: AsAnyArc + Send + Sync + 'static {
    /// Role of the component, e.g. [`RESOURCE`] or [`AGENT`].
    fn type_tag(&self) -> &'static str;

    /// Fully qualified name of the concrete type. The registry derives the
    /// canonical component name from its last path segment.
    fn kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Canonical registry name for a concrete type name.
///
/// Module path and generic arguments are dropped and the remainder is
/// converted to `snake_case`: `my_sim::WorldClock<u8>` becomes `world_clock`.
pub fn canonical_name(kind: &str) -> String {
    let base = kind.split('<').next().unwrap_or(kind);
    let last = base.rsplit("::").next().unwrap_or(base);
    last.to_snake_case()
}

#[derive(Default)]
struct RegistryState {
    holders: HashMap<ComponentKey, Arc<dyn Component>>,
    lookup: BTreeMap<String, BTreeMap<String, Weak<dyn Component>>>,
}

/// Registry of live components keyed by `(type_tag, name)`.
///
/// All operations take a single internal lock; contention is expected to
/// be low. Use [`global`] for the process-wide instance, or construct a
/// private registry for isolated tests.
#[derive(Default)]
pub struct ComponentRegistry {
    state: RwLock<RegistryState>,
}

impl core::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.read();
        let mut keys: Vec<_> = state.holders.keys().map(ToString::to_string).collect();
        keys.sort();
        f.debug_struct("ComponentRegistry")
            .field("components", &keys)
            .finish()
    }
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation is a paired insert/remove on the two maps under one
    // write guard, so a poisoned lock cannot expose a half-updated state.
    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `component` under `type_tag` and its canonical name.
    ///
    /// Re-registering the same instance is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if a different instance already
    /// holds the key.
    pub fn register(
        &self,
        component: Arc<dyn Component>,
        type_tag: &str,
    ) -> Result<ComponentKey, RegistryError> {
        let key = ComponentKey::new(type_tag, canonical_name(component.kind()));
        let mut state = self.write();

        if let Some(existing) = state.holders.get(&key) {
            if Arc::ptr_eq(existing, &component) {
                return Ok(key);
            }
            return Err(RegistryError::Duplicate { key });
        }

        state
            .lookup
            .entry(key.type_tag.clone())
            .or_default()
            .insert(key.name.clone(), Arc::downgrade(&component));
        state.holders.insert(key.clone(), component);
        tracing::debug!(%key, "Component registered");
        Ok(key)
    }

    /// Construct-and-register in one step: wraps `component` in an [`Arc`],
    /// registers it under its own [`Component::type_tag`] and returns the
    /// typed handle.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the key is already taken.
    pub fn create<T: Component>(&self, component: T) -> Result<Arc<T>, RegistryError> {
        let handle = Arc::new(component);
        let type_tag = handle.type_tag();
        self.register(Arc::clone(&handle) as Arc<dyn Component>, type_tag)?;
        Ok(handle)
    }

    /// Remove the component at `(type_tag, name)` from both maps.
    ///
    /// Returns whether a component was removed; removing an absent entry is
    /// a no-op.
    pub fn unregister(&self, type_tag: &str, name: &str) -> bool {
        let key = ComponentKey::new(type_tag, name);
        let mut state = self.write();
        let removed = state.holders.remove(&key).is_some();

        let now_empty = state.lookup.get_mut(type_tag).is_some_and(|names| {
            names.remove(name);
            names.is_empty()
        });
        if now_empty {
            state.lookup.remove(type_tag);
        }

        if removed {
            tracing::debug!(%key, "Component unregistered");
        }
        removed
    }

    /// Look up the live component at `(type_tag, name)`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if nothing is registered there.
    pub fn get(&self, type_tag: &str, name: &str) -> Result<Arc<dyn Component>, RegistryError> {
        let key = ComponentKey::new(type_tag, name);
        let state = self.read();
        state
            .holders
            .get(&key)
            .cloned()
            .ok_or(RegistryError::NotFound { key })
    }

    /// Look up a component and downcast it to its concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if nothing is registered there,
    /// or [`RegistryError::TypeMismatch`] if it is a different type.
    pub fn get_as<T: Component>(&self, type_tag: &str, name: &str) -> Result<Arc<T>, RegistryError> {
        let component = self.get(type_tag, name)?;
        component
            .into_any_arc()
            .downcast::<T>()
            .map_err(|_any| RegistryError::TypeMismatch {
                key: ComponentKey::new(type_tag, name),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Snapshot of the live components tagged `type_tag`, ordered by name.
    ///
    /// The lookup index is copied first and each entry is then checked
    /// against the holder map, so an entry whose holder is gone is never
    /// returned.
    pub fn list(&self, type_tag: &str) -> Vec<Arc<dyn Component>> {
        let state = self.read();
        let Some(names) = state.lookup.get(type_tag) else {
            return Vec::new();
        };
        let snapshot: Vec<(String, Weak<dyn Component>)> = names
            .iter()
            .map(|(name, weak)| (name.clone(), Weak::clone(weak)))
            .collect();

        snapshot
            .into_iter()
            .filter(|(name, _)| {
                state
                    .holders
                    .contains_key(&ComponentKey::new(type_tag, name.as_str()))
            })
            .filter_map(|(_, weak)| weak.upgrade())
            .collect()
    }

    /// Keys of every registered component, sorted.
    pub fn keys(&self) -> Vec<ComponentKey> {
        let mut keys: Vec<_> = self.read().holders.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Shorthand for `list(RESOURCE)`.
    pub fn resources(&self) -> Vec<Arc<dyn Component>> {
        self.list(RESOURCE)
    }

    /// Number of registered components.
    pub fn len(&self) -> usize {
        self.read().holders.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.read().holders.is_empty()
    }
}

static GLOBAL: LazyLock<ComponentRegistry> = LazyLock::new(ComponentRegistry::new);

/// The process-wide registry shared by every subsystem.
pub fn global() -> &'static ComponentRegistry {
    &GLOBAL
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Clock;

    impl Component for Clock {
        fn type_tag(&self) -> &'static str {
            RESOURCE
        }
    }

    #[derive(Debug)]
    struct WeatherStation {
        readings: u32,
    }

    impl Component for WeatherStation {
        fn type_tag(&self) -> &'static str {
            RESOURCE
        }
    }

    #[derive(Debug)]
    struct Forager;

    impl Component for Forager {
        fn type_tag(&self) -> &'static str {
            AGENT
        }
    }

    #[test]
    fn canonical_name_strips_path_and_generics() {
        assert_eq!(canonical_name("my_sim::world::WorldClock"), "world_clock");
        assert_eq!(canonical_name("Ledger<u64>"), "ledger");
        assert_eq!(canonical_name("a::HTTPBackend<b::C>"), "http_backend");
    }

    #[test]
    fn register_then_get_returns_same_instance() {
        let registry = ComponentRegistry::new();
        let clock: Arc<dyn Component> = Arc::new(Clock);
        let key = registry.register(Arc::clone(&clock), RESOURCE).unwrap();
        assert_eq!(key, ComponentKey::new("resource", "clock"));

        let found = registry.get("resource", "clock").unwrap();
        assert!(Arc::ptr_eq(&found, &clock));
    }

    #[test]
    fn reregistering_same_instance_is_noop() {
        let registry = ComponentRegistry::new();
        let clock: Arc<dyn Component> = Arc::new(Clock);
        registry.register(Arc::clone(&clock), RESOURCE).unwrap();
        registry.register(Arc::clone(&clock), RESOURCE).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn different_instance_same_name_is_duplicate() {
        let registry = ComponentRegistry::new();
        registry.create(Clock).unwrap();
        let err = registry.create(Clock).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate { .. }));
    }

    #[test]
    fn same_name_under_other_tag_is_independent() {
        let registry = ComponentRegistry::new();
        registry.register(Arc::new(Clock), RESOURCE).unwrap();
        registry.register(Arc::new(Clock), "data").unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list("data").len(), 1);
    }

    #[test]
    fn unregister_hides_component() {
        let registry = ComponentRegistry::new();
        let _clock = registry.create(Clock).unwrap();
        assert_eq!(registry.list(RESOURCE).len(), 1);

        assert!(registry.unregister(RESOURCE, "clock"));
        assert!(registry.list(RESOURCE).is_empty());
        assert!(matches!(
            registry.get(RESOURCE, "clock"),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn unregister_absent_is_noop() {
        let registry = ComponentRegistry::new();
        assert!(!registry.unregister(RESOURCE, "clock"));
        assert!(!registry.unregister("nothing", "here"));
    }

    #[test]
    fn outstanding_handles_do_not_keep_entry_listed() {
        let registry = ComponentRegistry::new();
        let handle = registry.create(Clock).unwrap();
        registry.unregister(RESOURCE, "clock");
        // The caller still owns the component, but the registry forgot it.
        assert_eq!(Arc::strong_count(&handle), 1);
        assert!(registry.list(RESOURCE).is_empty());
    }

    #[test]
    fn list_is_sorted_and_tag_scoped() {
        let registry = ComponentRegistry::new();
        registry.create(WeatherStation { readings: 0 }).unwrap();
        registry.create(Clock).unwrap();
        registry.create(Forager).unwrap();

        let names: Vec<_> = registry
            .list(RESOURCE)
            .iter()
            .map(|c| canonical_name(c.kind()))
            .collect();
        assert_eq!(names, vec!["clock", "weather_station"]);
        assert_eq!(registry.list(AGENT).len(), 1);
        assert_eq!(registry.resources().len(), 2);
        assert!(registry.list("unknown").is_empty());
    }

    #[test]
    fn get_as_downcasts() {
        let registry = ComponentRegistry::new();
        registry.create(WeatherStation { readings: 4 }).unwrap();
        let station: Arc<WeatherStation> = registry.get_as(RESOURCE, "weather_station").unwrap();
        assert_eq!(station.readings, 4);

        let wrong = registry.get_as::<Clock>(RESOURCE, "weather_station");
        assert!(matches!(wrong, Err(RegistryError::TypeMismatch { .. })));
    }

    #[test]
    fn keys_are_sorted() {
        let registry = ComponentRegistry::new();
        registry.create(Forager).unwrap();
        registry.create(Clock).unwrap();
        let keys = registry.keys();
        assert_eq!(
            keys,
            vec![
                ComponentKey::new("agent", "forager"),
                ComponentKey::new("resource", "clock"),
            ]
        );
    }

    #[test]
    fn global_registry_is_shared() {
        assert!(std::ptr::eq(global(), global()));
    }
}
