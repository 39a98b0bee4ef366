//! Steppable components wrapped with their own context and hooks.
//!
//! A [`Module`] pairs a registered component with the [`ContextScope`] its
//! steps run in and the [`HookChain`] wrapped around its step. Each call to
//! [`Module::step`] runs in a fresh child scope, so bindings the step or its
//! hooks make do not leak into the next step.
//!
//! The module's root scope is seeded with its identity (`module_id`,
//! `module_type`, `module_class`); [`Module::bind_episode`] adds the
//! episode, timestep and trial before a step so state written during it can
//! be attributed.
//!
//! Modules compose into a tree. [`Module::add_module`] attaches a shared
//! child under a name, and [`Module::named_modules`] walks the tree
//! depth-first, naming each module by its dotted path from the root:
//!
//! ```text
//! ""                  world
//! "sensors"           ├── sensors
//! "sensors.thermo"    │   └── thermo
//! "clock"             └── clock
//! ```
//!
//! A module reachable under more than one path is yielded once, under the
//! first path the walk finds.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use synk_types::{ModuleId, Value, keys};

use crate::context::ContextScope;
use crate::episode::EpisodeState;
use crate::hooks::{BoxError, HookChain, HookError};
use crate::registry::{Component, ComponentRegistry, RegistryError, canonical_name};

/// A component with a step operation.
pub trait Steppable: Component {
    /// Advance the component by one step.
    ///
    /// `scope` is the child scope of the current step; `args` is the
    /// argument list after every pre-hook has run.
    fn step(&self, scope: &mut ContextScope, args: &[Value]) -> Result<Value, BoxError>;
}

/// Errors raised while composing modules.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// A child name is unusable as a path segment.
    #[error("invalid module name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Object-safe view of a module as a node in a module tree.
pub trait ModuleNode: Send + Sync {
    /// Unique id of this module instance.
    fn module_id(&self) -> ModuleId;

    /// Canonical component name.
    fn name(&self) -> &str;

    /// Directly attached children, in insertion order.
    fn children(&self) -> &IndexMap<String, Arc<dyn ModuleNode>>;
}

impl fmt::Debug for dyn ModuleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleNode")
            .field("name", &self.name())
            .field("module_id", &self.module_id())
            .field("children", &self.children().len())
            .finish()
    }
}

/// Every module reachable from `root`, depth-first with `root` first,
/// paired with its dotted path. `root` itself has the empty path.
pub fn named_modules(root: &dyn ModuleNode) -> Vec<(String, &dyn ModuleNode)> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    walk(root, "", &mut seen, &mut out);
    out
}

fn walk<'a>(
    node: &'a dyn ModuleNode,
    path: &str,
    seen: &mut HashSet<ModuleId>,
    out: &mut Vec<(String, &'a dyn ModuleNode)>,
) {
    if !seen.insert(node.module_id()) {
        return;
    }
    out.push((path.to_owned(), node));
    for (name, child) in node.children() {
        let child_path = if path.is_empty() {
            name.clone()
        } else {
            format!("{path}.{name}")
        };
        walk(&**child, &child_path, seen, out);
    }
}

/// A steppable component with its context and hook chain.
#[derive(Debug)]
pub struct Module<C> {
    component: Arc<C>,
    module_id: ModuleId,
    name: String,
    scope: ContextScope,
    hooks: HookChain,
    children: IndexMap<String, Arc<dyn ModuleNode>>,
}

impl<C: Steppable> Module<C> {
    /// Wrap an already-constructed component handle.
    pub fn new(component: Arc<C>) -> Self {
        let module_id = ModuleId::new();
        let name = canonical_name(component.kind());
        let mut scope = ContextScope::new();
        scope.set(keys::MODULE_ID, module_id.to_string());
        scope.set(keys::MODULE_TYPE, name.as_str());
        scope.set(keys::MODULE_CLASS, component.type_tag());
        Self {
            component,
            module_id,
            name,
            scope,
            hooks: HookChain::new(),
            children: IndexMap::new(),
        }
    }

    /// Construct `component`, register it in `registry` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the component's key is taken.
    pub fn create(registry: &ComponentRegistry, component: C) -> Result<Self, RegistryError> {
        let handle = registry.create(component)?;
        Ok(Self::new(handle))
    }

    /// The wrapped component.
    pub const fn component(&self) -> &Arc<C> {
        &self.component
    }

    /// Unique id of this module instance.
    pub const fn module_id(&self) -> ModuleId {
        self.module_id
    }

    /// Canonical component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module's root scope.
    pub const fn scope(&self) -> &ContextScope {
        &self.scope
    }

    /// Mutable access to the module's root scope.
    pub const fn scope_mut(&mut self) -> &mut ContextScope {
        &mut self.scope
    }

    /// The hooks wrapped around [`step`](Self::step).
    pub const fn hooks(&self) -> &HookChain {
        &self.hooks
    }

    /// Mutable access to the hook chain, for registering hooks.
    pub const fn hooks_mut(&mut self) -> &mut HookChain {
        &mut self.hooks
    }

    /// Attach `child` under `name`, replacing any child already there.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::InvalidName`] if `name` is empty or contains
    /// a `.`.
    pub fn add_module(
        &mut self,
        name: impl Into<String>,
        child: Arc<dyn ModuleNode>,
    ) -> Result<(), ModuleError> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name.contains('.') {
            Some("name contains '.'")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(ModuleError::InvalidName { name, reason });
        }
        tracing::debug!(parent = %self.name, child = %name, child_type = child.name(), "Module attached");
        self.children.insert(name, child);
        Ok(())
    }

    /// The child attached under `name`.
    pub fn child(&self, name: &str) -> Option<&Arc<dyn ModuleNode>> {
        self.children.get(name)
    }

    /// Direct children with their names. A child attached under several
    /// names is yielded once, under the first.
    pub fn named_children(&self) -> impl Iterator<Item = (&str, &Arc<dyn ModuleNode>)> {
        let mut seen = HashSet::new();
        self.children
            .iter()
            .filter(move |(_, child)| seen.insert(child.module_id()))
            .map(|(name, child)| (name.as_str(), child))
    }

    /// This module and every module below it. See [`named_modules`].
    pub fn named_modules(&self) -> Vec<(String, &dyn ModuleNode)> {
        named_modules(self)
    }

    /// Bind the episode, timestep and trial of `state` in the root scope.
    pub fn bind_episode(&mut self, state: &EpisodeState) {
        self.scope.set(keys::EPISODE, state.episode.to_string());
        self.scope.set(keys::TIMESTEP, state.timestep);
        self.scope.set(keys::TRIAL, state.trial);
    }

    /// Run one step of the component through the hook chain, inside a
    /// child scope that is discarded afterwards.
    ///
    /// # Errors
    ///
    /// Returns whatever [`HookChain::invoke`] returns.
    pub fn step(&mut self, args: Vec<Value>) -> Result<Value, HookError> {
        let Self {
            component,
            scope,
            hooks,
            name,
            ..
        } = self;
        let mut child = scope.enter_child();
        let result = hooks.invoke(&mut child, |scope, args| component.step(scope, args), args);
        if let Err(err) = &result {
            tracing::warn!(module = %name, error = %err, "Module step failed");
        }
        result
    }
}

impl<C: Steppable> ModuleNode for Module<C> {
    fn module_id(&self) -> ModuleId {
        self.module_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn children(&self) -> &IndexMap<String, Arc<dyn ModuleNode>> {
        &self.children
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use serde_json::json;
    use synk_types::EpisodeId;

    use super::*;
    use crate::hooks::HookOutput;
    use crate::registry::RESOURCE;

    #[derive(Debug, Default)]
    struct Accumulator {
        total: AtomicU64,
    }

    impl Component for Accumulator {
        fn type_tag(&self) -> &'static str {
            RESOURCE
        }
    }

    impl Steppable for Accumulator {
        fn step(&self, scope: &mut ContextScope, args: &[Value]) -> Result<Value, BoxError> {
            let amount = args.first().and_then(Value::as_u64).ok_or("missing amount")?;
            scope.set("last_amount", amount);
            let total = self.total.fetch_add(amount, Ordering::SeqCst).saturating_add(amount);
            Ok(json!(total))
        }
    }

    #[test]
    fn identity_bindings_are_seeded() {
        let module = Module::new(Arc::new(Accumulator::default()));
        let snap = module.scope().snapshot();
        assert_eq!(snap.get(keys::MODULE_TYPE), Some(&json!("accumulator")));
        assert_eq!(snap.get(keys::MODULE_CLASS), Some(&json!("resource")));
        assert_eq!(
            snap.get(keys::MODULE_ID),
            Some(&json!(module.module_id().to_string()))
        );
        assert_eq!(module.name(), "accumulator");
    }

    #[test]
    fn step_runs_through_hooks() {
        let mut module = Module::new(Arc::new(Accumulator::default()));
        module
            .hooks_mut()
            .register_pre("triple", |_, args| {
                let n = args.first().and_then(Value::as_u64).unwrap_or_default();
                Ok(HookOutput::Single(json!(n.saturating_mul(3))))
            });

        assert_eq!(module.step(vec![json!(2)]).unwrap(), json!(6));
        assert_eq!(module.step(vec![json!(1)]).unwrap(), json!(9));
    }

    #[test]
    fn step_bindings_do_not_leak() {
        let mut module = Module::new(Arc::new(Accumulator::default()));
        module.step(vec![json!(4)]).unwrap();
        assert!(!module.scope().contains("last_amount"));
        assert_eq!(module.scope().depth(), 0);
    }

    #[test]
    fn bind_episode_makes_metadata_available() {
        let mut module = Module::new(Arc::new(Accumulator::default()));
        let state = EpisodeState {
            trial: 2,
            timestep: 11,
            episode: EpisodeId::new(),
        };
        module.bind_episode(&state);
        module.hooks_mut().register_post("meta", |scope, result, _| {
            let meta = scope.snapshot().metadata()?;
            Ok(json!({ "timestep": meta.timestep, "value": result }))
        });

        let out = module.step(vec![json!(1)]).unwrap();
        assert_eq!(out, json!({ "timestep": 11, "value": 1 }));
        assert_eq!(module.scope().get(keys::TRIAL).unwrap(), &json!(2));
    }

    #[test]
    fn failed_step_surfaces_as_step_error() {
        let mut module = Module::new(Arc::new(Accumulator::default()));
        assert!(matches!(
            module.step(vec![]),
            Err(HookError::Step { .. })
        ));
        assert_eq!(module.scope().depth(), 0);
    }

    #[test]
    fn create_registers_component() {
        let registry = ComponentRegistry::new();
        let module = Module::create(&registry, Accumulator::default()).unwrap();
        let found = registry
            .get_as::<Accumulator>(RESOURCE, "accumulator")
            .unwrap();
        assert!(Arc::ptr_eq(&found, module.component()));
        assert!(matches!(
            Module::create(&registry, Accumulator::default()),
            Err(RegistryError::Duplicate { .. })
        ));
    }

    #[derive(Debug)]
    struct Thermometer;

    impl Component for Thermometer {
        fn type_tag(&self) -> &'static str {
            RESOURCE
        }
    }

    impl Steppable for Thermometer {
        fn step(&self, _scope: &mut ContextScope, _args: &[Value]) -> Result<Value, BoxError> {
            Ok(json!(21.5))
        }
    }

    fn paths(module: &Module<Accumulator>) -> Vec<String> {
        module
            .named_modules()
            .into_iter()
            .map(|(path, _)| path)
            .collect()
    }

    #[test]
    fn named_modules_use_dotted_paths() {
        let mut sensors = Module::new(Arc::new(Accumulator::default()));
        sensors
            .add_module("thermo", Arc::new(Module::new(Arc::new(Thermometer))))
            .unwrap();

        let mut world = Module::new(Arc::new(Accumulator::default()));
        world.add_module("sensors", Arc::new(sensors)).unwrap();
        world
            .add_module("clock", Arc::new(Module::new(Arc::new(Thermometer))))
            .unwrap();

        assert_eq!(paths(&world), ["", "sensors", "sensors.thermo", "clock"]);
        let named = world.named_modules();
        assert_eq!(named.first().unwrap().1.module_id(), world.module_id());
        assert_eq!(named.get(2).unwrap().1.name(), "thermometer");
    }

    #[test]
    fn shared_module_is_yielded_once() {
        let thermo: Arc<dyn ModuleNode> = Arc::new(Module::new(Arc::new(Thermometer)));
        let mut world = Module::new(Arc::new(Accumulator::default()));
        world.add_module("indoor", Arc::clone(&thermo)).unwrap();
        world.add_module("outdoor", Arc::clone(&thermo)).unwrap();

        assert_eq!(paths(&world), ["", "indoor"]);
        let children: Vec<_> = world.named_children().map(|(name, _)| name).collect();
        assert_eq!(children, ["indoor"]);
        assert!(world.child("outdoor").is_some());
    }

    #[test]
    fn readding_a_name_replaces_the_child() {
        let first: Arc<dyn ModuleNode> = Arc::new(Module::new(Arc::new(Thermometer)));
        let second: Arc<dyn ModuleNode> = Arc::new(Module::new(Arc::new(Thermometer)));
        let mut world = Module::new(Arc::new(Accumulator::default()));
        world.add_module("thermo", Arc::clone(&first)).unwrap();
        world.add_module("thermo", Arc::clone(&second)).unwrap();

        assert_eq!(world.children().len(), 1);
        assert_eq!(
            world.child("thermo").unwrap().module_id(),
            second.module_id()
        );
    }

    #[test]
    fn invalid_child_names_are_rejected() {
        let mut world = Module::new(Arc::new(Accumulator::default()));
        for bad in ["", "sensors.thermo"] {
            let err = world
                .add_module(bad, Arc::new(Module::new(Arc::new(Thermometer))))
                .unwrap_err();
            assert!(matches!(err, ModuleError::InvalidName { ref name, .. } if name == bad));
        }
        assert!(world.named_children().next().is_none());
        assert_eq!(paths(&world), [""]);
    }
}
