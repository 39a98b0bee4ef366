//! Dynamically-scoped key/value bindings.
//!
//! A [`ContextScope`] is a stack of binding frames. Lookups walk the stack
//! from the innermost frame outwards, so a nested scope sees its parent's
//! bindings unless it shadows them. Entering a child scope pushes a frame;
//! leaving it pops the frame, and nothing the child bound, shadowed or
//! deleted is visible afterwards.
//!
//! Child scopes are entered through [`ContextScope::enter_child`], which
//! returns a guard. The frame is popped when the guard is dropped, so it is
//! popped on every exit path, including early returns and `?`.
//!
//! [`ContextScope::snapshot`] flattens the visible bindings into an
//! immutable [`ContextSnapshot`], from which the persistence [`Metadata`]
//! record is built.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use serde::Serialize;
use synk_types::{Metadata, Value, keys};

/// Binding frame. `None` masks a binding inherited from an outer frame.
type Frame = BTreeMap<String, Option<Value>>;

/// Bindings a [`Metadata`] record cannot be built without.
const REQUIRED_METADATA: [&str; 5] = [
    keys::EPISODE,
    keys::TIMESTEP,
    keys::MODULE_ID,
    keys::MODULE_TYPE,
    keys::MODULE_CLASS,
];

/// Errors raised by context lookups.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// The key has no visible binding.
    #[error("context key not found: {key}")]
    NotFound {
        /// The key that was looked up.
        key: String,
    },

    /// An operation required a binding that is absent.
    #[error("required context binding not set: {key}")]
    NotSet {
        /// The missing binding.
        key: String,
    },

    /// The bindings are present but do not form a valid metadata record.
    #[error("invalid metadata bindings: {0}")]
    InvalidMetadata(#[from] serde_json::Error),
}

/// Stack of binding frames with dynamic (call-extent) visibility.
#[derive(Debug, Clone, Default)]
pub struct ContextScope {
    root: Frame,
    stack: Vec<Frame>,
}

impl ContextScope {
    /// Create a scope with an empty root frame.
    pub fn new() -> Self {
        Self::default()
    }

    fn top_mut(&mut self) -> &mut Frame {
        self.stack.last_mut().unwrap_or(&mut self.root)
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        self.stack
            .iter()
            .rev()
            .chain(std::iter::once(&self.root))
            .find_map(|frame| frame.get(key))
            .and_then(Option::as_ref)
    }

    /// Bind `key` to `value` in the innermost frame.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.top_mut().insert(key.into(), Some(value.into()));
    }

    /// Read the visible binding for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::NotFound`] if `key` has no visible binding.
    pub fn get(&self, key: &str) -> Result<&Value, ContextError> {
        self.lookup(key).ok_or_else(|| ContextError::NotFound {
            key: key.to_owned(),
        })
    }

    /// Like [`get`](Self::get), but reports a missing binding as
    /// [`ContextError::NotSet`] for operations that depend on it.
    pub fn require(&self, key: &str) -> Result<&Value, ContextError> {
        self.lookup(key).ok_or_else(|| ContextError::NotSet {
            key: key.to_owned(),
        })
    }

    /// Whether `key` has a visible binding.
    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Hide `key` for the rest of the current frame's extent.
    ///
    /// A binding inherited from an outer frame reappears once the current
    /// frame exits. Deleting an unbound key is a no-op.
    pub fn delete(&mut self, key: &str) {
        self.top_mut().remove(key);
        if !self.stack.is_empty() && self.contains(key) {
            self.top_mut().insert(key.to_owned(), None);
        }
    }

    /// Number of child frames currently entered.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Push a child frame. It is popped when the returned guard drops.
    pub fn enter_child(&mut self) -> ChildScope<'_> {
        let depth = self.stack.len();
        self.stack.push(Frame::new());
        ChildScope { scope: self, depth }
    }

    /// Run `f` inside a child frame.
    pub fn scoped<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let mut child = self.enter_child();
        f(&mut child)
    }

    /// Materialize every visible binding into an immutable record.
    pub fn snapshot(&self) -> ContextSnapshot {
        let mut bindings = BTreeMap::new();
        for frame in std::iter::once(&self.root).chain(self.stack.iter()) {
            for (key, value) in frame {
                match value {
                    Some(value) => {
                        bindings.insert(key.clone(), value.clone());
                    }
                    None => {
                        bindings.remove(key);
                    }
                }
            }
        }
        ContextSnapshot { bindings }
    }

    /// Emit the visible bindings at debug level.
    pub fn log_context(&self) {
        tracing::debug!(depth = self.depth(), context = ?self.snapshot(), "Context bindings");
    }
}

/// Guard for a child frame entered with [`ContextScope::enter_child`].
///
/// Dereferences to the scope, so bindings made through the guard land in
/// the child frame. Dropping the guard pops the frame.
#[derive(Debug)]
pub struct ChildScope<'a> {
    scope: &'a mut ContextScope,
    depth: usize,
}

impl ChildScope<'_> {
    /// Leave the child frame, restoring the parent's visible bindings.
    pub fn exit(self) {}
}

impl Deref for ChildScope<'_> {
    type Target = ContextScope;

    fn deref(&self) -> &ContextScope {
        self.scope
    }
}

impl DerefMut for ChildScope<'_> {
    fn deref_mut(&mut self) -> &mut ContextScope {
        self.scope
    }
}

impl Drop for ChildScope<'_> {
    fn drop(&mut self) {
        self.scope.stack.truncate(self.depth);
    }
}

/// Immutable record of the bindings visible at one moment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct ContextSnapshot {
    bindings: BTreeMap<String, Value>,
}

impl ContextSnapshot {
    /// Value bound to `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.bindings.get(key)
    }

    /// Bindings in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no bindings were visible.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// The bindings as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.bindings
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Build the persistence metadata record from these bindings.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::NotSet`] naming the first missing required
    /// binding, or [`ContextError::InvalidMetadata`] if a binding has the
    /// wrong shape (e.g. a non-numeric timestep).
    pub fn metadata(&self) -> Result<Metadata, ContextError> {
        if let Some(missing) = REQUIRED_METADATA
            .iter()
            .find(|key| !self.bindings.contains_key(**key))
        {
            return Err(ContextError::NotSet {
                key: (*missing).to_owned(),
            });
        }
        Ok(serde_json::from_value(self.to_value())?)
    }
}
