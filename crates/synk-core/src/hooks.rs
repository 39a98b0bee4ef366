//! Named pre/post hooks wrapped around a step function.
//!
//! A [`HookChain`] holds two insertion-ordered lists of named hooks.
//! [`HookChain::invoke`] threads the step arguments through every pre-hook,
//! calls the step with the result, then threads the step's return value
//! through every post-hook. Post-hooks also see the final argument list, so
//! anything a pre-hook injected is visible to them.
//!
//! Registering a hook under a name that is already taken replaces the old
//! hook in place, keeping its position in the chain.
//!
//! The first hook or step that fails aborts the chain; nothing after it
//! runs and the error is returned as a [`HookError`].

use std::fmt;

use indexmap::IndexMap;
use synk_types::Value;

use crate::context::ContextScope;

/// Error type user hooks and step functions return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A hook run before the step. Receives and returns the argument list.
pub type PreHook =
    Box<dyn Fn(&mut ContextScope, Vec<Value>) -> Result<HookOutput, BoxError> + Send + Sync>;

/// A hook run after the step. Receives the running result and the final
/// argument list, and returns the new result.
pub type PostHook =
    Box<dyn Fn(&mut ContextScope, Value, &[Value]) -> Result<Value, BoxError> + Send + Sync>;

/// Which half of the chain a hook belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    /// Runs before the step, rewriting its arguments.
    Pre,
    /// Runs after the step, rewriting its result.
    Post,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => f.write_str("pre"),
            Self::Post => f.write_str("post"),
        }
    }
}

/// Errors raised while running a hook chain.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// A registered hook failed.
    #[error("{stage}-hook '{hook}' failed: {source}")]
    Hook {
        /// Name the hook was registered under.
        hook: String,
        /// Whether it was a pre- or post-hook.
        stage: HookStage,
        /// The hook's own error.
        source: BoxError,
    },

    /// The wrapped step function failed.
    #[error("step failed: {source}")]
    Step {
        /// The step's own error.
        source: BoxError,
    },
}

/// What a pre-hook hands to the next stage.
///
/// A pre-hook may return a full argument list or a single value; a single
/// value becomes a one-element argument list.
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutput {
    /// A replacement argument list.
    Args(Vec<Value>),
    /// A single argument.
    Single(Value),
}

impl HookOutput {
    /// Normalize into an argument list.
    pub fn into_args(self) -> Vec<Value> {
        match self {
            Self::Args(args) => args,
            Self::Single(value) => vec![value],
        }
    }
}

impl From<Vec<Value>> for HookOutput {
    fn from(args: Vec<Value>) -> Self {
        Self::Args(args)
    }
}

impl From<Value> for HookOutput {
    fn from(value: Value) -> Self {
        Self::Single(value)
    }
}

/// Identifies a registered hook so it can be removed later.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HookHandle {
    /// Name the hook was registered under.
    pub name: String,
    /// Which list the hook lives in.
    pub stage: HookStage,
}

/// Ordered pre- and post-hooks around a step function.
#[derive(Default)]
pub struct HookChain {
    pre: IndexMap<String, PreHook>,
    post: IndexMap<String, PostHook>,
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookChain")
            .field("pre", &self.pre.keys().collect::<Vec<_>>())
            .field("post", &self.post.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HookChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre-hook, replacing any pre-hook with the same name.
    pub fn register_pre<F>(&mut self, name: impl Into<String>, hook: F) -> HookHandle
    where
        F: Fn(&mut ContextScope, Vec<Value>) -> Result<HookOutput, BoxError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        let replaced = self.pre.insert(name.clone(), Box::new(hook)).is_some();
        tracing::debug!(hook = %name, replaced, "Registered pre-hook");
        HookHandle {
            name,
            stage: HookStage::Pre,
        }
    }

    /// Register a post-hook, replacing any post-hook with the same name.
    pub fn register_post<F>(&mut self, name: impl Into<String>, hook: F) -> HookHandle
    where
        F: Fn(&mut ContextScope, Value, &[Value]) -> Result<Value, BoxError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        let replaced = self.post.insert(name.clone(), Box::new(hook)).is_some();
        tracing::debug!(hook = %name, replaced, "Registered post-hook");
        HookHandle {
            name,
            stage: HookStage::Post,
        }
    }

    /// Remove the hook `handle` refers to. Returns whether it was present.
    pub fn remove(&mut self, handle: &HookHandle) -> bool {
        let removed = match handle.stage {
            HookStage::Pre => self.pre.shift_remove(&handle.name).is_some(),
            HookStage::Post => self.post.shift_remove(&handle.name).is_some(),
        };
        if removed {
            tracing::debug!(hook = %handle.name, stage = %handle.stage, "Removed hook");
        }
        removed
    }

    /// Pre-hook names in execution order.
    pub fn pre_hooks(&self) -> impl Iterator<Item = &str> {
        self.pre.keys().map(String::as_str)
    }

    /// Post-hook names in execution order.
    pub fn post_hooks(&self) -> impl Iterator<Item = &str> {
        self.post.keys().map(String::as_str)
    }

    /// Total number of registered hooks.
    pub fn len(&self) -> usize {
        self.pre.len().saturating_add(self.post.len())
    }

    /// Whether no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }

    /// Run `step` with `args`, wrapped by every registered hook.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::Hook`] for the first failing hook or
    /// [`HookError::Step`] if the step itself fails.
    pub fn invoke<F>(
        &self,
        scope: &mut ContextScope,
        step: F,
        args: Vec<Value>,
    ) -> Result<Value, HookError>
    where
        F: FnOnce(&mut ContextScope, &[Value]) -> Result<Value, BoxError>,
    {
        let mut current = args;
        for (name, hook) in &self.pre {
            current = hook(scope, current)
                .map_err(|source| HookError::Hook {
                    hook: name.clone(),
                    stage: HookStage::Pre,
                    source,
                })?
                .into_args();
        }

        let mut result = step(scope, &current).map_err(|source| HookError::Step { source })?;

        for (name, hook) in &self.post {
            result = hook(scope, result, &current).map_err(|source| HookError::Hook {
                hook: name.clone(),
                stage: HookStage::Post,
                source,
            })?;
        }
        Ok(result)
    }
}
