//! Simulation-state kernel for synk.
//!
//! This crate owns the pieces a simulation uses to keep track of who is
//! running, in what context, and which episode the state belongs to.
//!
//! # Modules
//!
//! - [`registry`] -- [`ComponentRegistry`]: live components keyed by
//!   `(type_tag, name)`, with owning holders and a weak lookup index.
//! - [`context`] -- [`ContextScope`]: stacked, dynamically-scoped bindings
//!   and their immutable [`ContextSnapshot`].
//! - [`hooks`] -- [`HookChain`]: named pre/post hooks around a step.
//! - [`module`] -- [`Module`]: a steppable component with its own scope,
//!   hook chain and named child modules.
//! - [`episode`] -- [`EpisodeCounter`]: trial/timestep counting and episode
//!   rotation.
//! - [`config`] -- Configuration loading from `synk-config.yaml` into
//!   strongly-typed structs.
//!
//! Tiered storage and the state journal live in `synk-db` and are
//! re-exported here for convenience.

pub mod config;
pub mod context;
pub mod episode;
pub mod hooks;
pub mod module;
pub mod registry;

pub use context::{ChildScope, ContextError, ContextScope, ContextSnapshot};
pub use episode::{CounterError, EpisodeCounter, EpisodeScope, EpisodeState};
pub use hooks::{BoxError, HookChain, HookError, HookHandle, HookOutput, HookStage};
pub use module::{Module, ModuleError, ModuleNode, Steppable};
pub use registry::{Component, ComponentRegistry, RegistryError};
pub use synk_db::{StateJournal, StoreError, TieredStore};
