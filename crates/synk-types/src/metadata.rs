//! Persistence metadata attached to every recorded state row.
//!
//! A [`Metadata`] record is materialized from the bindings visible in a
//! context scope at the moment a module writes state. The binding names
//! are fixed and listed in [`keys`].

use serde::{Deserialize, Serialize};

use crate::ids::{EpisodeId, ModuleId};

/// Well-known context binding names.
pub mod keys {
    /// Current episode identifier (string form of an [`EpisodeId`](crate::EpisodeId)).
    pub const EPISODE: &str = "episode";
    /// Current timestep (unsigned integer).
    pub const TIMESTEP: &str = "timestep";
    /// Current trial count (unsigned integer).
    pub const TRIAL: &str = "trial";
    /// Identifier of the module instance writing state.
    pub const MODULE_ID: &str = "module_id";
    /// Canonical component name of the module (e.g. `"clock"`).
    pub const MODULE_TYPE: &str = "module_type";
    /// Component type tag of the module (e.g. `"resource"`).
    pub const MODULE_CLASS: &str = "module_class";
    /// Whether the row marks the entry point of an episode.
    pub const IS_ENTRY: &str = "is_entry";
    /// Whether the row is scoped to an episode at all.
    pub const IS_EPISODE: &str = "is_episode";
}

/// Typed view of the context bindings needed to persist module state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Episode the row belongs to.
    pub episode: EpisodeId,
    /// Timestep at which the row was produced.
    pub timestep: u64,
    /// Module instance that produced the row.
    pub module_id: ModuleId,
    /// Canonical component name of the producing module.
    pub module_type: String,
    /// Type tag of the producing module.
    pub module_class: String,
    /// Entry-point marker (defaults to `false` when unbound).
    #[serde(default)]
    pub is_entry: bool,
    /// Episode-scoped marker (defaults to `true` when unbound).
    #[serde(default = "default_true")]
    pub is_episode: bool,
}

const fn default_true() -> bool {
    true
}
