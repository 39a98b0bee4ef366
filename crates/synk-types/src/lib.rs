//! Shared type definitions for the synk simulation-state kernel.
//!
//! This crate holds the small set of value types that flow between the
//! storage layer and the kernel: component identity, episode and module
//! identifiers, and the persistence metadata record.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for episodes and module instances
//! - [`key`] -- The `(type_tag, name)` component key
//! - [`metadata`] -- Persistence metadata and well-known context keys

pub mod ids;
pub mod key;
pub mod metadata;

// Re-export all public types at crate root for convenience.
pub use ids::{EpisodeId, ModuleId};
pub use key::ComponentKey;
pub use metadata::{Metadata, keys};

/// Dynamic value stored in context bindings, hook arguments and backing
/// stores.
pub use serde_json::Value;
