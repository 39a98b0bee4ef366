//! Storage layer for the synk simulation-state kernel.
//!
//! Module state flows through three layers:
//!
//! ```text
//! Module step
//!     |
//!     +-- set / get --> StateJournal   (staged, uncommitted writes)
//!                           |
//!                           +-- commit --> TieredStore (fan-out write, ordered read)
//!                                              |-- cache      (BackingStore)
//!                                              |-- local      (BackingStore)
//!                                              +-- analytics  (BackingStore)
//! ```
//!
//! # Modules
//!
//! - [`store`] -- The [`BackingStore`] contract every tier implements
//! - [`memory`] -- In-memory stores, including a switchable failing store
//! - [`file`] -- JSON-file store that survives restarts
//! - [`tiered`] -- [`TieredStore`] fan-out over ordered tiers
//! - [`journal`] -- [`StateJournal`] staged-write overlay
//! - [`error`] -- Shared error types

pub mod error;
pub mod file;
pub mod journal;
pub mod memory;
pub mod store;
pub mod tiered;

// Re-export primary types for convenience.
pub use error::StoreError;
pub use file::FileStore;
pub use journal::{CommitReport, StateJournal};
pub use memory::{FailSwitch, FlakyStore, MemoryStore};
pub use store::BackingStore;
pub use tiered::{DEFAULT_TIERS, TieredStore};
