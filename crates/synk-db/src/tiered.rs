//! Priority-ordered fan-out over several backing stores.
//!
//! A [`TieredStore`] owns a fixed, ordered list of tiers, conventionally
//! `[cache, local, analytics]`.
//!
//! - Writes fan out to every tier in order.
//! - Reads and existence checks consult tiers in the same order and stop
//!   at the first tier that has the key.
//!
//! Consistency is best-effort: when a tier write fails the remaining tiers
//! are skipped and the ones already written are left as they are. The
//! failure is reported as [`StoreError::PartialWrite`] naming the tiers
//! that did receive the value, so callers can see the divergence.

use synk_types::Value;

use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::store::BackingStore;

/// Conventional tier names, highest priority first.
pub const DEFAULT_TIERS: [&str; 3] = ["cache", "local", "analytics"];

/// One named backing store within a [`TieredStore`].
struct Tier {
    name: String,
    store: Box<dyn BackingStore>,
}

/// Write-through, read-fallback store over an ordered list of tiers.
#[derive(Default)]
pub struct TieredStore {
    tiers: Vec<Tier>,
}

impl core::fmt::Debug for TieredStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TieredStore")
            .field("tiers", &self.tier_names())
            .finish()
    }
}

impl TieredStore {
    /// Create a store with no tiers. Add tiers with [`with_tier`](Self::with_tier).
    pub const fn new() -> Self {
        Self { tiers: Vec::new() }
    }

    /// Create a store with one [`MemoryStore`] per name, in the given order.
    pub fn in_memory<S: AsRef<str>>(names: &[S]) -> Self {
        names.iter().fold(Self::new(), |tiered, name| {
            tiered.with_tier(name.as_ref(), MemoryStore::new())
        })
    }

    /// Create the conventional `[cache, local, analytics]` in-memory stack.
    pub fn standard() -> Self {
        Self::in_memory(&DEFAULT_TIERS)
    }

    /// Append a tier with the lowest priority so far.
    #[must_use]
    pub fn with_tier(mut self, name: impl Into<String>, store: impl BackingStore + 'static) -> Self {
        self.tiers.push(Tier {
            name: name.into(),
            store: Box::new(store),
        });
        self
    }

    /// Tier names in priority order.
    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name.as_str()).collect()
    }

    /// Borrow a single tier by name.
    pub fn tier(&self, name: &str) -> Option<&dyn BackingStore> {
        self.tiers
            .iter()
            .find(|t| t.name == name)
            .map(|t| &*t.store)
    }

    /// Write `value` to every tier in priority order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PartialWrite`] if any tier write fails. Earlier
    /// tiers keep the new value; later tiers are not attempted.
    pub fn set(&mut self, key: &str, value: &Value) -> Result<(), StoreError> {
        self.fan_out(key, |store| store.set(key, value.clone()))?;
        tracing::debug!(key, tiers = self.tiers.len(), "Tiered write");
        Ok(())
    }

    /// Read `key` from the first tier (in priority order) that has it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no tier has the key.
    pub fn get(&self, key: &str) -> Result<Value, StoreError> {
        self.tiers
            .iter()
            .find(|t| t.store.exists(key))
            .map_or_else(|| Err(StoreError::not_found(key)), |t| t.store.get(key))
    }

    /// Whether any tier has `key`.
    pub fn exists(&self, key: &str) -> bool {
        self.tiers.iter().any(|t| t.store.exists(key))
    }

    /// Delete `key` from every tier. Tiers that lack the key are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no tier has the key, or
    /// [`StoreError::PartialWrite`] if a tier delete fails midway.
    pub fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if !self.exists(key) {
            return Err(StoreError::not_found(key));
        }
        self.fan_out(key, |store| match store.delete(key) {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        })?;
        tracing::debug!(key, "Tiered remove");
        Ok(())
    }

    /// Ensure `key` is absent from every tier. Returns whether anything was
    /// removed; an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PartialWrite`] if a tier delete fails midway.
    pub fn discard(&mut self, key: &str) -> Result<bool, StoreError> {
        match self.remove(key) {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Apply `op` to every tier in order, stopping at the first failure.
    fn fan_out<F>(&mut self, key: &str, mut op: F) -> Result<(), StoreError>
    where
        F: FnMut(&mut (dyn BackingStore + 'static)) -> Result<(), StoreError>,
    {
        let mut succeeded = Vec::with_capacity(self.tiers.len());
        for tier in &mut self.tiers {
            if let Err(err) = op(&mut *tier.store) {
                tracing::warn!(
                    key,
                    failed_tier = %tier.name,
                    ?succeeded,
                    error = %err,
                    "Tier write failed, tiers left divergent"
                );
                return Err(StoreError::PartialWrite {
                    key: key.to_owned(),
                    failed_tier: tier.name.clone(),
                    succeeded,
                    source: Box::new(err),
                });
            }
            succeeded.push(tier.name.clone());
        }
        Ok(())
    }
}
