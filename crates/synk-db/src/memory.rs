//! In-memory backing stores.
//!
//! [`MemoryStore`] is the default tier implementation and the reference
//! for the [`BackingStore`] contract. [`FlakyStore`] wraps one with a
//! shared switch that makes writes fail, which is how partial fan-out
//! writes and journal retries are exercised.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use synk_types::Value;

use crate::error::StoreError;
use crate::store::BackingStore;

/// Ordered in-memory key/value store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Value>,
}

impl MemoryStore {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BackingStore for MemoryStore {
    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Value, StoreError> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(key))
    }

    fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(key))
    }
}

/// Shared switch controlling a [`FlakyStore`].
#[derive(Debug, Clone, Default)]
pub struct FailSwitch {
    tripped: Arc<AtomicBool>,
}

impl FailSwitch {
    /// Make subsequent writes fail.
    pub fn trip(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }

    /// Let subsequent writes succeed again.
    pub fn reset(&self) {
        self.tripped.store(false, Ordering::SeqCst);
    }

    /// Whether writes currently fail.
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

/// In-memory store whose writes (`set` and `delete`) fail while its
/// [`FailSwitch`] is tripped. Reads are never affected.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    switch: FailSwitch,
}

impl FlakyStore {
    /// Create an empty store and the switch that controls it.
    pub fn new() -> (Self, FailSwitch) {
        let store = Self::default();
        let switch = store.switch.clone();
        (store, switch)
    }

    fn check(&self, op: &str, key: &str) -> Result<(), StoreError> {
        if self.switch.is_tripped() {
            return Err(StoreError::Backend(format!("{op} {key} rejected")));
        }
        Ok(())
    }
}

impl BackingStore for FlakyStore {
    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.check("set", key)?;
        self.inner.set(key, value)
    }

    fn get(&self, key: &str) -> Result<Value, StoreError> {
        self.inner.get(key)
    }

    fn exists(&self, key: &str) -> bool {
        self.inner.exists(key)
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.check("delete", key)?;
        self.inner.delete(key)
    }
}
