//! The backing-store contract consumed by every tier.
//!
//! A backing store is an opaque associative store keyed by string. The
//! kernel never embeds serialization or query-language logic: each store
//! decides how it persists a [`Value`].

use synk_types::Value;

use crate::error::StoreError;

/// Key/value contract implemented by every tier of a
/// [`TieredStore`](crate::TieredStore).
///
/// Implementations must treat repeated `set` calls with the same
/// arguments as harmless, because journal commits retry failed entries.
pub trait BackingStore: Send {
    /// Store `value` at `key`, overwriting any previous value.
    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Read the value at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the key is absent.
    fn get(&self, key: &str) -> Result<Value, StoreError>;

    /// Whether `key` is present.
    fn exists(&self, key: &str) -> bool;

    /// Remove `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the key is absent.
    fn delete(&mut self, key: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure the trait is object-safe.
    fn _assert_backing_store_object_safe(_: &dyn BackingStore) {}
}
