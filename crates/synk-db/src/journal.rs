//! Staged-write overlay on top of a [`TieredStore`].
//!
//! Module state mutated during a step is staged in the journal and only
//! reaches the tiers on [`StateJournal::commit`]. Reads see staged values
//! first, so a module observes its own uncommitted writes.
//!
//! Commit is per-entry, not all-or-nothing: entries are flushed in the
//! order they were first staged, each one is dropped from the journal only
//! after its own tiered write succeeds, and the first failure stops the
//! flush. Whatever is still pending can be retried with another commit or
//! thrown away with [`StateJournal::reset`].

use indexmap::IndexMap;
use synk_types::Value;

use crate::error::StoreError;
use crate::tiered::TieredStore;

/// Outcome of a successful [`StateJournal::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitReport {
    /// Number of entries flushed to the tiered store.
    pub committed: usize,
}

/// Pending-write journal overlaying a [`TieredStore`].
#[derive(Debug)]
pub struct StateJournal {
    store: TieredStore,
    pending: IndexMap<String, Value>,
    eager: bool,
}

impl StateJournal {
    /// Create a deferred-commit journal over `store`.
    pub fn new(store: TieredStore) -> Self {
        Self {
            store,
            pending: IndexMap::new(),
            eager: false,
        }
    }

    /// Create a journal that commits on every [`set`](Self::set).
    pub fn eager(store: TieredStore) -> Self {
        Self {
            eager: true,
            ..Self::new(store)
        }
    }

    /// Whether this journal commits on every write.
    pub const fn is_eager(&self) -> bool {
        self.eager
    }

    /// The underlying tiered store (committed state only).
    pub const fn store(&self) -> &TieredStore {
        &self.store
    }

    /// Consume the journal, discarding pending writes, and return the store.
    pub fn into_store(self) -> TieredStore {
        self.store
    }

    /// Stage `value` under `name`. Restaging a name keeps its first
    /// flush position.
    ///
    /// # Errors
    ///
    /// Only an eager journal can fail here, with whatever the immediate
    /// [`commit`](Self::commit) returned. The staged value stays pending.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Result<(), StoreError> {
        let name = name.into();
        tracing::debug!(name = %name, eager = self.eager, "Journal staged write");
        self.pending.insert(name, value);
        if self.eager {
            self.commit()?;
        }
        Ok(())
    }

    /// Read `name`, preferring the staged value over committed state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if neither the journal nor the
    /// tiered store has the name.
    pub fn get(&self, name: &str) -> Result<Value, StoreError> {
        match self.pending.get(name) {
            Some(value) => Ok(value.clone()),
            None => self.store.get(name),
        }
    }

    /// Whether `name` is staged or committed.
    pub fn exists(&self, name: &str) -> bool {
        self.pending.contains_key(name) || self.store.exists(name)
    }

    /// Ensure `name` is absent from both the journal and every tier.
    /// Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PartialWrite`] if a tier delete fails midway.
    pub fn delete(&mut self, name: &str) -> Result<bool, StoreError> {
        let staged = self.pending.shift_remove(name).is_some();
        let committed = self.store.discard(name)?;
        Ok(staged || committed)
    }

    /// Flush pending entries to the tiered store in staging order.
    ///
    /// # Errors
    ///
    /// Returns the first tiered write error. The failing entry and every
    /// entry staged after it remain pending.
    pub fn commit(&mut self) -> Result<CommitReport, StoreError> {
        let mut report = CommitReport::default();
        while let Some((name, value)) = self.pending.first() {
            if let Err(err) = self.store.set(name, value) {
                tracing::warn!(
                    name = %name,
                    committed = report.committed,
                    still_pending = self.pending.len(),
                    error = %err,
                    "Journal commit stopped"
                );
                return Err(err);
            }
            self.pending.shift_remove_index(0);
            report.committed = report.committed.saturating_add(1);
        }
        if report.committed > 0 {
            tracing::info!(committed = report.committed, "Journal committed");
        }
        Ok(report)
    }

    /// Discard every pending entry without flushing. Returns how many
    /// entries were dropped.
    pub fn reset(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "Journal reset");
        }
        dropped
    }

    /// Pending entries in flush order.
    pub fn pending(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.pending.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of pending entries.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether any writes are staged but uncommitted.
    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::memory::{FlakyStore, MemoryStore};
    use crate::store::BackingStore;

    #[test]
    fn staged_value_visible_before_commit() {
        let mut journal = StateJournal::new(TieredStore::standard());
        journal.set("x", json!(1)).unwrap();
        assert_eq!(journal.get("x").unwrap(), json!(1));
        assert!(journal.exists("x"));
        assert!(!journal.store().exists("x"));
    }

    #[test]
    fn commit_flushes_to_store() {
        let mut journal = StateJournal::new(TieredStore::standard());
        journal.set("x", json!(1)).unwrap();
        let report = journal.commit().unwrap();
        assert_eq!(report.committed, 1);
        assert!(!journal.is_dirty());
        assert_eq!(journal.store().get("x").unwrap(), json!(1));
    }

    #[test]
    fn reset_discards_without_flushing() {
        let mut journal = StateJournal::new(TieredStore::standard());
        journal.set("y", json!(2)).unwrap();
        assert_eq!(journal.reset(), 1);
        assert!(!journal.store().exists("y"));
        assert!(journal.get("y").unwrap_err().is_not_found());
    }

    #[test]
    fn reset_falls_back_to_committed_value() {
        let mut journal = StateJournal::new(TieredStore::standard());
        journal.set("y", json!("old")).unwrap();
        journal.commit().unwrap();
        journal.set("y", json!("new")).unwrap();
        assert_eq!(journal.get("y").unwrap(), json!("new"));

        journal.reset();
        assert_eq!(journal.get("y").unwrap(), json!("old"));
    }

    #[test]
    fn eager_journal_commits_on_set() {
        let mut journal = StateJournal::eager(TieredStore::standard());
        assert!(journal.is_eager());
        journal.set("x", json!(5)).unwrap();
        assert!(!journal.is_dirty());
        assert_eq!(journal.store().get("x").unwrap(), json!(5));
    }

    #[test]
    fn pending_keeps_first_staging_order() {
        let mut journal = StateJournal::new(TieredStore::standard());
        journal.set("b", json!(1)).unwrap();
        journal.set("a", json!(2)).unwrap();
        journal.set("b", json!(3)).unwrap();
        let order: Vec<_> = journal.pending().map(|(k, _)| k.to_owned()).collect();
        assert_eq!(order, vec!["b", "a"]);
        assert_eq!(journal.get("b").unwrap(), json!(3));
    }

    #[test]
    fn failed_entry_stays_pending_for_retry() {
        let (flaky, switch) = FlakyStore::new();
        let store = TieredStore::new()
            .with_tier("cache", MemoryStore::new())
            .with_tier("local", flaky);
        let mut journal = StateJournal::new(store);

        journal.set("a", json!(1)).unwrap();
        journal.set("b", json!(2)).unwrap();

        switch.trip();
        assert!(matches!(
            journal.commit(),
            Err(StoreError::PartialWrite { .. })
        ));
        assert_eq!(journal.pending_len(), 2);
        // The cache tier already took the first entry.
        assert!(journal.store().tier("cache").unwrap().exists("a"));

        switch.reset();
        let report = journal.commit().unwrap();
        assert_eq!(report.committed, 2);
        assert!(!journal.is_dirty());
        assert_eq!(journal.store().tier("local").unwrap().get("b").unwrap(), json!(2));
    }

    #[test]
    fn eager_failure_leaves_entry_pending() {
        let (flaky, switch) = FlakyStore::new();
        let mut journal = StateJournal::eager(TieredStore::new().with_tier("cache", flaky));
        switch.trip();
        assert!(journal.set("x", json!(1)).is_err());
        assert!(journal.is_dirty());
        assert_eq!(journal.get("x").unwrap(), json!(1));
    }

    #[test]
    fn delete_removes_staged_and_committed() {
        let mut journal = StateJournal::new(TieredStore::standard());
        journal.set("x", json!(1)).unwrap();
        journal.commit().unwrap();
        journal.set("x", json!(2)).unwrap();

        assert!(journal.delete("x").unwrap());
        assert!(!journal.exists("x"));
        assert!(!journal.delete("x").unwrap());
    }

    #[test]
    fn commit_on_clean_journal_is_noop() {
        let mut journal = StateJournal::new(TieredStore::standard());
        assert_eq!(journal.commit().unwrap(), CommitReport { committed: 0 });
        let store = journal.into_store();
        assert!(store.tier("cache").is_some());
    }

    #[test]
    fn tiers_visible_through_trait_object() {
        let mut journal = StateJournal::new(TieredStore::standard());
        journal.set("k", json!("v")).unwrap();
        journal.commit().unwrap();
        let cache: &dyn BackingStore = journal.store().tier("cache").unwrap();
        assert_eq!(cache.get("k").unwrap(), json!("v"));
    }
}
