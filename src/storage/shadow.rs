//! Shadow state - last observed remote configuration per system
//!
//! Pure storage used for diffing. Readers get copies; the lock is never held
//! across an await outside this module.

use std::collections::BTreeMap;

use tokio::sync::RwLock;

/// Last known snapshot per entity, keyed by system id
pub struct ShadowStore<T> {
    entries: RwLock<BTreeMap<String, T>>,
}

impl<T: Clone> ShadowStore<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn get(&self, entity_id: &str) -> Option<T> {
        self.entries.read().await.get(entity_id).cloned()
    }

    pub async fn set(&self, entity_id: &str, snapshot: T) {
        self.entries
            .write()
            .await
            .insert(entity_id.to_string(), snapshot);
    }

    /// Run a read-compare-write on one entry under a single write lock.
    ///
    /// `f` sees the current snapshot (if any) and returns the replacement to
    /// store, or `None` to leave the entry as it is.
    pub async fn update<R>(
        &self,
        entity_id: &str,
        f: impl FnOnce(Option<&T>) -> (Option<T>, R),
    ) -> R {
        let mut entries = self.entries.write().await;
        let (replacement, result) = f(entries.get(entity_id));
        if let Some(snapshot) = replacement {
            entries.insert(entity_id.to_string(), snapshot);
        }
        result
    }

    /// Point-in-time copy of every entry, ordered by entity id
    pub async fn entities(&self) -> Vec<(String, T)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(id, snapshot)| (id.clone(), snapshot.clone()))
            .collect()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<T: Clone> Default for ShadowStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
