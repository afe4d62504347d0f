// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Keyed cache of loaded model bundles.
//!
//! Concurrent requests for the same key must not load the same checkpoint
//! set twice: each key owns a slot mutex, and the loader runs while holding
//! only that slot, so loads for different keys proceed in parallel while
//! duplicate requests for one key wait for the first loader's result.
//!
//! Failed loads leave the slot empty, so a later request retries after the
//! operator fixes the checkpoint files.

use crate::checkpoint::{CheckpointStore, FusionModel, ModelConfig, ModelKey};
use crate::error::InferError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

type Slot = Arc<Mutex<Option<Arc<FusionModel>>>>;

/// Shared cache of eval-mode model bundles, keyed by checkpoint identity.
#[derive(Default)]
pub struct ModelCache {
    slots: Mutex<HashMap<ModelKey, Slot>>,
}

fn recover<'a, T>(
    result: Result<MutexGuard<'a, T>, std::sync::PoisonError<MutexGuard<'a, T>>>,
) -> MutexGuard<'a, T> {
    // A loader panic poisons the slot but leaves it structurally intact
    // (either empty or holding a fully loaded bundle), so the guard stays
    // usable.
    match result {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &ModelKey) -> Slot {
        let mut slots = recover(self.slots.lock());
        slots.entry(*key).or_default().clone()
    }

    /// Returns the cached bundle for `key`, loading it through `store` on
    /// first use. At most one loader runs per key at a time.
    pub fn get_or_load(
        &self,
        key: &ModelKey,
        store: &CheckpointStore,
        config: &ModelConfig,
    ) -> Result<Arc<FusionModel>, InferError> {
        let slot = self.slot(key);
        let mut guard = recover(slot.lock());
        if let Some(model) = guard.as_ref() {
            return Ok(Arc::clone(model));
        }
        tracing::debug!(identity = %key.identity(), "model cache miss");
        let model = Arc::new(store.load(key, config)?);
        *guard = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Drops the cached bundle for `key`, forcing the next request to reload
    /// from disk. Requests already holding an `Arc` keep their instance.
    pub fn evict(&self, key: &ModelKey) {
        let mut slots = recover(self.slots.lock());
        slots.remove(key);
    }

    /// Number of keys with a loaded bundle.
    pub fn len(&self) -> usize {
        let slots = recover(self.slots.lock());
        slots
            .values()
            .filter(|slot| recover(slot.lock()).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;

    fn key() -> ModelKey {
        ModelKey::new(Category::Bagel, 750, 4)
    }

    #[test]
    fn failed_load_leaves_the_cache_empty() {
        let cache = ModelCache::new();
        let store = CheckpointStore::new("/nonexistent");
        let result = cache.get_or_load(&key(), &store, &ModelConfig::default());
        assert!(matches!(result, Err(InferError::MissingCheckpoints { .. })));
        assert!(cache.is_empty());
    }

    #[test]
    fn eviction_forgets_the_key() {
        let cache = ModelCache::new();
        cache.evict(&key());
        assert!(cache.is_empty());
    }
}
