//! Bounded cache of display-only tenant metadata.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::context::TenantId;

/// Default number of descriptors kept before a full clear.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Descriptive tenant information.
///
/// Populated lazily and used for display purposes only. Never consult a
/// descriptor for an authorization decision; the bound tenant on the
/// connection is the only authoritative signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantDescriptor {
    pub id: TenantId,
    pub name: String,
    /// Plan identifier, e.g. `"free"` or `"enterprise"`.
    pub plan: String,
}

/// Bounded mapping of tenant id to descriptor.
///
/// When an insert would exceed the capacity the entire map is cleared and
/// repopulated on demand, rather than evicting by recency. Descriptor fields
/// change infrequently and are display-only, so the occasional cold restart
/// is acceptable and the policy needs no locking discipline beyond the
/// map's own sharded locks. Duplicate repopulation under concurrency is a
/// benign race.
#[derive(Debug)]
pub struct TenantCache {
    entries: DashMap<TenantId, TenantDescriptor>,
    capacity: usize,
}

impl TenantCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, tenant_id: TenantId) -> Option<TenantDescriptor> {
        self.entries.get(&tenant_id).map(|e| e.value().clone())
    }

    /// Insert a descriptor, full-clearing the cache first if the insert
    /// would push it past capacity.
    pub fn insert(&self, descriptor: TenantDescriptor) {
        if !self.entries.contains_key(&descriptor.id) && self.entries.len() >= self.capacity {
            tracing::debug!(
                capacity = self.capacity,
                "tenant cache at capacity, clearing all entries"
            );
            self.entries.clear();
        }
        self.entries.insert(descriptor.id, descriptor);
    }

    /// Fetch the descriptor for a tenant, loading and caching it on a miss.
    ///
    /// Concurrent callers may each run the loader for the same tenant; the
    /// last write wins and both observe equivalent data.
    ///
    /// # Errors
    ///
    /// Propagates the loader's error; nothing is cached in that case.
    pub async fn get_or_insert_with<F, Fut, E>(
        &self,
        tenant_id: TenantId,
        loader: F,
    ) -> Result<TenantDescriptor, E>
    where
        F: FnOnce(TenantId) -> Fut,
        Fut: Future<Output = Result<TenantDescriptor, E>>,
    {
        if let Some(found) = self.get(tenant_id) {
            return Ok(found);
        }
        let descriptor = loader(tenant_id).await?;
        self.insert(descriptor.clone());
        Ok(descriptor)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for TenantCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_possible_wrap)]
mod tests {
    use super::*;

    fn descriptor(id: TenantId) -> TenantDescriptor {
        TenantDescriptor {
            id,
            name: format!("tenant-{id}"),
            plan: "free".to_owned(),
        }
    }

    #[test]
    fn insert_and_get_round_trip() {
        let cache = TenantCache::new(10);
        cache.insert(descriptor(1));
        assert_eq!(cache.get(1), Some(descriptor(1)));
        assert_eq!(cache.get(2), None);
    }

    #[test]
    fn overflow_clears_everything_then_repopulates_single_entry() {
        let cache = TenantCache::new(DEFAULT_CACHE_CAPACITY);
        for id in 0..DEFAULT_CACHE_CAPACITY as TenantId {
            cache.insert(descriptor(id));
        }
        assert_eq!(cache.len(), DEFAULT_CACHE_CAPACITY);

        cache.insert(descriptor(DEFAULT_CACHE_CAPACITY as TenantId));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(DEFAULT_CACHE_CAPACITY as TenantId).is_some());
        assert!(cache.get(0).is_none());
    }

    #[test]
    fn reinserting_existing_key_at_capacity_does_not_clear() {
        let cache = TenantCache::new(2);
        cache.insert(descriptor(1));
        cache.insert(descriptor(2));

        let mut updated = descriptor(2);
        updated.plan = "enterprise".to_owned();
        cache.insert(updated.clone());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(2), Some(updated));
        assert!(cache.get(1).is_some());
    }

    #[tokio::test]
    async fn get_or_insert_with_populates_on_miss_only() {
        let cache = TenantCache::new(10);
        let loaded = cache
            .get_or_insert_with(5, |id| async move { Ok::<_, ()>(descriptor(id)) })
            .await
            .unwrap();
        assert_eq!(loaded.id, 5);

        // Second call must hit the cache; a loader that fails proves it was
        // not invoked.
        let cached = cache
            .get_or_insert_with(5, |_| async move { Err(()) })
            .await
            .unwrap();
        assert_eq!(cached, loaded);
    }

    #[tokio::test]
    async fn get_or_insert_with_error_caches_nothing() {
        let cache = TenantCache::new(10);
        let result: Result<TenantDescriptor, &str> =
            cache.get_or_insert_with(5, |_| async move { Err("backend down") }).await;
        assert!(result.is_err());
        assert!(cache.is_empty());
    }
}
