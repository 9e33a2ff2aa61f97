//! Collaborator traits: the key-value cache and the record store.
//!
//! Both are supplied from outside the repository layer and shared by every
//! request in the process. Neither offers transactional guarantees.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use pennant_core::{CacheError, EntityId, EntityKind, StoreError, StoreRow};
use serde::{Deserialize, Serialize};

use crate::codec::CacheKey;

/// Key-value cache client.
///
/// Implementations must be thread-safe. Expired entries must read as absent.
#[async_trait]
pub trait KvCache: Send + Sync {
    /// Read a single key.
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError>;

    /// Write a single key with a time-to-live.
    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Read many keys in one call. The result is aligned with `keys`.
    async fn multi_get(&self, keys: &[CacheKey]) -> Result<Vec<Option<Vec<u8>>>, CacheError>;

    /// Write many keys in one call, all with the same time-to-live.
    async fn multi_set(
        &self,
        entries: Vec<(CacheKey, Vec<u8>)>,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Usage statistics for this cache instance.
    async fn stats(&self) -> Result<CacheStats, CacheError>;
}

/// Record store accessor.
///
/// Failures are reported as [`StoreError`] and are fatal for the fetch that
/// issued them. Retrying, if wanted, is the implementation's business.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the row of `kind` with the given id, if it exists.
    async fn find_one(&self, kind: EntityKind, id: &EntityId) -> Result<Option<StoreRow>, StoreError>;

    /// Fetch every existing row of `kind` among `ids`, in no particular order.
    async fn find_many(&self, kind: EntityKind, ids: &[EntityId]) -> Result<Vec<StoreRow>, StoreError>;

    /// The first `first` ids of `kind`, in id order.
    async fn list_ids(&self, kind: EntityKind, first: usize) -> Result<Vec<EntityId>, StoreError>;

    /// Ids of the events attached to each of `campaign_ids`, in id order and
    /// at most `first` per campaign, in one call. Campaigns without events
    /// may be left out of the map.
    async fn campaign_event_ids_many(
        &self,
        campaign_ids: &[EntityId],
        first: usize,
    ) -> Result<HashMap<EntityId, Vec<EntityId>>, StoreError>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of keys read and found.
    pub hits: u64,
    /// Number of keys read and not found (or expired).
    pub misses: u64,
    /// Number of entries currently stored, expired ones included until purged.
    pub entry_count: u64,
    /// Number of entries dropped because they expired.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
