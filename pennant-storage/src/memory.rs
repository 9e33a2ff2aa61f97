//! In-process implementations of the cache and record store traits.
//!
//! `InMemoryKvCache` is a usable single-node cache. `InMemoryRecordStore`
//! backs demos and tests; it counts calls and can be told to fail or to
//! respond slowly.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use pennant_core::{
    BrandRow, CacheError, CampaignRow, EntityId, EntityKind, EventRow, StoreError, StoreRow,
};
use tokio::time::Instant;

use crate::codec::CacheKey;
use crate::traits::{CacheStats, KvCache, RecordStore};

// ============================================================================
// IN-MEMORY CACHE
// ============================================================================

#[derive(Debug)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// Concurrent in-memory cache with per-entry expiry.
#[derive(Debug, Default)]
pub struct InMemoryKvCache {
    entries: DashMap<CacheKey, StoredValue>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl InMemoryKvCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until next read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a live entry exists for `key`, without touching statistics.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries
            .get(key)
            .map(|value| value.expires_at > Instant::now())
            .unwrap_or(false)
    }

    /// Overwrite a key with raw bytes. Used to simulate corrupt payloads.
    pub fn insert_raw(&self, key: CacheKey, bytes: Vec<u8>, ttl: Duration) {
        self.put(key, bytes, ttl);
    }

    fn put(&self, key: CacheKey, bytes: Vec<u8>, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries.insert(key, StoredValue { bytes, expires_at });
    }

    fn read(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let now = Instant::now();
        let found = match self.entries.get(key) {
            Some(value) if value.expires_at > now => Some(value.bytes.clone()),
            Some(_) => {
                // Guard must be released before removing from the same shard.
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match found {
            Some(bytes) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(bytes)
            }
            None => {
                if self
                    .entries
                    .remove_if(key, |_, value| value.expires_at <= now)
                    .is_some()
                {
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }
}

#[async_trait]
impl KvCache for InMemoryKvCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.read(key))
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.put(key.clone(), value, ttl);
        Ok(())
    }

    async fn multi_get(&self, keys: &[CacheKey]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        Ok(keys.iter().map(|key| self.read(key)).collect())
    }

    async fn multi_set(
        &self,
        entries: Vec<(CacheKey, Vec<u8>)>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        for (key, value) in entries {
            self.put(key, value, ttl);
        }
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.len() as u64,
            expirations: self.expirations.load(Ordering::Relaxed),
        })
    }
}

// ============================================================================
// IN-MEMORY RECORD STORE
// ============================================================================

/// Record store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    rows: RwLock<HashMap<(EntityKind, EntityId), StoreRow>>,
    campaign_events: RwLock<HashMap<EntityId, BTreeSet<i64>>>,
    find_one_calls: AtomicU64,
    find_many_calls: AtomicU64,
    event_listing_calls: AtomicU64,
    failing: AtomicBool,
    latency_ms: AtomicU64,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, row: StoreRow) {
        if let Ok(mut rows) = self.rows.write() {
            rows.insert((row.kind(), row.id()), row);
        }
    }

    pub fn insert_brand(&self, id: i64, name: impl Into<String>) {
        self.insert(StoreRow::Brand(BrandRow {
            id,
            name: name.into(),
        }));
    }

    pub fn insert_event(&self, id: i64, title: impl Into<String>, body: impl Into<String>) {
        self.insert(StoreRow::Event(EventRow {
            id,
            title: title.into(),
            body: body.into(),
        }));
    }

    pub fn insert_campaign(
        &self,
        id: i64,
        brand_id: i64,
        title: impl Into<String>,
        body: impl Into<String>,
    ) {
        self.insert(StoreRow::Campaign(CampaignRow {
            id,
            brand_id,
            title: title.into(),
            body: body.into(),
        }));
    }

    /// Attach an event to a campaign.
    pub fn link_event(&self, campaign_id: i64, event_id: i64) {
        if let Ok(mut links) = self.campaign_events.write() {
            links
                .entry(EntityId::from(campaign_id))
                .or_default()
                .insert(event_id);
        }
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn find_one_calls(&self) -> u64 {
        self.find_one_calls.load(Ordering::SeqCst)
    }

    pub fn find_many_calls(&self) -> u64 {
        self.find_many_calls.load(Ordering::SeqCst)
    }

    /// Number of campaign event listings served.
    pub fn event_listing_calls(&self) -> u64 {
        self.event_listing_calls.load(Ordering::SeqCst)
    }

    async fn before_call(&self, kind: EntityKind) -> Result<(), StoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::QueryFailed {
                kind,
                reason: "store unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn poisoned() -> StoreError {
        StoreError::Connection {
            reason: "in-memory store lock poisoned".to_string(),
        }
    }
}

fn sort_ids(ids: &mut [EntityId]) {
    ids.sort_by(|a, b| match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(b),
    });
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_one(&self, kind: EntityKind, id: &EntityId) -> Result<Option<StoreRow>, StoreError> {
        self.find_one_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call(kind).await?;

        let rows = self.rows.read().map_err(|_| Self::poisoned())?;
        Ok(rows.get(&(kind, id.clone())).cloned())
    }

    async fn find_many(&self, kind: EntityKind, ids: &[EntityId]) -> Result<Vec<StoreRow>, StoreError> {
        self.find_many_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call(kind).await?;

        let wanted: BTreeSet<&EntityId> = ids.iter().collect();
        let rows = self.rows.read().map_err(|_| Self::poisoned())?;
        Ok(wanted
            .into_iter()
            .filter_map(|id| rows.get(&(kind, id.clone())).cloned())
            .collect())
    }

    async fn list_ids(&self, kind: EntityKind, first: usize) -> Result<Vec<EntityId>, StoreError> {
        self.before_call(kind).await?;

        let rows = self.rows.read().map_err(|_| Self::poisoned())?;
        let mut ids: Vec<EntityId> = rows
            .keys()
            .filter(|(row_kind, _)| *row_kind == kind)
            .map(|(_, id)| id.clone())
            .collect();
        sort_ids(&mut ids);
        ids.truncate(first);
        Ok(ids)
    }

    async fn campaign_event_ids_many(
        &self,
        campaign_ids: &[EntityId],
        first: usize,
    ) -> Result<HashMap<EntityId, Vec<EntityId>>, StoreError> {
        self.event_listing_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call(EntityKind::Event).await?;

        let links = self.campaign_events.read().map_err(|_| Self::poisoned())?;
        Ok(campaign_ids
            .iter()
            .filter_map(|campaign_id| {
                let events = links.get(campaign_id)?;
                let ids = events.iter().take(first).map(|id| EntityId::from(*id)).collect();
                Some((campaign_id.clone(), ids))
            })
            .collect())
    }
}
