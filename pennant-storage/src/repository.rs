//! Cache-aside repository.
//!
//! One `CacheRepository` serves one entity type. It checks the shared cache,
//! falls back to the record store on a miss, and writes found entities back.
//! Every cache and store call is counted on the request's
//! [`DataFetchingStats`]: one increment per call, never per key.
//!
//! Only positive results are cached. An id the store does not know is looked
//! up again on every request.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pennant_core::settings::{env_setting, parse_setting};
use pennant_core::{ConfigError, EntityId, PennantResult};

use crate::codec::{decode_cache_payload, encode_for_cache, CacheKey, CachedEntity};
use crate::loader::BatchSource;
use crate::stats::DataFetchingStats;
use crate::traits::{KvCache, RecordStore};

/// Configuration for cache-aside repositories.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied to every cache write, single or batch.
    pub entry_ttl: Duration,
    /// Prepended to every cache key. Lets several deployments share a cache.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(300),
            key_prefix: String::new(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `PENNANT_CACHE_TTL_SECS` and `PENNANT_CACHE_KEY_PREFIX`.
    /// Unset values take their defaults; malformed ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_settings(env_setting)
    }

    /// Same as [`CacheConfig::from_env`], reading settings through `lookup`.
    pub fn from_settings(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let entry_ttl = parse_setting::<u64>("PENNANT_CACHE_TTL_SECS", lookup("PENNANT_CACHE_TTL_SECS"))?
            .map(Duration::from_secs)
            .unwrap_or(defaults.entry_ttl);
        if entry_ttl.is_zero() {
            return Err(ConfigError::invalid("PENNANT_CACHE_TTL_SECS", "0", "TTL must be positive"));
        }

        let key_prefix = lookup("PENNANT_CACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix);

        Ok(Self {
            entry_ttl,
            key_prefix,
        })
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

/// Cache-aside repository for entity type `E`.
///
/// # Type Parameters
///
/// - `S`: the record store consulted on cache misses
/// - `C`: the key-value cache
///
/// Both are held behind `Arc` and may be trait objects.
pub struct CacheRepository<E, S, C>
where
    S: RecordStore + ?Sized,
    C: KvCache + ?Sized,
{
    store: Arc<S>,
    cache: Arc<C>,
    stats: Arc<DataFetchingStats>,
    config: CacheConfig,
    _entity: PhantomData<fn() -> E>,
}

impl<E, S, C> Clone for CacheRepository<E, S, C>
where
    S: RecordStore + ?Sized,
    C: KvCache + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            stats: Arc::clone(&self.stats),
            config: self.config.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E, S, C> fmt::Debug for CacheRepository<E, S, C>
where
    E: CachedEntity,
    S: RecordStore + ?Sized,
    C: KvCache + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRepository")
            .field("entity", &E::KIND)
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl<E, S, C> CacheRepository<E, S, C>
where
    E: CachedEntity,
    S: RecordStore + ?Sized,
    C: KvCache + ?Sized,
{
    pub fn new(
        store: Arc<S>,
        cache: Arc<C>,
        stats: Arc<DataFetchingStats>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            cache,
            stats,
            config,
            _entity: PhantomData,
        }
    }

    /// Stats collector this repository reports to.
    pub fn stats(&self) -> &Arc<DataFetchingStats> {
        &self.stats
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cache key for `id` under this repository's entity type. Ids are
    /// canonicalized first, so `"007"` and `"7"` share one key.
    pub fn key_for(&self, id: &EntityId) -> CacheKey {
        CacheKey::for_entity::<E>(&self.config.key_prefix, &id.canonical())
    }

    /// Fetch one entity, consulting the cache first.
    ///
    /// Returns `Ok(None)` when the store has no such row. Cache faults degrade
    /// to a store fetch; store faults are returned.
    pub async fn get_by_id(&self, id: &EntityId) -> PennantResult<Option<E>> {
        let id = &id.canonical();
        let key = self.key_for(id);

        self.stats.record_cache_get();
        let cached = match self.cache.get(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, falling back to store");
                None
            }
        };

        if let Some(entity) = decode_cache_payload::<E>(cached.as_deref()) {
            tracing::debug!(key = %key, "Cache hit");
            return Ok(Some(entity));
        }
        tracing::debug!(key = %key, "Cache miss");

        self.stats.record_sql_call();
        let row = self.store.find_one(E::KIND, id).await.map_err(|e| {
            tracing::error!(entity = %E::KIND, id = %id, error = %e, "Store lookup failed");
            e
        })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let entity = E::from_row(row)?;
        self.write_one(&key, &entity).await;
        Ok(Some(entity))
    }

    /// Fetch many entities with at most one cache read, one store query and
    /// one cache write.
    ///
    /// The result has one slot per input id, in input order. Duplicate ids get
    /// duplicate slots, and so do different spellings of one numeric id.
    /// A store failure fails the whole batch.
    pub async fn get_batch_by_ids(&self, ids: &[EntityId]) -> PennantResult<Vec<Option<E>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<EntityId> = ids.iter().map(EntityId::canonical).collect();
        let keys: Vec<CacheKey> = ids.iter().map(|id| self.key_for(id)).collect();

        self.stats.record_cache_get();
        let cached = match self.cache.multi_get(&keys).await {
            Ok(values) if values.len() == keys.len() => values,
            Ok(values) => {
                tracing::warn!(
                    expected = keys.len(),
                    got = values.len(),
                    "Cache multi_get returned misaligned results, treating as misses"
                );
                vec![None; keys.len()]
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache multi_get failed, falling back to store");
                vec![None; keys.len()]
            }
        };

        let mut results: Vec<Option<E>> = cached
            .iter()
            .map(|raw| decode_cache_payload::<E>(raw.as_deref()))
            .collect();

        let mut seen = HashSet::new();
        let missing: Vec<EntityId> = ids
            .iter()
            .zip(&results)
            .filter(|(_, hit)| hit.is_none())
            .filter(|(id, _)| seen.insert(*id))
            .map(|(id, _)| id.clone())
            .collect();

        tracing::debug!(
            entity = %E::KIND,
            requested = ids.len(),
            missing = missing.len(),
            "Batch cache lookup"
        );

        if missing.is_empty() {
            return Ok(results);
        }

        self.stats.record_sql_call();
        let rows = self.store.find_many(E::KIND, &missing).await.map_err(|e| {
            tracing::error!(
                entity = %E::KIND,
                ids = missing.len(),
                error = %e,
                "Store batch lookup failed"
            );
            e
        })?;

        let wanted: HashSet<&EntityId> = missing.iter().collect();
        let mut fetched: HashMap<EntityId, E> = HashMap::with_capacity(rows.len());
        for row in rows {
            let entity = E::from_row(row)?;
            let id = entity.id().canonical();
            if !wanted.contains(&id) {
                tracing::warn!(entity = %E::KIND, id = %id, "Store returned an unrequested row, ignoring");
                continue;
            }
            fetched.insert(id, entity);
        }

        self.write_many(&fetched).await;

        for (slot, id) in results.iter_mut().zip(&ids) {
            if slot.is_none() {
                *slot = fetched.get(id).cloned();
            }
        }

        Ok(results)
    }

    async fn write_one(&self, key: &CacheKey, entity: &E) {
        let payload = match encode_for_cache(entity) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Skipping cache write");
                return;
            }
        };

        self.stats.record_cache_set();
        if let Err(e) = self.cache.set(key, payload, self.config.entry_ttl).await {
            tracing::warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    async fn write_many(&self, fetched: &HashMap<EntityId, E>) {
        let entries: Vec<(CacheKey, Vec<u8>)> = fetched
            .iter()
            .filter_map(|(id, entity)| match encode_for_cache(entity) {
                Ok(payload) => Some((self.key_for(id), payload)),
                Err(e) => {
                    tracing::warn!(entity = %E::KIND, id = %id, error = %e, "Skipping cache write");
                    None
                }
            })
            .collect();

        if entries.is_empty() {
            return;
        }

        self.stats.record_cache_set();
        if let Err(e) = self.cache.multi_set(entries, self.config.entry_ttl).await {
            tracing::warn!(entity = %E::KIND, error = %e, "Cache batch write failed");
        }
    }
}

#[async_trait]
impl<E, S, C> BatchSource for CacheRepository<E, S, C>
where
    E: CachedEntity,
    S: RecordStore + ?Sized + 'static,
    C: KvCache + ?Sized + 'static,
{
    type Value = E;

    async fn fetch_batch(&self, ids: &[EntityId]) -> PennantResult<Vec<Option<E>>> {
        self.get_batch_by_ids(ids).await
    }
}
