//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store that survives process restarts and can be shared between
//! workers on the same host.
//!
//! # Value Layout
//!
//! Every stored value is `[expires_at_millis: 8 bytes LE][payload]`. Expired
//! entries are reported as misses and removed lazily on the next write
//! transaction that touches them.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use pennant_core::CacheError;

use crate::codec::CacheKey;
use crate::traits::{CacheStats, KvCache};

const EXPIRY_PREFIX_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored value is shorter than its expiry prefix.
    #[error("Corrupt entry: {0}")]
    CorruptEntry(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        CacheError::Backend {
            reason: e.to_string(),
        }
    }
}

/// LMDB-backed cache.
///
/// ```ignore
/// use pennant_storage::LmdbKvCache;
///
/// let cache = LmdbKvCache::new("/var/cache/pennant", 256)?;
/// cache.set(&key, payload, Duration::from_secs(300)).await?;
/// ```
pub struct LmdbKvCache {
    env: Env,
    db: Database<Bytes, Bytes>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl LmdbKvCache {
    /// Open (or create) a cache under `path` with a map size of `max_size_mb`.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        })
    }

    fn frame(value: &[u8], ttl: Duration) -> Vec<u8> {
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_millis);

        let mut framed = Vec::with_capacity(EXPIRY_PREFIX_LEN + value.len());
        framed.extend_from_slice(&expires_at.to_le_bytes());
        framed.extend_from_slice(value);
        framed
    }

    /// Split a stored value into its payload, or `None` if it has expired.
    fn unframe(bytes: &[u8], now_millis: i64) -> Result<Option<&[u8]>, LmdbCacheError> {
        if bytes.len() < EXPIRY_PREFIX_LEN {
            return Err(LmdbCacheError::CorruptEntry(format!(
                "{} bytes",
                bytes.len()
            )));
        }
        let mut prefix = [0u8; EXPIRY_PREFIX_LEN];
        prefix.copy_from_slice(&bytes[..EXPIRY_PREFIX_LEN]);
        let expires_at = i64::from_le_bytes(prefix);

        if expires_at <= now_millis {
            return Ok(None);
        }
        Ok(Some(&bytes[EXPIRY_PREFIX_LEN..]))
    }

    /// Look up several keys in one read transaction. Returns the values and
    /// the keys found expired.
    fn read_many(
        &self,
        keys: &[CacheKey],
    ) -> Result<(Vec<Option<Vec<u8>>>, Vec<CacheKey>), LmdbCacheError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        let now = Utc::now().timestamp_millis();

        let mut values = Vec::with_capacity(keys.len());
        let mut expired = Vec::new();
        for key in keys {
            let stored = self
                .db
                .get(&rtxn, key.as_bytes())
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

            let value = match stored {
                Some(bytes) => match Self::unframe(bytes, now)? {
                    Some(payload) => Some(payload.to_vec()),
                    None => {
                        expired.push(key.clone());
                        None
                    }
                },
                None => None,
            };

            match value {
                Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
                None => self.misses.fetch_add(1, Ordering::Relaxed),
            };
            values.push(value);
        }

        Ok((values, expired))
    }

    fn write_many(&self, entries: &[(CacheKey, Vec<u8>)], ttl: Duration) -> Result<(), LmdbCacheError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        for (key, value) in entries {
            self.db
                .put(&mut wtxn, key.as_bytes(), &Self::frame(value, ttl))
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        }

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))
    }

    /// Remove expired keys, rechecking expiry inside the write transaction.
    fn purge(&self, keys: &[CacheKey]) -> Result<(), LmdbCacheError> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        let now = Utc::now().timestamp_millis();

        let mut removed = 0u64;
        for key in keys {
            let still_expired = match self.db.get(&wtxn, key.as_bytes()) {
                Ok(Some(bytes)) => matches!(Self::unframe(bytes, now), Ok(None)),
                _ => false,
            };
            if still_expired
                && self
                    .db
                    .delete(&mut wtxn, key.as_bytes())
                    .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
            {
                removed += 1;
            }
        }

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        self.expirations.fetch_add(removed, Ordering::Relaxed);
        Ok(())
    }

    fn lookup(&self, keys: &[CacheKey]) -> Result<Vec<Option<Vec<u8>>>, LmdbCacheError> {
        let (values, expired) = self.read_many(keys)?;
        if let Err(e) = self.purge(&expired) {
            tracing::debug!(error = %e, "Failed to purge expired LMDB entries");
        }
        Ok(values)
    }
}

#[async_trait]
impl KvCache for LmdbKvCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        let mut values = self.lookup(std::slice::from_ref(key))?;
        Ok(values.pop().flatten())
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.write_many(&[(key.clone(), value)], ttl)?;
        Ok(())
    }

    async fn multi_get(&self, keys: &[CacheKey]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        Ok(self.lookup(keys)?)
    }

    async fn multi_set(
        &self,
        entries: Vec<(CacheKey, Vec<u8>)>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.write_many(&entries, ttl)?;
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        let entry_count = self
            .db
            .len(&rtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            expirations: self.expirations.load(Ordering::Relaxed),
        })
    }
}
