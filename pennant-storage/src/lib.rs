//! Pennant Storage - Cache-Aside Repositories and Batch Loading
//!
//! Everything between a GraphQL resolver and the primary store:
//! per-request fetch statistics, the entity codec, the cache-aside
//! repository, the per-request batch loader, and the cache and store
//! backends that run in process.
//!
//! The PostgreSQL record store lives in pennant-api.

pub mod campaigns;
pub mod codec;
pub mod lmdb_backend;
pub mod loader;
pub mod memory;
pub mod repository;
pub mod stats;
pub mod traits;

pub use campaigns::{BrandRepository, CampaignEventIds, CampaignRepository, EventRepository};
pub use codec::{decode_cache_payload, encode_for_cache, from_store_row, CacheKey, CachedEntity};
pub use lmdb_backend::{LmdbCacheError, LmdbKvCache};
pub use loader::{BatchLoader, BatchSource, LoaderConfig};
pub use memory::{InMemoryKvCache, InMemoryRecordStore};
pub use repository::{CacheConfig, CacheRepository};
pub use stats::{DataFetchingStats, StatCounter, StatsSnapshot};
pub use traits::{CacheStats, KvCache, RecordStore};
