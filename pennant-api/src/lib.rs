//! Pennant API - GraphQL Read Service
//!
//! Serves campaigns, events and brands over GraphQL. Reads go through
//! cache-aside repositories, and nested fields are coalesced by per-request
//! batch loaders. Each response reports how many store and cache calls it
//! cost in the `dataFetchingStats` extension.

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod macros;
pub mod routes;
pub mod seed;
pub mod state;
pub mod telemetry;
pub mod tracing_ext;

use std::sync::Arc;

use pennant_storage::{InMemoryKvCache, InMemoryRecordStore, LmdbKvCache};

pub use config::{ApiConfig, CacheBackendKind, StoreBackend};
pub use context::RequestContext;
pub use db::{DbConfig, PgRecordStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use routes::graphql::{build_schema, execute_request, PennantSchema, STATS_EXTENSION};
pub use state::{AppState, SharedCache, SharedStore};
pub use tracing_ext::{decode_ftv1, ResolverTracing, FTV1_EXTENSION};

/// Build the record store selected by `config`.
///
/// The memory store is seeded with `config.seed_campaigns` demo campaigns.
pub fn build_store(config: &ApiConfig) -> ApiResult<SharedStore> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let db_config = DbConfig::from_env()?;
            tracing::info!(host = %db_config.host, db = %db_config.dbname, "Using PostgreSQL store");
            Ok(Arc::new(PgRecordStore::from_config(&db_config)?))
        }
        StoreBackend::Memory => {
            let store = InMemoryRecordStore::new();
            seed::seed_demo_data(&store, config.seed_campaigns);
            Ok(Arc::new(store))
        }
    }
}

/// Build the key-value cache selected by `config`.
pub fn build_cache(config: &ApiConfig) -> ApiResult<SharedCache> {
    match config.cache_backend {
        CacheBackendKind::Memory => Ok(Arc::new(InMemoryKvCache::new())),
        CacheBackendKind::Lmdb => {
            std::fs::create_dir_all(&config.lmdb_path).map_err(|e| {
                ApiError::internal_error(format!(
                    "Failed to create LMDB directory {}: {}",
                    config.lmdb_path.display(),
                    e
                ))
            })?;
            tracing::info!(path = %config.lmdb_path.display(), "Using LMDB cache");
            Ok(Arc::new(LmdbKvCache::new(&config.lmdb_path, config.lmdb_max_size_mb)?))
        }
    }
}

/// Build the application state: schema, backends and configuration.
pub fn build_app_state(config: ApiConfig) -> ApiResult<AppState> {
    let store = build_store(&config)?;
    let cache = build_cache(&config)?;
    let schema = build_schema(&config);
    Ok(AppState::new(schema, store, cache, config))
}
