//! Shared application state for Axum routers.

use std::sync::Arc;

use pennant_storage::{KvCache, RecordStore};

use crate::config::ApiConfig;
use crate::routes::graphql::PennantSchema;

/// The record store every repository falls back to.
pub type SharedStore = Arc<dyn RecordStore>;

/// The key-value cache shared by every request.
pub type SharedCache = Arc<dyn KvCache>;

/// Application-wide state shared across all routes.
///
/// Only process-wide things live here. Stats, repositories and loaders are
/// built per request from these parts (see [`crate::context::RequestContext`]).
#[derive(Clone)]
pub struct AppState {
    pub graphql_schema: PennantSchema,
    pub store: SharedStore,
    pub cache: SharedCache,
    pub config: Arc<ApiConfig>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        graphql_schema: PennantSchema,
        store: SharedStore,
        cache: SharedCache,
        config: ApiConfig,
    ) -> Self {
        Self {
            graphql_schema,
            store,
            cache,
            config: Arc::new(config),
            start_time: std::time::Instant::now(),
        }
    }
}

// Use macro to reduce boilerplate for FromRef implementations
crate::impl_from_ref!(PennantSchema, graphql_schema);
crate::impl_from_ref!(SharedStore, store);
crate::impl_from_ref!(SharedCache, cache);
crate::impl_from_ref!(Arc<ApiConfig>, config);
crate::impl_from_ref!(std::time::Instant, start_time);
