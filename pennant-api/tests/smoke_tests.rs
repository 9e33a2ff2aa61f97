//! Smoke tests against a live PostgreSQL database.
//!
//! Run with `--features db-tests` and the `PENNANT_DB_*` variables pointing at
//! a database holding the campaign tables.

#[cfg(feature = "db-tests")]
mod db {
    use std::sync::Arc;

    use async_graphql::Request;
    use pennant_api::{
        build_schema, execute_request, ApiConfig, ApiResult, DbConfig, PgRecordStore,
        STATS_EXTENSION,
    };
    use pennant_core::{EntityId, EntityKind};
    use pennant_storage::{InMemoryKvCache, RecordStore};

    fn test_store() -> ApiResult<PgRecordStore> {
        PgRecordStore::from_config(&DbConfig::from_env()?)
    }

    #[tokio::test]
    async fn smoke_test_listing_and_batch_lookup() -> ApiResult<()> {
        let store = test_store()?;

        let ids = store
            .list_ids(EntityKind::Campaign, 5)
            .await
            .map_err(pennant_core::PennantError::from)?;
        let rows = store
            .find_many(EntityKind::Campaign, &ids)
            .await
            .map_err(pennant_core::PennantError::from)?;
        assert_eq!(rows.len(), ids.len());

        let listing = store
            .campaign_event_ids_many(&ids, 2)
            .await
            .map_err(pennant_core::PennantError::from)?;
        assert!(listing.keys().all(|id| ids.contains(id)));
        assert!(listing.values().all(|events| events.len() <= 2));

        let missing = store
            .find_one(EntityKind::Campaign, &EntityId::from(i64::MAX))
            .await
            .map_err(pennant_core::PennantError::from)?;
        assert!(missing.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn smoke_test_graphql_over_postgres() -> ApiResult<()> {
        let config = ApiConfig::default();
        let schema = build_schema(&config);
        let response = execute_request(
            &schema,
            Arc::new(test_store()?),
            Arc::new(InMemoryKvCache::new()),
            &config,
            Request::new("{ campaigns(first: 3) { id title events { id } } }"),
        )
        .await;

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert!(response.extensions.contains_key(STATS_EXTENSION));
        Ok(())
    }
}
