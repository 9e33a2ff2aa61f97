//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling with deadpool-postgres, and the
//! [`PgRecordStore`] that serves repository misses from the campaign tables.
//!
//! Every query has exactly one round trip. Ids are text at the API edge and
//! `bigint` in the tables; an id that is not a number cannot name a row, so
//! it is reported absent without touching the database.

use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use pennant_core::settings::{env_setting, parse_setting};
use pennant_core::{
    BrandRow, CampaignRow, ConfigError, EntityId, EntityKind, EventRow, StoreError, StoreRow,
};
use pennant_storage::RecordStore;
use std::collections::HashMap;
use std::time::Duration;
use tokio_postgres::{NoTls, Row};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "pennant".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_settings(env_setting)
    }

    /// Same as [`DbConfig::from_env`], reading settings through `lookup`.
    pub fn from_settings(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: lookup("PENNANT_DB_HOST").unwrap_or(defaults.host),
            port: parse_setting("PENNANT_DB_PORT", lookup("PENNANT_DB_PORT"))?.unwrap_or(defaults.port),
            dbname: lookup("PENNANT_DB_NAME").unwrap_or(defaults.dbname),
            user: lookup("PENNANT_DB_USER").unwrap_or(defaults.user),
            password: lookup("PENNANT_DB_PASSWORD").unwrap_or(defaults.password),
            max_size: parse_setting("PENNANT_DB_POOL_SIZE", lookup("PENNANT_DB_POOL_SIZE"))?
                .unwrap_or(defaults.max_size),
            timeout: parse_setting::<u64>("PENNANT_DB_TIMEOUT", lookup("PENNANT_DB_TIMEOUT"))?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(self.max_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// QUERIES
// ============================================================================

const CAMPAIGN_COLUMNS: &str = "id::bigint, brand_id::bigint, title, body";
const EVENT_COLUMNS: &str = "id::bigint, title, body";
const BRAND_COLUMNS: &str = "id::bigint, name";

fn table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Campaign => "campaigns_campaign",
        EntityKind::Event => "campaigns_event",
        EntityKind::Brand => "campaigns_brand",
    }
}

fn columns(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Campaign => CAMPAIGN_COLUMNS,
        EntityKind::Event => EVENT_COLUMNS,
        EntityKind::Brand => BRAND_COLUMNS,
    }
}

fn select_one_sql(kind: EntityKind) -> String {
    format!(
        "SELECT {} FROM {} WHERE id = $1::bigint",
        columns(kind),
        table(kind)
    )
}

fn select_many_sql(kind: EntityKind) -> String {
    format!(
        "SELECT {} FROM {} WHERE id = ANY($1::bigint[])",
        columns(kind),
        table(kind)
    )
}

fn list_ids_sql(kind: EntityKind) -> String {
    format!("SELECT id::bigint FROM {} ORDER BY id LIMIT $1", table(kind))
}

/// First `$2` event ids of every campaign in `$1`, one round trip for all.
const CAMPAIGN_EVENT_IDS_SQL: &str = "SELECT campaign_id::bigint, event_id::bigint FROM ( \
     SELECT campaign_id, event_id, \
     row_number() OVER (PARTITION BY campaign_id ORDER BY event_id) AS ord \
     FROM campaigns_campaign_events WHERE campaign_id = ANY($1::bigint[]) \
     ) ranked WHERE ord <= $2 ORDER BY campaign_id, event_id";

// ============================================================================
// RECORD STORE
// ============================================================================

/// Record store over the campaign tables.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: Pool,
}

impl PgRecordStore {
    /// Create a new store with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new store from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, StoreError> {
        self.pool.get().await.map_err(|e| StoreError::Connection {
            reason: e.to_string(),
        })
    }
}

fn query_failed(kind: EntityKind, err: tokio_postgres::Error) -> StoreError {
    tracing::debug!(entity = %kind, error = ?err, "Query failed");
    StoreError::QueryFailed {
        kind,
        reason: err.to_string(),
    }
}

fn decode_row(kind: EntityKind, row: &Row) -> Result<StoreRow, StoreError> {
    let decode_err = |e: tokio_postgres::Error| StoreError::RowDecode {
        kind,
        reason: e.to_string(),
    };

    let store_row = match kind {
        EntityKind::Campaign => StoreRow::Campaign(CampaignRow {
            id: row.try_get(0).map_err(decode_err)?,
            brand_id: row.try_get(1).map_err(decode_err)?,
            title: row.try_get(2).map_err(decode_err)?,
            body: row.try_get(3).map_err(decode_err)?,
        }),
        EntityKind::Event => StoreRow::Event(EventRow {
            id: row.try_get(0).map_err(decode_err)?,
            title: row.try_get(1).map_err(decode_err)?,
            body: row.try_get(2).map_err(decode_err)?,
        }),
        EntityKind::Brand => StoreRow::Brand(BrandRow {
            id: row.try_get(0).map_err(decode_err)?,
            name: row.try_get(1).map_err(decode_err)?,
        }),
    };
    Ok(store_row)
}

fn decode_ids(kind: EntityKind, rows: &[Row]) -> Result<Vec<EntityId>, StoreError> {
    rows.iter()
        .map(|row| {
            row.try_get::<_, i64>(0)
                .map(EntityId::from)
                .map_err(|e| StoreError::RowDecode {
                    kind,
                    reason: e.to_string(),
                })
        })
        .collect()
}

fn decode_link(row: &Row) -> Result<(i64, i64), StoreError> {
    let decode_err = |e: tokio_postgres::Error| StoreError::RowDecode {
        kind: EntityKind::Event,
        reason: e.to_string(),
    };
    Ok((
        row.try_get(0).map_err(decode_err)?,
        row.try_get(1).map_err(decode_err)?,
    ))
}

/// `LIMIT` takes a bigint; saturate rather than wrap.
fn limit_param(first: usize) -> i64 {
    i64::try_from(first).unwrap_or(i64::MAX)
}

/// Numeric ids, deduplicated in first-seen order.
fn numeric_ids(ids: &[EntityId]) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .filter_map(EntityId::as_i64)
        .filter(|id| seen.insert(*id))
        .collect()
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find_one(&self, kind: EntityKind, id: &EntityId) -> Result<Option<StoreRow>, StoreError> {
        let Some(numeric) = id.as_i64() else {
            return Ok(None);
        };

        let client = self.client().await?;
        let row = client
            .query_opt(&select_one_sql(kind), &[&numeric])
            .await
            .map_err(|e| query_failed(kind, e))?;

        row.map(|r| decode_row(kind, &r)).transpose()
    }

    async fn find_many(&self, kind: EntityKind, ids: &[EntityId]) -> Result<Vec<StoreRow>, StoreError> {
        let numeric = numeric_ids(ids);
        if numeric.is_empty() {
            return Ok(Vec::new());
        }

        let client = self.client().await?;
        let rows = client
            .query(&select_many_sql(kind), &[&numeric])
            .await
            .map_err(|e| query_failed(kind, e))?;

        rows.iter().map(|r| decode_row(kind, r)).collect()
    }

    async fn list_ids(&self, kind: EntityKind, first: usize) -> Result<Vec<EntityId>, StoreError> {
        let client = self.client().await?;
        let rows = client
            .query(&list_ids_sql(kind), &[&limit_param(first)])
            .await
            .map_err(|e| query_failed(kind, e))?;

        decode_ids(kind, &rows)
    }

    async fn campaign_event_ids_many(
        &self,
        campaign_ids: &[EntityId],
        first: usize,
    ) -> Result<HashMap<EntityId, Vec<EntityId>>, StoreError> {
        let numeric = numeric_ids(campaign_ids);
        if numeric.is_empty() || first == 0 {
            return Ok(HashMap::new());
        }

        let client = self.client().await?;
        let rows = client
            .query(CAMPAIGN_EVENT_IDS_SQL, &[&numeric, &limit_param(first)])
            .await
            .map_err(|e| query_failed(EntityKind::Event, e))?;

        let mut listing: HashMap<EntityId, Vec<EntityId>> = HashMap::with_capacity(numeric.len());
        for row in &rows {
            let (campaign_id, event_id) = decode_link(row)?;
            listing
                .entry(EntityId::from(campaign_id))
                .or_default()
                .push(EntityId::from(event_id));
        }
        Ok(listing)
    }
}
