//! GraphQL API Routes
//!
//! - POST /graphql - execute a query
//! - GET /graphql - GraphiQL playground
//!
//! Every request gets its own [`RequestContext`]: a fresh stats collector,
//! repositories bound to it and one batch loader per entity type. When the
//! request finishes, the stats snapshot is attached to the response as the
//! `dataFetchingStats` extension.

use async_graphql::{
    ComplexObject, Context, EmptyMutation, EmptySubscription, ErrorExtensions, Object,
    Response, Result as GqlResult, Schema, ServerError, SimpleObject, Value, ID,
};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use pennant_core::{Brand, Campaign, EntityId, Event, PennantResult};
use pennant_storage::{BatchLoader, BatchSource};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::config::ApiConfig;
use crate::context::RequestContext;
use crate::error::{gql_error, ApiError};
use crate::state::{AppState, SharedCache, SharedStore};
use crate::telemetry::{RequestOutcome, METRICS};
use crate::tracing_ext::ResolverTracing;

/// Response extension carrying the request's fetch counters.
pub const STATS_EXTENSION: &str = "dataFetchingStats";

/// Page size for list fields when `first` is omitted.
const DEFAULT_PAGE_SIZE: i32 = 10;

// ============================================================================
// GRAPHQL TYPES
// ============================================================================

/// GraphQL event object.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "Event")]
pub struct GqlEvent {
    pub id: ID,
    pub title: String,
    pub body: String,
}

impl From<Event> for GqlEvent {
    fn from(e: Event) -> Self {
        Self {
            id: ID(e.id.into_inner()),
            title: e.title,
            body: e.body,
        }
    }
}

/// GraphQL brand object.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "Brand")]
pub struct GqlBrand {
    pub id: ID,
    pub name: String,
}

impl From<Brand> for GqlBrand {
    fn from(b: Brand) -> Self {
        Self {
            id: ID(b.id.into_inner()),
            name: b.name,
        }
    }
}

/// GraphQL campaign object.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "Campaign", complex)]
pub struct GqlCampaign {
    pub id: ID,
    pub title: String,
    pub body: String,
    #[graphql(skip)]
    pub brand_id: EntityId,
}

impl From<Campaign> for GqlCampaign {
    fn from(c: Campaign) -> Self {
        Self {
            id: ID(c.id.into_inner()),
            title: c.title,
            body: c.body,
            brand_id: c.brand_id,
        }
    }
}

#[ComplexObject]
impl GqlCampaign {
    /// The brand running this campaign.
    async fn brand(&self, ctx: &Context<'_>) -> GqlResult<Option<GqlBrand>> {
        let request = ctx.data::<Arc<RequestContext>>()?;
        let brand = request
            .brand_loader
            .load(self.brand_id.clone())
            .await
            .map_err(gql_error)?;
        Ok(brand.map(Into::into))
    }

    /// Events attached to this campaign, by ascending id.
    async fn events(
        &self,
        ctx: &Context<'_>,
        #[graphql(default_with = "DEFAULT_PAGE_SIZE")] first: i32,
    ) -> GqlResult<Vec<GqlEvent>> {
        let first = page_size(first)?;
        let request = ctx.data::<Arc<RequestContext>>()?;

        let ids = load_owned(
            request.campaign_event_ids_loader(first),
            EntityId::new(self.id.as_str()),
        )
        .await
            .map_err(gql_error)?
            .unwrap_or_default();
        let events = request
            .event_loader
            .load_many(&ids)
            .await
            .map_err(gql_error)?;

        Ok(events.into_iter().flatten().map(Into::into).collect())
    }
}

/// Await a load on an owned loader. Being generic over the source keeps the
/// loader type out of the resolver future, so its `Send` check does not have to
/// re-prove the source's `'static` bounds.
fn load_owned<B: BatchSource>(
    loader: BatchLoader<B>,
    id: EntityId,
) -> impl Future<Output = PennantResult<Option<B::Value>>> + Send {
    async move { loader.load(id).await }
}

fn page_size(first: i32) -> GqlResult<usize> {
    usize::try_from(first)
        .map_err(|_| ApiError::invalid_input("first must not be negative").extend())
}

// ============================================================================
// QUERY ROOT
// ============================================================================

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn hello(&self) -> &'static str {
        "Hello!"
    }

    /// Get a campaign by ID.
    async fn campaign(&self, ctx: &Context<'_>, id: ID) -> GqlResult<Option<GqlCampaign>> {
        let request = ctx.data::<Arc<RequestContext>>()?;
        let campaign = request
            .campaigns
            .get_campaign_by_id(&EntityId::new(id.0))
            .await
            .map_err(gql_error)?;
        Ok(campaign.map(Into::into))
    }

    /// The first campaigns by ascending id.
    async fn campaigns(
        &self,
        ctx: &Context<'_>,
        #[graphql(default_with = "DEFAULT_PAGE_SIZE")] first: i32,
    ) -> GqlResult<Vec<GqlCampaign>> {
        let first = page_size(first)?;
        let request = ctx.data::<Arc<RequestContext>>()?;
        let campaigns = request
            .campaigns
            .get_campaigns(first)
            .await
            .map_err(gql_error)?;
        Ok(campaigns.into_iter().map(Into::into).collect())
    }

    /// Get an event by ID.
    async fn event(&self, ctx: &Context<'_>, id: ID) -> GqlResult<Option<GqlEvent>> {
        let request = ctx.data::<Arc<RequestContext>>()?;
        let event = request
            .event_loader
            .load(EntityId::new(id.0))
            .await
            .map_err(gql_error)?;
        Ok(event.map(Into::into))
    }

    /// Get a brand by ID.
    async fn brand(&self, ctx: &Context<'_>, id: ID) -> GqlResult<Option<GqlBrand>> {
        let request = ctx.data::<Arc<RequestContext>>()?;
        let brand = request
            .brand_loader
            .load(EntityId::new(id.0))
            .await
            .map_err(gql_error)?;
        Ok(brand.map(Into::into))
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub type PennantSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

/// Build the schema, with resolver tracing when enabled.
pub fn build_schema(config: &ApiConfig) -> PennantSchema {
    let builder = Schema::build(QueryRoot, EmptyMutation, EmptySubscription);
    if config.tracing_enabled {
        builder.extension(ResolverTracing).finish()
    } else {
        builder.finish()
    }
}

/// Execute one GraphQL request with its own data access context.
///
/// The whole execution is bounded by `config.request_timeout`. On expiry
/// every loader of the request is cancelled and a single `TIMEOUT` error is
/// returned.
pub async fn execute_request(
    schema: &PennantSchema,
    store: SharedStore,
    cache: SharedCache,
    config: &ApiConfig,
    request: async_graphql::Request,
) -> Response {
    let started = Instant::now();
    let context = Arc::new(RequestContext::new(store, cache, config));
    let request = request.data(Arc::clone(&context));

    let (response, outcome) =
        match tokio::time::timeout(config.request_timeout, schema.execute(request)).await {
            Ok(response) if response.is_ok() => (response, RequestOutcome::Ok),
            Ok(response) => (response, RequestOutcome::Error),
            Err(_) => {
                context.cancel();
                tracing::warn!(
                    timeout_ms = config.request_timeout.as_millis() as u64,
                    "GraphQL request timed out"
                );
                (timeout_response(), RequestOutcome::Timeout)
            }
        };

    let stats = context.snapshot();
    tracing::debug!(
        sql_calls = stats.sql_calls,
        cache_gets = stats.cache_gets,
        cache_sets = stats.cache_sets,
        outcome = outcome.as_label(),
        "GraphQL request finished"
    );
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_request(outcome, &stats, started.elapsed());
    }

    match serde_json::to_value(stats).and_then(Value::from_json) {
        Ok(value) => response.extension(STATS_EXTENSION, value),
        Err(e) => {
            tracing::warn!(error = %e, "Could not encode data fetching stats");
            response
        }
    }
}

fn timeout_response() -> Response {
    let error = ApiError::timeout("graphql").extend();
    let mut server_error = ServerError::new(error.message, None);
    server_error.extensions = error.extensions;
    Response::from_errors(vec![server_error])
}

// ============================================================================
// HANDLERS
// ============================================================================

/// Handler for GraphQL requests.
pub async fn graphql_handler(
    State(schema): State<PennantSchema>,
    State(store): State<SharedStore>,
    State(cache): State<SharedCache>,
    State(config): State<Arc<ApiConfig>>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    execute_request(&schema, store, cache, &config, req.into_inner())
        .await
        .into()
}

/// Handler for GraphiQL playground.
pub async fn graphiql_handler() -> impl IntoResponse {
    Html(
        async_graphql::http::GraphiQLSource::build()
            .endpoint("/graphql")
            .finish(),
    )
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

/// Create the GraphQL router.
pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(graphiql_handler).post(graphql_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_rejects_negative() {
        assert_eq!(page_size(DEFAULT_PAGE_SIZE).ok(), Some(10));
        assert_eq!(page_size(0).ok(), Some(0));

        let err = page_size(-1).err();
        let code = err
            .and_then(|e| e.extensions)
            .and_then(|ext| ext.get("code").cloned());
        assert_eq!(code, Some(Value::from("INVALID_INPUT")));
    }

    #[test]
    fn test_schema_sdl_exposes_read_api() {
        let sdl = build_schema(&ApiConfig::default()).sdl();
        for field in [
            "hello: String!",
            "campaign(id: ID!): Campaign",
            "campaigns(first: Int! = 10): [Campaign!]!",
            "events(first: Int! = 10): [Event!]!",
            "brand: Brand",
        ] {
            assert!(sdl.contains(field), "missing `{}` in schema", field);
        }
        assert!(!sdl.contains("brandId"));
    }

    #[test]
    fn test_timeout_response_has_code() {
        let response = timeout_response();
        assert_eq!(response.errors.len(), 1);
        let code = response.errors[0]
            .extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .cloned();
        assert_eq!(code, Some(Value::from("TIMEOUT")));
    }
}
