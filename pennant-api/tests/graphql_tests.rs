//! GraphQL execution tests against the in-memory store and cache.

use std::sync::Arc;
use std::time::Duration;

use async_graphql::{Request, Response, Value};
use pennant_api::{
    build_schema, decode_ftv1, execute_request, ApiConfig, FTV1_EXTENSION, STATS_EXTENSION,
};
use pennant_storage::{InMemoryKvCache, InMemoryRecordStore, StatsSnapshot};
use pennant_test_utils::assert_stats;
use pennant_test_utils::fixtures::{catalogue_store, launch_store};
use serde_json::json;

type TestResult = Result<(), Box<dyn std::error::Error>>;

struct Harness {
    store: Arc<InMemoryRecordStore>,
    cache: Arc<InMemoryKvCache>,
    config: ApiConfig,
}

impl Harness {
    fn new(store: InMemoryRecordStore) -> Self {
        Self {
            store: Arc::new(store),
            cache: Arc::new(InMemoryKvCache::new()),
            config: ApiConfig::default().with_tracing(false),
        }
    }

    fn with_config(mut self, config: ApiConfig) -> Self {
        self.config = config;
        self
    }

    async fn run(&self, query: &str) -> Response {
        let schema = build_schema(&self.config);
        execute_request(
            &schema,
            self.store.clone(),
            self.cache.clone(),
            &self.config,
            Request::new(query),
        )
        .await
    }
}

fn stats_of(response: &Response) -> Result<StatsSnapshot, Box<dyn std::error::Error>> {
    let value = response
        .extensions
        .get(STATS_EXTENSION)
        .cloned()
        .ok_or("missing dataFetchingStats extension")?;
    Ok(serde_json::from_value(value.into_json()?)?)
}

fn data_of(response: &Response) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    Ok(response.data.clone().into_json()?)
}

fn error_code(response: &Response, index: usize) -> Option<Value> {
    response
        .errors
        .get(index)
        .and_then(|e| e.extensions.as_ref())
        .and_then(|ext| ext.get("code"))
        .cloned()
}

#[tokio::test]
async fn hello_touches_nothing() -> TestResult {
    let harness = Harness::new(launch_store());
    let response = harness.run("{ hello }").await;

    assert!(response.errors.is_empty());
    assert_eq!(data_of(&response)?, json!({ "hello": "Hello!" }));
    assert_eq!(stats_of(&response)?, StatsSnapshot::new(0, 0, 0));
    Ok(())
}

#[tokio::test]
async fn campaign_lookup_is_cached_across_requests() -> TestResult {
    let harness = Harness::new(launch_store());
    let query = r#"{ campaign(id: "42") { id title } }"#;

    let cold = harness.run(query).await;
    assert_eq!(
        data_of(&cold)?,
        json!({ "campaign": { "id": "42", "title": "Launch" } })
    );
    assert_eq!(stats_of(&cold)?, StatsSnapshot::new(1, 1, 1));

    // Stats are per request; the cache is not.
    let warm = harness.run(query).await;
    assert_eq!(data_of(&warm)?, data_of(&cold)?);
    assert_eq!(stats_of(&warm)?, StatsSnapshot::new(0, 1, 0));
    assert_eq!(harness.store.find_one_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn missing_campaign_is_null_and_not_cached() -> TestResult {
    let harness = Harness::new(launch_store());
    let query = r#"{ campaign(id: "7") { title } }"#;

    for _ in 0..2 {
        let response = harness.run(query).await;
        assert!(response.errors.is_empty());
        assert_eq!(data_of(&response)?, json!({ "campaign": null }));
        assert_eq!(stats_of(&response)?, StatsSnapshot::new(1, 1, 0));
    }
    assert!(harness.cache.is_empty());
    Ok(())
}

#[tokio::test]
async fn nested_fields_are_batched_per_entity_type() -> TestResult {
    let harness = Harness::new(catalogue_store(4));
    let query = "{ campaigns(first: 4) { id brand { name } events { id title } } }";

    let response = harness.run(query).await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);

    let data = data_of(&response)?;
    let campaigns = data["campaigns"].as_array().ok_or("campaigns is not a list")?;
    assert_eq!(campaigns.len(), 4);
    assert_eq!(campaigns[0]["brand"]["name"], "Globex");
    assert_eq!(campaigns[1]["brand"]["name"], "Acme");
    assert_eq!(
        campaigns[2]["events"],
        json!([
            { "id": "301", "title": "Event 301" },
            { "id": "302", "title": "Event 302" },
            { "id": "303", "title": "Event 303" },
        ])
    );

    // list ids + campaign batch + one event id listing + event batch + brand batch
    assert_stats(stats_of(&response)?, 5, 3, 3);
    assert_eq!(harness.store.find_many_calls(), 3);
    assert_eq!(harness.store.event_listing_calls(), 1);
    assert_eq!(harness.store.find_one_calls(), 0);

    // Listings are not cached; entities are.
    let warm = harness.run(query).await;
    assert_eq!(data_of(&warm)?, data);
    assert_stats(stats_of(&warm)?, 2, 3, 0);
    assert_eq!(harness.store.find_many_calls(), 3);
    assert_eq!(harness.store.event_listing_calls(), 2);
    Ok(())
}

#[tokio::test]
async fn event_and_brand_lookups_share_request_loaders() -> TestResult {
    let harness = Harness::new(catalogue_store(2));
    let query = r#"{
        a: event(id: "101") { title }
        b: event(id: "201") { title }
        c: event(id: "101") { title }
        missing: event(id: "999") { title }
        brand(id: "2") { name }
    }"#;

    let response = harness.run(query).await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        data_of(&response)?,
        json!({
            "a": { "title": "Event 101" },
            "b": { "title": "Event 201" },
            "c": { "title": "Event 101" },
            "missing": null,
            "brand": { "name": "Globex" },
        })
    );
    // One batch per loader.
    assert_eq!(stats_of(&response)?, StatsSnapshot::new(2, 2, 2));
    Ok(())
}

#[tokio::test]
async fn store_failure_is_a_field_error() -> TestResult {
    let harness = Harness::new(launch_store());
    harness.store.set_failing(true);

    let response = harness.run(r#"{ hello campaign(id: "42") { title } }"#).await;

    assert_eq!(
        data_of(&response)?,
        json!({ "hello": "Hello!", "campaign": null })
    );
    assert_eq!(response.errors.len(), 1);
    assert_eq!(error_code(&response, 0), Some(Value::from("DATABASE_ERROR")));
    assert_eq!(stats_of(&response)?, StatsSnapshot::new(1, 1, 0));
    Ok(())
}

#[tokio::test]
async fn negative_page_size_is_rejected() -> TestResult {
    let harness = Harness::new(catalogue_store(1));
    let response = harness.run("{ campaigns(first: -1) { id } }").await;

    assert_eq!(error_code(&response, 0), Some(Value::from("INVALID_INPUT")));
    assert_eq!(stats_of(&response)?, StatsSnapshot::new(0, 0, 0));
    Ok(())
}

#[tokio::test]
async fn slow_store_times_out_the_request() -> TestResult {
    let store = launch_store();
    store.set_latency(Duration::from_secs(5));
    let harness = Harness::new(store).with_config(
        ApiConfig::default()
            .with_tracing(false)
            .with_request_timeout(Duration::from_millis(50)),
    );

    let response = harness.run(r#"{ campaign(id: "42") { title } }"#).await;

    assert_eq!(response.errors.len(), 1);
    assert_eq!(error_code(&response, 0), Some(Value::from("TIMEOUT")));
    assert_eq!(data_of(&response)?, serde_json::Value::Null);
    // The abandoned lookup never reached the cache write.
    assert!(harness.cache.is_empty());
    Ok(())
}

#[tokio::test]
async fn resolver_trace_is_attached_when_enabled() -> TestResult {
    let harness =
        Harness::new(catalogue_store(2)).with_config(ApiConfig::default().with_tracing(true));

    let response = harness.run("{ campaigns(first: 2) { title events { id } } }").await;
    assert!(response.errors.is_empty());

    let Some(Value::String(encoded)) = response.extensions.get(FTV1_EXTENSION) else {
        return Err("missing ftv1 extension".into());
    };
    let trace = decode_ftv1(encoded)?;
    let root = trace.root.ok_or("trace has no root")?;

    let campaigns = root.child_named("campaigns").ok_or("no campaigns node")?;
    assert_eq!(campaigns.r#type, "[Campaign!]!");
    assert_eq!(campaigns.child.len(), 2);

    let events = campaigns
        .child_at(1)
        .and_then(|c| c.child_named("events"))
        .ok_or("no campaigns.1.events node")?;
    assert_eq!(events.parent_type, "Campaign");
    assert!(events.start_time <= events.end_time);

    // Stats are reported alongside the trace.
    assert!(response.extensions.contains_key(STATS_EXTENSION));
    Ok(())
}

#[tokio::test]
async fn trace_is_absent_when_disabled() {
    let harness = Harness::new(launch_store());
    let response = harness.run("{ hello }").await;
    assert!(!response.extensions.contains_key(FTV1_EXTENSION));
}
