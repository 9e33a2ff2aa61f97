//! Pennant Test Utilities
//!
//! Shared test infrastructure for the Pennant workspace:
//! - Proptest generators for entities and id lists
//! - A small, fully linked in-memory catalogue
//! - Assertions on per-request fetch statistics

pub use pennant_core::{
    Brand, Campaign, EntityId, EntityKind, Event, PennantError, PennantResult, StoreRow,
};
pub use pennant_storage::{
    DataFetchingStats, InMemoryKvCache, InMemoryRecordStore, StatsSnapshot,
};

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Pennant entity types.

    use super::*;
    use proptest::prelude::*;

    /// Store-style numeric id.
    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        (1i64..1_000_000).prop_map(EntityId::from)
    }

    /// Short free text, including quotes and non-ASCII.
    pub fn arb_text() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            "[a-zA-Z0-9 ]{1,40}",
            "[\\PC]{1,40}",
        ]
    }

    pub fn arb_brand() -> impl Strategy<Value = Brand> {
        (arb_entity_id(), arb_text()).prop_map(|(id, name)| Brand { id, name })
    }

    pub fn arb_event() -> impl Strategy<Value = Event> {
        (arb_entity_id(), arb_text(), arb_text())
            .prop_map(|(id, title, body)| Event { id, title, body })
    }

    pub fn arb_campaign() -> impl Strategy<Value = Campaign> {
        (arb_entity_id(), arb_entity_id(), arb_text(), arb_text()).prop_map(
            |(id, brand_id, title, body)| Campaign {
                id,
                brand_id,
                title,
                body,
            },
        )
    }

    /// Id lists drawn from a small range so duplicates are common.
    pub fn arb_id_list(max_id: i64, max_len: usize) -> impl Strategy<Value = Vec<EntityId>> {
        prop::collection::vec((1..=max_id).prop_map(EntityId::from), 0..=max_len)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built stores for common scenarios.

    use super::*;

    /// Number of events linked to every catalogue campaign.
    pub const EVENTS_PER_CAMPAIGN: i64 = 3;

    /// Campaign 42, titled "Launch", with brand 1 and no events.
    pub fn launch_store() -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new();
        store.insert_brand(1, "Acme");
        store.insert_campaign(42, 1, "Launch", "Launch day");
        store
    }

    /// `campaigns` campaigns with ids `1..=campaigns`.
    ///
    /// Campaign `n` belongs to brand `n % 2 + 1` and owns events
    /// `n * 100 + 1 ..= n * 100 + EVENTS_PER_CAMPAIGN`.
    pub fn catalogue_store(campaigns: i64) -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new();
        store.insert_brand(1, "Acme");
        store.insert_brand(2, "Globex");

        for n in 1..=campaigns {
            store.insert_campaign(n, n % 2 + 1, format!("Campaign {}", n), format!("Body {}", n));
            for offset in 1..=EVENTS_PER_CAMPAIGN {
                let event_id = n * 100 + offset;
                store.insert_event(event_id, format!("Event {}", event_id), "");
                store.link_event(n, event_id);
            }
        }
        store
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

/// Assert the counters of a stats snapshot.
#[track_caller]
pub fn assert_stats(stats: StatsSnapshot, sql_calls: u64, cache_gets: u64, cache_sets: u64) {
    assert_eq!(
        stats,
        StatsSnapshot::new(sql_calls, cache_gets, cache_sets),
        "expected sql_calls={}, cache_gets={}, cache_sets={}",
        sql_calls,
        cache_gets,
        cache_sets
    );
}
