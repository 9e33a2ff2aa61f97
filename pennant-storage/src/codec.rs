//! Cache keys and the entity codec.
//!
//! Converts entities to and from their cached JSON form, and store rows into
//! entities. Cache payloads are best effort: anything that fails to decode is
//! reported as a miss, never as an error.

use std::fmt;

use pennant_core::{
    Brand, CacheError, Campaign, ConversionError, EntityId, EntityKind, Event, StoreRow,
};
use serde::{de::DeserializeOwned, Serialize};

/// Types the cache-aside repository can serve.
///
/// - `KIND` fixes the cache tag for the type, so keys of different entity
///   types can never collide on the same id.
/// - `from_row` is the only way a store row becomes an entity. Handing it a
///   row of another kind is a [`ConversionError`].
pub trait CachedEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &EntityId;

    fn from_row(row: StoreRow) -> Result<Self, ConversionError>;
}

fn mismatch(row: &StoreRow, target: EntityKind) -> ConversionError {
    ConversionError {
        row_kind: row.kind(),
        target,
    }
}

impl CachedEntity for Campaign {
    const KIND: EntityKind = EntityKind::Campaign;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn from_row(row: StoreRow) -> Result<Self, ConversionError> {
        match row {
            StoreRow::Campaign(row) => Ok(Campaign {
                id: row.id.into(),
                brand_id: row.brand_id.into(),
                title: row.title,
                body: row.body,
            }),
            other => Err(mismatch(&other, Self::KIND)),
        }
    }
}

impl CachedEntity for Event {
    const KIND: EntityKind = EntityKind::Event;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn from_row(row: StoreRow) -> Result<Self, ConversionError> {
        match row {
            StoreRow::Event(row) => Ok(Event {
                id: row.id.into(),
                title: row.title,
                body: row.body,
            }),
            other => Err(mismatch(&other, Self::KIND)),
        }
    }
}

impl CachedEntity for Brand {
    const KIND: EntityKind = EntityKind::Brand;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn from_row(row: StoreRow) -> Result<Self, ConversionError> {
        match row {
            StoreRow::Brand(row) => Ok(Brand {
                id: row.id.into(),
                name: row.name,
            }),
            other => Err(mismatch(&other, Self::KIND)),
        }
    }
}

// ============================================================================
// CACHE KEYS
// ============================================================================

/// A cache key of the form `{prefix}{Tag}-{id}`.
///
/// Keys can only be built from an entity type and an id, so the type tag is
/// always part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(kind: EntityKind, id: &EntityId) -> Self {
        Self::with_prefix("", kind, id)
    }

    pub fn with_prefix(prefix: &str, kind: EntityKind, id: &EntityId) -> Self {
        Self(format!("{}{}-{}", prefix, kind.type_tag(), id))
    }

    pub fn for_entity<E: CachedEntity>(prefix: &str, id: &EntityId) -> Self {
        Self::with_prefix(prefix, E::KIND, id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// PAYLOAD CODEC
// ============================================================================

/// Serialize an entity for the cache.
///
/// Field order follows the struct declaration, so the same entity always
/// produces the same bytes.
pub fn encode_for_cache<E: CachedEntity>(entity: &E) -> Result<Vec<u8>, CacheError> {
    serde_json::to_vec(entity).map_err(|e| CacheError::Serialization {
        reason: e.to_string(),
    })
}

/// Decode a cached payload. Absent, empty and undecodable payloads are all
/// `None`.
pub fn decode_cache_payload<E: CachedEntity>(raw: Option<&[u8]>) -> Option<E> {
    let bytes = raw.filter(|bytes| !bytes.is_empty())?;

    match serde_json::from_slice(bytes) {
        Ok(entity) => Some(entity),
        Err(e) => {
            tracing::warn!(
                entity = E::KIND.type_tag(),
                error = %e,
                "Discarding undecodable cache payload"
            );
            None
        }
    }
}

/// Convert a store row into an entity of type `E`.
pub fn from_store_row<E: CachedEntity>(row: StoreRow) -> Result<E, ConversionError> {
    E::from_row(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pennant_core::{BrandRow, CampaignRow, EventRow};

    fn campaign() -> Campaign {
        Campaign {
            id: EntityId::from("42"),
            brand_id: EntityId::from("7"),
            title: "Launch".to_string(),
            body: "Spring launch".to_string(),
        }
    }

    #[test]
    fn test_cache_key_format() {
        let key = CacheKey::for_entity::<Campaign>("", &EntityId::from("42"));
        assert_eq!(key.as_str(), "Campaign-42");

        let prefixed = CacheKey::with_prefix("v2:", EntityKind::Event, &EntityId::from(1));
        assert_eq!(prefixed.to_string(), "v2:Event-1");
    }

    #[test]
    fn test_cache_keys_differ_across_types_for_same_id() {
        let id = EntityId::from("1");
        let keys: std::collections::HashSet<_> = EntityKind::ALL
            .iter()
            .map(|kind| CacheKey::new(*kind, &id))
            .collect();
        assert_eq!(keys.len(), EntityKind::ALL.len());
    }

    #[test]
    fn test_encode_is_deterministic() -> Result<(), CacheError> {
        assert_eq!(encode_for_cache(&campaign())?, encode_for_cache(&campaign())?);
        Ok(())
    }

    #[test]
    fn test_decode_absent_and_empty() {
        assert_eq!(decode_cache_payload::<Campaign>(None), None);
        assert_eq!(decode_cache_payload::<Campaign>(Some(b"")), None);
    }

    #[test]
    fn test_decode_corrupt_payload_is_a_miss() {
        assert_eq!(decode_cache_payload::<Campaign>(Some(b"{not json")), None);
    }

    #[test]
    fn test_decode_schema_mismatch_is_a_miss() {
        // An Event payload does not carry a brand_id.
        let event = Event {
            id: EntityId::from("1"),
            title: "Kickoff".to_string(),
            body: "".to_string(),
        };
        let bytes = serde_json::to_vec(&event).expect("event serializes");
        assert_eq!(decode_cache_payload::<Campaign>(Some(&bytes)), None);
    }

    #[test]
    fn test_from_store_row_matching_kind() {
        let row = StoreRow::Campaign(CampaignRow {
            id: 42,
            brand_id: 7,
            title: "Launch".to_string(),
            body: "Spring launch".to_string(),
        });
        assert_eq!(from_store_row::<Campaign>(row), Ok(campaign()));

        let brand = from_store_row::<Brand>(StoreRow::Brand(BrandRow {
            id: 7,
            name: "Acme".to_string(),
        }));
        assert_eq!(brand.map(|b| b.name), Ok("Acme".to_string()));
    }

    #[test]
    fn test_from_store_row_wrong_kind_fails() {
        let row = StoreRow::Event(EventRow {
            id: 1,
            title: "Kickoff".to_string(),
            body: "".to_string(),
        });
        let err = from_store_row::<Campaign>(row).expect_err("event row is not a campaign");
        assert_eq!(err.row_kind, EntityKind::Event);
        assert_eq!(err.target, EntityKind::Campaign);
    }
}
