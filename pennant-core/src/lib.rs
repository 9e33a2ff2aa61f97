//! Pennant Core - Entity Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! Entities are immutable snapshots of store rows; rows are the shape the
//! relational store hands back before conversion.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
pub mod settings;

pub use error::{CacheError, ConfigError, ConversionError, PennantError, PennantResult, StoreError};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Identifier of an entity as exposed through the API.
///
/// The relational store uses integer keys while GraphQL speaks string IDs,
/// so the identifier is carried as a string and parsed on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric form of the id, if it has one.
    pub fn as_i64(&self) -> Option<i64> {
        self.0.trim().parse().ok()
    }

    /// The form used for cache keys and store lookups: numeric ids in plain
    /// decimal (`"007"` and `" 7"` both become `"7"`), anything else as is.
    pub fn canonical(&self) -> EntityId {
        match self.as_i64() {
            Some(n) => EntityId::from(n),
            None => self.clone(),
        }
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Entity type discriminator.
///
/// Closed set: every kind the store can return has exactly one entity type
/// and one cache tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Campaign,
    Event,
    Brand,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Campaign, EntityKind::Event, EntityKind::Brand];

    /// Fixed tag used as the type component of cache keys.
    pub const fn type_tag(self) -> &'static str {
        match self {
            EntityKind::Campaign => "Campaign",
            EntityKind::Event => "Event",
            EntityKind::Brand => "Brand",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_tag())
    }
}

// ============================================================================
// ENTITIES
// ============================================================================

/// A brand that owns campaigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub id: EntityId,
    pub name: String,
}

/// An event attached to one or more campaigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EntityId,
    pub title: String,
    pub body: String,
}

/// A marketing campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: EntityId,
    pub brand_id: EntityId,
    pub title: String,
    pub body: String,
}

// ============================================================================
// STORE ROWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrandRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub id: i64,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignRow {
    pub id: i64,
    pub brand_id: i64,
    pub title: String,
    pub body: String,
}

/// A row as returned by the record store, tagged with the table it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreRow {
    Campaign(CampaignRow),
    Event(EventRow),
    Brand(BrandRow),
}

impl StoreRow {
    pub fn kind(&self) -> EntityKind {
        match self {
            StoreRow::Campaign(_) => EntityKind::Campaign,
            StoreRow::Event(_) => EntityKind::Event,
            StoreRow::Brand(_) => EntityKind::Brand,
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            StoreRow::Campaign(row) => row.id.into(),
            StoreRow::Event(row) => row.id.into(),
            StoreRow::Brand(row) => row.id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_numeric_parsing() {
        assert_eq!(EntityId::from(42).as_i64(), Some(42));
        assert_eq!(EntityId::from("17").as_i64(), Some(17));
        assert_eq!(EntityId::from("abc").as_i64(), None);
        assert_eq!(EntityId::from(42).to_string(), "42");
    }

    #[test]
    fn test_canonical_id_collapses_numeric_spellings() {
        for raw in ["007", " 7", "7", "+7"] {
            assert_eq!(EntityId::from(raw).canonical(), EntityId::from(7));
        }
        assert_eq!(EntityId::from("abc").canonical(), EntityId::from("abc"));
    }

    #[test]
    fn test_entity_id_serializes_as_plain_string() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&EntityId::from("7"))?;
        assert_eq!(json, "\"7\"");
        Ok(())
    }

    #[test]
    fn test_type_tags_are_distinct() {
        let tags: std::collections::HashSet<_> =
            EntityKind::ALL.iter().map(|k| k.type_tag()).collect();
        assert_eq!(tags.len(), EntityKind::ALL.len());
    }

    #[test]
    fn test_store_row_kind_and_id() {
        let row = StoreRow::Event(EventRow {
            id: 9,
            title: "Kickoff".to_string(),
            body: "".to_string(),
        });
        assert_eq!(row.kind(), EntityKind::Event);
        assert_eq!(row.id(), EntityId::from(9));
    }
}
