//! Repositories for the campaign domain.

use std::collections::HashSet;

use async_trait::async_trait;
use pennant_core::{Brand, Campaign, EntityId, EntityKind, Event, PennantResult};

use crate::loader::BatchSource;
use crate::repository::CacheRepository;
use crate::traits::{KvCache, RecordStore};

pub type CampaignRepository<S = dyn RecordStore, C = dyn KvCache> = CacheRepository<Campaign, S, C>;
pub type EventRepository<S = dyn RecordStore, C = dyn KvCache> = CacheRepository<Event, S, C>;
pub type BrandRepository<S = dyn RecordStore, C = dyn KvCache> = CacheRepository<Brand, S, C>;

impl<S, C> CacheRepository<Campaign, S, C>
where
    S: RecordStore + ?Sized,
    C: KvCache + ?Sized,
{
    pub async fn get_campaign_by_id(&self, id: &EntityId) -> PennantResult<Option<Campaign>> {
        self.get_by_id(id).await
    }

    /// The first `first` campaigns by id: one listing query, then the batch
    /// path. Campaigns deleted between the two calls are skipped.
    pub async fn get_campaigns(&self, first: usize) -> PennantResult<Vec<Campaign>> {
        self.stats().record_sql_call();
        let ids = self.store().list_ids(EntityKind::Campaign, first).await?;

        let campaigns = self.get_batch_by_ids(&ids).await?;
        Ok(campaigns.into_iter().flatten().collect())
    }
}

impl<S, C> CacheRepository<Event, S, C>
where
    S: RecordStore + ?Sized,
    C: KvCache + ?Sized,
{
    pub async fn get_event_by_id(&self, id: &EntityId) -> PennantResult<Option<Event>> {
        self.get_by_id(id).await
    }

    pub async fn get_events_batch(&self, ids: &[EntityId]) -> PennantResult<Vec<Option<Event>>> {
        self.get_batch_by_ids(ids).await
    }

    /// Event ids of many campaigns with one store call: ascending, at most
    /// `first` each. Aligned with `campaign_ids`; unknown campaigns get an
    /// empty list.
    pub async fn event_ids_for_campaigns(
        &self,
        campaign_ids: &[EntityId],
        first: usize,
    ) -> PennantResult<Vec<Vec<EntityId>>> {
        if campaign_ids.is_empty() {
            return Ok(Vec::new());
        }

        let canonical: Vec<EntityId> = campaign_ids.iter().map(EntityId::canonical).collect();
        let mut seen = HashSet::new();
        let unique: Vec<EntityId> = canonical
            .iter()
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect();

        self.stats().record_sql_call();
        let listing = self
            .store()
            .campaign_event_ids_many(&unique, first)
            .await
            .map_err(|e| {
                tracing::error!(campaigns = unique.len(), error = %e, "Campaign event listing failed");
                e
            })?;

        Ok(canonical
            .iter()
            .map(|id| {
                let mut ids = listing.get(id).cloned().unwrap_or_default();
                ids.truncate(first);
                ids
            })
            .collect())
    }
}

/// Batch source resolving a campaign id to its first `first` event ids.
///
/// One loader per distinct `first`: the page size is part of the query, not
/// of the key.
pub struct CampaignEventIds<S = dyn RecordStore, C = dyn KvCache>
where
    S: RecordStore + ?Sized,
    C: KvCache + ?Sized,
{
    events: EventRepository<S, C>,
    first: usize,
}

impl<S, C> CampaignEventIds<S, C>
where
    S: RecordStore + ?Sized,
    C: KvCache + ?Sized,
{
    pub fn new(events: EventRepository<S, C>, first: usize) -> Self {
        Self { events, first }
    }
}

#[async_trait]
impl<S, C> BatchSource for CampaignEventIds<S, C>
where
    S: RecordStore + ?Sized + 'static,
    C: KvCache + ?Sized + 'static,
{
    type Value = Vec<EntityId>;

    async fn fetch_batch(&self, ids: &[EntityId]) -> PennantResult<Vec<Option<Vec<EntityId>>>> {
        let lists = self.events.event_ids_for_campaigns(ids, self.first).await?;
        Ok(lists.into_iter().map(Some).collect())
    }
}

impl<S, C> CacheRepository<Brand, S, C>
where
    S: RecordStore + ?Sized,
    C: KvCache + ?Sized,
{
    pub async fn get_brand_by_id(&self, id: &EntityId) -> PennantResult<Option<Brand>> {
        self.get_by_id(id).await
    }
}
