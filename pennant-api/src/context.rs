//! Per-request data access.
//!
//! A [`RequestContext`] is created for every GraphQL request and dropped when
//! the response is sent. It owns the request's stats collector, one
//! repository per entity type, and one batch loader per repository, plus
//! lazily created loaders for campaign event listings. All of them report to
//! the same stats collector, and all loaders share the request's
//! cancellation token and deadline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use pennant_storage::{
    BatchLoader, BrandRepository, CampaignEventIds, CampaignRepository, DataFetchingStats,
    EventRepository, LoaderConfig, StatsSnapshot,
};
use tokio_util::sync::CancellationToken;

use crate::config::ApiConfig;
use crate::state::{SharedCache, SharedStore};

pub struct RequestContext {
    pub stats: Arc<DataFetchingStats>,
    pub campaigns: CampaignRepository,
    pub events: EventRepository,
    pub brands: BrandRepository,
    pub campaign_loader: BatchLoader<CampaignRepository>,
    pub event_loader: BatchLoader<EventRepository>,
    pub brand_loader: BatchLoader<BrandRepository>,
    /// Event id listings, one loader per page size.
    event_id_loaders: Mutex<HashMap<usize, BatchLoader<CampaignEventIds>>>,
    loader_config: LoaderConfig,
    timeout: Duration,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(store: SharedStore, cache: SharedCache, config: &ApiConfig) -> Self {
        let stats = Arc::new(DataFetchingStats::new());
        let cancel = CancellationToken::new();

        let campaigns = CampaignRepository::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&stats),
            config.cache.clone(),
        );
        let events = EventRepository::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&stats),
            config.cache.clone(),
        );
        let brands =
            BrandRepository::new(store, cache, Arc::clone(&stats), config.cache.clone());

        let timeout = Some(config.request_timeout);
        let campaign_loader = BatchLoader::with_cancellation(
            campaigns.clone(),
            config.loader.clone(),
            cancel.child_token(),
            timeout,
        );
        let event_loader = BatchLoader::with_cancellation(
            events.clone(),
            config.loader.clone(),
            cancel.child_token(),
            timeout,
        );
        let brand_loader = BatchLoader::with_cancellation(
            brands.clone(),
            config.loader.clone(),
            cancel.child_token(),
            timeout,
        );

        Self {
            stats,
            campaigns,
            events,
            brands,
            campaign_loader,
            event_loader,
            brand_loader,
            event_id_loaders: Mutex::new(HashMap::new()),
            loader_config: config.loader.clone(),
            timeout: config.request_timeout,
            cancel,
        }
    }

    /// Loader resolving a campaign id to its first `first` event ids. Every
    /// call with the same `first` gets the same loader, so sibling campaigns
    /// share one listing query.
    pub fn campaign_event_ids_loader(&self, first: usize) -> BatchLoader<CampaignEventIds> {
        let mut loaders = self
            .event_id_loaders
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loaders
            .entry(first)
            .or_insert_with(|| {
                BatchLoader::with_cancellation(
                    CampaignEventIds::new(self.events.clone(), first),
                    self.loader_config.clone(),
                    self.cancel.child_token(),
                    Some(self.timeout),
                )
            })
            .clone()
    }

    /// Abandon the request. Buffered and in-flight loads fail with
    /// `Cancelled` and no further batches are dispatched.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.campaign_loader.cancel();
        self.event_loader.cancel();
        self.brand_loader.cancel();
        let loaders = self
            .event_id_loaders
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for loader in loaders.values() {
            loader.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        // Timer tasks spawned by the loaders must not outlive the request.
        self.cancel.cancel();
    }
}
