//! Per-request batch loader.
//!
//! Collects individual `load` calls made within one short window into a
//! single [`BatchSource::fetch_batch`] call, then hands each caller its own
//! result. A loader belongs to one request and is dropped with it.
//!
//! # Windows
//!
//! The first id buffered into an empty window spawns a flush task. The task
//! waits `LoaderConfig::delay` (or yields once when the delay is zero) and then
//! dispatches whatever has been buffered. A window that reaches
//! `max_batch_size` distinct ids is dispatched immediately instead.
//!
//! Ids already being fetched by an earlier window join that fetch rather than
//! being fetched twice.
//!
//! # Cancellation
//!
//! Every pending caller is resolved, never left waiting: with
//! [`PennantError::Cancelled`] when the loader's token is cancelled, and with
//! [`PennantError::Timeout`] when the loader's deadline passes. An abandoned
//! fetch never writes partial results into the memo.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use pennant_core::settings::{env_setting, parse_flag, parse_setting};
use pennant_core::{ConfigError, EntityId, PennantError, PennantResult};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Anything that can resolve a set of ids in one call.
///
/// The returned vector must be aligned with `ids`.
#[async_trait]
pub trait BatchSource: Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    async fn fetch_batch(&self, ids: &[EntityId]) -> PennantResult<Vec<Option<Self::Value>>>;
}

/// Configuration for batch loaders.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// How long a window stays open after its first id. Zero yields once.
    pub delay: Duration,
    /// Dispatch a window early once it holds this many distinct ids.
    pub max_batch_size: usize,
    /// Remember resolved values (including absence) for the loader's lifetime.
    pub memoize: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1),
            max_batch_size: 100,
            memoize: true,
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `PENNANT_LOADER_DELAY_MS`, `PENNANT_LOADER_MAX_BATCH_SIZE`
    /// and `PENNANT_LOADER_MEMOIZE`. Malformed values are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_settings(env_setting)
    }

    /// Same as [`LoaderConfig::from_env`], reading settings through `lookup`.
    pub fn from_settings(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let delay = parse_setting::<u64>("PENNANT_LOADER_DELAY_MS", lookup("PENNANT_LOADER_DELAY_MS"))?
            .map(Duration::from_millis)
            .unwrap_or(defaults.delay);

        let max_batch_size = parse_setting::<usize>(
            "PENNANT_LOADER_MAX_BATCH_SIZE",
            lookup("PENNANT_LOADER_MAX_BATCH_SIZE"),
        )?
        .unwrap_or(defaults.max_batch_size);
        if max_batch_size == 0 {
            return Err(ConfigError::invalid(
                "PENNANT_LOADER_MAX_BATCH_SIZE",
                "0",
                "batch size must be positive",
            ));
        }

        let memoize = parse_flag("PENNANT_LOADER_MEMOIZE", lookup("PENNANT_LOADER_MEMOIZE"))?
            .unwrap_or(defaults.memoize);

        Ok(Self {
            delay,
            max_batch_size,
            memoize,
        })
    }

    /// Set the window delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the maximum batch size. Zero is treated as one.
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    /// Enable or disable memoization.
    pub fn with_memoize(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }
}

type Reply<V> = oneshot::Sender<PennantResult<Option<V>>>;

/// Ids buffered in the open window, in first-request order.
struct Window<V> {
    order: Vec<EntityId>,
    waiters: HashMap<EntityId, Vec<Reply<V>>>,
}

impl<V> Default for Window<V> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            waiters: HashMap::new(),
        }
    }
}

struct LoaderState<V> {
    window: Window<V>,
    /// Bumped whenever the open window is taken; stale flush tasks compare it.
    generation: u64,
    /// Waiters for ids whose fetch has been dispatched but not answered.
    in_flight: HashMap<EntityId, Vec<Reply<V>>>,
    memo: HashMap<EntityId, Option<V>>,
}

struct Shared<B: BatchSource> {
    source: B,
    config: LoaderConfig,
    state: Mutex<LoaderState<B::Value>>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    flushes: AtomicU64,
}

enum Enqueued<V> {
    Ready(PennantResult<Option<V>>),
    Pending(oneshot::Receiver<PennantResult<Option<V>>>),
}

/// Request-scoped batching loader over a [`BatchSource`].
pub struct BatchLoader<B: BatchSource> {
    shared: Arc<Shared<B>>,
}

impl<B: BatchSource> Clone for BatchLoader<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: BatchSource> BatchLoader<B> {
    /// Loader with its own cancellation token and no deadline.
    pub fn new(source: B, config: LoaderConfig) -> Self {
        Self::with_cancellation(source, config, CancellationToken::new(), None)
    }

    /// Loader bound to `cancel`, giving up on pending loads after `timeout`.
    pub fn with_cancellation(
        source: B,
        config: LoaderConfig,
        cancel: CancellationToken,
        timeout: Option<Duration>,
    ) -> Self {
        let deadline = timeout.map(|t| Instant::now() + t);
        Self {
            shared: Arc::new(Shared {
                source,
                config,
                state: Mutex::new(LoaderState {
                    window: Window::default(),
                    generation: 0,
                    in_flight: HashMap::new(),
                    memo: HashMap::new(),
                }),
                cancel,
                timeout,
                deadline,
                flushes: AtomicU64::new(0),
            }),
        }
    }

    pub fn source(&self) -> &B {
        &self.shared.source
    }

    /// Resolve one id. Calls made in the same window share one fetch.
    pub fn load(
        &self,
        id: EntityId,
    ) -> impl Future<Output = PennantResult<Option<B::Value>>> + Send + '_ {
        async move {
            match self.shared.enqueue(id) {
                Enqueued::Ready(result) => result,
                Enqueued::Pending(rx) => self.shared.wait(rx).await,
            }
        }
    }

    /// Resolve several ids, returning results in input order.
    ///
    /// All ids are buffered before any is awaited, so they land in the same
    /// window unless it fills up.
    pub fn load_many<'a>(
        &'a self,
        ids: &'a [EntityId],
    ) -> impl Future<Output = PennantResult<Vec<Option<B::Value>>>> + Send + 'a {
        async move {
            let pending: Vec<_> = ids
                .iter()
                .map(|id| self.shared.enqueue(id.clone()))
                .collect();

            let results = join_all(pending.into_iter().map(|enqueued| async move {
                match enqueued {
                    Enqueued::Ready(result) => result,
                    Enqueued::Pending(rx) => self.shared.wait(rx).await,
                }
            }))
            .await;

            results.into_iter().collect()
        }
    }

    /// Seed the memo with a known value. Existing entries are kept.
    pub fn prime(&self, id: EntityId, value: Option<B::Value>) {
        if !self.shared.config.memoize {
            return;
        }
        self.shared.lock().memo.entry(id).or_insert(value);
    }

    /// Forget the memoized value for `id`.
    pub fn clear(&self, id: &EntityId) {
        self.shared.lock().memo.remove(id);
    }

    /// Cancel the loader. Pending and future loads fail with `Cancelled`.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
        self.shared.fail_pending(PennantError::Cancelled);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Number of batches dispatched to the source so far.
    pub fn flush_count(&self) -> u64 {
        self.shared.flushes.load(Ordering::SeqCst)
    }
}

impl<B: BatchSource> Shared<B> {
    fn lock(&self) -> MutexGuard<'_, LoaderState<B::Value>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timeout_error(&self) -> PennantError {
        PennantError::Timeout {
            after_ms: self.timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
        }
    }

    fn enqueue(self: &Arc<Self>, id: EntityId) -> Enqueued<B::Value> {
        if self.cancel.is_cancelled() {
            return Enqueued::Ready(Err(PennantError::Cancelled));
        }

        let mut guard = self.lock();
        let state = &mut *guard;

        if self.config.memoize {
            if let Some(value) = state.memo.get(&id) {
                return Enqueued::Ready(Ok(value.clone()));
            }
        }

        let (tx, rx) = oneshot::channel();

        if let Some(waiters) = state.in_flight.get_mut(&id) {
            waiters.push(tx);
            return Enqueued::Pending(rx);
        }

        let opens_window = state.window.order.is_empty();
        match state.window.waiters.entry(id) {
            Entry::Occupied(mut entry) => entry.get_mut().push(tx),
            Entry::Vacant(entry) => {
                state.window.order.push(entry.key().clone());
                entry.insert(vec![tx]);
            }
        }

        if state.window.order.len() >= self.config.max_batch_size {
            let ids = Self::take_window(state);
            drop(guard);
            tokio::spawn(Arc::clone(self).dispatch(ids));
        } else if opens_window {
            let generation = state.generation;
            drop(guard);
            tokio::spawn(Arc::clone(self).flush_after_delay(generation));
        }

        Enqueued::Pending(rx)
    }

    /// Take the open window and move its waiters to `in_flight`.
    fn take_window(state: &mut LoaderState<B::Value>) -> Vec<EntityId> {
        state.generation += 1;
        let window = std::mem::take(&mut state.window);
        for (id, waiters) in window.waiters {
            state.in_flight.entry(id).or_default().extend(waiters);
        }
        window.order
    }

    async fn flush_after_delay(self: Arc<Self>, generation: u64) {
        let delay = self.config.delay;
        let wait = async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
        };

        tokio::select! {
            _ = self.cancel.cancelled() => {
                self.fail_pending(PennantError::Cancelled);
                return;
            }
            _ = wait => {}
        }

        let ids = {
            let mut state = self.lock();
            if state.generation != generation || state.window.order.is_empty() {
                return;
            }
            Self::take_window(&mut state)
        };
        self.dispatch(ids).await;
    }

    async fn dispatch(self: Arc<Self>, ids: Vec<EntityId>) {
        let flush = self.flushes.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(flush, batch_size = ids.len(), "Dispatching batch");

        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PennantError::Cancelled),
            _ = expired => Err(self.timeout_error()),
            result = self.source.fetch_batch(&ids) => result.and_then(|values| {
                if values.len() == ids.len() {
                    Ok(values)
                } else {
                    Err(PennantError::BatchMismatch {
                        expected: ids.len(),
                        got: values.len(),
                    })
                }
            }),
        };

        match outcome {
            Ok(values) => self.resolve(ids, values),
            Err(e) => {
                tracing::debug!(flush, error = %e, "Batch failed");
                self.reject(&ids, e);
            }
        }
    }

    fn resolve(&self, ids: Vec<EntityId>, values: Vec<Option<B::Value>>) {
        let mut replies = Vec::with_capacity(ids.len());
        {
            let mut state = self.lock();
            for (id, value) in ids.into_iter().zip(values) {
                let waiters = state.in_flight.remove(&id).unwrap_or_default();
                if self.config.memoize {
                    state.memo.insert(id, value.clone());
                }
                replies.push((waiters, value));
            }
        }

        for (waiters, value) in replies {
            for waiter in waiters {
                let _ = waiter.send(Ok(value.clone()));
            }
        }
    }

    fn reject(&self, ids: &[EntityId], error: PennantError) {
        let waiters: Vec<Reply<B::Value>> = {
            let mut state = self.lock();
            ids.iter()
                .filter_map(|id| state.in_flight.remove(id))
                .flatten()
                .collect()
        };

        for waiter in waiters {
            let _ = waiter.send(Err(error.clone()));
        }
    }

    /// Resolve every buffered and in-flight waiter with `error`.
    fn fail_pending(&self, error: PennantError) {
        let waiters: Vec<Reply<B::Value>> = {
            let mut state = self.lock();
            state.generation += 1;
            let window = std::mem::take(&mut state.window);
            let in_flight = std::mem::take(&mut state.in_flight);
            window
                .waiters
                .into_values()
                .chain(in_flight.into_values())
                .flatten()
                .collect()
        };

        if !waiters.is_empty() {
            tracing::debug!(pending = waiters.len(), error = %error, "Failing pending loads");
        }
        for waiter in waiters {
            let _ = waiter.send(Err(error.clone()));
        }
    }

    async fn wait(
        &self,
        rx: oneshot::Receiver<PennantResult<Option<B::Value>>>,
    ) -> PennantResult<Option<B::Value>> {
        let received = match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, rx)
                .await
                .map_err(|_| self.timeout_error())?,
            None => rx.await,
        };

        // A dropped sender means the fetch task went away without answering.
        received.unwrap_or(Err(PennantError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pennant_core::StoreError;
    use std::sync::atomic::AtomicBool;

    /// Source that serves `value-{id}` for numeric ids below 100 and records
    /// every batch it receives.
    #[derive(Default)]
    struct RecordingSource {
        batches: Mutex<Vec<Vec<EntityId>>>,
        failing: AtomicBool,
        latency: Option<Duration>,
        short_by_one: bool,
    }

    impl RecordingSource {
        fn batches(&self) -> Vec<Vec<EntityId>> {
            self.batches.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    #[async_trait]
    impl BatchSource for RecordingSource {
        type Value = String;

        async fn fetch_batch(&self, ids: &[EntityId]) -> PennantResult<Vec<Option<String>>> {
            self.batches
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(ids.to_vec());

            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Connection {
                    reason: "refused".into(),
                }
                .into());
            }

            let mut values: Vec<Option<String>> = ids
                .iter()
                .map(|id| match id.as_i64() {
                    Some(n) if n < 100 => Some(format!("value-{}", n)),
                    _ => None,
                })
                .collect();
            if self.short_by_one {
                values.pop();
            }
            Ok(values)
        }
    }

    fn ids(raw: &[i64]) -> Vec<EntityId> {
        raw.iter().copied().map(EntityId::from).collect()
    }

    fn settings<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn test_loader_config_from_settings() -> Result<(), ConfigError> {
        let config = LoaderConfig::from_settings(settings(&[
            ("PENNANT_LOADER_DELAY_MS", "5"),
            ("PENNANT_LOADER_MAX_BATCH_SIZE", "25"),
            ("PENNANT_LOADER_MEMOIZE", "false"),
        ]))?;
        assert_eq!(config.delay, Duration::from_millis(5));
        assert_eq!(config.max_batch_size, 25);
        assert!(!config.memoize);

        let defaults = LoaderConfig::from_settings(settings(&[]))?;
        assert_eq!(defaults.max_batch_size, 100);
        assert!(defaults.memoize);
        Ok(())
    }

    #[test]
    fn test_loader_config_rejects_malformed_values() {
        let bad = [
            ("PENNANT_LOADER_DELAY_MS", "soon"),
            ("PENNANT_LOADER_MAX_BATCH_SIZE", "0"),
            ("PENNANT_LOADER_MAX_BATCH_SIZE", "-3"),
            ("PENNANT_LOADER_MEMOIZE", "flase"),
        ];
        for pair in bad {
            let result = LoaderConfig::from_settings(settings(&[pair]));
            assert!(
                matches!(&result, Err(ConfigError::InvalidValue { field, .. }) if field == pair.0),
                "{:?} should be rejected",
                pair
            );
        }
    }

    #[tokio::test]
    async fn test_concurrent_loads_coalesce_into_one_batch() {
        let loader = BatchLoader::new(RecordingSource::default(), LoaderConfig::default());

        let results = join_all((1..=10).map(|n| loader.load(EntityId::from(n)))).await;

        for (n, result) in (1..=10).zip(results) {
            assert_eq!(result.expect("load should succeed"), Some(format!("value-{}", n)));
        }
        assert_eq!(loader.flush_count(), 1);
        assert_eq!(loader.source().batches(), vec![ids(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10])]);
    }

    #[tokio::test]
    async fn test_duplicates_share_one_slot_in_first_seen_order() {
        let loader = BatchLoader::new(RecordingSource::default(), LoaderConfig::default());

        let (a, b, c, d) = tokio::join!(
            loader.load(EntityId::from(3)),
            loader.load(EntityId::from(1)),
            loader.load(EntityId::from(3)),
            loader.load(EntityId::from(200)),
        );

        assert_eq!(a.expect("load"), Some("value-3".to_string()));
        assert_eq!(b.expect("load"), Some("value-1".to_string()));
        assert_eq!(c.expect("load"), Some("value-3".to_string()));
        assert_eq!(d.expect("load"), None);
        assert_eq!(loader.source().batches(), vec![ids(&[3, 1, 200])]);
    }

    #[tokio::test]
    async fn test_zero_delay_still_coalesces() {
        let config = LoaderConfig::default().with_delay(Duration::ZERO);
        let loader = BatchLoader::new(RecordingSource::default(), config);

        let results = join_all((1..=5).map(|n| loader.load(EntityId::from(n)))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(loader.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_full_window_dispatches_early() {
        let config = LoaderConfig::default().with_max_batch_size(2);
        let loader = BatchLoader::new(RecordingSource::default(), config);

        let results = loader.load_many(&ids(&[1, 2, 3, 4, 5])).await.expect("load_many");

        assert_eq!(results.len(), 5);
        assert_eq!(loader.flush_count(), 3);
        assert_eq!(
            loader.source().batches(),
            vec![ids(&[1, 2]), ids(&[3, 4]), ids(&[5])]
        );
    }

    #[tokio::test]
    async fn test_load_many_keeps_input_order_and_duplicates() {
        let loader = BatchLoader::new(RecordingSource::default(), LoaderConfig::default());

        let results = loader.load_many(&ids(&[5, 150, 2, 5])).await.expect("load_many");

        assert_eq!(
            results,
            vec![
                Some("value-5".to_string()),
                None,
                Some("value-2".to_string()),
                Some("value-5".to_string()),
            ]
        );
        assert_eq!(loader.source().batches(), vec![ids(&[5, 150, 2])]);
    }

    #[tokio::test]
    async fn test_memo_serves_repeat_loads_including_absence() {
        let loader = BatchLoader::new(RecordingSource::default(), LoaderConfig::default());

        loader.load_many(&ids(&[1, 500])).await.expect("first");
        let again = loader.load_many(&ids(&[500, 1])).await.expect("second");

        assert_eq!(again, vec![None, Some("value-1".to_string())]);
        assert_eq!(loader.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_without_memo_every_window_fetches() {
        let config = LoaderConfig::default().with_memoize(false);
        let loader = BatchLoader::new(RecordingSource::default(), config);

        loader.load(EntityId::from(1)).await.expect("first");
        loader.load(EntityId::from(1)).await.expect("second");

        assert_eq!(loader.flush_count(), 2);
    }

    #[tokio::test]
    async fn test_prime_and_clear() {
        let loader = BatchLoader::new(RecordingSource::default(), LoaderConfig::default());

        loader.prime(EntityId::from(1), Some("primed".to_string()));
        assert_eq!(
            loader.load(EntityId::from(1)).await.expect("load"),
            Some("primed".to_string())
        );
        assert_eq!(loader.flush_count(), 0);

        loader.clear(&EntityId::from(1));
        assert_eq!(
            loader.load(EntityId::from(1)).await.expect("load"),
            Some("value-1".to_string())
        );
        assert_eq!(loader.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_error_reaches_every_waiter_and_is_not_memoized() {
        let source = RecordingSource::default();
        source.failing.store(true, Ordering::SeqCst);
        let loader = BatchLoader::new(source, LoaderConfig::default());

        let (a, b, c) = tokio::join!(
            loader.load(EntityId::from(1)),
            loader.load(EntityId::from(2)),
            loader.load(EntityId::from(1)),
        );
        for result in [a, b, c] {
            assert!(matches!(result, Err(PennantError::Store(StoreError::Connection { .. }))));
        }
        assert_eq!(loader.flush_count(), 1);

        loader.source().failing.store(false, Ordering::SeqCst);
        let recovered = loader.load(EntityId::from(1)).await.expect("load");
        assert_eq!(recovered, Some("value-1".to_string()));
        assert_eq!(loader.flush_count(), 2);
    }

    #[tokio::test]
    async fn test_misaligned_source_is_an_error() {
        let source = RecordingSource {
            short_by_one: true,
            ..Default::default()
        };
        let loader = BatchLoader::new(source, LoaderConfig::default());

        let result = loader.load_many(&ids(&[1, 2])).await;
        assert_eq!(
            result,
            Err(PennantError::BatchMismatch {
                expected: 2,
                got: 1
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_resolves_buffered_loads() {
        let config = LoaderConfig::default().with_delay(Duration::from_secs(10));
        let loader = BatchLoader::new(RecordingSource::default(), config);

        let pending = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load(EntityId::from(1)).await }
        });
        tokio::task::yield_now().await;

        loader.cancel();

        let result = pending.await.expect("task should not panic");
        assert_eq!(result, Err(PennantError::Cancelled));
        assert_eq!(loader.flush_count(), 0);
        assert_eq!(loader.load(EntityId::from(2)).await, Err(PennantError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_token_cancels_in_flight_fetch() {
        let source = RecordingSource {
            latency: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let token = CancellationToken::new();
        let loader = BatchLoader::with_cancellation(
            source,
            LoaderConfig::default(),
            token.child_token(),
            None,
        );

        let pending = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load(EntityId::from(1)).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(loader.flush_count(), 1);

        token.cancel();

        let result = pending.await.expect("task should not panic");
        assert_eq!(result, Err(PennantError::Cancelled));
        assert!(loader.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_times_out_slow_fetch() {
        let source = RecordingSource {
            latency: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let loader = BatchLoader::with_cancellation(
            source,
            LoaderConfig::default(),
            CancellationToken::new(),
            Some(Duration::from_secs(5)),
        );

        let (a, b) = tokio::join!(loader.load(EntityId::from(1)), loader.load(EntityId::from(2)));

        assert_eq!(a, Err(PennantError::Timeout { after_ms: 5000 }));
        assert_eq!(b, Err(PennantError::Timeout { after_ms: 5000 }));
    }
}
