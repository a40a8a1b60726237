//! Batched prefetch of parameter values.
//!
//! Foreground tasks register the keys they will need together with a
//! fallback initializer. A single background [`FetchWorker`] resolves the
//! whole pending set in one bulk fetch plus at most one bulk create, then
//! wakes everyone waiting on it.

use crate::core::{Error, Matrix, ParameterKey, Result};
use crate::remote::RemoteParameterClient;
use crate::store::cache::LocalCache;
use crate::store::kv::Shared;
use crate::store::stats::StoreStats;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Deferred computation producing a value the remote service does not have.
pub type Initializer = Box<dyn FnOnce() -> Result<Matrix> + Send>;

#[derive(Default)]
struct QueueState {
    entries: HashMap<ParameterKey, Initializer>,
    resolving: bool,
    passes: u64,
    failure: Option<(u64, Error)>,
}

/// Keys awaiting resolution.
///
/// A key stays pending until the resolution that picked it up has finished,
/// whether it succeeded or fell back to its initializer.
#[derive(Default)]
pub struct PrefetchQueue {
    state: Mutex<QueueState>,
}

impl PrefetchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pending fetch. A later registration for the same key replaces
    /// the earlier initializer; returns whether one was replaced.
    pub async fn register(&self, key: &str, init: Initializer) -> bool {
        self.state
            .lock()
            .await
            .entries
            .insert(key.to_string(), init)
            .is_some()
    }

    /// True once nothing is queued and no resolution is in flight.
    pub async fn is_empty(&self) -> bool {
        let state = self.state.lock().await;
        state.entries.is_empty() && !state.resolving
    }

    /// Number of queued keys, excluding any in flight.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Queued keys, sorted.
    pub async fn keys(&self) -> Vec<ParameterKey> {
        let mut keys: Vec<ParameterKey> = self.state.lock().await.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    async fn begin_resolution(&self) -> HashMap<ParameterKey, Initializer> {
        let mut state = self.state.lock().await;
        state.resolving = true;
        std::mem::take(&mut state.entries)
    }

    /// End a resolution, recording its failure in the same step that makes
    /// the queue observably empty. Returns the number of the finished pass.
    async fn finish_resolution(&self, failure: Option<Error>) -> u64 {
        let mut state = self.state.lock().await;
        state.resolving = false;
        state.passes += 1;
        if let Some(err) = failure {
            state.failure = Some((state.passes, err));
        }
        state.passes
    }

    /// Number of resolution passes finished so far.
    pub async fn passes(&self) -> u64 {
        self.state.lock().await.passes
    }

    /// Failure of the latest failed pass, if it finished after pass `since`.
    ///
    /// The failure is left in place so every caller waiting on that pass
    /// sees it.
    pub async fn failure_since(&self, since: u64) -> Option<Error> {
        match &self.state.lock().await.failure {
            Some((pass, err)) if *pass > since => Some(err.clone()),
            _ => None,
        }
    }
}

/// Outcome of one resolution pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    /// Keys that were pending
    pub requested: usize,
    /// Keys fetched from the remote service
    pub fetched: usize,
    /// Keys produced by their initializer
    pub initialized: usize,
}

/// Resolve every pending key against the remote service.
///
/// Keys already cached are skipped. The pending set is emptied whatever the
/// outcome. Every value obtained is merged before an error is returned; a
/// failed bulk create takes precedence over initializer failures.
pub(crate) async fn resolve_remote(
    cache: &LocalCache,
    queue: &PrefetchQueue,
    stats: &StoreStats,
    client: &mut dyn RemoteParameterClient,
) -> Result<ResolveSummary> {
    let pending = queue.begin_resolution().await;
    let result = fetch_pending(cache, stats, client, pending).await;
    queue.finish_resolution(result.as_ref().err().cloned()).await;
    stats.record_resolution();
    result
}

async fn fetch_pending(
    cache: &LocalCache,
    stats: &StoreStats,
    client: &mut dyn RemoteParameterClient,
    mut pending: HashMap<ParameterKey, Initializer>,
) -> Result<ResolveSummary> {
    let mut summary = ResolveSummary {
        requested: pending.len(),
        ..Default::default()
    };

    let mut keys: Vec<ParameterKey> = pending.keys().cloned().collect();
    keys.sort();
    let missing = cache.missing(&keys).await;
    if missing.is_empty() {
        return Ok(summary);
    }

    let mut fetched = client.get_list(&missing).await?;
    let mut resolved: HashMap<ParameterKey, Matrix> = HashMap::new();
    let mut created: HashMap<ParameterKey, Matrix> = HashMap::new();
    let mut failure = None;

    for key in missing {
        if let Some(value) = fetched.remove(&key).flatten() {
            resolved.insert(key, value);
            continue;
        }
        let Some(init) = pending.remove(&key) else {
            continue;
        };
        match init() {
            Ok(value) => {
                created.insert(key, value);
            }
            Err(err) => {
                warn!(key = %key, error = %err, "prefetch initializer failed");
                failure.get_or_insert(Error::initializer(&key, err));
            }
        }
    }
    summary.fetched = resolved.len();
    summary.initialized = created.len();
    stats.record_remote_fetch(summary.fetched as u64);
    stats.record_initialized(summary.initialized as u64);

    let mut created_outcome = Ok(());
    if !created.is_empty() {
        let outcome = client.update_list(&created, false).await;
        match outcome {
            Ok(mut canonical) => {
                for (key, local) in created {
                    let value = canonical.remove(&key).unwrap_or(local);
                    resolved.insert(key, value);
                }
            }
            Err(err) => {
                warn!(keys = created.len(), error = %err, "bulk create failed");
                created_outcome = Err(err);
            }
        }
    }

    for (key, value) in resolved {
        cache.insert_if_absent(&key, value).await;
    }

    created_outcome?;
    match failure {
        Some(err) => Err(err),
        None => Ok(summary),
    }
}

/// Resolve every pending key from its initializer alone.
///
/// Used where no remote service exists.
pub(crate) async fn resolve_local(
    cache: &LocalCache,
    queue: &PrefetchQueue,
    stats: &StoreStats,
) -> Result<ResolveSummary> {
    let pending = queue.begin_resolution().await;
    let mut summary = ResolveSummary {
        requested: pending.len(),
        ..Default::default()
    };
    let mut failure = None;

    for (key, init) in pending {
        if cache.contains(&key).await {
            continue;
        }
        match init() {
            Ok(value) => {
                cache.insert_if_absent(&key, value).await;
                summary.initialized += 1;
            }
            Err(err) => {
                failure.get_or_insert(Error::initializer(&key, err));
            }
        }
    }

    queue.finish_resolution(failure.clone()).await;
    stats.record_initialized(summary.initialized as u64);
    stats.record_resolution();
    match failure {
        Some(err) => Err(err),
        None => Ok(summary),
    }
}

/// Background task draining the prefetch queue.
///
/// Sleeps until woken, resolves the pending set with its own remote handle,
/// leaves any failure on the queue for the waiters, then broadcasts
/// completion.
pub struct FetchWorker {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl FetchWorker {
    /// Spawn the worker on the current tokio runtime.
    pub(crate) fn spawn(shared: Arc<Shared>) -> Self {
        let (shutdown, signal) = watch::channel(false);
        let handle = tokio::spawn(Self::run(shared, signal));
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Stop the worker and wait for it to exit.
    pub async fn shutdown(&mut self) -> Result<()> {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            handle.await?;
        }
        Ok(())
    }

    async fn run(shared: Arc<Shared>, mut signal: watch::Receiver<bool>) {
        info!(store = %shared.config.name, "fetch worker started");
        let mut client: Option<Box<dyn RemoteParameterClient>> = None;

        loop {
            tokio::select! {
                changed = signal.changed() => {
                    if changed.is_err() || *signal.borrow() {
                        break;
                    }
                    continue;
                }
                _ = shared.wake.notified() => {}
            }

            debug!(store = %shared.config.name, "start batch request keys");
            let outcome = {
                let _exclusive = shared.exclusive.lock().await;
                Self::resolve(&shared, &mut client).await
            };
            match outcome {
                Ok(summary) => debug!(
                    requested = summary.requested,
                    fetched = summary.fetched,
                    initialized = summary.initialized,
                    "end batch request keys"
                ),
                Err(err) => {
                    warn!(error = %err, "batch request keys failed");
                    if err.is_remote() {
                        client = None;
                    }
                }
            }
            shared.resolved.notify_waiters();
        }

        info!(store = %shared.config.name, "fetch worker stopped");
    }

    async fn resolve(
        shared: &Shared,
        client: &mut Option<Box<dyn RemoteParameterClient>>,
    ) -> Result<ResolveSummary> {
        if shared.queue.is_empty().await {
            return Ok(ResolveSummary::default());
        }
        if client.is_none() {
            match shared.factory.connect() {
                Ok(connected) => *client = Some(connected),
                Err(err) => {
                    // Resolution removes pending keys even when it cannot run.
                    shared.queue.begin_resolution().await;
                    shared.queue.finish_resolution(Some(err.clone())).await;
                    return Err(err);
                }
            }
        }
        let handle = client
            .as_deref_mut()
            .ok_or_else(|| Error::Internal("fetch worker lost its client".to_string()))?;
        resolve_remote(&shared.cache, &shared.queue, &shared.stats, handle).await
    }
}

impl Drop for FetchWorker {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::scripted::ScriptedClient;
    use crate::remote::{InMemoryParameterService, RemoteCall};

    fn init_filled(value: f32) -> Initializer {
        Box::new(move || -> Result<Matrix> { Ok(Matrix::filled(1, 1, value)) })
    }

    #[tokio::test]
    async fn test_register_replaces_initializer() {
        let queue = PrefetchQueue::new();
        assert!(!queue.register("a", init_filled(1.0)).await);
        assert!(queue.register("a", init_filled(2.0)).await);
        assert_eq!(queue.len().await, 1);

        let cache = LocalCache::new();
        resolve_local(&cache, &queue, &StoreStats::default()).await.unwrap();
        assert_eq!(cache.get("a").await, Some(Matrix::filled(1, 1, 2.0)));
    }

    #[tokio::test]
    async fn test_remote_hit_and_fallback() {
        let service = InMemoryParameterService::default();
        service.seed("a", Matrix::filled(1, 1, 5.0)).await;

        let queue = PrefetchQueue::new();
        queue.register("a", init_filled(0.0)).await;
        queue.register("b", init_filled(1.5)).await;

        let cache = LocalCache::new();
        let stats = StoreStats::default();
        let mut client = service.client();
        let summary = resolve_remote(&cache, &queue, &stats, &mut client).await.unwrap();

        assert_eq!(summary, ResolveSummary { requested: 2, fetched: 1, initialized: 1 });
        assert_eq!(cache.get("a").await, Some(Matrix::filled(1, 1, 5.0)));
        assert_eq!(cache.get("b").await, Some(Matrix::filled(1, 1, 1.5)));
        assert_eq!(service.value("b").await, Some(Matrix::filled(1, 1, 1.5)));
        assert!(queue.is_empty().await);

        let calls = service.calls().await;
        assert_eq!(
            calls,
            vec![
                RemoteCall::GetList { keys: vec!["a".to_string(), "b".to_string()] },
                RemoteCall::UpdateList { keys: vec!["b".to_string()], overwrite: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_cached_keys_are_not_fetched() {
        let service = InMemoryParameterService::default();
        let queue = PrefetchQueue::new();
        let cache = LocalCache::new();
        cache.insert("a", Matrix::filled(1, 1, 9.0)).await;

        queue.register("a", init_filled(0.0)).await;
        let mut client = service.client();
        resolve_remote(&cache, &queue, &StoreStats::default(), &mut client)
            .await
            .unwrap();

        assert!(service.calls().await.is_empty());
        assert_eq!(cache.get("a").await, Some(Matrix::filled(1, 1, 9.0)));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_initializer_failure_is_returned_and_queue_cleared() {
        let service = InMemoryParameterService::default();
        let queue = PrefetchQueue::new();
        queue
            .register(
                "bad",
                Box::new(|| -> Result<Matrix> { Err(Error::Internal("no seed".to_string())) }),
            )
            .await;
        queue.register("good", init_filled(3.0)).await;

        let cache = LocalCache::new();
        let mut client = service.client();
        let err = resolve_remote(&cache, &queue, &StoreStats::default(), &mut client)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InitializerFailed { ref key, .. } if key == "bad"));
        assert!(!cache.contains("bad").await);
        assert_eq!(cache.get("good").await, Some(Matrix::filled(1, 1, 3.0)));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_remote_outage_clears_queue() {
        let service = InMemoryParameterService::default();
        service.set_available(false);
        let queue = PrefetchQueue::new();
        queue.register("a", init_filled(1.0)).await;

        let cache = LocalCache::new();
        let mut client = service.client();
        let err = resolve_remote(&cache, &queue, &StoreStats::default(), &mut client)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RemoteUnavailable(_)));
        assert!(queue.is_empty().await);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_failure_stays_visible_to_every_waiter() {
        let queue = PrefetchQueue::new();
        let before = queue.passes().await;
        queue.register("a", init_filled(1.0)).await;

        queue.begin_resolution().await;
        let pass = queue
            .finish_resolution(Some(Error::RemoteUnavailable("down".to_string())))
            .await;
        assert_eq!(pass, before + 1);

        let first = queue.failure_since(before).await;
        let second = queue.failure_since(before).await;
        assert!(matches!(first, Some(Error::RemoteUnavailable(_))));
        assert_eq!(first, second);
        assert!(queue.failure_since(pass).await.is_none());

        queue.begin_resolution().await;
        queue.finish_resolution(None).await;
        assert!(queue.failure_since(pass).await.is_none());
    }

    #[tokio::test]
    async fn test_fetched_values_survive_failed_create() {
        let mut client = ScriptedClient::default()
            .with_stored("a", Matrix::filled(1, 1, 5.0))
            .failing_creates();
        let queue = PrefetchQueue::new();
        queue.register("a", init_filled(0.0)).await;
        queue.register("b", init_filled(1.0)).await;

        let cache = LocalCache::new();
        let err = resolve_remote(&cache, &queue, &StoreStats::default(), &mut client)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RemoteUnavailable(_)));
        assert_eq!(cache.get("a").await, Some(Matrix::filled(1, 1, 5.0)));
        assert!(!cache.contains("b").await);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_canonical_value_wins_bulk_create() {
        let mut client = ScriptedClient::default().with_hidden("b", Matrix::filled(1, 1, 7.0));
        let queue = PrefetchQueue::new();
        queue.register("b", init_filled(1.0)).await;

        let cache = LocalCache::new();
        let summary = resolve_remote(&cache, &queue, &StoreStats::default(), &mut client)
            .await
            .unwrap();

        assert_eq!(summary.initialized, 1);
        assert_eq!(cache.get("b").await, Some(Matrix::filled(1, 1, 7.0)));
    }
}
