//! Worker-local parameter store.
//!
//! Presents one key → matrix interface whether values live only in memory
//! (standalone and parameter-server roles) or on a remote parameter service
//! (distributed workers). The role is fixed when the store is built.
//!
//! Locking: prefetch resolution, prefetch registration and round application
//! share one coarse lock. Reads and per-example accumulation do not take it.

use crate::core::{Error, Matrix, Result};
use crate::remote::{ClientFactory, NoRemote};
use crate::store::cache::LocalCache;
use crate::store::config::{Mode, StoreConfig};
use crate::store::context::WorkerContext;
use crate::store::gradient::{GradientAccumulator, GradientEntry};
use crate::store::prefetch::{resolve_local, FetchWorker, PrefetchQueue};
use crate::store::stats::{StatsSnapshot, StoreStats};
use crate::store::sync::{RoundReport, Synchronizer};
use crate::update::UpdateRule;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

/// State shared between the store handle and its fetch worker.
pub(crate) struct Shared {
    pub(crate) config: StoreConfig,
    pub(crate) cache: LocalCache,
    pub(crate) queue: PrefetchQueue,
    pub(crate) gradients: GradientAccumulator,
    pub(crate) sync: Synchronizer,
    pub(crate) stats: StoreStats,
    pub(crate) factory: Arc<dyn ClientFactory>,
    /// Coarse lock serializing resolution, registration and round application
    pub(crate) exclusive: Mutex<()>,
    /// Wakes the fetch worker
    pub(crate) wake: Notify,
    /// Broadcast after every resolution pass
    pub(crate) resolved: Notify,
}

/// Key → matrix store for one training process.
pub struct ParameterStore {
    shared: Arc<Shared>,
    fetcher: Option<FetchWorker>,
}

impl ParameterStore {
    /// Build a store for `config.mode`.
    ///
    /// Distributed workers get a background fetch worker, so this must run
    /// inside a tokio runtime.
    pub fn new(config: StoreConfig, factory: Arc<dyn ClientFactory>) -> Result<Self> {
        config.validate()?;
        let mode = config.mode;
        let shared = Arc::new(Shared {
            config,
            cache: LocalCache::new(),
            queue: PrefetchQueue::new(),
            gradients: GradientAccumulator::new(),
            sync: Synchronizer::new(),
            stats: StoreStats::default(),
            factory,
            exclusive: Mutex::new(()),
            wake: Notify::new(),
            resolved: Notify::new(),
        });

        let fetcher = if mode.is_distributed_worker() {
            tokio::runtime::Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;
            Some(FetchWorker::spawn(Arc::clone(&shared)))
        } else {
            None
        };

        info!(store = %shared.config.name, mode = %mode, "parameter store created");
        Ok(Self { shared, fetcher })
    }

    /// Standalone store with no remote service.
    pub fn standalone() -> Result<Self> {
        Self::new(StoreConfig::standalone(), Arc::new(NoRemote))
    }

    /// Parameter-server store.
    pub fn parameter_server() -> Result<Self> {
        Self::new(StoreConfig::parameter_server(), Arc::new(NoRemote))
    }

    pub fn mode(&self) -> Mode {
        self.shared.config.mode
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Open a context for one foreground task.
    ///
    /// Distributed workers receive a fresh remote handle; other roles get a
    /// local context.
    pub fn context(&self) -> Result<WorkerContext> {
        let mode = self.mode();
        if mode.is_distributed_worker() {
            let client = self.shared.factory.connect()?;
            Ok(WorkerContext::remote(mode, client))
        } else {
            Ok(WorkerContext::local(mode))
        }
    }

    /// Look up a value.
    ///
    /// A distributed worker asks the remote service directly and ignores the
    /// local cache; other roles answer from the cache.
    pub async fn get(&self, ctx: &mut WorkerContext, key: &str) -> Result<Option<Matrix>> {
        if self.mode().is_distributed_worker() {
            let value = ctx.client()?.get(key).await?;
            self.shared.stats.record_remote_fetch(1);
            return Ok(value);
        }
        Ok(self.shared.cache.get(key).await)
    }

    /// Look up a value, creating it with `init` on a miss.
    ///
    /// A distributed worker first asks the remote service; if that has no
    /// value, the initializer's result is offered to the service with
    /// create-or-fetch semantics and whatever the service stores is cached.
    /// Concurrent callers may each run `init`, but only one value is cached
    /// and every caller receives it.
    pub async fn get_or_init<F>(&self, ctx: &mut WorkerContext, key: &str, init: F) -> Result<Matrix>
    where
        F: FnOnce() -> Result<Matrix>,
    {
        let shared = &self.shared;
        if let Some(value) = shared.cache.get(key).await {
            shared.stats.record_hit();
            return Ok(value);
        }
        shared.stats.record_miss();

        if !self.mode().is_distributed_worker() {
            let value = init().map_err(|e| Error::initializer(key, e))?;
            shared.stats.record_initialized(1);
            return Ok(shared.cache.insert_if_absent(key, value).await);
        }

        let client = ctx.client()?;
        if let Some(remote) = client.get(key).await? {
            shared.stats.record_remote_fetch(1);
            return Ok(shared.cache.insert_if_absent(key, remote).await);
        }

        let local = init().map_err(|e| Error::initializer(key, e))?;
        shared.stats.record_initialized(1);
        let canonical = client.update(key, &local, false).await?;
        if canonical != local {
            debug!(key, "remote value won create race");
        }
        Ok(shared.cache.insert_if_absent(key, canonical).await)
    }

    /// Seed a value directly. Only the parameter-server role may do this.
    pub async fn put(&self, key: &str, value: Matrix) -> Result<()> {
        if !self.mode().is_parameter_server() {
            return Err(Error::IllegalOperation(format!(
                "put({}) is only allowed on the parameter server, not in {} mode",
                key,
                self.mode()
            )));
        }
        self.shared.cache.insert(key, value).await;
        Ok(())
    }

    /// Reset the gradient accumulator; distributed workers also drop every
    /// cached value so the next round fetches fresh ones.
    pub async fn clear(&self) {
        self.shared.gradients.clear().await;
        if self.mode().is_distributed_worker() {
            info!(store = %self.shared.config.name, "clear worker cache weights");
            self.shared.cache.clear().await;
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.shared.cache.contains(key).await
    }

    pub async fn cached_len(&self) -> usize {
        self.shared.cache.len().await
    }

    /// Queue `key` for the next batched resolution.
    pub async fn register_prefetch<F>(&self, key: &str, init: F)
    where
        F: FnOnce() -> Result<Matrix> + Send + 'static,
    {
        let _exclusive = self.shared.exclusive.lock().await;
        if self.shared.queue.register(key, Box::new(init)).await {
            debug!(key, "prefetch registration replaced");
        }
    }

    pub async fn pending_len(&self) -> usize {
        self.shared.queue.len().await
    }

    /// Resolve every registered prefetch and wait for it to finish.
    ///
    /// A distributed worker wakes the fetch worker and polls, bounded by the
    /// configured interval per wait, until the pending set is empty. Other
    /// roles resolve inline from the initializers. A failure of any pass
    /// that finished after this call began is returned to every caller
    /// waiting on it.
    pub async fn signal_and_wait(&self) -> Result<()> {
        let shared = &self.shared;
        let since = shared.queue.passes().await;
        if !self.mode().is_distributed_worker() {
            let _exclusive = shared.exclusive.lock().await;
            resolve_local(&shared.cache, &shared.queue, &shared.stats).await?;
            return Self::failure_since(shared, since).await;
        }

        info!(store = %shared.config.name, "notify fetcher thread");
        let poll = shared.config.poll_interval();
        loop {
            let resolved = shared.resolved.notified();
            tokio::pin!(resolved);
            resolved.as_mut().enable();

            if shared.queue.is_empty().await {
                break;
            }
            if !self.fetcher.as_ref().map_or(false, FetchWorker::is_running) {
                return Err(Error::WorkerStopped);
            }
            shared.wake.notify_one();
            let _ = tokio::time::timeout(poll, resolved).await;
        }

        Self::failure_since(shared, since).await
    }

    /// Report a failed resolution pass that finished after pass `since`.
    async fn failure_since(shared: &Shared, since: u64) -> Result<()> {
        match shared.queue.failure_since(since).await {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Record one contribution toward `key`'s gradient; returns the count.
    pub async fn accumulate(&self, key: &str, contribution: Matrix) -> Result<u64> {
        self.shared.gradients.accumulate(key, contribution).await
    }

    /// Mean of the contributions recorded for `key` this round.
    pub async fn gradient_mean(&self, key: &str) -> Result<Matrix> {
        self.shared.gradients.mean(key).await
    }

    pub async fn gradient_len(&self) -> usize {
        self.shared.gradients.len().await
    }

    /// Apply every accumulated gradient and close the round.
    ///
    /// Parameter-server and standalone roles update cached values in place;
    /// a distributed worker pushes each mean to the remote service tagged
    /// with the rule's name and then waits at the barrier. On failure the
    /// entries not yet applied are put back and the error is returned.
    pub async fn apply_round(&self, ctx: &mut WorkerContext, rule: &dyn UpdateRule) -> Result<RoundReport> {
        let _exclusive = self.shared.exclusive.lock().await;
        let entries = self.shared.gradients.drain().await;
        self.apply_entries(ctx, rule, entries).await
    }

    /// Apply the accumulated gradient of a single key and close the round.
    pub async fn apply_key(&self, ctx: &mut WorkerContext, rule: &dyn UpdateRule, key: &str) -> Result<RoundReport> {
        let _exclusive = self.shared.exclusive.lock().await;
        let entry = self
            .shared
            .gradients
            .take(key)
            .await
            .ok_or_else(|| Error::GradientNotFound(key.to_string()))?;
        self.apply_entries(ctx, rule, vec![entry]).await
    }

    async fn apply_entries(
        &self,
        ctx: &mut WorkerContext,
        rule: &dyn UpdateRule,
        entries: Vec<GradientEntry>,
    ) -> Result<RoundReport> {
        let shared = &self.shared;
        let remote = self.mode().is_distributed_worker();
        let mut remaining: VecDeque<GradientEntry> = entries.into();
        let mut applied = 0;

        while let Some(entry) = remaining.pop_front() {
            if let Err(err) = self.apply_entry(ctx, rule, &entry).await {
                warn!(key = %entry.key, error = %err, "round aborted");
                remaining.push_front(entry);
                if let Err(restore_err) = shared.gradients.restore(remaining.into()).await {
                    warn!(error = %restore_err, "could not restore gradients");
                }
                return Err(err);
            }
            applied += 1;
        }

        let round = if remote {
            let round = shared.sync.barrier(ctx.client()?).await?;
            shared.stats.record_barrier();
            round
        } else {
            shared.sync.advance()
        };
        shared.stats.record_round();

        info!(round, keys = applied, pushed = remote, "round applied");
        Ok(shared.sync.report(round, applied, remote))
    }

    async fn apply_entry(&self, ctx: &mut WorkerContext, rule: &dyn UpdateRule, entry: &GradientEntry) -> Result<()> {
        let gradient = entry.mean()?;
        if self.mode().is_distributed_worker() {
            ctx.client()?.push(&entry.key, &gradient, rule.name(), true).await?;
            self.shared.stats.record_push();
            return Ok(());
        }

        self.shared
            .cache
            .with_value_mut(&entry.key, |value| rule.apply(&entry.key, value, &gradient))
            .await
            .unwrap_or_else(|| Err(Error::ParameterNotFound(entry.key.clone())))
    }

    /// Rounds completed by this store.
    pub fn completed_rounds(&self) -> u64 {
        self.shared.sync.completed_rounds()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Whether the background fetch worker is alive.
    pub fn is_fetcher_running(&self) -> bool {
        self.fetcher.as_ref().map_or(false, FetchWorker::is_running)
    }

    /// Stop the fetch worker and wait for it to exit.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(fetcher) = self.fetcher.as_mut() {
            fetcher.shutdown().await?;
        }
        Ok(())
    }
}
