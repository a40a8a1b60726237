//! In-process parameter service.
//!
//! Implements the full remote contract against shared memory: canonical
//! values, create-or-fetch updates, rule application on push and a round
//! barrier sized to the number of participating workers. Every call is
//! recorded so callers can inspect exactly what reached the service.

use crate::core::{Error, Matrix, ParameterKey, Result};
use crate::remote::client::{ClientFactory, RemoteParameterClient};
use crate::update::RuleRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Barrier, Mutex, RwLock};
use tracing::debug;

/// A call received by the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RemoteCall {
    GetList { keys: Vec<ParameterKey> },
    UpdateList { keys: Vec<ParameterKey>, overwrite: bool },
    Get { key: ParameterKey },
    Update { key: ParameterKey, overwrite: bool },
    Push {
        key: ParameterKey,
        gradient: Matrix,
        rule: String,
        synchronous: bool,
    },
    Barrier,
}

impl RemoteCall {
    pub fn is_push(&self) -> bool {
        matches!(self, RemoteCall::Push { .. })
    }

    pub fn is_barrier(&self) -> bool {
        matches!(self, RemoteCall::Barrier)
    }

    pub fn is_get_list(&self) -> bool {
        matches!(self, RemoteCall::GetList { .. })
    }
}

/// Service configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Workers that must reach the barrier before a round completes
    pub participants: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { participants: 1 }
    }
}

/// Service statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub total_pull_requests: u64,
    pub total_create_requests: u64,
    pub total_push_requests: u64,
    pub total_updates_applied: u64,
    pub total_barriers: u64,
}

struct ServiceState {
    values: RwLock<HashMap<ParameterKey, Matrix>>,
    rules: RuleRegistry,
    barrier: Barrier,
    participants: usize,
    available: AtomicBool,
    calls: Mutex<Vec<RemoteCall>>,
    stats: Mutex<ServiceStats>,
}

/// Shared in-memory parameter service; clones refer to the same state.
#[derive(Clone)]
pub struct InMemoryParameterService {
    state: Arc<ServiceState>,
}

impl InMemoryParameterService {
    /// Create a service applying pushes with the given rules.
    pub fn new(config: ServiceConfig, rules: RuleRegistry) -> Self {
        let participants = config.participants.max(1);
        Self {
            state: Arc::new(ServiceState {
                values: RwLock::new(HashMap::new()),
                rules,
                barrier: Barrier::new(participants),
                participants,
                available: AtomicBool::new(true),
                calls: Mutex::new(Vec::new()),
                stats: Mutex::new(ServiceStats::default()),
            }),
        }
    }

    /// Open a client handle.
    pub fn client(&self) -> InMemoryClient {
        InMemoryClient {
            state: Arc::clone(&self.state),
        }
    }

    /// Store a value directly, bypassing the call log.
    pub async fn seed(&self, key: &str, value: Matrix) {
        self.state.values.write().await.insert(key.to_string(), value);
    }

    /// Current stored value for `key`.
    pub async fn value(&self, key: &str) -> Option<Matrix> {
        self.state.values.read().await.get(key).cloned()
    }

    /// Number of stored parameters.
    pub async fn len(&self) -> usize {
        self.state.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// All calls received so far, in arrival order.
    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.state.calls.lock().await.clone()
    }

    /// Forget recorded calls.
    pub async fn clear_calls(&self) {
        self.state.calls.lock().await.clear();
    }

    pub async fn stats(&self) -> ServiceStats {
        self.state.stats.lock().await.clone()
    }

    pub fn participants(&self) -> usize {
        self.state.participants
    }

    /// Simulate an outage: while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.state.available.store(available, Ordering::SeqCst);
    }
}

impl Default for InMemoryParameterService {
    fn default() -> Self {
        Self::new(ServiceConfig::default(), RuleRegistry::new())
    }
}

impl ClientFactory for InMemoryParameterService {
    fn connect(&self) -> Result<Box<dyn RemoteParameterClient>> {
        Ok(Box::new(self.client()))
    }
}

/// Client handle onto an [`InMemoryParameterService`].
pub struct InMemoryClient {
    state: Arc<ServiceState>,
}

impl InMemoryClient {
    async fn record(&self, call: RemoteCall) -> Result<()> {
        if !self.state.available.load(Ordering::SeqCst) {
            return Err(Error::RemoteUnavailable("in-memory service is offline".to_string()));
        }
        self.state.calls.lock().await.push(call);
        Ok(())
    }

    fn create_or_fetch(
        values: &mut HashMap<ParameterKey, Matrix>,
        key: &str,
        value: &Matrix,
        overwrite: bool,
    ) -> Matrix {
        if overwrite || !values.contains_key(key) {
            values.insert(key.to_string(), value.clone());
            return value.clone();
        }
        values.get(key).cloned().unwrap_or_else(|| value.clone())
    }
}

#[async_trait]
impl RemoteParameterClient for InMemoryClient {
    async fn get_list(&mut self, keys: &[ParameterKey]) -> Result<HashMap<ParameterKey, Option<Matrix>>> {
        self.record(RemoteCall::GetList { keys: keys.to_vec() }).await?;
        self.state.stats.lock().await.total_pull_requests += 1;

        let values = self.state.values.read().await;
        Ok(keys
            .iter()
            .map(|key| (key.clone(), values.get(key).cloned()))
            .collect())
    }

    async fn update_list(
        &mut self,
        values: &HashMap<ParameterKey, Matrix>,
        overwrite: bool,
    ) -> Result<HashMap<ParameterKey, Matrix>> {
        let mut keys: Vec<ParameterKey> = values.keys().cloned().collect();
        keys.sort();
        self.record(RemoteCall::UpdateList { keys, overwrite }).await?;
        self.state.stats.lock().await.total_create_requests += 1;

        let mut stored = self.state.values.write().await;
        Ok(values
            .iter()
            .map(|(key, value)| {
                let canonical = Self::create_or_fetch(&mut stored, key, value, overwrite);
                (key.clone(), canonical)
            })
            .collect())
    }

    async fn get(&mut self, key: &str) -> Result<Option<Matrix>> {
        self.record(RemoteCall::Get { key: key.to_string() }).await?;
        self.state.stats.lock().await.total_pull_requests += 1;
        Ok(self.state.values.read().await.get(key).cloned())
    }

    async fn update(&mut self, key: &str, value: &Matrix, overwrite: bool) -> Result<Matrix> {
        self.record(RemoteCall::Update {
            key: key.to_string(),
            overwrite,
        })
        .await?;
        self.state.stats.lock().await.total_create_requests += 1;

        let mut stored = self.state.values.write().await;
        Ok(Self::create_or_fetch(&mut stored, key, value, overwrite))
    }

    async fn push(&mut self, key: &str, gradient: &Matrix, rule: &str, synchronous: bool) -> Result<()> {
        self.record(RemoteCall::Push {
            key: key.to_string(),
            gradient: gradient.clone(),
            rule: rule.to_string(),
            synchronous,
        })
        .await?;
        self.state.stats.lock().await.total_push_requests += 1;

        let update_rule = self
            .state
            .rules
            .get(rule)
            .ok_or_else(|| Error::UnknownUpdateRule(rule.to_string()))?;

        let mut stored = self.state.values.write().await;
        let value = stored
            .get_mut(key)
            .ok_or_else(|| Error::RemoteRejected(format!("push for unknown parameter {}", key)))?;
        update_rule.apply(key, value, gradient)?;
        drop(stored);

        self.state.stats.lock().await.total_updates_applied += 1;
        debug!(key, rule, "applied pushed gradient");
        Ok(())
    }

    async fn barrier(&mut self) -> Result<()> {
        self.record(RemoteCall::Barrier).await?;
        self.state.barrier.wait().await;
        self.state.stats.lock().await.total_barriers += 1;
        Ok(())
    }
}
