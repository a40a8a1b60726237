//! Round boundaries for bulk-synchronous training.
//!
//! A distributed worker pushes every averaged gradient of a round and then
//! waits at the remote barrier, so round N is applied everywhere before any
//! worker starts round N + 1. Local modes only advance the round counter.

use crate::core::{now, Result, Timestamp};
use crate::remote::RemoteParameterClient;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Summary of one applied round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    /// Round number, starting at 1
    pub round: u64,
    /// Keys whose averaged gradient was applied or pushed
    pub keys_applied: usize,
    /// Whether gradients went to the remote service
    pub pushed: bool,
    /// Completion time
    pub completed_at: Timestamp,
}

/// Tracks completed rounds and performs the barrier wait.
#[derive(Debug, Default)]
pub struct Synchronizer {
    completed: AtomicU64,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rounds completed so far.
    pub fn completed_rounds(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Wait at the remote barrier, then close the round.
    ///
    /// Blocks until every participant arrives; there is no timeout. A failed
    /// barrier leaves the round open.
    pub async fn barrier(&self, client: &mut dyn RemoteParameterClient) -> Result<u64> {
        let round = self.completed_rounds() + 1;
        info!(round, "worker barrier waiting begin");
        client.barrier().await?;
        info!(round, "worker barrier waiting end");
        Ok(self.advance())
    }

    /// Close the round without a barrier.
    pub fn advance(&self) -> u64 {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Build the report for a closed round.
    pub fn report(&self, round: u64, keys_applied: usize, pushed: bool) -> RoundReport {
        RoundReport {
            round,
            keys_applied,
            pushed,
            completed_at: now(),
        }
    }
}
