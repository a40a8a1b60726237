//! Per-key gradient accumulation for one synchronization round.
//!
//! An entry exists for a key if and only if at least one contribution was
//! recorded since the last clear or drain.

use crate::core::{Error, Matrix, ParameterKey, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Running sum and contribution count for one key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientEntry {
    /// Parameter key
    pub key: ParameterKey,
    /// Sum of all contributions
    pub sum: Matrix,
    /// Number of contributions
    pub count: u64,
}

impl GradientEntry {
    fn new(key: &str, contribution: Matrix) -> Self {
        Self {
            key: key.to_string(),
            sum: contribution,
            count: 1,
        }
    }

    /// Mean contribution, `sum / count`.
    ///
    /// A zero count means the entry outlived its contributions and is
    /// reported as [`Error::EmptyGradient`].
    pub fn mean(&self) -> Result<Matrix> {
        if self.count == 0 {
            return Err(Error::EmptyGradient(self.key.clone()));
        }
        let mut mean = self.sum.clone();
        mean.div_scalar_assign(self.count as f32);
        Ok(mean)
    }
}

/// Concurrent accumulator of per-example gradient contributions.
#[derive(Debug, Default)]
pub struct GradientAccumulator {
    entries: Mutex<HashMap<ParameterKey, GradientEntry>>,
}

impl GradientAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a contribution for `key`, returning the new count.
    ///
    /// A contribution whose shape differs from the running sum is rejected
    /// and leaves the entry untouched.
    pub async fn accumulate(&self, key: &str, contribution: Matrix) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(entry) => {
                entry.sum.add_assign(&contribution)?;
                entry.count += 1;
                Ok(entry.count)
            }
            None => {
                entries.insert(key.to_string(), GradientEntry::new(key, contribution));
                Ok(1)
            }
        }
    }

    /// Mean of the contributions recorded for `key`.
    pub async fn mean(&self, key: &str) -> Result<Matrix> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .ok_or_else(|| Error::GradientNotFound(key.to_string()))?
            .mean()
    }

    pub async fn count(&self, key: &str) -> Option<u64> {
        self.entries.lock().await.get(key).map(|e| e.count)
    }

    /// Remove and return the entry for `key`.
    pub async fn take(&self, key: &str) -> Option<GradientEntry> {
        self.entries.lock().await.remove(key)
    }

    /// Remove and return every entry, ordered by key.
    pub async fn drain(&self) -> Vec<GradientEntry> {
        let mut drained: Vec<GradientEntry> = self.entries.lock().await.drain().map(|(_, e)| e).collect();
        drained.sort_by(|a, b| a.key.cmp(&b.key));
        drained
    }

    /// Put entries back after an interrupted round.
    ///
    /// Contributions recorded in the meantime are merged into the restored sums.
    pub async fn restore(&self, restored: Vec<GradientEntry>) -> Result<()> {
        let mut entries = self.entries.lock().await;
        for entry in restored {
            match entries.get_mut(&entry.key) {
                Some(newer) => {
                    newer.sum.add_assign(&entry.sum)?;
                    newer.count += entry.count;
                }
                None => {
                    entries.insert(entry.key.clone(), entry);
                }
            }
        }
        Ok(())
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }
}
