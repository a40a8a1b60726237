//! Local value cache.
//!
//! The single source of truth for what this process currently believes a
//! parameter's value is. Once a value is cached the cache owns it; readers
//! receive copies and updates are applied in place under the write lock.

use crate::core::{Matrix, ParameterKey, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Thread-safe key → matrix map.
#[derive(Debug, Default)]
pub struct LocalCache {
    values: RwLock<HashMap<ParameterKey, Matrix>>,
}

impl LocalCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the cached value.
    pub async fn get(&self, key: &str) -> Option<Matrix> {
        self.values.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.values.read().await.contains_key(key)
    }

    /// Insert or replace a value.
    pub async fn insert(&self, key: &str, value: Matrix) {
        self.values.write().await.insert(key.to_string(), value);
    }

    /// Insert `value` unless the key is already cached.
    ///
    /// Returns whichever value ends up cached, so concurrent fillers of the
    /// same key all observe one copy.
    pub async fn insert_if_absent(&self, key: &str, value: Matrix) -> Matrix {
        self.values
            .write()
            .await
            .entry(key.to_string())
            .or_insert(value)
            .clone()
    }

    /// Keys from `keys` that are not cached, in input order.
    pub async fn missing(&self, keys: &[ParameterKey]) -> Vec<ParameterKey> {
        let values = self.values.read().await;
        keys.iter()
            .filter(|key| !values.contains_key(key.as_str()))
            .cloned()
            .collect()
    }

    /// Run `f` against the cached value in place.
    ///
    /// Returns `None` when the key is not cached.
    pub async fn with_value_mut<F>(&self, key: &str, f: F) -> Option<Result<()>>
    where
        F: FnOnce(&mut Matrix) -> Result<()>,
    {
        let mut values = self.values.write().await;
        values.get_mut(key).map(f)
    }

    /// Evict everything.
    pub async fn clear(&self) {
        self.values.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }

    /// Cached keys, sorted.
    pub async fn keys(&self) -> Vec<ParameterKey> {
        let mut keys: Vec<ParameterKey> = self.values.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache = LocalCache::new();
        assert!(cache.get("w").await.is_none());

        cache.insert("w", Matrix::filled(1, 1, 2.0)).await;
        assert_eq!(cache.get("w").await, Some(Matrix::filled(1, 1, 2.0)));
        assert!(cache.contains("w").await);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_insert_if_absent_keeps_first() {
        let cache = LocalCache::new();
        let first = cache.insert_if_absent("w", Matrix::filled(1, 1, 1.0)).await;
        let second = cache.insert_if_absent("w", Matrix::filled(1, 1, 9.0)).await;

        assert_eq!(first, Matrix::filled(1, 1, 1.0));
        assert_eq!(second, Matrix::filled(1, 1, 1.0));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_preserves_order() {
        let cache = LocalCache::new();
        cache.insert("b", Matrix::zeros(1, 1)).await;

        let keys = vec!["c".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(cache.missing(&keys).await, vec!["c".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn test_with_value_mut() {
        let cache = LocalCache::new();
        cache.insert("w", Matrix::filled(1, 1, 1.0)).await;

        let outcome = cache
            .with_value_mut("w", |v| v.add_assign(&Matrix::filled(1, 1, 1.0)))
            .await;
        assert_eq!(outcome, Some(Ok(())));
        assert_eq!(cache.get("w").await, Some(Matrix::filled(1, 1, 2.0)));

        let failed = cache
            .with_value_mut("w", |v| v.add_assign(&Matrix::zeros(2, 2)))
            .await;
        assert!(matches!(failed, Some(Err(Error::ShapeMismatch { .. }))));

        assert!(cache.with_value_mut("missing", |_| Ok(())).await.is_none());
    }

    #[test]
    fn test_usable_from_blocking_code() {
        let cache = LocalCache::new();
        tokio_test::block_on(async {
            cache.insert("w", Matrix::zeros(1, 1)).await;
            assert!(cache.contains("w").await);
        });
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = LocalCache::new();
        cache.insert("a", Matrix::zeros(1, 1)).await;
        cache.insert("b", Matrix::zeros(1, 1)).await;
        assert_eq!(cache.keys().await, vec!["a".to_string(), "b".to_string()]);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
