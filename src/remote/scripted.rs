//! Scripted client for tests that need the service to disagree with itself.

use crate::core::{Error, Matrix, ParameterKey, Result};
use crate::remote::{ClientFactory, RemoteParameterClient};
use async_trait::async_trait;
use std::collections::HashMap;

/// Client whose reads and creates are configured separately.
///
/// `stored` values are visible to reads and creates. `hidden` values are
/// invisible to reads but win every non-overwriting create, which models
/// another worker creating the key between our read and our create.
#[derive(Clone, Debug, Default)]
pub(crate) struct ScriptedClient {
    stored: HashMap<ParameterKey, Matrix>,
    hidden: HashMap<ParameterKey, Matrix>,
    fail_creates: bool,
}

impl ScriptedClient {
    pub(crate) fn with_stored(mut self, key: &str, value: Matrix) -> Self {
        self.stored.insert(key.to_string(), value);
        self
    }

    pub(crate) fn with_hidden(mut self, key: &str, value: Matrix) -> Self {
        self.hidden.insert(key.to_string(), value);
        self
    }

    pub(crate) fn failing_creates(mut self) -> Self {
        self.fail_creates = true;
        self
    }

    fn create(&mut self, key: &str, value: &Matrix, overwrite: bool) -> Result<Matrix> {
        if self.fail_creates {
            return Err(Error::RemoteUnavailable("create rejected".to_string()));
        }
        if overwrite {
            self.hidden.remove(key);
            self.stored.insert(key.to_string(), value.clone());
            return Ok(value.clone());
        }
        if let Some(existing) = self.hidden.get(key).or_else(|| self.stored.get(key)) {
            return Ok(existing.clone());
        }
        self.stored.insert(key.to_string(), value.clone());
        Ok(value.clone())
    }
}

#[async_trait]
impl RemoteParameterClient for ScriptedClient {
    async fn get_list(&mut self, keys: &[ParameterKey]) -> Result<HashMap<ParameterKey, Option<Matrix>>> {
        Ok(keys
            .iter()
            .map(|key| (key.clone(), self.stored.get(key).cloned()))
            .collect())
    }

    async fn update_list(
        &mut self,
        values: &HashMap<ParameterKey, Matrix>,
        overwrite: bool,
    ) -> Result<HashMap<ParameterKey, Matrix>> {
        let mut out = HashMap::new();
        for (key, value) in values {
            out.insert(key.clone(), self.create(key, value, overwrite)?);
        }
        Ok(out)
    }

    async fn get(&mut self, key: &str) -> Result<Option<Matrix>> {
        Ok(self.stored.get(key).cloned())
    }

    async fn update(&mut self, key: &str, value: &Matrix, overwrite: bool) -> Result<Matrix> {
        self.create(key, value, overwrite)
    }

    async fn push(&mut self, _key: &str, _gradient: &Matrix, _rule: &str, _synchronous: bool) -> Result<()> {
        Ok(())
    }

    async fn barrier(&mut self) -> Result<()> {
        Ok(())
    }
}

impl ClientFactory for ScriptedClient {
    fn connect(&self) -> Result<Box<dyn RemoteParameterClient>> {
        Ok(Box::new(self.clone()))
    }
}
