//! Client contract for the remote parameter service.
//!
//! A client handle is not assumed safe for concurrent use, so every method
//! takes `&mut self`. Callers that run concurrently each obtain their own
//! handle from a [`ClientFactory`].

use crate::core::{Matrix, ParameterKey, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// Handle to the remote parameter service.
#[async_trait]
pub trait RemoteParameterClient: Send {
    /// Fetch many keys at once.
    ///
    /// A key the service does not hold maps to `None` or is omitted.
    async fn get_list(&mut self, keys: &[ParameterKey]) -> Result<HashMap<ParameterKey, Option<Matrix>>>;

    /// Bulk create-or-fetch.
    ///
    /// Returns the value the service stores for each key afterwards. With
    /// `overwrite == false` an existing value wins over the submitted one.
    async fn update_list(
        &mut self,
        values: &HashMap<ParameterKey, Matrix>,
        overwrite: bool,
    ) -> Result<HashMap<ParameterKey, Matrix>>;

    /// Fetch a single key.
    async fn get(&mut self, key: &str) -> Result<Option<Matrix>>;

    /// Single create-or-fetch, returning the canonical stored value.
    async fn update(&mut self, key: &str, value: &Matrix, overwrite: bool) -> Result<Matrix>;

    /// Push an averaged gradient; the service applies the named rule.
    async fn push(&mut self, key: &str, gradient: &Matrix, rule: &str, synchronous: bool) -> Result<()>;

    /// Block until every participant of the current round reaches the barrier.
    async fn barrier(&mut self) -> Result<()>;
}

/// Produces independent client handles.
pub trait ClientFactory: Send + Sync {
    /// Open a new handle to the remote service.
    fn connect(&self) -> Result<Box<dyn RemoteParameterClient>>;
}

/// Factory for processes that never talk to a remote service.
///
/// Standalone and parameter-server stores are built with it; any attempt to
/// connect is a lifecycle bug.
#[derive(Clone, Debug, Default)]
pub struct NoRemote;

impl ClientFactory for NoRemote {
    fn connect(&self) -> Result<Box<dyn RemoteParameterClient>> {
        Err(crate::core::Error::NoRemoteClient("local".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;

    #[test]
    fn test_no_remote_refuses_to_connect() {
        let err = NoRemote.connect().err();
        assert_eq!(err, Some(Error::NoRemoteClient("local".to_string())));
    }
}
