//! Per-task connection context.
//!
//! Each foreground task that talks to the remote service holds its own
//! context; the handle inside is never shared between tasks.

use crate::core::{Error, Result};
use crate::remote::RemoteParameterClient;
use crate::store::config::Mode;
use uuid::Uuid;

/// Connection state owned by one foreground task.
pub struct WorkerContext {
    id: Uuid,
    mode: Mode,
    client: Option<Box<dyn RemoteParameterClient>>,
}

impl WorkerContext {
    /// Context with a remote handle.
    pub fn remote(mode: Mode, client: Box<dyn RemoteParameterClient>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            client: Some(client),
        }
    }

    /// Context for a process that keeps values only in memory.
    pub fn local(mode: Mode) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            client: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// The remote handle, or [`Error::NoRemoteClient`] for local contexts.
    pub fn client(&mut self) -> Result<&mut (dyn RemoteParameterClient + 'static)> {
        match self.client.as_deref_mut() {
            Some(client) => Ok(client),
            None => Err(Error::NoRemoteClient(self.mode.to_string())),
        }
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("has_client", &self.has_client())
            .finish()
    }
}
