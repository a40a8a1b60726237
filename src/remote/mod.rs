//! Remote Parameter Service Module
//!
//! Provides the boundary to the remote parameter service:
//! - Client and factory traits consumed by the store
//! - An in-process service implementing the same contract

pub mod client;
pub mod memory;
#[cfg(test)]
pub(crate) mod scripted;

pub use client::{ClientFactory, NoRemote, RemoteParameterClient};
pub use memory::{InMemoryClient, InMemoryParameterService, RemoteCall, ServiceConfig, ServiceStats};
