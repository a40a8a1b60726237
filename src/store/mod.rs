//! Parameter Store Module
//!
//! Provides the worker-local view of distributed parameters:
//! - Mode dispatch between local memory and the remote service
//! - Batched asynchronous prefetch with fallback initialization
//! - Per-round gradient accumulation and barrier synchronization

pub mod cache;
pub mod config;
pub mod context;
pub mod gradient;
pub mod kv;
pub mod prefetch;
pub mod stats;
pub mod sync;

pub use cache::LocalCache;
pub use config::{Mode, StoreConfig};
pub use context::WorkerContext;
pub use gradient::{GradientAccumulator, GradientEntry};
pub use kv::ParameterStore;
pub use prefetch::{FetchWorker, Initializer, PrefetchQueue, ResolveSummary};
pub use stats::{StatsSnapshot, StoreStats};
pub use sync::{RoundReport, Synchronizer};
