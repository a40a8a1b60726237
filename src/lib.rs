//! # bspstore - Worker-local parameter store for BSP training
//!
//! A uniform key → matrix interface over model parameters:
//! - **Store**: local cache with mode dispatch (standalone, worker, server)
//! - **Prefetch**: batched background resolution with fallback initializers
//! - **Rounds**: gradient accumulation, averaged updates and barrier sync
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bspstore::core::Matrix;
//! use bspstore::store::ParameterStore;
//! use bspstore::update::Sgd;
//!
//! #[tokio::main]
//! async fn main() -> bspstore::Result<()> {
//!     let store = ParameterStore::standalone()?;
//!     let mut ctx = store.context()?;
//!
//!     store.get_or_init(&mut ctx, "w", || Ok(Matrix::zeros(2, 2))).await?;
//!     store.accumulate("w", Matrix::filled(2, 2, 0.5)).await?;
//!     let report = store.apply_round(&mut ctx, &Sgd::new(0.1)).await?;
//!     println!("round {} applied {} keys", report.round, report.keys_applied);
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod monitoring;
pub mod remote;
pub mod store;
pub mod update;

pub use crate::core::error::{Error, Result};
