//! Core utilities and common types for the store.

pub mod error;
pub mod matrix;
pub mod types;

pub use error::{Error, Result};
pub use matrix::Matrix;
pub use types::*;
