//! Update Rule Module
//!
//! Provides the seam between averaged gradients and parameter values:
//! - The `UpdateRule` trait
//! - A plain SGD rule
//! - Name-based rule lookup for remote application

pub mod registry;
pub mod rule;

pub use registry::RuleRegistry;
pub use rule::{Sgd, UpdateRule};
