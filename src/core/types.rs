//! Common types used across store modules.

/// Identifier of a parameter, shared between the local cache and the remote service.
pub type ParameterKey = String;

/// Timestamp wrapper for consistent serialization.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Get current UTC timestamp.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}
