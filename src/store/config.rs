//! Store configuration.
//!
//! The process role is fixed at construction and decides which data paths
//! are legal.

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Role of this process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Single process, parameters held only in local memory
    Standalone,
    /// Distributed training worker backed by a remote service
    Worker,
    /// The parameter-server role itself
    ParameterServer,
}

impl Mode {
    pub fn is_parameter_server(&self) -> bool {
        matches!(self, Mode::ParameterServer)
    }

    pub fn is_distributed(&self) -> bool {
        matches!(self, Mode::Worker | Mode::ParameterServer)
    }

    pub fn is_standalone(&self) -> bool {
        matches!(self, Mode::Standalone)
    }

    /// Distributed and not the server: values live remotely.
    pub fn is_distributed_worker(&self) -> bool {
        self.is_distributed() && !self.is_parameter_server()
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Standalone => write!(f, "standalone"),
            Mode::Worker => write!(f, "worker"),
            Mode::ParameterServer => write!(f, "server"),
        }
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standalone" | "local" => Ok(Mode::Standalone),
            "worker" => Ok(Mode::Worker),
            "server" | "ps" | "parameter_server" => Ok(Mode::ParameterServer),
            other => Err(Error::Config(format!("unknown mode: {}", other))),
        }
    }
}

/// Parameter store configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Process role
    pub mode: Mode,
    /// Upper bound on a single wait for prefetch completion
    pub poll_interval_ms: u64,
    /// Name used in log output
    pub name: String,
}

impl StoreConfig {
    /// Standalone store.
    pub fn standalone() -> Self {
        Self {
            mode: Mode::Standalone,
            poll_interval_ms: 300,
            name: "kvstore".to_string(),
        }
    }

    /// Distributed worker store.
    pub fn worker() -> Self {
        Self {
            mode: Mode::Worker,
            ..Self::standalone()
        }
    }

    /// Parameter-server store.
    pub fn parameter_server() -> Self {
        Self {
            mode: Mode::ParameterServer,
            ..Self::standalone()
        }
    }

    /// Set the prefetch poll interval, rounded to whole milliseconds.
    ///
    /// Intervals below one millisecond are raised to one.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.poll_interval_ms = millis.max(1);
        self
    }

    /// Set the store name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: StoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the store relies on.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::standalone()
    }
}
