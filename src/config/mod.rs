//! Run configuration
//!
//! Settings that shape how a prepared query is executed: pool size, probe
//! timeout and dispatch behaviour. Everything has a default so an empty JSON
//! object is a valid configuration.

use crate::error::{PortQueryError, Result};
use serde::Deserialize;
use std::time::Duration;

/// Default probe timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Default number of non-blocking passes over the queue ring per submission
pub const DEFAULT_PUSH_ROUNDS: usize = 1;

/// Settings for running a query
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    /// Worker thread count, 0 means one per hardware thread
    pub threads: usize,
    /// Per-probe timeout
    pub timeout_ms: u64,
    /// Non-blocking push passes over every queue before falling back to a blocking push
    pub push_rounds: usize,
    /// Dispatch candidate ports in random order instead of ascending
    pub randomize_order: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            push_rounds: DEFAULT_PUSH_ROUNDS,
            randomize_order: false,
        }
    }
}

impl QueryConfig {
    /// Parse and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: QueryConfig = serde_json::from_str(json)
            .map_err(|e| PortQueryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that can never work
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(PortQueryError::Config(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.push_rounds == 0 {
            return Err(PortQueryError::Config(
                "push_rounds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Probe timeout as a [`Duration`]
    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Builder-style thread count override
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Builder-style timeout override
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = QueryConfig::from_json("{}").unwrap();
        assert_eq!(config, QueryConfig::default());
        assert_eq!(config.timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_json() {
        let config = QueryConfig::from_json(r#"{"threads": 4, "randomize_order": true}"#).unwrap();
        assert_eq!(config.threads, 4);
        assert!(config.randomize_order);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            QueryConfig::from_json(r#"{"timeout_ms": 0}"#),
            Err(PortQueryError::Config(_))
        ));
        assert!(matches!(
            QueryConfig::from_json(r#"{"push_rounds": 0}"#),
            Err(PortQueryError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(QueryConfig::from_json(r#"{"thread": 4}"#).is_err());
    }
}
