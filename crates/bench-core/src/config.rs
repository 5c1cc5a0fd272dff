//! Run configuration schema and validation

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum number of iterations per scenario
pub const MAX_ITERATIONS: u32 = 100;

/// Minimum per-iteration timeout in milliseconds
pub const MIN_TIMEOUT_MS: u64 = 5_000;

/// Configuration for one benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Repetitions per scenario (1..=100)
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Per-iteration wall-clock budget in milliseconds (>= 5000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Sampling temperature (0.0..=2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request token-by-token streaming and derive TTFT/TPOT
    #[serde(default)]
    pub streaming: bool,

    /// Pause between iterations in milliseconds, to let the backend settle
    /// between requests. Defaults to 100.
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
}

fn default_iterations() -> u32 {
    5
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_pause_ms() -> u64 {
    100
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            timeout_ms: default_timeout_ms(),
            temperature: default_temperature(),
            streaming: false,
            pause_ms: default_pause_ms(),
        }
    }
}

impl RunConfig {
    /// Validate the configuration ranges
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 || self.iterations > MAX_ITERATIONS {
            return Err(Error::bad_input(format!(
                "iterations must be between 1 and {}, got {}",
                MAX_ITERATIONS, self.iterations
            )));
        }
        if self.timeout_ms < MIN_TIMEOUT_MS {
            return Err(Error::bad_input(format!(
                "timeout_ms must be at least {}, got {}",
                MIN_TIMEOUT_MS, self.timeout_ms
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::bad_input(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }
        Ok(())
    }

    /// The per-iteration deadline as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The inter-iteration pause as a [`Duration`]
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    /// Builder-style override for iterations
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Builder-style override for the per-iteration timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Builder-style override for streaming
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.iterations, 5);
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.pause_ms, 100);
        assert!(!config.streaming);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_iteration_bounds() {
        assert!(RunConfig::default().with_iterations(0).validate().is_err());
        assert!(RunConfig::default().with_iterations(1).validate().is_ok());
        assert!(RunConfig::default().with_iterations(100).validate().is_ok());
        assert!(RunConfig::default().with_iterations(101).validate().is_err());
    }

    #[test]
    fn test_timeout_bound() {
        assert!(RunConfig::default().with_timeout_ms(4_999).validate().is_err());
        assert!(RunConfig::default().with_timeout_ms(5_000).validate().is_ok());
    }

    #[test]
    fn test_temperature_bounds() {
        let mut config = RunConfig::default();
        config.temperature = -0.1;
        assert!(config.validate().is_err());
        config.temperature = 2.0;
        assert!(config.validate().is_ok());
        config.temperature = 2.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_defaults() {
        let config: RunConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RunConfig::default());

        let config: RunConfig =
            serde_json::from_str(r#"{"iterations": 3, "streaming": true}"#).unwrap();
        assert_eq!(config.iterations, 3);
        assert!(config.streaming);
        assert_eq!(config.timeout_ms, 30_000);
    }
}
