//! Solver tuning, loadable from TOML.
//!
//! ```
//! use room_wizard::SolverConfig;
//! use std::time::Duration;
//!
//! let config = SolverConfig::from_toml_str(r#"
//!     time_limit_secs = 30
//!     workers = 4
//!
//!     [warm_start]
//!     max_iterations = 5000
//! "#).unwrap();
//!
//! assert_eq!(config.time_limit(), Duration::from_secs(30));
//! assert_eq!(config.warm_start.max_iterations, 5000);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Simulated-annealing parameters for the warm start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealParams {
    pub enabled: bool,
    /// Initial temperature, in score units.
    pub temperature: f64,
    pub cooling_rate: f64,
    pub max_iterations: usize,
    /// Share of the time limit the warm start may use.
    pub time_share: f64,
}

impl Default for AnnealParams {
    fn default() -> Self {
        AnnealParams {
            enabled: true,
            temperature: 2.0,
            cooling_rate: 0.999,
            max_iterations: 20_000,
            time_share: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub time_limit_secs: f64,
    /// Search threads. 0 or 1 searches on the calling thread.
    pub workers: usize,
    pub random_seed: u64,
    /// Search nodes between wall-clock checks.
    pub check_interval: u64,
    pub warm_start: AnnealParams,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            time_limit_secs: 300.0,
            workers: 8,
            random_seed: 42,
            check_interval: 1024,
            warm_start: AnnealParams::default(),
        }
    }
}

impl SolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::error::RoomError::Config(format!("cannot read solver config: {e}"))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn with_time_limit_secs(mut self, seconds: f64) -> Self {
        self.time_limit_secs = seconds;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_warm_start(mut self, params: AnnealParams) -> Self {
        self.warm_start = params;
        self
    }

    pub fn without_warm_start(mut self) -> Self {
        self.warm_start.enabled = false;
        self
    }

    /// Negative or NaN limits read as zero.
    pub fn time_limit(&self) -> Duration {
        if self.time_limit_secs.is_finite() && self.time_limit_secs > 0.0 {
            Duration::from_secs_f64(self.time_limit_secs)
        } else {
            Duration::ZERO
        }
    }

    pub fn warm_start_limit(&self) -> Duration {
        self.time_limit().mul_f64(self.warm_start.time_share.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_keys() {
        let config = SolverConfig::from_toml_str("workers = 2").unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.time_limit(), Duration::from_secs(300));
        assert!(config.warm_start.enabled);
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(SolverConfig::from_toml_str("workers = \"many\"").is_err());
    }

    #[test]
    fn builder() {
        let config = SolverConfig::new()
            .with_time_limit_secs(2.0)
            .with_workers(1)
            .with_random_seed(7)
            .without_warm_start();
        assert_eq!(config.time_limit(), Duration::from_secs(2));
        assert_eq!(config.warm_start_limit(), Duration::from_millis(200));
        assert_eq!(config.random_seed, 7);
        assert!(!config.warm_start.enabled);
    }

    #[test]
    fn negative_limit_is_zero() {
        let config = SolverConfig::new().with_time_limit_secs(-1.0);
        assert_eq!(config.time_limit(), Duration::ZERO);
    }
}
