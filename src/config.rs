//! Engine settings, loadable from JSON.
//!
//! ```json
//! { "iterate": { "tolerance": 1e-8, "max_iteration": 50 }, "optimizer_max_iterations": 200 }
//! ```
//! Every field is optional; missing ones take the defaults below.

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default convergence tolerance for fixed-point iteration
pub const DEFAULT_TOLERANCE: f64 = 1.0e-6;

/// Default iteration bound for fixed-point iteration
pub const DEFAULT_MAX_ITERATION: i64 = 25;

/// Default outer-iteration bound for optimizer drivers
pub const DEFAULT_OPTIMIZER_MAX_ITERATIONS: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterateSettings {
    pub tolerance: f64,
    pub max_iteration: i64,
}

impl Default for IterateSettings {
    fn default() -> Self {
        Self { tolerance: DEFAULT_TOLERANCE, max_iteration: DEFAULT_MAX_ITERATION }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub iterate: IterateSettings,
    pub optimizer_max_iterations: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            iterate: IterateSettings::default(),
            optimizer_max_iterations: DEFAULT_OPTIMIZER_MAX_ITERATIONS,
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| FlowError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| FlowError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| FlowError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, text)
            .map_err(|e| FlowError::Config(format!("Failed to write {}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.iterate.tolerance >= 0.0) {
            return Err(FlowError::Config(format!(
                "iterate.tolerance must be non-negative, got {}",
                self.iterate.tolerance
            )));
        }
        if self.iterate.max_iteration < 1 {
            return Err(FlowError::Config(format!(
                "iterate.max_iteration must be at least 1, got {}",
                self.iterate.max_iteration
            )));
        }
        if self.optimizer_max_iterations < 1 {
            return Err(FlowError::Config(format!(
                "optimizer_max_iterations must be at least 1, got {}",
                self.optimizer_max_iterations
            )));
        }
        Ok(())
    }
}
