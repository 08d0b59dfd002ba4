//! Simulation run configuration.
//!
//! All fields have defaults, so a JSON file only needs the values it wants
//! to change:
//!
//! ```
//! use goalseek::SimConfig;
//!
//! let cfg = SimConfig::from_json(r#"{ "max_epochs": 20, "sequential": true }"#).unwrap();
//! assert_eq!(cfg.max_epochs, 20);
//! assert!(cfg.sequential);
//! assert_eq!(cfg.seed, 1);
//! assert_eq!(cfg.tolerance, 0.5);
//! ```

use crate::engine::DEFAULT_CYCLES_PER_QUARTER;
use crate::sequencer::TimeScale;
use crate::stats::DEFAULT_TOLERANCE;
use crate::{Result, SimError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Epoch limit used when `max_epochs` is left at 0.
pub const DEFAULT_MAX_EPOCHS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Maximum epochs for `train` (0 = use the default)
    pub max_epochs: usize,
    /// Seed for presentation order
    pub seed: u64,
    /// Present rows in index order instead of a fresh permutation per epoch
    pub sequential: bool,
    /// Update weights after every settle (false = test mode)
    pub learn: bool,
    /// Notify the view observer while running
    pub view_on: bool,
    /// View granularity while learning
    pub train_update: TimeScale,
    /// View granularity while not learning
    pub test_update: TimeScale,
    /// Per-unit error tolerance
    pub tolerance: f32,
    /// Engine cycles per settle quarter
    pub cycles_per_quarter: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_epochs: 0,
            seed: 1,
            sequential: false,
            learn: true,
            view_on: true,
            train_update: TimeScale::Cycle,
            test_update: TimeScale::Cycle,
            tolerance: DEFAULT_TOLERANCE,
            cycles_per_quarter: DEFAULT_CYCLES_PER_QUARTER,
        }
    }
}

impl SimConfig {
    /// Replace the seed with one drawn from the wall clock.
    pub fn new_random_seed(&mut self) {
        self.seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);
    }

    /// `max_epochs`, or the default when unset.
    pub fn effective_max_epochs(&self) -> usize {
        if self.max_epochs == 0 {
            DEFAULT_MAX_EPOCHS
        } else {
            self.max_epochs
        }
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.cycles_per_quarter == 0 {
            return Err(SimError::InvalidParameter(
                "cycles_per_quarter must be at least 1".into(),
            ));
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(SimError::InvalidParameter(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: SimConfig = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}
