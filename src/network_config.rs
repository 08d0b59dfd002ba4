//! Network configuration serialization.
//!
//! Describes the reference engine ([`crate::network::Network`]) as plain
//! data so a network can be saved, edited, and rebuilt:
//!
//! 1. **LayerConfig** - a named 2-D group of units and its default mode
//! 2. **ProjectionConfig** - a weighted pathway between two layers
//! 3. **NetworkConfig** - layers, projections, dynamics parameters, and
//!    optionally the learned weights
//!
//! # Example
//!
//! ```
//! use goalseek::{Network, NetworkConfig};
//!
//! # fn main() -> goalseek::Result<()> {
//! let config = NetworkConfig::goal_guy().with_metadata("name", "goal guy");
//! let json = config.to_json()?;
//!
//! let restored = NetworkConfig::from_json(&json)?;
//! let net = Network::from_config(&restored)?;
//! assert_eq!(net.num_layers(), 4);
//! # Ok(())
//! # }
//! ```

use crate::role::RoleMode;
use crate::{Result, SimError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A named layer of units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerConfig {
    pub name: String,
    /// `[rows, cols]`
    pub shape: [usize; 2],
    /// Mode before any role assignment
    pub kind: RoleMode,
    /// Strength of layer-level inhibition
    pub inhib_gain: f32,
}

impl LayerConfig {
    pub fn new(name: impl Into<String>, shape: [usize; 2], kind: RoleMode) -> Self {
        Self {
            name: name.into(),
            shape,
            kind,
            inhib_gain: 1.0,
        }
    }

    #[inline]
    pub fn num_units(&self) -> usize {
        self.shape[0] * self.shape[1]
    }
}

/// Connectivity between sender and receiver units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PathPattern {
    /// Every sender to every receiver
    Full,
    /// Sender `i` to receiver `i` (layers must have equal size)
    OneToOne,
}

/// Direction of a projection relative to the main flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PathClass {
    Forward,
    Back,
}

/// A weighted pathway between two layers, referenced by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectionConfig {
    pub sender: String,
    pub receiver: String,
    pub pattern: PathPattern,
    pub class: PathClass,
    /// Relative contribution to the receiver's net input
    pub wt_scale_rel: f32,
}

impl ProjectionConfig {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        pattern: PathPattern,
        class: PathClass,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            pattern,
            class,
            wt_scale_rel: 1.0,
        }
    }

    pub fn with_scale(mut self, wt_scale_rel: f32) -> Self {
        self.wt_scale_rel = wt_scale_rel;
        self
    }
}

/// Unit dynamics and learning parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetParams {
    /// Learning rate for the contrastive Hebbian update
    pub lrate: f32,
    /// Sigmoid gain
    pub gain: f32,
    /// Activation threshold after inhibition
    pub thr: f32,
    /// Integration rate of activity toward its driven value
    pub dt: f32,
    /// Rate of the running average activity
    pub avg_dt: f32,
    /// Mean of the initial weights
    pub init_wt_mean: f32,
    /// Half-width of the uniform initial weight range
    pub init_wt_var: f32,
    /// Fraction of activity removed at the start of a settle
    pub decay: f32,
}

impl Default for NetParams {
    fn default() -> Self {
        Self {
            lrate: 0.04,
            gain: 12.0,
            thr: 0.1,
            dt: 0.3,
            avg_dt: 0.01,
            init_wt_mean: 0.5,
            init_wt_var: 0.25,
            decay: 1.0,
        }
    }
}

/// Complete reference network description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Version of the serialization format
    pub version: String,

    pub layers: Vec<LayerConfig>,

    pub projections: Vec<ProjectionConfig>,

    #[serde(default)]
    pub params: NetParams,

    /// Seed for weight initialization
    #[serde(default)]
    pub seed: u64,

    /// Learned weights, one vector per projection
    #[serde(default)]
    pub learned_state: Option<Vec<Vec<f32>>>,

    /// Optional metadata (name, description, etc.)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl NetworkConfig {
    pub fn new(layers: Vec<LayerConfig>, projections: Vec<ProjectionConfig>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            layers,
            projections,
            params: NetParams::default(),
            seed: 0,
            learned_state: None,
            metadata: HashMap::new(),
        }
    }

    /// The four-layer goal-driven network: 5x5 Context, Goal, Motor and
    /// Outcome layers.
    ///
    /// Context feeds Goal one-to-one, Goal drives Motor, Motor predicts
    /// Outcome, and Outcome projects back to Motor at a fifth of the
    /// forward strength.
    pub fn goal_guy() -> Self {
        use PathClass::{Back, Forward};
        use PathPattern::{Full, OneToOne};

        let layers = vec![
            LayerConfig::new("Context", [5, 5], RoleMode::Input),
            LayerConfig::new("Goal", [5, 5], RoleMode::Hidden),
            LayerConfig::new("Motor", [5, 5], RoleMode::Hidden),
            LayerConfig::new("Outcome", [5, 5], RoleMode::Target),
        ];
        let projections = vec![
            ProjectionConfig::new("Context", "Goal", OneToOne, Forward),
            ProjectionConfig::new("Goal", "Motor", Full, Forward),
            ProjectionConfig::new("Motor", "Outcome", Full, Forward),
            ProjectionConfig::new("Outcome", "Motor", Full, Back).with_scale(0.2),
        ];
        Self::new(layers, projections)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_params(mut self, params: NetParams) -> Self {
        self.params = params;
        self
    }

    /// Create configuration with learned weights.
    pub fn with_state(mut self, learned_state: Vec<Vec<f32>>) -> Self {
        self.learned_state = Some(learned_state);
        self
    }

    /// Add metadata to the configuration.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check names, shapes and projection endpoints.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for layer in &self.layers {
            if !seen.insert(layer.name.as_str()) {
                return Err(SimError::InvalidParameter(format!(
                    "duplicate layer name '{}'",
                    layer.name
                )));
            }
            if layer.num_units() == 0 {
                return Err(SimError::InvalidParameter(format!(
                    "layer '{}' has no units",
                    layer.name
                )));
            }
        }

        for proj in &self.projections {
            let units = |name: &str| {
                self.layers
                    .iter()
                    .find(|l| l.name == name)
                    .map(LayerConfig::num_units)
                    .ok_or_else(|| {
                        SimError::InvalidParameter(format!("projection names unknown layer '{}'", name))
                    })
            };
            let send = units(&proj.sender)?;
            let recv = units(&proj.receiver)?;
            if proj.pattern == PathPattern::OneToOne && send != recv {
                return Err(SimError::InvalidParameter(format!(
                    "one-to-one projection {} -> {} joins {} and {} units",
                    proj.sender, proj.receiver, send, recv
                )));
            }
        }

        if let Some(state) = &self.learned_state {
            if state.len() != self.projections.len() {
                return Err(SimError::InvalidParameter(format!(
                    "learned state has {} weight sets for {} projections",
                    state.len(),
                    self.projections.len()
                )));
            }
        }
        Ok(())
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to binary (bincode).
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary (bincode).
    pub fn from_binary(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}
