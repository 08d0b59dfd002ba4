//! Engine - the interface the trial loop needs from a network simulator.
//!
//! The simulation driver never looks inside the network. It clamps vectors
//! onto layers, drives the settle cycle by cycle and quarter by quarter,
//! asks for weight updates, and reads back activity and error metrics.
//! [`crate::network::Network`] is a small reference implementation; any
//! other simulator can be driven by implementing [`Engine`].

use crate::role::RoleMode;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Number of quarters in one settle.
pub const QUARTERS: usize = 4;

/// Default cycles per quarter (100 cycles per settle).
pub const DEFAULT_CYCLES_PER_QUARTER: usize = 25;

/// Stable handle to an engine layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerId(u32);

impl LayerId {
    /// Create a LayerId from a raw u32 value.
    #[inline]
    pub fn from_raw(id: u32) -> Self {
        LayerId(id)
    }

    /// Get the raw value as an index.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Time counters within and across settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimTime {
    /// Cycle within the current settle
    pub cycle: usize,
    /// Quarter within the current settle (0..4)
    pub quarter: usize,
    /// Cycles since the last reset
    pub total_cycles: usize,
    /// Settles since the last reset
    pub settles: usize,
    /// Cycles per quarter
    pub cycles_per_quarter: usize,
}

impl SimTime {
    pub fn new(cycles_per_quarter: usize) -> Self {
        Self {
            cycle: 0,
            quarter: 0,
            total_cycles: 0,
            settles: 0,
            cycles_per_quarter,
        }
    }

    /// Zero all counters, keeping the quarter length.
    pub fn reset(&mut self) {
        *self = Self::new(self.cycles_per_quarter);
    }

    /// Mark the start of a settle.
    pub fn settle_start(&mut self) {
        self.cycle = 0;
        self.quarter = 0;
    }

    pub fn cycle_inc(&mut self) {
        self.cycle += 1;
        self.total_cycles += 1;
    }

    /// Advance to the next quarter; wraps into a new settle after the last.
    pub fn quarter_inc(&mut self) {
        self.quarter += 1;
        if self.quarter == QUARTERS {
            self.settles += 1;
        }
    }

    /// Quarters 0..3 are the minus phase; the last quarter is the plus phase.
    #[inline]
    pub fn is_plus_phase(&self) -> bool {
        self.quarter == QUARTERS - 1
    }
}

impl Default for SimTime {
    fn default() -> Self {
        Self::new(DEFAULT_CYCLES_PER_QUARTER)
    }
}

/// External network simulator driven by the trial loop.
///
/// "Produced activity" is the value a unit settled to at the end of the
/// minus (free-running) phase, never the clamped plus-phase value.
pub trait Engine {
    /// Look up a layer by name.
    fn layer_id(&self, name: &str) -> Option<LayerId>;

    /// Name of a resolved layer.
    fn layer_name(&self, id: LayerId) -> &str;

    /// Number of units in a layer.
    fn num_units(&self, id: LayerId) -> usize;

    /// Re-initialize all weights.
    fn init_weights(&mut self);

    /// Remove every externally applied vector.
    fn clear_external_inputs(&mut self);

    /// Set how a layer treats its external vector.
    fn set_layer_mode(&mut self, id: LayerId, mode: RoleMode);

    /// Apply an external vector to a layer.
    ///
    /// Elements beyond the layer's unit count are ignored.
    fn apply_external(&mut self, id: LayerId, values: &[f32]);

    /// Prepare for a new settle.
    fn alpha_cycle_init(&mut self);

    /// Run one time-step.
    fn cycle(&mut self, time: &SimTime);

    /// Finish a quarter (records minus/plus phase activity).
    fn quarter_final(&mut self, time: &SimTime);

    /// Compute weight changes from the last settle.
    fn compute_dwt(&mut self);

    /// Apply the computed weight changes.
    fn apply_dwt(&mut self);

    /// Minus-phase activity of every unit in a layer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SimError::NoActivity`] when the layer holds no data.
    fn produced_activity(&self, id: LayerId) -> Result<Vec<f32>>;

    /// Tolerance SSE against the layer's target: `(sse, sse / units)`.
    ///
    /// Per-unit differences with magnitude below `tolerance` count as zero.
    fn mse(&self, id: LayerId, tolerance: f32) -> (f32, f32);

    /// Cosine between minus and plus phase activity (1.0 = exact match).
    fn cos_diff(&self, id: LayerId) -> f32;

    /// Running average of the layer's minus-phase activity.
    fn mean_activity(&self, id: LayerId) -> f32;
}
