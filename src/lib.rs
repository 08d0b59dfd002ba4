//! Goalseek - a two-phase, goal-driven associative learning driver
//!
//! Goalseek runs the control loop of a small simulated learner that must
//! predict the outcome of an action (sub-phase 0) and then choose the action
//! that achieves a desired outcome (sub-phase 1). The network itself is an
//! external collaborator behind the [`Engine`] trait; this crate owns the
//! data flow around it.
//!
//! # Architecture
//!
//! - **PatternStore**: authored rows of Context, Goal, Motor and Outcome
//!   vectors, one row per trial
//! - **PhaseSequencer**: clamps the right roles for each sub-phase and runs
//!   the quarter/cycle settle
//! - **RelayBuffer**: carries the network's own Motor and Outcome activity
//!   from sub-phase 0 into sub-phase 1
//! - **TrialStats / EpochAccumulators**: per-trial error measures summed
//!   over an epoch
//! - **Sim**: trial and epoch scheduling, presentation order, stop control
//! - **EpochLog**: one normalized row per completed epoch
//! - **Network**: a rate-coded reference [`Engine`]
//!
//! # Examples
//!
//! ```
//! use goalseek::{Network, NetworkConfig, PatternGen, PatternStore, Sim, SimConfig};
//! use rand::SeedableRng;
//!
//! # fn main() -> goalseek::Result<()> {
//! let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//! let store = PatternStore::generate(5, [5, 5], &PatternGen::goal_guy(), &mut rng);
//! let net = Network::from_config(&NetworkConfig::goal_guy())?;
//!
//! let config = SimConfig { cycles_per_quarter: 5, ..SimConfig::default() };
//! let mut sim = Sim::new(config, net, store)?;
//! sim.step_epoch()?;
//!
//! let row = sim.log().last().unwrap();
//! assert_eq!(row.epoch, 0);
//! assert!(row.out_pred_pct_cor >= 0.0 && row.out_pred_pct_cor <= 1.0);
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! Diagnostics go through `tracing`. The library never installs a
//! subscriber.

// Module declarations
pub mod config;
pub mod engine;
pub mod epoch_log;
pub mod error;
pub mod network;
pub mod network_config;
pub mod pattern_store;
pub mod relay;
pub mod role;
pub mod sequencer;
pub mod sim;
pub mod stats;
pub mod utils;

// Re-exports for convenient access
pub use config::{SimConfig, DEFAULT_MAX_EPOCHS};
pub use engine::{Engine, LayerId, SimTime, DEFAULT_CYCLES_PER_QUARTER, QUARTERS};
pub use epoch_log::{EpochLog, EpochRow, COLUMNS};
pub use error::{Result, SimError};
pub use network::Network;
pub use network_config::{
    LayerConfig, NetParams, NetworkConfig, PathClass, PathPattern, ProjectionConfig,
};
pub use pattern_store::{PatternGen, PatternStore};
pub use relay::{CaptureSizes, RelayBuffer};
pub use role::{Role, RoleLayers, RoleMap, RoleMode};
pub use sequencer::{PhaseSequencer, SubPhase, TimeScale, ViewObserver};
pub use sim::{RunSummary, Sim, StopToken, TrainingHandle, TrialReport, TrialState};
pub use stats::{EpochAccumulators, TrialMetrics, TrialStats, DEFAULT_TOLERANCE};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "Goalseek";

/// Get version string
pub fn version() -> String {
    format!("{} v{}", NAME, VERSION)
}
