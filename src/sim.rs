//! Sim - the trial and epoch scheduler.
//!
//! One call to [`Sim::step_trial`] runs a complete trial:
//!
//! 1. resolve the Pattern Store row from the presentation order
//! 2. sub-phase 0: apply inputs, settle (and learn), capture Motor and
//!    Outcome activity into the relay buffer, accumulate statistics
//! 3. sub-phase 1: apply inputs, settle (and learn), clear the relay row,
//!    accumulate statistics
//! 4. advance the trial counter; after the last row, close the epoch
//!    (append the epoch log row, reset the trial counter, advance the
//!    epoch, re-permute the order)
//!
//! The two sub-phases of a trial are never split: the stop flag is only
//! checked between trials.
//!
//! # Examples
//!
//! ```
//! use goalseek::{NetworkConfig, Network, PatternGen, PatternStore, Sim, SimConfig};
//! use rand::SeedableRng;
//!
//! # fn main() -> goalseek::Result<()> {
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let store = PatternStore::generate(4, [5, 5], &PatternGen::goal_guy(), &mut rng);
//! let net = Network::from_config(&NetworkConfig::goal_guy())?;
//!
//! let cfg = SimConfig { max_epochs: 2, cycles_per_quarter: 5, ..SimConfig::default() };
//! let mut sim = Sim::new(cfg, net, store)?;
//! let summary = sim.train()?;
//!
//! assert_eq!(summary.epochs, 2);
//! assert_eq!(sim.log().len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::config::SimConfig;
use crate::engine::Engine;
use crate::epoch_log::EpochLog;
use crate::pattern_store::PatternStore;
use crate::relay::RelayBuffer;
use crate::role::{Role, RoleLayers, RoleMap};
use crate::sequencer::{PhaseSequencer, SubPhase, ViewObserver};
use crate::stats::{EpochAccumulators, TrialMetrics, TrialStats};
use crate::utils::{permutation, shuffle_indices};
use crate::{Result, SimError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where the scheduler is within a trial.
///
/// `EpochBoundary` is held from the close of an epoch until the next
/// trial starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    AwaitingSubPhase0,
    AwaitingSubPhase1,
    EpochBoundary,
}

/// Cooperative cancellation flag, polled between trials.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop at the next trial boundary.
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Outcome of one [`Sim::step_trial`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialReport {
    /// Epoch the trial belonged to
    pub epoch: usize,
    /// Trial counter within the epoch
    pub trial: usize,
    /// Pattern Store row presented (`None` for an empty store)
    pub row: Option<usize>,
    /// Sub-phase 0 metrics
    pub outcome_driven: TrialMetrics,
    /// Sub-phase 1 metrics
    pub goal_driven: TrialMetrics,
    /// Epoch closed by this call, if any
    pub closed_epoch: Option<usize>,
}

/// Timing of a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Epochs completed during the run
    pub epochs: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Mean wall time per completed epoch.
    pub fn per_epoch(&self) -> Duration {
        if self.epochs == 0 {
            Duration::ZERO
        } else {
            self.elapsed / self.epochs as u32
        }
    }
}

/// Drives trials, epochs and presentation order over an [`Engine`].
pub struct Sim<E: Engine> {
    config: SimConfig,
    engine: E,
    store: PatternStore,
    relay: RelayBuffer,
    sequencer: PhaseSequencer,
    stats: TrialStats,
    acc: EpochAccumulators,
    log: EpochLog,
    order: Vec<usize>,
    rng: StdRng,
    max_epochs: usize,
    epoch: usize,
    trial: usize,
    state: TrialState,
    stop: StopToken,
}

impl<E: Engine> Sim<E> {
    /// Resolve role layers, check sizes, and initialize a run.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or any role has no layer in
    /// the engine. Size mismatches are only logged.
    pub fn new(config: SimConfig, engine: E, store: PatternStore) -> Result<Self> {
        config.validate()?;
        let layers = RoleLayers::resolve(&engine)?;
        check_layer_sizes(&engine, &layers, &store);

        let sequencer = PhaseSequencer::new(layers, config.cycles_per_quarter).with_view(
            config.view_on,
            config.train_update,
            config.test_update,
        );
        let stats = TrialStats::new(layers, config.tolerance);
        let relay = RelayBuffer::new(store.num_rows(), store.cells());

        let mut sim = Self {
            rng: StdRng::seed_from_u64(config.seed),
            max_epochs: config.effective_max_epochs(),
            config,
            engine,
            store,
            relay,
            sequencer,
            stats,
            acc: EpochAccumulators::new(),
            log: EpochLog::new(),
            order: Vec::new(),
            epoch: 0,
            trial: 0,
            state: TrialState::AwaitingSubPhase0,
            stop: StopToken::new(),
        };
        sim.init();
        Ok(sim)
    }

    /// Restart the run: reseed, reset counters, draw a new order,
    /// re-initialize weights, and clear the epoch log.
    pub fn init(&mut self) {
        self.rng = StdRng::seed_from_u64(self.config.seed);
        self.max_epochs = self.config.effective_max_epochs();
        self.epoch = 0;
        self.trial = 0;
        self.state = TrialState::AwaitingSubPhase0;
        self.stop.reset();
        self.sequencer.reset_time();

        let n = self.store.num_rows();
        self.order = if self.config.sequential {
            (0..n).collect()
        } else {
            permutation(n, &mut self.rng)
        };

        self.engine.init_weights();
        self.log.clear();
        self.acc.reset();
        self.relay.reset();
        self.sequencer.update_view();
    }

    /// Replace the Pattern Store from a JSON file and re-initialize.
    ///
    /// A load failure is logged and leaves an empty store of the same shape.
    pub fn open_patterns(&mut self, path: impl AsRef<Path>) {
        let store = PatternStore::open_or_empty(path, self.store.shape());
        self.set_patterns(store);
    }

    /// Replace the Pattern Store and re-initialize.
    pub fn set_patterns(&mut self, store: PatternStore) {
        check_layer_sizes(&self.engine, self.sequencer.layers(), &store);
        self.relay = RelayBuffer::new(store.num_rows(), store.cells());
        self.store = store;
        self.init();
    }

    /// Install a view observer.
    pub fn set_observer(&mut self, observer: Box<dyn ViewObserver>) {
        self.sequencer.set_observer(observer);
    }

    /// Pattern Store row presented at the current trial.
    pub fn current_row(&self) -> Option<usize> {
        if self.config.sequential {
            (self.trial < self.store.num_rows()).then_some(self.trial)
        } else {
            self.order.get(self.trial).copied()
        }
    }

    /// Run both sub-phases of the next trial.
    ///
    /// # Errors
    ///
    /// Only fatal errors are returned, and always before sub-phase 0
    /// touches the engine.
    pub fn step_trial(&mut self) -> Result<TrialReport> {
        let learn = self.config.learn;
        let mut report = TrialReport {
            epoch: self.epoch,
            trial: self.trial,
            row: self.current_row(),
            outcome_driven: TrialMetrics::default(),
            goal_driven: TrialMetrics::default(),
            closed_epoch: None,
        };

        if let Some(row) = report.row {
            self.state = TrialState::AwaitingSubPhase0;
            self.sequencer.run_sub_phase(
                &mut self.engine,
                &self.store,
                &self.relay,
                row,
                SubPhase::OutcomeDriven,
                learn,
            )?;
            let sizes = self.relay.capture(&self.engine, self.sequencer.layers(), row);
            report.outcome_driven =
                self.stats
                    .compute(&self.engine, SubPhase::OutcomeDriven, true, &mut self.acc);

            self.state = TrialState::AwaitingSubPhase1;
            self.sequencer.run_sub_phase(
                &mut self.engine,
                &self.store,
                &self.relay,
                row,
                SubPhase::GoalDriven,
                learn,
            )?;
            self.relay.clear(row, sizes);
            report.goal_driven =
                self.stats
                    .compute(&self.engine, SubPhase::GoalDriven, true, &mut self.acc);

            self.trial += 1;
            self.state = TrialState::AwaitingSubPhase0;
        }

        if self.trial >= self.store.num_rows() {
            report.closed_epoch = Some(self.close_epoch()?);
        }
        Ok(report)
    }

    /// Run trials until the epoch advances or a stop is requested.
    pub fn step_epoch(&mut self) -> Result<()> {
        let cur = self.epoch;
        loop {
            self.step_trial()?;
            if self.stop.is_stop_requested() || self.epoch > cur {
                return Ok(());
            }
        }
    }

    /// Run trials until a stop is requested or `max_epochs` is reached.
    ///
    /// Clears any earlier stop request first, so a stopped run resumes
    /// where it left off.
    pub fn run(&mut self, max_epochs: usize) -> Result<RunSummary> {
        self.stop.reset();
        self.run_until_stopped(max_epochs)
    }

    /// Run until the configured epoch limit.
    pub fn train(&mut self) -> Result<RunSummary> {
        self.run(self.max_epochs)
    }

    fn run_until_stopped(&mut self, max_epochs: usize) -> Result<RunSummary> {
        let start_epoch = self.epoch;
        let start = Instant::now();
        while !self.stop.is_stop_requested() && self.epoch < max_epochs {
            self.step_trial()?;
        }
        let summary = RunSummary {
            epochs: self.epoch - start_epoch,
            elapsed: start.elapsed(),
        };
        info!(
            epochs = summary.epochs,
            secs = summary.elapsed.as_secs_f64(),
            per_epoch_secs = summary.per_epoch().as_secs_f64(),
            "training finished"
        );
        Ok(summary)
    }

    /// Ask a running `train`/`run`/`step_epoch` to stop at the next trial
    /// boundary.
    pub fn stop(&self) {
        self.stop.request_stop();
    }

    /// Shared handle to the stop flag.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    fn close_epoch(&mut self) -> Result<usize> {
        self.state = TrialState::EpochBoundary;
        let layers = *self.sequencer.layers();
        let mean_act = RoleMap::from_fn(|role| self.engine.mean_activity(layers[role]));

        let closed = self.epoch;
        let row = *self
            .log
            .append_epoch(closed, &mut self.acc, self.store.num_rows(), mean_act)?;
        debug!(
            epoch = closed,
            out_sse = row.out_sse,
            mot_sse = row.mot_sse,
            out_cos_diff = row.out_cos_diff,
            out_goal_pct_err = row.out_goal_pct_err,
            "epoch complete"
        );

        self.trial = 0;
        self.epoch += 1;
        if !self.config.sequential {
            shuffle_indices(&mut self.order, &mut self.rng);
        }
        self.sequencer.epoch_view(self.config.learn, &row);
        Ok(closed)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn store(&self) -> &PatternStore {
        &self.store
    }

    pub fn relay(&self) -> &RelayBuffer {
        &self.relay
    }

    pub fn log(&self) -> &EpochLog {
        &self.log
    }

    pub fn accumulators(&self) -> &EpochAccumulators {
        &self.acc
    }

    pub fn layers(&self) -> &RoleLayers {
        self.sequencer.layers()
    }

    pub fn presentation_order(&self) -> &[usize] {
        &self.order
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn trial(&self) -> usize {
        self.trial
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn max_epochs(&self) -> usize {
        self.max_epochs
    }
}

impl<E: Engine + Send + 'static> Sim<E> {
    /// Run [`Sim::train`] on a background thread.
    ///
    /// The stop flag is cleared before the thread starts, so a stop
    /// requested through the handle is never lost.
    pub fn spawn_train(self) -> TrainingHandle<E> {
        let stop = self.stop_token();
        stop.reset();
        let handle = thread::spawn(move || {
            let mut sim = self;
            let max_epochs = sim.max_epochs;
            let result = sim.run_until_stopped(max_epochs);
            (sim, result)
        });
        TrainingHandle { stop, handle }
    }
}

/// A training run in progress on another thread.
pub struct TrainingHandle<E: Engine> {
    stop: StopToken,
    handle: JoinHandle<(Sim<E>, Result<RunSummary>)>,
}

impl<E: Engine> TrainingHandle<E> {
    /// Request a stop at the next trial boundary.
    pub fn stop(&self) {
        self.stop.request_stop();
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run and take the simulation back.
    pub fn join(self) -> Result<(Sim<E>, RunSummary)> {
        let (sim, result) = self
            .handle
            .join()
            .map_err(|_| SimError::Other("training thread panicked".into()))?;
        Ok((sim, result?))
    }
}

fn check_layer_sizes<E: Engine + ?Sized>(engine: &E, layers: &RoleLayers, store: &PatternStore) {
    for role in Role::ALL {
        let units = engine.num_units(layers[role]);
        if !store.is_empty() && units != store.cells() {
            warn!(%role, units, cells = store.cells(), "layer size differs from pattern size");
        }
    }
    let goal = engine.num_units(layers[Role::Goal]);
    let outcome = engine.num_units(layers[Role::Outcome]);
    if goal != outcome {
        let e = SimError::UnitCountMismatch {
            left: Role::Goal,
            left_units: goal,
            right: Role::Outcome,
            right_units: outcome,
        };
        warn!(error = %e, "goal/outcome statistics will compare overlapping units");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_token_shared() {
        let a = StopToken::new();
        let b = a.clone();
        assert!(!b.is_stop_requested());
        a.request_stop();
        assert!(b.is_stop_requested());
        b.reset();
        assert!(!a.is_stop_requested());
    }

    #[test]
    fn test_run_summary_per_epoch() {
        let s = RunSummary {
            epochs: 4,
            elapsed: Duration::from_millis(100),
        };
        assert_eq!(s.per_epoch(), Duration::from_millis(25));

        let empty = RunSummary {
            epochs: 0,
            elapsed: Duration::from_millis(5),
        };
        assert_eq!(empty.per_epoch(), Duration::ZERO);
    }
}
