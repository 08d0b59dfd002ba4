//! PhaseSequencer - clamps the right roles for a sub-phase and settles.
//!
//! A trial runs two sub-phases in order:
//!
//! | role    | sub-phase 0 (outcome-driven) | sub-phase 1 (goal-driven)   |
//! |---------|------------------------------|-----------------------------|
//! | Context | Input (authored)             | Input (not applied)         |
//! | Goal    | Hidden                       | Input (= relayed Outcome)   |
//! | Motor   | Hidden                       | Target (= relayed Motor)    |
//! | Outcome | Target (authored)            | Hidden                      |
//!
//! Goal's clamp vector in sub-phase 1 is the Outcome the network produced
//! in sub-phase 0, not the Goal column of the Pattern Store. When no
//! activity was relayed for a role the authored column is used instead.
//!
//! A settle is [`QUARTERS`] quarters of `cycles_per_quarter` engine cycles,
//! followed by one weight update when learning.

use crate::engine::{Engine, SimTime, QUARTERS};
use crate::epoch_log::EpochRow;
use crate::pattern_store::PatternStore;
use crate::relay::RelayBuffer;
use crate::role::{Role, RoleLayers, RoleMode};
use crate::{Result, SimError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two ordered stages of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubPhase {
    /// Context in, Outcome as target
    OutcomeDriven = 0,
    /// Goal in, Motor as target
    GoalDriven = 1,
}

impl SubPhase {
    /// Both sub-phases in execution order.
    pub const ORDER: [SubPhase; 2] = [SubPhase::OutcomeDriven, SubPhase::GoalDriven];

    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Activation mode of `role` during this sub-phase.
    pub fn mode(self, role: Role) -> RoleMode {
        match (self, role) {
            (_, Role::Context) => RoleMode::Input,
            (SubPhase::OutcomeDriven, Role::Goal) => RoleMode::Hidden,
            (SubPhase::OutcomeDriven, Role::Motor) => RoleMode::Hidden,
            (SubPhase::OutcomeDriven, Role::Outcome) => RoleMode::Target,
            (SubPhase::GoalDriven, Role::Goal) => RoleMode::Input,
            (SubPhase::GoalDriven, Role::Motor) => RoleMode::Target,
            (SubPhase::GoalDriven, Role::Outcome) => RoleMode::Hidden,
        }
    }

    /// Roles that receive an external vector during this sub-phase.
    pub fn clamped(self) -> [Role; 2] {
        match self {
            SubPhase::OutcomeDriven => [Role::Context, Role::Outcome],
            SubPhase::GoalDriven => [Role::Goal, Role::Motor],
        }
    }
}

impl TryFrom<u8> for SubPhase {
    type Error = SimError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SubPhase::OutcomeDriven),
            1 => Ok(SubPhase::GoalDriven),
            v => Err(SimError::InvalidSubPhase(v)),
        }
    }
}

impl fmt::Display for SubPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Granularity at which the view observer is notified.
///
/// Ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimeScale {
    /// Every cycle
    Cycle,
    /// Every 10th cycle of a quarter
    FastSpike,
    /// Every quarter
    Quarter,
    /// Quarters 2 and 3 (end of minus and plus phase)
    Phase,
    /// Once per settle
    AlphaCycle,
    /// At epoch boundaries, like `Epoch`
    Trial,
    /// At epoch boundaries
    Epoch,
}

/// Receives view updates while the network settles.
///
/// `epoch_logged` is called with every new epoch log row, whether or not
/// the view is on. Closures only receive view updates.
pub trait ViewObserver: Send {
    fn update(&mut self, time: &SimTime);

    fn epoch_logged(&mut self, _row: &EpochRow) {}
}

impl<F: FnMut(&SimTime) + Send> ViewObserver for F {
    fn update(&mut self, time: &SimTime) {
        self(time)
    }
}

/// Applies sub-phase inputs and drives the engine's settle.
pub struct PhaseSequencer {
    layers: RoleLayers,
    time: SimTime,
    view_on: bool,
    train_update: TimeScale,
    test_update: TimeScale,
    observer: Option<Box<dyn ViewObserver>>,
}

impl PhaseSequencer {
    /// Create a sequencer over resolved role layers.
    pub fn new(layers: RoleLayers, cycles_per_quarter: usize) -> Self {
        Self {
            layers,
            time: SimTime::new(cycles_per_quarter),
            view_on: false,
            train_update: TimeScale::Cycle,
            test_update: TimeScale::Cycle,
            observer: None,
        }
    }

    /// Configure view updates for training and test settles.
    pub fn with_view(mut self, on: bool, train_update: TimeScale, test_update: TimeScale) -> Self {
        self.view_on = on;
        self.train_update = train_update;
        self.test_update = test_update;
        self
    }

    /// Install the view observer.
    pub fn set_observer(&mut self, observer: Box<dyn ViewObserver>) {
        self.observer = Some(observer);
    }

    pub fn layers(&self) -> &RoleLayers {
        &self.layers
    }

    pub fn time(&self) -> &SimTime {
        &self.time
    }

    pub fn reset_time(&mut self) {
        self.time.reset();
    }

    /// Set role modes and apply the clamp vectors for `sub_phase` at `row`.
    ///
    /// Does not touch the Pattern Store or the relay buffer.
    pub fn apply_inputs<E: Engine + ?Sized>(
        &self,
        engine: &mut E,
        store: &PatternStore,
        relay: &RelayBuffer,
        row: usize,
        sub_phase: SubPhase,
    ) {
        engine.clear_external_inputs();
        for role in Role::ALL {
            engine.set_layer_mode(self.layers[role], sub_phase.mode(role));
        }

        match sub_phase {
            SubPhase::OutcomeDriven => {
                engine.apply_external(self.layers[Role::Context], store.cell(Role::Context, row));
                engine.apply_external(self.layers[Role::Outcome], store.cell(Role::Outcome, row));
            }
            SubPhase::GoalDriven => {
                let outcome = relay
                    .get(Role::Outcome, row)
                    .unwrap_or_else(|| store.cell(Role::Outcome, row));
                let motor = relay
                    .get(Role::Motor, row)
                    .unwrap_or_else(|| store.cell(Role::Motor, row));
                engine.apply_external(self.layers[Role::Goal], outcome);
                engine.apply_external(self.layers[Role::Motor], motor);
            }
        }
    }

    /// Run one settle: four quarters of cycles, then learn if requested.
    pub fn settle<E: Engine + ?Sized>(&mut self, engine: &mut E, learn: bool) {
        let scale = self.scale(learn);

        engine.alpha_cycle_init();
        self.time.settle_start();
        for qtr in 0..QUARTERS {
            for cyc in 0..self.time.cycles_per_quarter {
                engine.cycle(&self.time);
                self.time.cycle_inc();
                match scale {
                    TimeScale::Cycle => self.update_view(),
                    TimeScale::FastSpike if (cyc + 1) % 10 == 0 => self.update_view(),
                    _ => {}
                }
            }
            engine.quarter_final(&self.time);
            self.time.quarter_inc();
            match scale {
                TimeScale::Quarter => self.update_view(),
                TimeScale::Phase if qtr >= 2 => self.update_view(),
                _ => {}
            }
        }

        if learn {
            engine.compute_dwt();
            engine.apply_dwt();
        }
        if scale == TimeScale::AlphaCycle {
            self.update_view();
        }
    }

    /// Apply inputs for `sub_phase` at `row` and settle.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::TrialOutOfRange`] before touching the engine if
    /// `row` does not address a Pattern Store row.
    pub fn run_sub_phase<E: Engine + ?Sized>(
        &mut self,
        engine: &mut E,
        store: &PatternStore,
        relay: &RelayBuffer,
        row: usize,
        sub_phase: SubPhase,
        learn: bool,
    ) -> Result<()> {
        if row >= store.num_rows() {
            return Err(SimError::TrialOutOfRange {
                row,
                rows: store.num_rows(),
            });
        }
        self.apply_inputs(engine, store, relay, row, sub_phase);
        self.settle(engine, learn);
        Ok(())
    }

    /// Hand the new log row to the observer at an epoch boundary.
    ///
    /// Any update scale coarser than [`TimeScale::AlphaCycle`] also gets a
    /// view update here.
    pub fn epoch_view(&mut self, learn: bool, row: &EpochRow) {
        if let Some(obs) = self.observer.as_mut() {
            obs.epoch_logged(row);
        }
        if self.scale(learn) > TimeScale::AlphaCycle {
            self.update_view();
        }
    }

    fn scale(&self, learn: bool) -> TimeScale {
        if learn {
            self.train_update
        } else {
            self.test_update
        }
    }

    /// Notify the observer if the view is on.
    pub fn update_view(&mut self) {
        if !self.view_on {
            return;
        }
        if let Some(obs) = self.observer.as_mut() {
            obs.update(&self.time);
        }
    }
}
