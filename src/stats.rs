//! Trial statistics and their epoch-scoped accumulation.
//!
//! Sub-phase 0 measures the Outcome layer against its target and compares
//! the produced Goal and Outcome activity unit by unit. Sub-phase 1
//! measures the Motor layer against its target. All error measures use a
//! per-unit tolerance (0.5 by default): differences smaller than the
//! tolerance count as zero.
//!
//! Sums live in an explicit [`EpochAccumulators`] owned by the scheduler.
//! Only [`crate::epoch_log::EpochLog::append_epoch`] resets it.

use crate::engine::Engine;
use crate::role::{Role, RoleLayers};
use crate::sequencer::SubPhase;
use crate::utils::tolerance_sse;
use crate::SimError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default per-unit error tolerance.
pub const DEFAULT_TOLERANCE: f32 = 0.5;

/// Running sums over the trials of one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochAccumulators {
    pub mot_sum_sse: f32,
    pub mot_sum_avg_sse: f32,
    pub mot_sum_cos_diff: f32,

    pub out_sum_sse: f32,
    pub out_sum_avg_sse: f32,
    pub out_sum_cos_diff: f32,

    /// Trials whose produced Goal and Outcome differ beyond tolerance
    pub out_goal_cnt_err: usize,
    /// Trials with non-zero Outcome SSE
    pub out_pred_cnt_err: usize,
}

impl EpochAccumulators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every sum and counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Raw metrics of one sub-phase of one trial.
///
/// Fields that do not apply to the sub-phase stay at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialMetrics {
    pub out_sse: f32,
    pub out_avg_sse: f32,
    pub out_cos_diff: f32,
    /// Tolerance SSE between produced Goal and produced Outcome
    pub goal_out_sse: f32,
    pub mot_sse: f32,
    pub mot_avg_sse: f32,
    pub mot_cos_diff: f32,
}

impl TrialMetrics {
    /// Goal and Outcome disagreed on at least one unit.
    #[inline]
    pub fn goal_mismatch(&self) -> bool {
        self.goal_out_sse != 0.0
    }

    /// The Outcome layer mispredicted its target.
    #[inline]
    pub fn outcome_error(&self) -> bool {
        self.out_sse != 0.0
    }
}

/// Computes per-trial statistics for the four resolved role layers.
#[derive(Debug, Clone)]
pub struct TrialStats {
    layers: RoleLayers,
    tolerance: f32,
}

impl TrialStats {
    pub fn new(layers: RoleLayers, tolerance: f32) -> Self {
        Self { layers, tolerance }
    }

    #[inline]
    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Measure the sub-phase that just settled.
    ///
    /// With `accumulate`, each quantity is added to `acc`; counters move by
    /// at most one per trial regardless of how many units are wrong.
    pub fn compute<E: Engine + ?Sized>(
        &self,
        engine: &E,
        sub_phase: SubPhase,
        accumulate: bool,
        acc: &mut EpochAccumulators,
    ) -> TrialMetrics {
        let mut m = TrialMetrics::default();
        match sub_phase {
            SubPhase::OutcomeDriven => {
                let out = self.layers[Role::Outcome];
                (m.out_sse, m.out_avg_sse) = engine.mse(out, self.tolerance);
                m.out_cos_diff = engine.cos_diff(out);
                m.goal_out_sse = self.goal_outcome_sse(engine);

                if accumulate {
                    acc.out_sum_sse += m.out_sse;
                    acc.out_sum_avg_sse += m.out_avg_sse;
                    acc.out_sum_cos_diff += m.out_cos_diff;
                    if m.outcome_error() {
                        acc.out_pred_cnt_err += 1;
                    }
                    if m.goal_mismatch() {
                        acc.out_goal_cnt_err += 1;
                    }
                }
            }
            SubPhase::GoalDriven => {
                let mot = self.layers[Role::Motor];
                (m.mot_sse, m.mot_avg_sse) = engine.mse(mot, self.tolerance);
                m.mot_cos_diff = engine.cos_diff(mot);

                if accumulate {
                    acc.mot_sum_sse += m.mot_sse;
                    acc.mot_sum_avg_sse += m.mot_avg_sse;
                    acc.mot_sum_cos_diff += m.mot_cos_diff;
                }
            }
        }
        m
    }

    /// Like [`TrialStats::compute`] for an unchecked sub-phase number.
    ///
    /// An out-of-range value is logged and yields zero metrics without
    /// touching `acc`.
    pub fn compute_raw<E: Engine + ?Sized>(
        &self,
        engine: &E,
        sub_phase: u8,
        accumulate: bool,
        acc: &mut EpochAccumulators,
    ) -> TrialMetrics {
        match SubPhase::try_from(sub_phase) {
            Ok(p) => self.compute(engine, p, accumulate, acc),
            Err(e) => {
                warn!(error = %e, "trial statistics skipped");
                TrialMetrics::default()
            }
        }
    }

    fn goal_outcome_sse<E: Engine + ?Sized>(&self, engine: &E) -> f32 {
        let goal = engine.produced_activity(self.layers[Role::Goal]);
        let outcome = engine.produced_activity(self.layers[Role::Outcome]);
        let (goal, outcome) = match (goal, outcome) {
            (Ok(g), Ok(o)) => (g, o),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "goal/outcome comparison skipped");
                return 0.0;
            }
        };

        if goal.len() != outcome.len() {
            let e = SimError::UnitCountMismatch {
                left: Role::Goal,
                left_units: goal.len(),
                right: Role::Outcome,
                right_units: outcome.len(),
            };
            warn!(error = %e, "comparing overlapping units only");
        }
        tolerance_sse(&goal, &outcome, self.tolerance)
    }
}
