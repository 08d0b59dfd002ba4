//! EpochLog - one normalized statistics row per completed epoch.
//!
//! The log is append-only: row `k` is written when epoch `k` closes and is
//! never modified afterwards. Appending consumes the epoch accumulators and
//! zeroes them, so no caller can double-count into the next epoch.
//!
//! # Examples
//!
//! ```
//! use goalseek::{EpochAccumulators, EpochLog, RoleMap};
//!
//! let mut log = EpochLog::new();
//! let mut acc = EpochAccumulators::new();
//! acc.out_sum_sse = 2.0;
//! acc.out_pred_cnt_err = 1;
//!
//! let row = log.append_epoch(0, &mut acc, 4, RoleMap::default()).unwrap();
//! assert_eq!(row.out_sse, 0.5);
//! assert_eq!(row.out_pred_pct_cor, 0.75);
//! assert!(acc.is_zero());
//! ```

use crate::role::{Role, RoleMap};
use crate::stats::EpochAccumulators;
use crate::{Result, SimError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Column names in table order.
pub const COLUMNS: [&str; 17] = [
    "Epoch",
    "MotSSE",
    "OutSSE",
    "MotAvgSSE",
    "OutAvgSSE",
    "OutGoalPctErr",
    "OutPredPctErr",
    "OutGoalPctCor",
    "OutPredPctCor",
    "MotCosDiff",
    "OutCosDiff",
    "ContextActAvg",
    "GoalActAvg",
    "MotorActAvg",
    "OutActAvg",
    "OutPredCntErr",
    "OutGoalCntErr",
];

/// Statistics of one completed epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRow {
    #[serde(rename = "Epoch")]
    pub epoch: usize,
    #[serde(rename = "MotSSE")]
    pub mot_sse: f32,
    #[serde(rename = "OutSSE")]
    pub out_sse: f32,
    #[serde(rename = "MotAvgSSE")]
    pub mot_avg_sse: f32,
    #[serde(rename = "OutAvgSSE")]
    pub out_avg_sse: f32,
    #[serde(rename = "OutGoalPctErr")]
    pub out_goal_pct_err: f32,
    #[serde(rename = "OutPredPctErr")]
    pub out_pred_pct_err: f32,
    #[serde(rename = "OutGoalPctCor")]
    pub out_goal_pct_cor: f32,
    #[serde(rename = "OutPredPctCor")]
    pub out_pred_pct_cor: f32,
    #[serde(rename = "MotCosDiff")]
    pub mot_cos_diff: f32,
    #[serde(rename = "OutCosDiff")]
    pub out_cos_diff: f32,
    #[serde(rename = "ContextActAvg")]
    pub context_act_avg: f32,
    #[serde(rename = "GoalActAvg")]
    pub goal_act_avg: f32,
    #[serde(rename = "MotorActAvg")]
    pub motor_act_avg: f32,
    #[serde(rename = "OutActAvg")]
    pub out_act_avg: f32,
    #[serde(rename = "OutPredCntErr")]
    pub out_pred_cnt_err: usize,
    #[serde(rename = "OutGoalCntErr")]
    pub out_goal_cnt_err: usize,
}

impl EpochRow {
    /// Normalize accumulated sums over `num_trials` trials.
    ///
    /// With zero trials every mean is 0 and every percent-correct is 1.
    pub fn from_accumulators(
        epoch: usize,
        acc: &EpochAccumulators,
        num_trials: usize,
        mean_act: RoleMap<f32>,
    ) -> Self {
        let np = num_trials as f32;
        let norm = |v: f32| if num_trials == 0 { 0.0 } else { v / np };

        let out_goal_pct_err = norm(acc.out_goal_cnt_err as f32);
        let out_pred_pct_err = norm(acc.out_pred_cnt_err as f32);

        Self {
            epoch,
            mot_sse: norm(acc.mot_sum_sse),
            out_sse: norm(acc.out_sum_sse),
            mot_avg_sse: norm(acc.mot_sum_avg_sse),
            out_avg_sse: norm(acc.out_sum_avg_sse),
            out_goal_pct_err,
            out_pred_pct_err,
            out_goal_pct_cor: 1.0 - out_goal_pct_err,
            out_pred_pct_cor: 1.0 - out_pred_pct_err,
            mot_cos_diff: norm(acc.mot_sum_cos_diff),
            out_cos_diff: norm(acc.out_sum_cos_diff),
            context_act_avg: mean_act[Role::Context],
            goal_act_avg: mean_act[Role::Goal],
            motor_act_avg: mean_act[Role::Motor],
            out_act_avg: mean_act[Role::Outcome],
            out_pred_cnt_err: acc.out_pred_cnt_err,
            out_goal_cnt_err: acc.out_goal_cnt_err,
        }
    }

    /// Value of a named column.
    pub fn get(&self, column: &str) -> Option<f64> {
        let v = match column {
            "Epoch" => self.epoch as f64,
            "MotSSE" => self.mot_sse as f64,
            "OutSSE" => self.out_sse as f64,
            "MotAvgSSE" => self.mot_avg_sse as f64,
            "OutAvgSSE" => self.out_avg_sse as f64,
            "OutGoalPctErr" => self.out_goal_pct_err as f64,
            "OutPredPctErr" => self.out_pred_pct_err as f64,
            "OutGoalPctCor" => self.out_goal_pct_cor as f64,
            "OutPredPctCor" => self.out_pred_pct_cor as f64,
            "MotCosDiff" => self.mot_cos_diff as f64,
            "OutCosDiff" => self.out_cos_diff as f64,
            "ContextActAvg" => self.context_act_avg as f64,
            "GoalActAvg" => self.goal_act_avg as f64,
            "MotorActAvg" => self.motor_act_avg as f64,
            "OutActAvg" => self.out_act_avg as f64,
            "OutPredCntErr" => self.out_pred_cnt_err as f64,
            "OutGoalCntErr" => self.out_goal_cnt_err as f64,
            _ => return None,
        };
        Some(v)
    }
}

/// Append-only table of epoch rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochLog {
    rows: Vec<EpochRow>,
}

impl EpochLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close `epoch`: normalize `acc`, append the row, and zero `acc`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidParameter`] if `epoch` is not the next
    /// row index; `acc` is left untouched in that case.
    pub fn append_epoch(
        &mut self,
        epoch: usize,
        acc: &mut EpochAccumulators,
        num_trials: usize,
        mean_act: RoleMap<f32>,
    ) -> Result<&EpochRow> {
        if epoch != self.rows.len() {
            return Err(SimError::InvalidParameter(format!(
                "epoch {} does not follow {} logged epochs",
                epoch,
                self.rows.len()
            )));
        }
        let row = EpochRow::from_accumulators(epoch, acc, num_trials, mean_act);
        acc.reset();
        self.rows.push(row);
        Ok(&self.rows[epoch])
    }

    /// Number of completed epochs.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[EpochRow] {
        &self.rows
    }

    pub fn last(&self) -> Option<&EpochRow> {
        self.rows.last()
    }

    /// Drop all rows (used when a run is re-initialized).
    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// All values of a named column, or `None` for an unknown column.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        if !COLUMNS.contains(&name) {
            return None;
        }
        self.rows.iter().map(|r| r.get(name)).collect()
    }

    /// Export the log to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Export the log to a JSON file.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Import a log from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
