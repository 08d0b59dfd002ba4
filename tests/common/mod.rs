//! Scripted engine shared by the integration tests.
//!
//! Produced (minus-phase) activity is whatever the test sets; plus-phase
//! activity is the applied external vector for clamped layers. Every call
//! the driver makes is counted or recorded.

#![allow(dead_code)]

use goalseek::utils::{cosine, tolerance_sse};
use goalseek::{Engine, LayerId, Result, RoleMode, SimError, SimTime, StopToken, QUARTERS};
use std::collections::HashSet;

pub const ROLE_NAMES: [&str; 4] = ["Context", "Goal", "Motor", "Outcome"];

#[derive(Debug, Clone)]
pub struct ScriptedEngine {
    names: Vec<String>,
    units: Vec<usize>,
    /// Minus-phase activity returned as produced activity
    pub produced: Vec<Vec<f32>>,
    /// Activity at the end of the last plus phase
    pub plus: Vec<Vec<f32>>,
    pub ext: Vec<Option<Vec<f32>>>,
    pub modes: Vec<RoleMode>,
    /// Every `apply_external` call as `(layer name, values)`
    pub applied: Vec<(String, Vec<f32>)>,
    pub settles: usize,
    pub cycles: usize,
    pub quarters: usize,
    pub dwt_calls: usize,
    pub apply_dwt_calls: usize,
    pub init_calls: usize,
    /// Layers whose produced activity read fails
    pub failing: HashSet<usize>,
    /// Request a stop when this settle (1-based) begins
    pub stop_at_settle: Option<(usize, StopToken)>,
}

impl ScriptedEngine {
    pub fn with_layers(layers: &[(&str, usize)]) -> Self {
        let n = layers.len();
        Self {
            names: layers.iter().map(|(name, _)| name.to_string()).collect(),
            units: layers.iter().map(|&(_, u)| u).collect(),
            produced: layers.iter().map(|&(_, u)| vec![0.0; u]).collect(),
            plus: layers.iter().map(|&(_, u)| vec![0.0; u]).collect(),
            ext: vec![None; n],
            modes: vec![RoleMode::Hidden; n],
            applied: Vec::new(),
            settles: 0,
            cycles: 0,
            quarters: 0,
            dwt_calls: 0,
            apply_dwt_calls: 0,
            init_calls: 0,
            failing: HashSet::new(),
            stop_at_settle: None,
        }
    }

    /// Four role layers of `units` units each.
    pub fn goal_guy(units: usize) -> Self {
        let layers: Vec<(&str, usize)> = ROLE_NAMES.iter().map(|&n| (n, units)).collect();
        Self::with_layers(&layers)
    }

    pub fn id(&self, name: &str) -> LayerId {
        self.layer_id(name).expect("layer exists")
    }

    pub fn set_produced(&mut self, name: &str, values: Vec<f32>) {
        let i = self.id(name).as_usize();
        self.produced[i] = values;
    }

    pub fn fail_layer(&mut self, name: &str) {
        let i = self.id(name).as_usize();
        self.failing.insert(i);
    }

    /// Vectors applied to `name`, in call order.
    pub fn applied_to(&self, name: &str) -> Vec<Vec<f32>> {
        self.applied
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

impl Engine for ScriptedEngine {
    fn layer_id(&self, name: &str) -> Option<LayerId> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| LayerId::from_raw(i as u32))
    }

    fn layer_name(&self, id: LayerId) -> &str {
        &self.names[id.as_usize()]
    }

    fn num_units(&self, id: LayerId) -> usize {
        self.units[id.as_usize()]
    }

    fn init_weights(&mut self) {
        self.init_calls += 1;
    }

    fn clear_external_inputs(&mut self) {
        self.ext.iter_mut().for_each(|e| *e = None);
    }

    fn set_layer_mode(&mut self, id: LayerId, mode: RoleMode) {
        self.modes[id.as_usize()] = mode;
    }

    fn apply_external(&mut self, id: LayerId, values: &[f32]) {
        let i = id.as_usize();
        let n = self.units[i].min(values.len());
        self.ext[i] = Some(values[..n].to_vec());
        self.applied.push((self.names[i].clone(), values[..n].to_vec()));
    }

    fn alpha_cycle_init(&mut self) {
        self.settles += 1;
        if let Some((at, token)) = &self.stop_at_settle {
            if *at == self.settles {
                token.request_stop();
            }
        }
    }

    fn cycle(&mut self, _time: &SimTime) {
        self.cycles += 1;
    }

    fn quarter_final(&mut self, time: &SimTime) {
        self.quarters += 1;
        if time.quarter == QUARTERS - 1 {
            for i in 0..self.names.len() {
                self.plus[i] = match (&self.ext[i], self.modes[i]) {
                    (Some(ext), RoleMode::Input | RoleMode::Target) => ext.clone(),
                    _ => self.produced[i].clone(),
                };
            }
        }
    }

    fn compute_dwt(&mut self) {
        self.dwt_calls += 1;
    }

    fn apply_dwt(&mut self) {
        self.apply_dwt_calls += 1;
    }

    fn produced_activity(&self, id: LayerId) -> Result<Vec<f32>> {
        let i = id.as_usize();
        if self.failing.contains(&i) {
            return Err(SimError::NoActivity {
                layer: self.names[i].clone(),
            });
        }
        Ok(self.produced[i].clone())
    }

    fn mse(&self, id: LayerId, tolerance: f32) -> (f32, f32) {
        let i = id.as_usize();
        match &self.ext[i] {
            Some(ext) if self.units[i] > 0 => {
                let sse = tolerance_sse(&self.produced[i], ext, tolerance);
                (sse, sse / self.units[i] as f32)
            }
            _ => (0.0, 0.0),
        }
    }

    fn cos_diff(&self, id: LayerId) -> f32 {
        let i = id.as_usize();
        cosine(&self.produced[i], &self.plus[i])
    }

    fn mean_activity(&self, id: LayerId) -> f32 {
        let act = &self.produced[id.as_usize()];
        if act.is_empty() {
            0.0
        } else {
            act.iter().sum::<f32>() / act.len() as f32
        }
    }
}
