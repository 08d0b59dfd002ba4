//! Network - a small rate-coded reference engine.
//!
//! Layers of units exchange activity through weighted projections. Each
//! cycle every layer's net input is computed from the previous cycle's
//! activity (synchronous update), reduced by layer-level inhibition, and
//! passed through a sigmoid. Activity integrates toward that value at rate
//! `dt`.
//!
//! A settle has a minus phase (quarters 0-2) and a plus phase (quarter 3).
//! Input layers are clamped to their external vector throughout; target
//! layers only during the plus phase. Learning is contrastive Hebbian:
//!
//! ```text
//! dw = lrate * (x_plus * y_plus - x_minus * y_minus)
//! ```
//!
//! # Example
//!
//! ```
//! use goalseek::{Engine, Network, PathClass, PathPattern, RoleMode, SimTime};
//!
//! # fn main() -> goalseek::Result<()> {
//! let mut net = Network::new();
//! let input = net.add_layer("In", [1, 3], RoleMode::Input);
//! let output = net.add_layer("Out", [1, 3], RoleMode::Target);
//! net.connect(input, output, PathPattern::Full, PathClass::Forward)?;
//! net.init_weights();
//!
//! net.apply_external(input, &[1.0, 0.0, 0.0]);
//! net.alpha_cycle_init();
//! let mut time = SimTime::new(5);
//! time.settle_start();
//! for _ in 0..4 {
//!     for _ in 0..5 {
//!         net.cycle(&time);
//!         time.cycle_inc();
//!     }
//!     net.quarter_final(&time);
//!     time.quarter_inc();
//! }
//! assert_eq!(net.produced_activity(output)?.len(), 3);
//! # Ok(())
//! # }
//! ```

use crate::engine::{Engine, LayerId, SimTime, QUARTERS};
use crate::network_config::{
    LayerConfig, NetParams, NetworkConfig, PathClass, PathPattern, ProjectionConfig,
};
use crate::role::RoleMode;
use crate::utils::{cosine, tolerance_sse};
use crate::{Result, SimError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Unit state of one layer.
#[derive(Debug, Clone)]
struct Layer {
    name: String,
    shape: [usize; 2],
    mode: RoleMode,
    inhib_gain: f32,
    act: Vec<f32>,
    /// Activity at the end of the minus phase
    act_m: Vec<f32>,
    /// Activity at the end of the plus phase
    act_p: Vec<f32>,
    ext: Vec<f32>,
    has_ext: bool,
    /// Running average of mean minus-phase activity
    avg_act: f32,
}

impl Layer {
    fn new(name: String, shape: [usize; 2], mode: RoleMode, inhib_gain: f32) -> Self {
        let n = shape[0] * shape[1];
        Self {
            name,
            shape,
            mode,
            inhib_gain,
            act: vec![0.0; n],
            act_m: vec![0.0; n],
            act_p: vec![0.0; n],
            ext: vec![0.0; n],
            has_ext: false,
            avg_act: 0.0,
        }
    }

    #[inline]
    fn num_units(&self) -> usize {
        self.act.len()
    }

    fn is_clamped(&self, plus_phase: bool) -> bool {
        self.has_ext
            && match self.mode {
                RoleMode::Input => true,
                RoleMode::Target => plus_phase,
                RoleMode::Hidden => false,
            }
    }

    fn reset_state(&mut self) {
        self.act.fill(0.0);
        self.act_m.fill(0.0);
        self.act_p.fill(0.0);
        self.avg_act = 0.0;
    }
}

/// Weighted pathway between two layers.
#[derive(Debug, Clone)]
struct Projection {
    sender: LayerId,
    receiver: LayerId,
    pattern: PathPattern,
    class: PathClass,
    wt_scale_rel: f32,
    /// Full: `[recv * num_send + send]`; OneToOne: `[unit]`
    wts: Vec<f32>,
    dwts: Vec<f32>,
}

impl Projection {
    /// Mean weighted input per receiver over active senders.
    fn add_net(&self, send_act: &[f32], net: &mut [f32]) {
        match self.pattern {
            PathPattern::Full => {
                let total: f32 = send_act.iter().sum();
                if total <= f32::EPSILON {
                    return;
                }
                let ns = send_act.len();
                for (r, n) in net.iter_mut().enumerate() {
                    let row = &self.wts[r * ns..(r + 1) * ns];
                    let sum: f32 = row.iter().zip(send_act).map(|(w, x)| w * x).sum();
                    *n += self.wt_scale_rel * sum / total;
                }
            }
            PathPattern::OneToOne => {
                for ((n, w), x) in net.iter_mut().zip(&self.wts).zip(send_act) {
                    *n += self.wt_scale_rel * w * x;
                }
            }
        }
    }
}

/// Rate-coded network implementing [`Engine`].
///
/// # Lifecycle
///
/// 1. Create network: `Network::new()` or `Network::from_config(&cfg)?`
/// 2. Add layers: `let id = net.add_layer(name, shape, mode)`
/// 3. Connect layers: `net.connect(sender, receiver, pattern, class)?`
/// 4. Initialize weights: `net.init_weights()`
/// 5. Drive it through the [`Engine`] methods
#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<Layer>,
    names: HashMap<String, LayerId>,
    projections: Vec<Projection>,
    params: NetParams,
    seed: u64,
}

impl Network {
    /// Create a new empty Network with default parameters.
    pub fn new() -> Self {
        Self::with_params(NetParams::default(), 0)
    }

    pub fn with_params(params: NetParams, seed: u64) -> Self {
        Self {
            layers: Vec::new(),
            names: HashMap::new(),
            projections: Vec::new(),
            params,
            seed,
        }
    }

    /// Add a layer and return its ID.
    ///
    /// Adding a second layer under an existing name rebinds the name to the
    /// new layer.
    pub fn add_layer(&mut self, name: impl Into<String>, shape: [usize; 2], mode: RoleMode) -> LayerId {
        let name = name.into();
        let id = LayerId::from_raw(self.layers.len() as u32);
        self.names.insert(name.clone(), id);
        self.layers.push(Layer::new(name, shape, mode, 1.0));
        id
    }

    /// Set the inhibition strength of a layer.
    pub fn set_inhib_gain(&mut self, id: LayerId, gain: f32) -> Result<()> {
        self.layer_mut(id)?.inhib_gain = gain;
        Ok(())
    }

    /// Connect two layers with relative scale 1.
    ///
    /// # Errors
    ///
    /// Returns error if either LayerId is not in the network, or if a
    /// one-to-one projection joins layers of different sizes.
    pub fn connect(
        &mut self,
        sender: LayerId,
        receiver: LayerId,
        pattern: PathPattern,
        class: PathClass,
    ) -> Result<()> {
        self.connect_scaled(sender, receiver, pattern, class, 1.0)
    }

    /// Connect two layers with a relative weight scale.
    pub fn connect_scaled(
        &mut self,
        sender: LayerId,
        receiver: LayerId,
        pattern: PathPattern,
        class: PathClass,
        wt_scale_rel: f32,
    ) -> Result<()> {
        let ns = self.layer(sender)?.num_units();
        let nr = self.layer(receiver)?.num_units();
        let num_wts = match pattern {
            PathPattern::Full => ns * nr,
            PathPattern::OneToOne if ns == nr => nr,
            PathPattern::OneToOne => {
                return Err(SimError::InvalidParameter(format!(
                    "one-to-one projection {} -> {} joins {} and {} units",
                    self.layer_name(sender),
                    self.layer_name(receiver),
                    ns,
                    nr
                )));
            }
        };
        self.projections.push(Projection {
            sender,
            receiver,
            pattern,
            class,
            wt_scale_rel,
            wts: vec![self.params.init_wt_mean; num_wts],
            dwts: vec![0.0; num_wts],
        });
        Ok(())
    }

    /// Build a network from its configuration.
    ///
    /// Weights are initialized from `config.seed`, then replaced by
    /// `config.learned_state` when present.
    pub fn from_config(config: &NetworkConfig) -> Result<Self> {
        config.validate()?;
        let mut net = Network::with_params(config.params, config.seed);
        for lc in &config.layers {
            let id = net.add_layer(lc.name.clone(), lc.shape, lc.kind);
            net.set_inhib_gain(id, lc.inhib_gain)?;
        }
        for pc in &config.projections {
            let sender = net.require(&pc.sender)?;
            let receiver = net.require(&pc.receiver)?;
            net.connect_scaled(sender, receiver, pc.pattern, pc.class, pc.wt_scale_rel)?;
        }
        net.init_weights();

        if let Some(state) = &config.learned_state {
            for (proj, wts) in net.projections.iter_mut().zip(state) {
                if wts.len() != proj.wts.len() {
                    return Err(SimError::InvalidParameter(format!(
                        "learned state has {} weights, projection needs {}",
                        wts.len(),
                        proj.wts.len()
                    )));
                }
                proj.wts.copy_from_slice(wts);
            }
        }
        Ok(net)
    }

    /// Export the architecture (without weights).
    pub fn to_config(&self) -> NetworkConfig {
        let layers = self
            .layers
            .iter()
            .map(|l| LayerConfig {
                name: l.name.clone(),
                shape: l.shape,
                kind: l.mode,
                inhib_gain: l.inhib_gain,
            })
            .collect();
        let projections = self
            .projections
            .iter()
            .map(|p| ProjectionConfig {
                sender: self.layer_name(p.sender).to_string(),
                receiver: self.layer_name(p.receiver).to_string(),
                pattern: p.pattern,
                class: p.class,
                wt_scale_rel: p.wt_scale_rel,
            })
            .collect();
        NetworkConfig::new(layers, projections)
            .with_params(self.params)
            .with_seed(self.seed)
    }

    /// Export the architecture together with the current weights.
    pub fn to_config_with_state(&self) -> NetworkConfig {
        let state = self.projections.iter().map(|p| p.wts.clone()).collect();
        self.to_config().with_state(state)
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn num_projections(&self) -> usize {
        self.projections.len()
    }

    pub fn params(&self) -> &NetParams {
        &self.params
    }

    /// Current activity of a layer.
    pub fn activity(&self, id: LayerId) -> Result<&[f32]> {
        Ok(&self.layer(id)?.act)
    }

    /// Plus-phase activity of a layer.
    pub fn plus_activity(&self, id: LayerId) -> Result<&[f32]> {
        Ok(&self.layer(id)?.act_p)
    }

    /// Current mode of a layer.
    pub fn mode(&self, id: LayerId) -> Result<RoleMode> {
        Ok(self.layer(id)?.mode)
    }

    /// Weights of the `index`-th projection.
    pub fn weights(&self, index: usize) -> Option<&[f32]> {
        self.projections.get(index).map(|p| p.wts.as_slice())
    }

    fn layer(&self, id: LayerId) -> Result<&Layer> {
        self.layers
            .get(id.as_usize())
            .ok_or_else(|| SimError::InvalidParameter(format!("layer {:?} not found", id)))
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        self.layers
            .get_mut(id.as_usize())
            .ok_or_else(|| SimError::InvalidParameter(format!("layer {:?} not found", id)))
    }

    fn require(&self, name: &str) -> Result<LayerId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| SimError::InvalidParameter(format!("layer '{}' not found", name)))
    }

    /// Net input of every layer from the current activity.
    fn net_inputs(&self) -> Vec<Vec<f32>> {
        let mut nets: Vec<Vec<f32>> = self.layers.iter().map(|l| vec![0.0; l.num_units()]).collect();
        let mut rel_sum = vec![0.0f32; self.layers.len()];
        for proj in &self.projections {
            let r = proj.receiver.as_usize();
            proj.add_net(&self.layers[proj.sender.as_usize()].act, &mut nets[r]);
            rel_sum[r] += proj.wt_scale_rel;
        }
        for (net, rel) in nets.iter_mut().zip(rel_sum) {
            if rel > 0.0 {
                net.iter_mut().for_each(|n| *n /= rel);
            }
        }
        nets
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Network {
    fn layer_id(&self, name: &str) -> Option<LayerId> {
        self.names.get(name).copied()
    }

    fn layer_name(&self, id: LayerId) -> &str {
        self.layers
            .get(id.as_usize())
            .map(|l| l.name.as_str())
            .unwrap_or("")
    }

    fn num_units(&self, id: LayerId) -> usize {
        self.layers.get(id.as_usize()).map_or(0, Layer::num_units)
    }

    fn init_weights(&mut self) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mean = self.params.init_wt_mean;
        let var = self.params.init_wt_var;
        for proj in &mut self.projections {
            for w in &mut proj.wts {
                *w = (mean + rng.gen_range(-1.0f32..=1.0) * var).clamp(0.0, 1.0);
            }
            proj.dwts.fill(0.0);
        }
        for layer in &mut self.layers {
            layer.reset_state();
        }
    }

    fn clear_external_inputs(&mut self) {
        for layer in &mut self.layers {
            layer.ext.fill(0.0);
            layer.has_ext = false;
        }
    }

    fn set_layer_mode(&mut self, id: LayerId, mode: RoleMode) {
        if let Some(layer) = self.layers.get_mut(id.as_usize()) {
            layer.mode = mode;
        }
    }

    fn apply_external(&mut self, id: LayerId, values: &[f32]) {
        if let Some(layer) = self.layers.get_mut(id.as_usize()) {
            let n = layer.num_units().min(values.len());
            layer.ext.fill(0.0);
            layer.ext[..n].copy_from_slice(&values[..n]);
            layer.has_ext = true;
        }
    }

    fn alpha_cycle_init(&mut self) {
        let keep = 1.0 - self.params.decay;
        for layer in &mut self.layers {
            layer.act.iter_mut().for_each(|a| *a *= keep);
        }
    }

    fn cycle(&mut self, time: &SimTime) {
        let plus = time.is_plus_phase();
        let nets = self.net_inputs();
        let p = self.params;

        for (layer, net) in self.layers.iter_mut().zip(nets) {
            if layer.is_clamped(plus) {
                layer.act.copy_from_slice(&layer.ext);
                continue;
            }
            let n = net.len().max(1) as f32;
            let inhib = layer.inhib_gain * net.iter().sum::<f32>() / n;
            for (a, x) in layer.act.iter_mut().zip(&net) {
                let drive = 1.0 / (1.0 + (-p.gain * (x - inhib - p.thr)).exp());
                *a += p.dt * (drive - *a);
            }
        }
    }

    fn quarter_final(&mut self, time: &SimTime) {
        let avg_dt = self.params.avg_dt;
        if time.quarter == QUARTERS - 2 {
            for layer in &mut self.layers {
                layer.act_m.copy_from_slice(&layer.act);
                let n = layer.num_units().max(1) as f32;
                let mean = layer.act_m.iter().sum::<f32>() / n;
                layer.avg_act += avg_dt * (mean - layer.avg_act);
            }
        } else if time.quarter == QUARTERS - 1 {
            for layer in &mut self.layers {
                layer.act_p.copy_from_slice(&layer.act);
            }
        }
    }

    fn compute_dwt(&mut self) {
        let lrate = self.params.lrate;
        for proj in &mut self.projections {
            let send = &self.layers[proj.sender.as_usize()];
            let recv = &self.layers[proj.receiver.as_usize()];
            match proj.pattern {
                PathPattern::Full => {
                    let ns = send.num_units();
                    for r in 0..recv.num_units() {
                        let (ym, yp) = (recv.act_m[r], recv.act_p[r]);
                        for s in 0..ns {
                            proj.dwts[r * ns + s] +=
                                lrate * (send.act_p[s] * yp - send.act_m[s] * ym);
                        }
                    }
                }
                PathPattern::OneToOne => {
                    for (i, dwt) in proj.dwts.iter_mut().enumerate() {
                        *dwt += lrate * (send.act_p[i] * recv.act_p[i] - send.act_m[i] * recv.act_m[i]);
                    }
                }
            }
        }
    }

    fn apply_dwt(&mut self) {
        for proj in &mut self.projections {
            for (w, dwt) in proj.wts.iter_mut().zip(proj.dwts.iter_mut()) {
                *w = (*w + *dwt).clamp(0.0, 1.0);
                *dwt = 0.0;
            }
        }
    }

    fn produced_activity(&self, id: LayerId) -> Result<Vec<f32>> {
        match self.layers.get(id.as_usize()) {
            Some(layer) if layer.num_units() > 0 => Ok(layer.act_m.clone()),
            Some(layer) => Err(SimError::NoActivity {
                layer: layer.name.clone(),
            }),
            None => Err(SimError::NoActivity {
                layer: format!("{:?}", id),
            }),
        }
    }

    fn mse(&self, id: LayerId, tolerance: f32) -> (f32, f32) {
        match self.layers.get(id.as_usize()) {
            Some(layer) if layer.has_ext && layer.num_units() > 0 => {
                let sse = tolerance_sse(&layer.act_m, &layer.ext, tolerance);
                (sse, sse / layer.num_units() as f32)
            }
            _ => (0.0, 0.0),
        }
    }

    fn cos_diff(&self, id: LayerId) -> f32 {
        self.layers
            .get(id.as_usize())
            .map_or(0.0, |l| cosine(&l.act_m, &l.act_p))
    }

    fn mean_activity(&self, id: LayerId) -> f32 {
        self.layers.get(id.as_usize()).map_or(0.0, |l| l.avg_act)
    }
}
