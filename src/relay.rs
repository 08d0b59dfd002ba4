//! RelayBuffer - carries produced activity from sub-phase 0 into sub-phase 1.
//!
//! After sub-phase 0 settles, the network's Motor and Outcome activity for
//! the current trial row is captured here. Sub-phase 1 clamps Goal to the
//! captured Outcome and uses the captured Motor as its target. Once
//! sub-phase 1 has settled the row is cleared, so the next epoch's visit to
//! the same row starts from authored data again.
//!
//! [`RelayBuffer::capture`] and [`RelayBuffer::clear`] are the only
//! per-trial mutators. Layout matches the Pattern Store: unit `i` of row `r` lives at
//! `r * cells + i` for both capture and clear.

use crate::engine::Engine;
use crate::role::{Role, RoleLayers, RoleMap};
use tracing::warn;

/// Roles whose produced activity is relayed.
pub const RELAYED: [Role; 2] = [Role::Motor, Role::Outcome];

/// Number of elements written per role by one capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSizes {
    pub motor: usize,
    pub outcome: usize,
}

impl CaptureSizes {
    /// Size recorded for a relayed role (0 for the others).
    pub fn get(&self, role: Role) -> usize {
        match role {
            Role::Motor => self.motor,
            Role::Outcome => self.outcome,
            Role::Context | Role::Goal => 0,
        }
    }

    fn set(&mut self, role: Role, size: usize) {
        match role {
            Role::Motor => self.motor = size,
            Role::Outcome => self.outcome = size,
            Role::Context | Role::Goal => {}
        }
    }
}

/// Transient per-row storage for captured Motor and Outcome activity.
#[derive(Debug, Clone)]
pub struct RelayBuffer {
    cells: usize,
    num_rows: usize,
    /// Flattened activity, indexed by role (only Motor and Outcome used)
    data: RoleMap<Vec<f32>>,
    /// Rows currently holding captured data, per role
    live: RoleMap<Vec<bool>>,
}

impl RelayBuffer {
    /// Create a buffer sized to a Pattern Store.
    pub fn new(num_rows: usize, cells: usize) -> Self {
        Self {
            cells,
            num_rows,
            data: RoleMap::from_fn(|role| {
                if RELAYED.contains(&role) {
                    vec![0.0; num_rows * cells]
                } else {
                    Vec::new()
                }
            }),
            live: RoleMap::from_fn(|role| {
                if RELAYED.contains(&role) {
                    vec![false; num_rows]
                } else {
                    Vec::new()
                }
            }),
        }
    }

    #[inline]
    pub fn cells(&self) -> usize {
        self.cells
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Read the engine's produced Motor and Outcome activity and write it
    /// into `row`.
    ///
    /// A role whose activity cannot be read is skipped for this trial and
    /// logged; the other role is still captured. Activity longer than a
    /// row is truncated. Returns the number of elements written per role.
    pub fn capture<E: Engine + ?Sized>(
        &mut self,
        engine: &E,
        layers: &RoleLayers,
        row: usize,
    ) -> CaptureSizes {
        let mut sizes = CaptureSizes::default();
        for role in RELAYED {
            match engine.produced_activity(layers[role]) {
                Ok(act) => sizes.set(role, self.write(role, row, &act)),
                Err(e) => warn!(%role, row, error = %e, "skipping relay capture"),
            }
        }
        sizes
    }

    /// Write `values` into `role`'s slot at `row`, returning elements written.
    fn write(&mut self, role: Role, row: usize, values: &[f32]) -> usize {
        if !RELAYED.contains(&role) || row >= self.num_rows {
            return 0;
        }
        if values.len() > self.cells {
            warn!(%role, units = values.len(), cells = self.cells, "captured activity truncated");
        }
        let n = values.len().min(self.cells);
        let start = row * self.cells;
        self.data[role][start..start + n].copy_from_slice(&values[..n]);
        self.live[role][row] = true;
        n
    }

    /// Zero the relay slots of `row` using the sizes recorded at capture.
    pub fn clear(&mut self, row: usize, sizes: CaptureSizes) {
        if row >= self.num_rows {
            return;
        }
        let start = row * self.cells;
        for role in RELAYED {
            let n = sizes.get(role).min(self.cells);
            self.data[role][start..start + n].fill(0.0);
            self.live[role][row] = false;
        }
    }

    /// Zero every row.
    pub fn reset(&mut self) {
        for role in RELAYED {
            self.data[role].fill(0.0);
            self.live[role].fill(false);
        }
    }

    /// Captured activity for `role` at `row`, if any is held.
    pub fn get(&self, role: Role, row: usize) -> Option<&[f32]> {
        if !RELAYED.contains(&role) || row >= self.num_rows || !self.live[role][row] {
            return None;
        }
        let start = row * self.cells;
        Some(&self.data[role][start..start + self.cells])
    }

    /// Whether no row holds captured data.
    pub fn is_clear(&self) -> bool {
        RELAYED.iter().all(|&role| {
            self.live[role].iter().all(|l| !l) && self.data[role].iter().all(|&v| v == 0.0)
        })
    }
}
