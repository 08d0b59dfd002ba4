//! PatternStore - authored external representations, one row per trial.
//!
//! Every row holds four equal-shape 2-D unit arrays, one per [`Role`].
//! Columns are stored flattened row-major, so unit `i` of row `r` lives at
//! `r * cells + i`.
//!
//! The store only holds authored data. Activity captured from the network
//! during a trial lives in [`crate::relay::RelayBuffer`], so a reader of
//! the store never sees relay values mixed in with ground truth.
//!
//! # Examples
//!
//! ```
//! use goalseek::{PatternGen, PatternStore, Role};
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let store = PatternStore::generate(25, [5, 5], &PatternGen::goal_guy(), &mut rng);
//!
//! assert_eq!(store.num_rows(), 25);
//! assert_eq!(store.cell(Role::Context, 3).iter().filter(|&&v| v == 1.0).count(), 3);
//! ```

use crate::role::{Role, RoleMap};
use crate::utils::shuffle_indices;
use crate::{Result, SimError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Recipe for a column of permuted binary rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternGen {
    /// Units per row set to `on_val`
    pub n_on: usize,
    pub on_val: f32,
    pub off_val: f32,
}

impl PatternGen {
    pub fn new(n_on: usize, on_val: f32, off_val: f32) -> Self {
        Self {
            n_on,
            on_val,
            off_val,
        }
    }

    /// Context and Outcome get 3 active units; Goal and Motor start silent.
    pub fn goal_guy() -> RoleMap<PatternGen> {
        RoleMap([
            PatternGen::new(3, 1.0, 0.0),
            PatternGen::new(0, 0.0, 0.0),
            PatternGen::new(0, 0.0, 0.0),
            PatternGen::new(3, 1.0, 0.0),
        ])
    }
}

/// Table of authored role vectors keyed by trial row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStore {
    /// Row labels
    names: Vec<String>,
    /// Unit array shape (Y, X) shared by all roles
    shape: [usize; 2],
    /// Flattened role columns
    columns: RoleMap<Vec<f32>>,
}

impl PatternStore {
    /// Create an empty store whose rows will have the given shape.
    pub fn new(shape: [usize; 2]) -> Self {
        Self {
            names: Vec::new(),
            shape,
            columns: RoleMap::default(),
        }
    }

    /// Create a store of `num_rows` all-zero rows.
    pub fn zeros(num_rows: usize, shape: [usize; 2]) -> Self {
        let len = num_rows * shape[0] * shape[1];
        Self {
            names: (0..num_rows).map(|r| format!("row_{}", r)).collect(),
            shape,
            columns: RoleMap::from_fn(|_| vec![0.0; len]),
        }
    }

    /// Generate `num_rows` rows of permuted binary patterns per role.
    ///
    /// Each row of a column gets exactly `n_on` units at `on_val` (capped at
    /// the row size) in random positions, the rest at `off_val`.
    pub fn generate<R: Rng>(
        num_rows: usize,
        shape: [usize; 2],
        gens: &RoleMap<PatternGen>,
        rng: &mut R,
    ) -> Self {
        let mut store = Self::zeros(num_rows, shape);
        let cells = store.cells();
        let mut idx: Vec<usize> = (0..cells).collect();

        for role in Role::ALL {
            let gen = gens[role];
            let col = &mut store.columns[role];
            for row in 0..num_rows {
                shuffle_indices(&mut idx, rng);
                let cell = &mut col[row * cells..(row + 1) * cells];
                cell.fill(gen.off_val);
                for &i in idx.iter().take(gen.n_on.min(cells)) {
                    cell[i] = gen.on_val;
                }
            }
        }
        store
    }

    /// Number of trial rows.
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Unit array shape (Y, X).
    #[inline]
    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    /// Units per role vector.
    #[inline]
    pub fn cells(&self) -> usize {
        self.shape[0] * self.shape[1]
    }

    /// Row labels.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Append a row.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidParameter`] if any vector does not have
    /// exactly `cells()` elements.
    pub fn push_row(&mut self, name: impl Into<String>, row: RoleMap<Vec<f32>>) -> Result<()> {
        let cells = self.cells();
        for (role, v) in row.iter() {
            if v.len() != cells {
                return Err(SimError::InvalidParameter(format!(
                    "{} vector has {} units, rows hold {}",
                    role,
                    v.len(),
                    cells
                )));
            }
        }
        for (role, v) in row.iter() {
            self.columns[role].extend_from_slice(v);
        }
        self.names.push(name.into());
        Ok(())
    }

    /// The authored vector for `role` at `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= num_rows()`.
    #[inline]
    pub fn cell(&self, role: Role, row: usize) -> &[f32] {
        let cells = self.cells();
        &self.columns[role][row * cells..(row + 1) * cells]
    }

    /// Overwrite the authored vector for `role` at `row`.
    ///
    /// # Errors
    ///
    /// Returns an error if `row` is out of range or `values` has the wrong
    /// length.
    pub fn set_cell(&mut self, role: Role, row: usize, values: &[f32]) -> Result<()> {
        let cells = self.cells();
        if row >= self.num_rows() {
            return Err(SimError::TrialOutOfRange {
                row,
                rows: self.num_rows(),
            });
        }
        if values.len() != cells {
            return Err(SimError::InvalidInputSize {
                expected: cells,
                actual: values.len(),
            });
        }
        self.columns[role][row * cells..(row + 1) * cells].copy_from_slice(values);
        Ok(())
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let store: PatternStore = serde_json::from_str(json)?;
        store.validate()?;
        Ok(store)
    }

    /// Serialize to binary (bincode).
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary (bincode).
    pub fn from_binary(data: &[u8]) -> Result<Self> {
        let store: PatternStore = bincode::deserialize(data)?;
        store.validate()?;
        Ok(store)
    }

    /// Write the store to a JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read a store from a JSON file.
    pub fn open_json(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Read a store from a JSON file, falling back to an empty store.
    ///
    /// A missing or unreadable file is logged, not fatal: the simulation
    /// still runs, producing degenerate statistics.
    pub fn open_or_empty(path: impl AsRef<Path>, shape: [usize; 2]) -> Self {
        let path = path.as_ref();
        match Self::open_json(path) {
            Ok(store) => {
                debug!(rows = store.num_rows(), path = %path.display(), "loaded patterns");
                store
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not load patterns, using empty store");
                Self::new(shape)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let expected = self.num_rows() * self.cells();
        for (role, col) in self.columns.iter() {
            if col.len() != expected {
                return Err(SimError::InvalidParameter(format!(
                    "{} column has {} values, expected {}",
                    role,
                    col.len(),
                    expected
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_zeros() {
        let store = PatternStore::zeros(4, [2, 3]);
        assert_eq!(store.num_rows(), 4);
        assert_eq!(store.cells(), 6);
        assert!(store.cell(Role::Goal, 3).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_push_row_checks_size() {
        let mut store = PatternStore::new([2, 2]);
        let good = RoleMap::from_fn(|r| vec![r.index() as f32; 4]);
        store.push_row("a", good).unwrap();
        assert_eq!(store.cell(Role::Motor, 0), &[2.0; 4]);

        let mut bad = RoleMap::from_fn(|_| vec![0.0; 4]);
        bad[Role::Outcome] = vec![0.0; 3];
        assert!(store.push_row("b", bad).is_err());
        assert_eq!(store.num_rows(), 1);
    }

    #[test]
    fn test_set_cell_row_offset() {
        let mut store = PatternStore::zeros(3, [1, 2]);
        store.set_cell(Role::Context, 2, &[1.0, 2.0]).unwrap();
        assert_eq!(store.cell(Role::Context, 1), &[0.0, 0.0]);
        assert_eq!(store.cell(Role::Context, 2), &[1.0, 2.0]);
        assert!(store.set_cell(Role::Context, 3, &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_generate_counts() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let store = PatternStore::generate(10, [5, 5], &PatternGen::goal_guy(), &mut rng);
        for row in 0..10 {
            let on = |role| store.cell(role, row).iter().filter(|&&v| v == 1.0).count();
            assert_eq!(on(Role::Context), 3);
            assert_eq!(on(Role::Outcome), 3);
            assert_eq!(on(Role::Goal), 0);
            assert_eq!(on(Role::Motor), 0);
        }
    }

    #[test]
    fn test_json_rejects_ragged_columns() {
        let mut store = PatternStore::zeros(2, [1, 1]);
        store.columns[Role::Motor].pop();
        let json = serde_json::to_string(&store).unwrap();
        assert!(PatternStore::from_json(&json).is_err());
    }

    #[test]
    fn test_open_or_empty_missing_file() {
        let store = PatternStore::open_or_empty("/nonexistent/patterns.json", [5, 5]);
        assert!(store.is_empty());
        assert_eq!(store.shape(), [5, 5]);
    }
}
