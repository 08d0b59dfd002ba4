//! Error types for the goalseek simulation driver.
//!
//! This module provides a unified error type for all operations in the
//! simulation loop, using the `thiserror` crate for ergonomic error handling.
//!
//! Only a few of these variants ever leave a trial: most conditions are
//! logged at the trial boundary and replaced by a safe default. See
//! [`SimError::is_fatal`].

use crate::role::Role;
use thiserror::Error;

/// The main error type for simulation operations.
#[derive(Error, Debug)]
pub enum SimError {
    /// A role has no matching layer in the network engine
    #[error("No layer named {role} in the network")]
    UnresolvedRole {
        /// The role that could not be resolved
        role: Role,
    },

    /// Sub-phase value outside {0, 1}
    #[error("Sub-phase {0} is out of range (expected 0 or 1)")]
    InvalidSubPhase(u8),

    /// Two layers that must be compared unit-by-unit have different sizes
    #[error("Unit count mismatch between {left} ({left_units}) and {right} ({right_units})")]
    UnitCountMismatch {
        /// First role
        left: Role,
        /// Units in the first role's layer
        left_units: usize,
        /// Second role
        right: Role,
        /// Units in the second role's layer
        right_units: usize,
    },

    /// The engine has no produced activity for a layer
    #[error("No produced activity for layer {layer}")]
    NoActivity {
        /// Layer name
        layer: String,
    },

    /// Vector size does not match the expected size
    #[error("Invalid input size: expected {expected}, got {actual}")]
    InvalidInputSize {
        /// Expected size
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Trial index does not address a Pattern Store row
    #[error("Trial row out of range: row {row}, rows {rows}")]
    TrialOutOfRange {
        /// The requested row
        row: usize,
        /// Number of rows in the store
        rows: usize,
    },

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary serialization error occurred
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON serialization error occurred
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

impl SimError {
    /// Whether this error must terminate a training run.
    ///
    /// Everything else is handled at the trial boundary with a logged
    /// warning and a default value.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SimError::UnresolvedRole { .. } | SimError::TrialOutOfRange { .. }
        )
    }
}

/// A specialized `Result` type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
