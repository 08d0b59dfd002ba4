//! Roles - the four named unit groups that external data is applied to.
//!
//! Role names are the join key between the Pattern Store columns and the
//! network engine's layers. They are resolved to [`LayerId`] handles once,
//! at configuration time, and consumed by index afterwards.

use crate::engine::{Engine, LayerId};
use crate::{Result, SimError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// One of the four functional unit groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Context,
    Goal,
    Motor,
    Outcome,
}

impl Role {
    /// All roles in column order.
    pub const ALL: [Role; 4] = [Role::Context, Role::Goal, Role::Motor, Role::Outcome];

    /// Stable name shared by Pattern Store columns and engine layers.
    pub fn name(self) -> &'static str {
        match self {
            Role::Context => "Context",
            Role::Goal => "Goal",
            Role::Motor => "Motor",
            Role::Outcome => "Outcome",
        }
    }

    /// Column index of this role.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Parse a role from its stable name.
    pub fn from_name(name: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|r| r.name() == name)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a role's layer participates in a settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleMode {
    /// Clamped to an external vector for the whole settle
    Input,
    /// Clamped to an external vector in the plus phase only
    Target,
    /// Free-running
    Hidden,
}

/// Fixed-size map keyed by [`Role`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RoleMap<T>(pub [T; 4]);

impl<T> RoleMap<T> {
    /// Build a map by evaluating `f` for every role.
    pub fn from_fn(mut f: impl FnMut(Role) -> T) -> Self {
        RoleMap([
            f(Role::Context),
            f(Role::Goal),
            f(Role::Motor),
            f(Role::Outcome),
        ])
    }

    /// Iterate `(role, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (Role, &T)> {
        Role::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> Index<Role> for RoleMap<T> {
    type Output = T;

    #[inline]
    fn index(&self, role: Role) -> &T {
        &self.0[role.index()]
    }
}

impl<T> IndexMut<Role> for RoleMap<T> {
    #[inline]
    fn index_mut(&mut self, role: Role) -> &mut T {
        &mut self.0[role.index()]
    }
}

/// Engine layer handles for every role, resolved once.
pub type RoleLayers = RoleMap<LayerId>;

impl RoleLayers {
    /// Resolve every role name against the engine.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnresolvedRole`] for the first role without a
    /// layer. This is fatal: there is nothing sensible to clamp.
    pub fn resolve<E: Engine + ?Sized>(engine: &E) -> Result<Self> {
        let mut ids = [LayerId::from_raw(0); 4];
        for role in Role::ALL {
            ids[role.index()] = engine
                .layer_id(role.name())
                .ok_or(SimError::UnresolvedRole { role })?;
        }
        Ok(RoleMap(ids))
    }
}
