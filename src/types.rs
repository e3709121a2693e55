//! Common types and enums for the ballistics system.

use std::fmt;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 128-bit identity of a simulated projectile.
///
/// The all-zero value ([`ProjectileId::NONE`]) means "not assigned yet".
/// Callers may supply their own ids to keep simulations on several peers
/// in step; otherwise the engine generates a random one.
///
/// # Example
/// ```
/// use terminal_ballistics::types::ProjectileId;
///
/// let id = ProjectileId::new();
/// assert!(!id.is_none());
/// assert!(ProjectileId::NONE.is_none());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ProjectileId(pub Uuid);

impl ProjectileId {
    /// The unassigned id.
    pub const NONE: ProjectileId = ProjectileId(Uuid::nil());

    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// True for the unassigned id.
    pub fn is_none(&self) -> bool {
        self.0.is_nil()
    }

    /// Returns `self` if assigned, otherwise a fresh id.
    pub fn or_generate(self) -> Self {
        if self.is_none() {
            Self::new()
        } else {
            self
        }
    }

    /// Folds the id into a 64-bit seed for per-projectile random streams.
    pub fn seed(&self) -> u64 {
        let (hi, lo) = self.0.as_u64_pair();
        hi ^ lo.rotate_left(17)
    }
}

impl fmt::Debug for ProjectileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProjectileId({})", self.0)
    }
}

impl fmt::Display for ProjectileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("None")
        } else {
            write!(f, "{}", self.0.simple())
        }
    }
}

/// Opaque handle of a host-side actor (the owner of one or more components).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, Reflect)]
pub struct ActorId(pub u64);

/// Opaque handle of a host-side collision component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, Reflect)]
pub struct ComponentId(pub u64);

/// Reference drag curve used for a bullet.
///
/// # Variants
/// * `G1` - Flat-based reference projectile, transition at Mach 1.198
/// * `G7` - Boat-tail reference projectile, transition at Mach 1.018
/// * `Sphere` - Reynolds-number curve for balls and pellets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Reflect)]
pub enum DragModel {
    #[default]
    G1,
    G7,
    Sphere,
}

/// Reason a simulation task terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Reflect)]
pub enum ExitCode {
    /// The projectile left the world bounds.
    #[default]
    Completed,
    /// The projectile was arrested (speed reached zero).
    ZeroVelocity,
    /// The projectile description was unusable.
    InvalidProjectile,
    /// The task detected a stuck state (same hit consumed twice).
    EarlyTermination,
    /// Distance travelled exceeded the effective range.
    RangeExhausted,
    /// Simulated time exceeded the configured ceiling.
    TimeExhausted,
    /// The consumer cancelled the task or the engine shut down.
    Cancelled,
}

impl ExitCode {
    /// True for outcomes that indicate a normal end of flight.
    pub fn is_normal(&self) -> bool {
        matches!(
            self,
            ExitCode::Completed | ExitCode::RangeExhausted | ExitCode::TimeExhausted
        )
    }
}

/// Result of consuming a single impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Reflect)]
pub enum ImpactOutcome {
    /// The surface was tagged to be ignored.
    Ignore,
    /// The projectile passed through the body.
    Penetration,
    /// The projectile deflected off the surface.
    Ricochet,
    /// The impact data could not be used.
    Invalid,
    /// The task must terminate after this impact.
    Kill,
}

/// How a task is advanced.
///
/// # Variants
/// * `Instant` - The whole flight runs on the async compute pool as fast as possible
/// * `Realtime` - The flight advances only when the engine is ticked with wall-clock deltas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Reflect)]
pub enum SimulationType {
    #[default]
    Instant,
    Realtime,
}

impl SimulationType {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            SimulationType::Instant => 0,
            SimulationType::Realtime => 1,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SimulationType::Instant),
            1 => Some(SimulationType::Realtime),
            _ => None,
        }
    }
}

/// Lifecycle state of a simulation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
pub enum SimState {
    #[default]
    Launching,
    Integrating,
    ConsumingHit,
    ShuttingDown,
    Done,
}

/// Which task kinds have their exit codes logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
pub enum ExitCodeLogFilter {
    BulletTasks,
    ProjectileTasks,
    #[default]
    Both,
}

impl ExitCodeLogFilter {
    /// Whether an exit of a task with the given kind should be logged.
    pub fn allows(&self, is_bullet: bool) -> bool {
        match self {
            ExitCodeLogFilter::Both => true,
            ExitCodeLogFilter::BulletTasks => is_bullet,
            ExitCodeLogFilter::ProjectileTasks => !is_bullet,
        }
    }
}
