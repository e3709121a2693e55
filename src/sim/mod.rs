//! Per-projectile simulation.
//!
//! A [`SimTask`] owns one projectile from launch to termination. It
//! integrates the flight, sweeps the scene for contacts, resolves each
//! contact through the impact model and reports what happened through an
//! [`EventSink`]. The accumulated [`TaskResult`] is handed over exactly once
//! when the task finishes.

mod launch;
mod task;

pub use launch::LaunchParams;
pub use task::SimTask;

use std::sync::{Arc, Mutex, PoisonError};

use bevy::math::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::environment::EnvironmentSnapshot;
use crate::events::TaskEvent;
use crate::impact::{ImpactParams, InjuryParams};
use crate::materials::MaterialTable;
use crate::resources::BallisticsConfig;
use crate::scene::SceneQuery;
use crate::types::{ExitCode, ProjectileId, SimulationType};

/// Shared, read-only inputs of a running task.
///
/// Built once per submission from the engine's current state, so a task
/// never observes configuration changes made after it was fired.
#[derive(Clone)]
pub struct SimContext {
    pub scene: Arc<dyn SceneQuery>,
    pub materials: Arc<MaterialTable>,
    pub config: Arc<BallisticsConfig>,
    pub environment: EnvironmentSnapshot,
}

impl SimContext {
    pub fn new(scene: Arc<dyn SceneQuery>) -> Self {
        let environment = EnvironmentSnapshot::default().with_gravity_z(scene.gravity_z());
        Self {
            scene,
            materials: Arc::new(MaterialTable::default()),
            config: Arc::new(BallisticsConfig::default()),
            environment,
        }
    }

    pub fn with_materials(mut self, materials: Arc<MaterialTable>) -> Self {
        self.materials = materials;
        self
    }

    pub fn with_config(mut self, config: BallisticsConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_environment(mut self, environment: EnvironmentSnapshot) -> Self {
        self.environment = environment.with_gravity_z(self.scene.gravity_z());
        self
    }
}

/// Receives the events a task produces, on the task's own thread.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TaskEvent);

    /// Whether per-step [`ProjectileState`] updates are wanted.
    fn wants_updates(&self) -> bool {
        false
    }
}

/// Sink that drops everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: TaskEvent) {}
}

/// Sink that keeps every event, for tests and synchronous callers.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TaskEvent>>,
    updates: bool,
}

impl RecordingSink {
    /// A sink that also asks for per-step updates.
    pub fn with_updates() -> Self {
        Self {
            updates: true,
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn completions(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.is_complete())
            .count()
    }

    /// The handed-over result, once the task has finished.
    pub fn result(&self) -> Option<TaskResult> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find_map(|e| match e {
                TaskEvent::Complete(result) => Some(result.as_ref().clone()),
                _ => None,
            })
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: TaskEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }

    fn wants_updates(&self) -> bool {
        self.updates
    }
}

/// One recorded sample of the flight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub position: DVec3,
    pub velocity: DVec3,
    pub time: f64,
}

/// Live state of a flight, sent with every update.
///
/// # Fields
/// * `distance` - Path length travelled so far (m)
/// * `time` - Simulated time since launch (s)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectileState {
    pub projectile_id: ProjectileId,
    pub position: DVec3,
    pub velocity: DVec3,
    pub orientation: DQuat,
    pub time: f64,
    pub distance: f64,
}

/// Everything a finished flight produced.
///
/// # Fields
/// * `path` - Position and velocity samples, one per integration step and contact
/// * `hits` - Entry contacts (including ricochets)
/// * `exit_hits` - Exit contacts of penetrated bodies
/// * `injuries` - Contacts with hit zones
/// * `draw_debug` - Whether the debug plugin should draw this flight
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskResult {
    pub projectile_id: ProjectileId,
    pub simulation_type: SimulationType,
    pub is_bullet: bool,
    pub path: Vec<PathPoint>,
    pub hits: Vec<ImpactParams>,
    pub exit_hits: Vec<ImpactParams>,
    pub injuries: Vec<InjuryParams>,
    pub exit_code: ExitCode,
    pub final_position: DVec3,
    pub final_velocity: DVec3,
    pub total_time: f64,
    pub distance: f64,
    pub draw_debug: bool,
}

impl TaskResult {
    /// Number of separate bodies struck.
    pub fn impact_count(&self) -> usize {
        self.hits.len() + self.injuries.iter().filter(|i| !i.impact.is_exit).count()
    }

    pub fn ricochets(&self) -> impl Iterator<Item = &ImpactParams> {
        self.hits
            .iter()
            .chain(self.injuries.iter().map(|i| &i.impact))
            .filter(|p| p.is_ricochet)
    }
}
