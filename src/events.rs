//! Events for the ballistics system.
//!
//! Tasks report through [`TaskEvent`]s. The engine queues them and hands
//! them to the owning consumer when it is dispatched: registered
//! [`Callbacks`] run first, then the core plugin forwards everything as
//! Bevy messages.
//!
//! Note: In Bevy 0.18, buffered events use the `Message` trait instead of `Event`.

use bevy::ecs::message::Message;
use bevy::math::DVec3;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::impact::{ImpactParams, InjuryParams};
use crate::projectile::Projectile;
use crate::sim::{LaunchParams, ProjectileState, TaskResult};
use crate::types::{ActorId, ProjectileId};

/// A projectile passed close to an actor that listens for fly-bys.
///
/// # Fields
/// * `location` - Point of the flight segment closest to the actor
/// * `distance` - Distance from that point to the actor's collision (m)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlyByParams {
    pub projectile_id: ProjectileId,
    pub actor: ActorId,
    pub location: DVec3,
    pub velocity: DVec3,
    pub distance: f64,
    pub time: f64,
}

/// Everything a task reports while it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Hit(ImpactParams),
    ExitHit(ImpactParams),
    Injure(InjuryParams),
    FlyBy(FlyByParams),
    Update(ProjectileState),
    Complete(Box<TaskResult>),
}

impl TaskEvent {
    pub fn projectile_id(&self) -> ProjectileId {
        match self {
            TaskEvent::Hit(p) | TaskEvent::ExitHit(p) => p.projectile_id,
            TaskEvent::Injure(i) => i.impact.projectile_id,
            TaskEvent::FlyBy(f) => f.projectile_id,
            TaskEvent::Update(s) => s.projectile_id,
            TaskEvent::Complete(r) => r.projectile_id,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, TaskEvent::Complete(_))
    }
}

type Callback<T> = Option<Box<dyn FnMut(&T) + Send>>;

/// Consumer hooks attached to one fired projectile.
///
/// Hooks run on whichever thread calls
/// [`BallisticsEngine::dispatch`](crate::scheduler::BallisticsEngine::dispatch).
///
/// # Example
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use terminal_ballistics::events::Callbacks;
///
/// let hits = Arc::new(AtomicUsize::new(0));
/// let counter = hits.clone();
/// let callbacks = Callbacks::default().on_hit(move |_| {
///     counter.fetch_add(1, Ordering::Relaxed);
/// });
/// assert!(!callbacks.wants_updates());
/// ```
#[derive(Default)]
pub struct Callbacks {
    complete: Callback<TaskResult>,
    hit: Callback<ImpactParams>,
    exit_hit: Callback<ImpactParams>,
    injure: Option<Box<dyn FnMut(&ImpactParams, &InjuryParams) + Send>>,
    update: Callback<ProjectileState>,
    fly_by: Callback<FlyByParams>,
}

impl Callbacks {
    pub fn on_complete(mut self, f: impl FnMut(&TaskResult) + Send + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }

    pub fn on_hit(mut self, f: impl FnMut(&ImpactParams) + Send + 'static) -> Self {
        self.hit = Some(Box::new(f));
        self
    }

    pub fn on_exit_hit(mut self, f: impl FnMut(&ImpactParams) + Send + 'static) -> Self {
        self.exit_hit = Some(Box::new(f));
        self
    }

    pub fn on_injure(mut self, f: impl FnMut(&ImpactParams, &InjuryParams) + Send + 'static) -> Self {
        self.injure = Some(Box::new(f));
        self
    }

    pub fn on_update(mut self, f: impl FnMut(&ProjectileState) + Send + 'static) -> Self {
        self.update = Some(Box::new(f));
        self
    }

    pub fn on_fly_by(mut self, f: impl FnMut(&FlyByParams) + Send + 'static) -> Self {
        self.fly_by = Some(Box::new(f));
        self
    }

    pub fn wants_updates(&self) -> bool {
        self.update.is_some()
    }

    /// Runs the hook matching `event`, if one is registered.
    pub fn invoke(&mut self, event: &TaskEvent) {
        match event {
            TaskEvent::Hit(params) => {
                if let Some(f) = self.hit.as_mut() {
                    f(params);
                }
            }
            TaskEvent::ExitHit(params) => {
                if let Some(f) = self.exit_hit.as_mut() {
                    f(params);
                }
            }
            TaskEvent::Injure(injury) => {
                if let Some(f) = self.injure.as_mut() {
                    f(&injury.impact, injury);
                }
            }
            TaskEvent::FlyBy(params) => {
                if let Some(f) = self.fly_by.as_mut() {
                    f(params);
                }
            }
            TaskEvent::Update(state) => {
                if let Some(f) = self.update.as_mut() {
                    f(state);
                }
            }
            TaskEvent::Complete(result) => {
                if let Some(f) = self.complete.as_mut() {
                    f(result);
                }
            }
        }
    }
}

/// Request to fire a projectile from inside the ECS.
///
/// Read by the core plugin, which submits it to the
/// [`BallisticsEngine`](crate::scheduler::BallisticsEngine).
///
/// # Fields
/// * `projectile` - What to fire
/// * `launch` - Muzzle state and query filters
/// * `id` - Caller-chosen id, or [`ProjectileId::NONE`] to generate one
///
/// # Example
/// ```
/// use bevy::math::DVec3;
/// use terminal_ballistics::events::FireProjectileMessage;
/// use terminal_ballistics::projectile::BulletPreset;
/// use terminal_ballistics::sim::LaunchParams;
///
/// let message = FireProjectileMessage::new(
///     BulletPreset::Para9x19.into(),
///     LaunchParams::new(DVec3::ZERO, DVec3::X),
/// );
/// assert!(message.id.is_none());
/// ```
#[derive(Message, Clone)]
pub struct FireProjectileMessage {
    pub projectile: Projectile,
    pub launch: LaunchParams,
    pub id: ProjectileId,
}

impl FireProjectileMessage {
    pub fn new(projectile: Projectile, launch: LaunchParams) -> Self {
        Self {
            projectile,
            launch,
            id: ProjectileId::NONE,
        }
    }

    /// Fires with a caller-supplied id, e.g. one received from a peer.
    pub fn with_id(mut self, id: ProjectileId) -> Self {
        self.id = id;
        self
    }
}

/// A projectile struck a surface (including ricochets).
#[derive(Message, Clone)]
pub struct ProjectileHitMessage(pub ImpactParams);

/// A projectile left a body it penetrated.
#[derive(Message, Clone)]
pub struct ProjectileExitHitMessage(pub ImpactParams);

/// A projectile struck a hit zone.
#[derive(Message, Clone)]
pub struct ProjectileInjuryMessage(pub InjuryParams);

/// A projectile passed close to a listening actor.
#[derive(Message, Clone)]
pub struct ProjectileFlyByMessage(pub FlyByParams);

/// A flight finished.
#[derive(Message, Clone)]
pub struct ProjectileCompleteMessage(pub TaskResult);
