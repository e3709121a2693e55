//! # Terminal Ballistics
//!
//! Concurrent projectile flight and terminal-ballistics simulation for Bevy 0.18.
//!
//! ## Features
//! - Drag integration with altitude-dependent air, wind and Coriolis acceleration
//! - Penetration, ricochet and exit-geometry decisions against a material table
//! - Bullet deformation and wound-cavity estimates for hit zones
//! - Instant flights on the async worker pool, realtime flights advanced per frame
//! - Per-projectile callbacks and Bevy messages for every impact
//! - Compact wire format for replicating fire requests (`netcode` feature)
//!
//! ## Quick Start
//! ```rust,no_run
//! use bevy::prelude::*;
//! use terminal_ballistics::prelude::*;
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(DefaultPlugins)
//!         .add_plugins(BallisticsPluginGroup)
//!         .run();
//! }
//! ```

pub mod environment;
pub mod error;
pub mod events;
pub mod exit;
pub mod impact;
pub mod materials;
pub mod math;
pub mod projectile;
pub mod resources;
pub mod scene;
pub mod scheduler;
pub mod shapes;
pub mod sim;
pub mod systems;
pub mod types;

#[cfg(feature = "netcode")]
pub mod network;

#[cfg(test)]
mod engine_tests;

pub mod prelude {
    pub use crate::error::BallisticsError;
    pub use crate::events::*;
    pub use crate::impact::{ImpactParams, InjuryParams};
    pub use crate::materials::{MaterialTable, SurfaceType};
    pub use crate::projectile::{Bullet, BulletPreset, Projectile, ProjectileProperties};
    pub use crate::resources::*;
    pub use crate::scene::{AnalyticScene, SceneActor, SceneBody, SceneQuery};
    pub use crate::scheduler::BallisticsEngine;
    pub use crate::sim::{LaunchParams, TaskResult};
    pub use crate::systems::debug::BallisticsDebugSettings;
    pub use crate::types::*;
    pub use crate::BallisticsPluginGroup;
    pub use crate::{BallisticsCorePlugin, BallisticsDebugPlugin};

    #[cfg(feature = "netcode")]
    pub use crate::network::{BallisticsNetworkPlugin, OutgoingFireMessage, RemoteFireMessage, ReplicatedFireMessage};
}

use bevy::ecs::message::MessageReader;
use bevy::prelude::*;

/// Main plugin group that includes all ballistics subsystems.
///
/// # Example
/// ```
/// use bevy::prelude::*;
/// use terminal_ballistics::prelude::*;
///
/// fn main() {
///     App::new()
///         .add_plugins(DefaultPlugins)
///         .add_plugins(BallisticsPluginGroup)
///         .run();
/// }
/// ```
#[derive(Default)]
pub struct BallisticsPluginGroup;

impl PluginGroup for BallisticsPluginGroup {
    /// Adds the core, debug and (with `netcode`) network plugins.
    fn build(self) -> bevy::app::PluginGroupBuilder {
        let group = bevy::app::PluginGroupBuilder::start::<Self>()
            .add(BallisticsCorePlugin)
            .add(BallisticsDebugPlugin);
        #[cfg(feature = "netcode")]
        let group = group.add(network::BallisticsNetworkPlugin);
        group
    }
}

/// Engine, settings and message plumbing.
///
/// Inserts a [`BallisticsEngine`](scheduler::BallisticsEngine) with an empty
/// scene unless one is already present. Replace its scene with
/// [`BallisticsEngine::set_scene`](scheduler::BallisticsEngine::set_scene).
/// The [`BallisticsConfig`](resources::BallisticsConfig) and
/// [`BallisticsEnvironment`](resources::BallisticsEnvironment) resources are
/// the source of truth afterwards; edits to them reach the engine each frame.
///
/// # Systems
/// - `sync_engine_settings` - Pushes edited config and environment into the engine
/// - `fire_projectiles` - Submits fire requests
/// - `tick_realtime_flights` - Advances realtime flights by the frame time
/// - `dispatch_engine_events` - Runs callbacks and writes impact messages
pub struct BallisticsCorePlugin;

impl Plugin for BallisticsCorePlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<resources::BallisticsConfig>()
            .register_type::<resources::BallisticsEnvironment>()
            .add_message::<events::FireProjectileMessage>()
            .add_message::<events::ProjectileHitMessage>()
            .add_message::<events::ProjectileExitHitMessage>()
            .add_message::<events::ProjectileInjuryMessage>()
            .add_message::<events::ProjectileFlyByMessage>()
            .add_message::<events::ProjectileCompleteMessage>()
            .add_systems(
                Update,
                (
                    systems::simulation::sync_engine_settings,
                    systems::simulation::fire_projectiles,
                    systems::simulation::tick_realtime_flights,
                    systems::simulation::dispatch_engine_events,
                )
                    .chain(),
            );

        // A pre-inserted engine seeds the settings resources
        let engine = app
            .world()
            .get_resource::<scheduler::BallisticsEngine>()
            .cloned()
            .unwrap_or_default();
        if !app.world().contains_resource::<resources::BallisticsConfig>() {
            app.insert_resource((*engine.config()).clone());
        }
        if !app.world().contains_resource::<resources::BallisticsEnvironment>() {
            app.insert_resource(engine.environment());
        }
        app.insert_resource(engine).add_systems(Last, shutdown_on_exit);
    }
}

/// Stops accepting work and waits briefly for running flights when the app exits.
fn shutdown_on_exit(engine: Res<scheduler::BallisticsEngine>, mut exits: MessageReader<AppExit>) {
    if exits.read().next().is_some() && !engine.shutdown(std::time::Duration::from_secs(2)) {
        warn!("Ballistics engine shut down with {} flights still running", engine.pending_count());
    }
}

/// Debug plugin drawing finished flight paths.
pub struct BallisticsDebugPlugin;

impl Plugin for BallisticsDebugPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<systems::debug::BallisticsDebugSettings>()
            .init_resource::<systems::debug::BallisticsDebugSettings>()
            .init_resource::<systems::debug::DebugPaths>()
            .add_systems(
                Update,
                (
                    systems::debug::collect_debug_paths.after(systems::simulation::dispatch_engine_events),
                    systems::debug::draw_projectile_debug,
                )
                    .chain(),
            );
    }
}
