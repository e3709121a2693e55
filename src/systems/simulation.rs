use bevy::ecs::message::{MessageReader, MessageWriter};
use bevy::prelude::*;

use crate::events::{
    FireProjectileMessage, ProjectileCompleteMessage, ProjectileExitHitMessage, ProjectileFlyByMessage,
    ProjectileHitMessage, ProjectileInjuryMessage, TaskEvent,
};
use crate::resources::{BallisticsConfig, BallisticsEnvironment};
use crate::scheduler::BallisticsEngine;

/// Pushes edited config and environment resources into the engine.
///
/// Flights already in the air keep the settings they were fired with.
pub fn sync_engine_settings(
    engine: Res<BallisticsEngine>,
    config: Res<BallisticsConfig>,
    environment: Res<BallisticsEnvironment>,
) {
    if config.is_changed() {
        engine.set_config(config.clone());
    }
    if environment.is_changed() {
        engine.set_environment(*environment);
    }
}

/// Submits every [`FireProjectileMessage`] to the engine.
pub fn fire_projectiles(engine: Res<BallisticsEngine>, mut requests: MessageReader<FireProjectileMessage>) {
    for request in requests.read() {
        let id = engine.fire(request.projectile.clone(), request.launch.clone(), request.id);
        if id.is_none() {
            warn!("Fire request {:?} was rejected", request.id);
        }
    }
}

/// Advances realtime flights by the frame time.
pub fn tick_realtime_flights(engine: Res<BallisticsEngine>, time: Res<Time>) {
    let dt = time.delta_secs_f64();
    if dt > 0.0 {
        engine.tick(dt);
    }
}

/// Runs queued callbacks and republishes every task event as a message.
#[allow(clippy::too_many_arguments)]
pub fn dispatch_engine_events(
    engine: Res<BallisticsEngine>,
    mut hits: MessageWriter<ProjectileHitMessage>,
    mut exit_hits: MessageWriter<ProjectileExitHitMessage>,
    mut injuries: MessageWriter<ProjectileInjuryMessage>,
    mut fly_bys: MessageWriter<ProjectileFlyByMessage>,
    mut completions: MessageWriter<ProjectileCompleteMessage>,
) {
    engine.dispatch_with(|event| match event {
        TaskEvent::Hit(params) => {
            hits.write(ProjectileHitMessage(*params));
        }
        TaskEvent::ExitHit(params) => {
            exit_hits.write(ProjectileExitHitMessage(*params));
        }
        TaskEvent::Injure(injury) => {
            injuries.write(ProjectileInjuryMessage(injury.clone()));
        }
        TaskEvent::FlyBy(params) => {
            fly_bys.write(ProjectileFlyByMessage(*params));
        }
        TaskEvent::Update(_) => {}
        TaskEvent::Complete(result) => {
            completions.write(ProjectileCompleteMessage((**result).clone()));
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bevy::math::DVec3;

    use super::*;
    use crate::materials::SurfaceType;
    use crate::projectile::BulletPreset;
    use crate::scene::{AnalyticScene, SceneBody};
    use crate::sim::{LaunchParams, TaskResult};
    use crate::types::{ExitCode, ProjectileId};
    use crate::BallisticsCorePlugin;

    #[derive(Resource, Default)]
    struct Seen {
        hits: usize,
        completed: Vec<TaskResult>,
    }

    fn record(
        mut seen: ResMut<Seen>,
        mut hits: MessageReader<ProjectileHitMessage>,
        mut completions: MessageReader<ProjectileCompleteMessage>,
    ) {
        seen.hits += hits.read().count();
        seen.completed.extend(completions.read().map(|m| m.0.clone()));
    }

    fn test_app(scene: AnalyticScene) -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .add_plugins(BallisticsCorePlugin)
            .init_resource::<Seen>()
            .add_systems(PostUpdate, record);
        app.world().resource::<BallisticsEngine>().set_scene(Arc::new(scene));
        app
    }

    #[test]
    fn test_fire_message_reaches_completion_message() {
        let scene = AnalyticScene::new().with_body(
            SceneBody::cuboid(DVec3::new(20.0, 0.0, 0.0), DVec3::new(0.5, 2.0, 2.0)).with_surface(SurfaceType::Concrete),
        );
        let mut app = test_app(scene);

        let id = ProjectileId::new();
        app.world_mut().write_message(
            FireProjectileMessage::new(BulletPreset::Para9x19.into(), LaunchParams::new(DVec3::ZERO, DVec3::X))
                .with_id(id),
        );
        app.update();

        let engine = app.world().resource::<BallisticsEngine>().clone();
        assert!(engine.wait_for_idle(Duration::from_secs(10)));
        app.update();

        let seen = app.world().resource::<Seen>();
        assert_eq!(seen.completed.len(), 1);
        assert_eq!(seen.completed[0].projectile_id, id);
        assert_eq!(seen.completed[0].exit_code, ExitCode::ZeroVelocity);
        assert_eq!(seen.hits, 1);
    }

    #[test]
    fn test_config_edits_reach_the_engine() {
        let mut app = test_app(AnalyticScene::new());
        app.update();
        app.world_mut().resource_mut::<BallisticsConfig>().max_penetrations = 2;
        app.update();
        assert_eq!(app.world().resource::<BallisticsEngine>().config().max_penetrations, 2);
    }
}
