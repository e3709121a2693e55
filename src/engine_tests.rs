//! Concurrency tests for the engine: many flights, cancellation races and
//! batch submission.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::{Duration, Instant};

    use bevy::math::DVec3;

    use crate::events::Callbacks;
    use crate::materials::SurfaceType;
    use crate::projectile::{BulletPreset, Projectile, ProjectileProperties};
    use crate::scene::{AnalyticScene, SceneBody};
    use crate::scheduler::BallisticsEngine;
    use crate::sim::LaunchParams;
    use crate::types::{ExitCode, ProjectileId};

    type Completions = Arc<Mutex<HashMap<ProjectileId, Vec<ExitCode>>>>;

    fn recording_callbacks(completions: &Completions) -> Callbacks {
        let completions = completions.clone();
        Callbacks::default().on_complete(move |result| {
            completions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(result.projectile_id)
                .or_default()
                .push(result.exit_code);
        })
    }

    /// Dispatches until `expected` flights reported or the deadline passed.
    fn drain(engine: &BallisticsEngine, completions: &Completions, expected: usize, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        loop {
            engine.wait_for_idle(Duration::from_millis(50));
            engine.dispatch();
            let done = completions.lock().unwrap_or_else(PoisonError::into_inner).len();
            if done >= expected || Instant::now() > deadline {
                return;
            }
        }
    }

    #[test]
    fn test_cancellation_race_completes_every_flight_once() {
        let engine = BallisticsEngine::default();
        let completions: Completions = Arc::default();
        let launch = LaunchParams::new(DVec3::ZERO, DVec3::X).with_range(3000.0);

        let mut cancelled = 0;
        let mut ids = Vec::with_capacity(1000);
        for i in 0..1000 {
            let id = engine.fire_with_callbacks(
                BulletPreset::Para9x19.into(),
                launch.clone(),
                recording_callbacks(&completions),
                ProjectileId::NONE,
            );
            assert!(!id.is_none());
            if i % 2 == 0 && engine.cancel(id) {
                cancelled += 1;
            }
            ids.push(id);
        }
        assert_eq!(cancelled, 500);

        drain(&engine, &completions, ids.len(), Duration::from_secs(120));

        let completions = completions.lock().unwrap_or_else(PoisonError::into_inner);
        assert_eq!(completions.len(), 1000);
        assert!(ids.iter().all(|id| completions.get(id).map(Vec::len) == Some(1)));
        let cancelled_codes = completions
            .values()
            .filter(|codes| codes[0] == ExitCode::Cancelled)
            .count();
        assert!(cancelled_codes >= 500, "only {cancelled_codes} cancelled");
        assert_eq!(engine.live_count(), 0);
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_parallel_batch_hits_the_same_wall() {
        let scene = AnalyticScene::new().with_body(
            SceneBody::cuboid(DVec3::new(10.05, 0.0, 0.0), DVec3::new(0.05, 20.0, 20.0)).with_surface(SurfaceType::Concrete),
        );
        let engine = BallisticsEngine::new(Arc::new(scene));

        let count = 48;
        let projectiles: Vec<Projectile> = vec![BulletPreset::Para9x19.into(); count];
        let launches: Vec<LaunchParams> = (0..count)
            .map(|i| LaunchParams::new(DVec3::new(0.0, i as f64 * 0.25 - 6.0, 0.0), DVec3::X))
            .collect();
        let chosen = ProjectileId::new();
        let ids = engine.fire_batch(projectiles, launches, vec![chosen]);

        assert_eq!(ids.len(), count);
        assert_eq!(ids[0], chosen);
        assert!(ids.iter().all(|id| !id.is_none()));

        let mut hits = 0;
        let mut completed = Vec::new();
        assert!(engine.wait_for_idle(Duration::from_secs(30)));
        engine.dispatch_with(|event| match event {
            crate::events::TaskEvent::Hit(_) => hits += 1,
            crate::events::TaskEvent::Complete(result) => completed.push(result.exit_code),
            _ => {}
        });

        assert_eq!(hits, count);
        assert_eq!(completed.len(), count);
        assert!(completed.iter().all(|code| *code == ExitCode::ZeroVelocity));
    }

    #[test]
    fn test_fragment_burst_flies_in_every_direction() {
        let engine = BallisticsEngine::default();
        let fragment = ProjectileProperties::sphere(0.003, 7850.0, SurfaceType::Steel);
        let launches = LaunchParams::new(DVec3::ZERO, DVec3::X)
            .with_speed(600.0)
            .with_range(10.0)
            .distributed_on_sphere(32);
        let ids = engine.fire_batch(vec![fragment.into(); launches.len()], launches, Vec::new());
        assert!(ids.iter().all(|id| !id.is_none()));

        let mut finals = Vec::new();
        assert!(engine.wait_for_idle(Duration::from_secs(30)));
        engine.dispatch_with(|event| {
            if let crate::events::TaskEvent::Complete(result) = event {
                assert_eq!(result.exit_code, ExitCode::RangeExhausted);
                finals.push(result.final_position);
            }
        });
        assert_eq!(finals.len(), 32);
        assert!(finals.iter().any(|p| p.z > 5.0));
        assert!(finals.iter().any(|p| p.z < -5.0));
    }

    #[test]
    fn test_small_batch_runs_sequentially_with_unique_ids() {
        let engine = BallisticsEngine::default();
        let launches = vec![LaunchParams::new(DVec3::ZERO, DVec3::X).with_range(5.0); 4];
        let ids = engine.fire_batch(vec![BulletPreset::Acp45.into(); 4], launches, Vec::new());

        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 4);
        assert!(engine.wait_for_idle(Duration::from_secs(10)));
        assert_eq!(engine.dispatch(), 4);
    }

    #[test]
    fn test_material_table_swap_applies_to_new_flights() {
        let scene = AnalyticScene::new().with_body(
            SceneBody::cuboid(DVec3::new(5.05, 0.0, 0.0), DVec3::new(0.05, 2.0, 2.0)).with_surface(SurfaceType::Concrete),
        );
        let engine = BallisticsEngine::new(Arc::new(scene));
        let launch = LaunchParams::new(DVec3::ZERO, DVec3::X);

        let mut before = None;
        engine.fire_test(BulletPreset::Para9x19.into(), launch.clone(), ProjectileId::NONE, |r| before = Some(r));
        let before = before.expect("prediction result");
        assert_eq!(before.exit_code, ExitCode::ZeroVelocity);

        let mut table = (*engine.material_table()).clone();
        let drywall = table.surface(SurfaceType::Drywall).clone();
        table.set_surface(SurfaceType::Concrete, drywall);
        engine.set_material_table(table);

        let mut after = None;
        engine.fire_test(BulletPreset::Para9x19.into(), launch, ProjectileId::NONE, |r| after = Some(r));
        let after = after.expect("prediction result");
        assert_eq!(after.exit_hits.len(), 1);
        assert!(after.final_velocity.length() > 0.0);
    }
}
