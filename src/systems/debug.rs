use bevy::ecs::message::MessageReader;
use bevy::math::DVec3;
use bevy::prelude::*;

use crate::events::ProjectileCompleteMessage;
use crate::sim::TaskResult;

/// Settings for the debug path overlay.
///
/// # Fields
/// * `enabled` - Draws nothing when false
/// * `lifetime` - Seconds a finished flight stays on screen
/// * `max_paths` - Oldest flights are dropped beyond this many
#[derive(Resource, Reflect, Clone)]
#[reflect(Resource)]
pub struct BallisticsDebugSettings {
    pub enabled: bool,
    pub lifetime: f32,
    pub max_paths: usize,
    pub path_color: Color,
    pub hit_color: Color,
    pub exit_color: Color,
}

impl Default for BallisticsDebugSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            lifetime: 5.0,
            max_paths: 256,
            path_color: Color::srgb(0.0, 1.0, 0.0),
            hit_color: Color::srgb(1.0, 0.0, 0.0),
            exit_color: Color::srgb(0.0, 0.4, 1.0),
        }
    }
}

/// A finished flight waiting to fade out.
#[derive(Clone, Debug)]
pub struct DebugPath {
    pub points: Vec<Vec3>,
    pub hits: Vec<Vec3>,
    pub exits: Vec<Vec3>,
    pub age: f32,
}

/// Flights currently drawn by the overlay.
#[derive(Resource, Default, Clone, Debug)]
pub struct DebugPaths(pub Vec<DebugPath>);

impl DebugPaths {
    pub fn push(&mut self, result: &TaskResult, max_paths: usize) {
        if !result.draw_debug || result.path.is_empty() {
            return;
        }
        self.0.push(DebugPath {
            points: result.path.iter().map(|p| to_render_space(p.position)).collect(),
            hits: result.hits.iter().map(|h| to_render_space(h.hit.location)).collect(),
            exits: result.exit_hits.iter().map(|h| to_render_space(h.hit.location)).collect(),
            age: 0.0,
        });
        let excess = self.0.len().saturating_sub(max_paths);
        self.0.drain(..excess);
    }

    /// Ages every path and drops the expired ones.
    pub fn expire(&mut self, dt: f32, lifetime: f32) {
        for path in &mut self.0 {
            path.age += dt;
        }
        self.0.retain(|path| path.age < lifetime);
    }
}

/// Maps simulation space (Z up) to Bevy's Y-up render space.
pub fn to_render_space(v: DVec3) -> Vec3 {
    Vec3::new(v.x as f32, v.z as f32, -v.y as f32)
}

pub fn collect_debug_paths(
    settings: Res<BallisticsDebugSettings>,
    time: Res<Time>,
    mut paths: ResMut<DebugPaths>,
    mut completions: MessageReader<ProjectileCompleteMessage>,
) {
    paths.expire(time.delta_secs(), settings.lifetime);
    for ProjectileCompleteMessage(result) in completions.read() {
        if settings.enabled {
            paths.push(result, settings.max_paths);
        }
    }
}

/// Draws finished flights with gizmos.
pub fn draw_projectile_debug(mut gizmos: Gizmos, settings: Res<BallisticsDebugSettings>, paths: Res<DebugPaths>) {
    if !settings.enabled {
        return;
    }

    for path in &paths.0 {
        gizmos.linestrip(path.points.iter().copied(), settings.path_color);
        for hit in &path.hits {
            gizmos.sphere(*hit, 0.05, settings.hit_color);
        }
        for exit in &path.exits {
            gizmos.sphere(*exit, 0.04, settings.exit_color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::PathPoint;

    fn result_with_path(draw_debug: bool) -> TaskResult {
        TaskResult {
            path: vec![
                PathPoint {
                    position: DVec3::ZERO,
                    velocity: DVec3::X,
                    time: 0.0,
                },
                PathPoint {
                    position: DVec3::new(1.0, 2.0, 3.0),
                    velocity: DVec3::X,
                    time: 0.1,
                },
            ],
            draw_debug,
            ..Default::default()
        }
    }

    #[test]
    fn test_render_space_is_y_up() {
        assert_eq!(to_render_space(DVec3::new(1.0, 2.0, 3.0)), Vec3::new(1.0, 3.0, -2.0));
    }

    #[test]
    fn test_paths_respect_tracer_flag_and_cap() {
        let mut paths = DebugPaths::default();
        paths.push(&result_with_path(false), 4);
        assert!(paths.0.is_empty());

        for _ in 0..6 {
            paths.push(&result_with_path(true), 4);
        }
        assert_eq!(paths.0.len(), 4);
        assert_eq!(paths.0[0].points[1], Vec3::new(1.0, 3.0, -2.0));
    }

    #[test]
    fn test_paths_expire() {
        let mut paths = DebugPaths::default();
        paths.push(&result_with_path(true), 8);
        paths.expire(1.0, 2.0);
        assert_eq!(paths.0.len(), 1);
        paths.expire(1.5, 2.0);
        assert!(paths.0.is_empty());
    }
}
