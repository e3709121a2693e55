//! Exit-geometry solver.
//!
//! Given the point where a projectile enters a body and the direction it
//! travels, find where it leaves that body, then keep walking along the same
//! line through any bodies that touch or overlap the first one.

use bevy::math::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::math::units::cm_to_m;
use crate::scene::{BodyKind, Bounds, HitResult, QueryParams, SceneQuery};
use crate::types::ComponentId;

/// Maximum forward steps taken while searching for an exit.
pub const MAX_EXIT_ITERATIONS: u32 = 50;
/// Distance the final exit is pushed forward to leave the body (m).
pub const DEPENETRATION_NUDGE: f64 = 1e-3;
/// Two chained segments closer than this along the path are the same hit (m).
pub const CHAIN_LOOP_TOLERANCE: f64 = 1e-3;
/// Extra distance probed past an exit for touching bodies (m).
const CHAIN_PROBE: f64 = 1e-3;
/// Radius of the sphere swept to find the next body of a chain (m).
pub const CHAIN_SWEEP_RADIUS: f64 = 5e-4;
/// Smallest step the forward search will use (m).
const MIN_RESOLUTION: f64 = 1e-4;

/// A ray through the world: start point, orientation and the cached unit
/// direction (the orientation's X axis).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub start: DVec3,
    pub orientation: DQuat,
    direction: DVec3,
}

impl Default for Path {
    fn default() -> Self {
        Self {
            start: DVec3::ZERO,
            orientation: DQuat::IDENTITY,
            direction: DVec3::X,
        }
    }
}

impl Path {
    /// Creates a path from a start point and a direction. A zero direction
    /// falls back to world X.
    pub fn new(start: DVec3, direction: DVec3) -> Self {
        let direction = direction.normalize_or(DVec3::X);
        Self {
            start,
            orientation: DQuat::from_rotation_arc(DVec3::X, direction),
            direction,
        }
    }

    pub fn from_orientation(start: DVec3, orientation: DQuat) -> Self {
        let orientation = orientation.normalize();
        Self {
            start,
            orientation,
            direction: (orientation * DVec3::X).normalize_or(DVec3::X),
        }
    }

    pub fn from_two_points(start: DVec3, end: DVec3) -> Self {
        Self::new(start, end - start)
    }

    pub fn direction(&self) -> DVec3 {
        self.direction
    }

    pub fn point_at(&self, distance: f64) -> DVec3 {
        self.start + self.direction * distance
    }

    /// Signed distance of the projection of `point` onto the path.
    pub fn distance_along(&self, point: DVec3) -> f64 {
        (point - self.start).dot(self.direction)
    }

    /// Closest point to `point` on the path (never behind its start).
    pub fn closest_point(&self, point: DVec3) -> DVec3 {
        self.point_at(self.distance_along(point).max(0.0))
    }

    /// Moves the start, keeping the direction.
    pub fn move_to(&mut self, start: DVec3) {
        self.start = start;
    }
}

/// How finely the forward search steps through a body.
///
/// # Variants
/// * `Auto` - Half of the component's smallest bound extent
/// * `Fixed` - A fixed step in centimetres
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    Auto,
    Fixed(f64),
}

impl Resolution {
    /// Step length in metres for a component with the given bounds.
    pub fn resolve(&self, bounds: &Bounds) -> f64 {
        let step = match *self {
            Resolution::Auto => bounds.half_extents().min_element(),
            Resolution::Fixed(cm) => cm_to_m(cm),
        };
        if step.is_finite() {
            step.max(MIN_RESOLUTION)
        } else {
            MIN_RESOLUTION
        }
    }
}

/// One traversal of a single body.
///
/// # Fields
/// * `impact_point` - Where the path enters the body
/// * `exit_location` - Where the path leaves it, always `impact_point + n·direction` with `n >= 0`
/// * `penetration_thickness` - Distance between entry and exit (m)
/// * `entering_hit` - Hit reported on the way in
/// * `exiting_hit` - Hit on the far side; its normal points along the path
/// * `distance_along_path` - Distance of `impact_point` from the start of the chain (m)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitResult {
    pub impact_point: DVec3,
    pub exit_location: DVec3,
    pub penetration_thickness: f64,
    pub entering_hit: HitResult,
    pub exiting_hit: HitResult,
    pub component: ComponentId,
    pub distance_along_path: f64,
}

impl ExitResult {
    fn new(entering_hit: HitResult, exiting_hit: HitResult) -> Self {
        let impact_point = entering_hit.impact_point;
        let exit_location = exiting_hit.impact_point;
        Self {
            impact_point,
            exit_location,
            penetration_thickness: impact_point.distance(exit_location),
            entering_hit,
            exiting_hit,
            component: entering_hit.component,
            distance_along_path: 0.0,
        }
    }

    /// Distance of the exit from the start of the chain.
    pub fn exit_distance_along_path(&self) -> f64 {
        self.distance_along_path + self.penetration_thickness
    }

    /// Pushes the exit forward along `direction`.
    pub fn nudge_exit(&mut self, direction: DVec3, amount: f64) {
        self.exit_location += direction * amount;
        self.exiting_hit.location += direction * amount;
    }
}

/// Ordered list of body traversals along one path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitResults {
    pub path: Path,
    results: Vec<ExitResult>,
}

impl ExitResults {
    pub fn new(path: Path) -> Self {
        Self {
            path,
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, mut result: ExitResult) {
        result.distance_along_path = self.path.distance_along(result.impact_point);
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn first(&self) -> Option<&ExitResult> {
        self.results.first()
    }

    pub fn last(&self) -> Option<&ExitResult> {
        self.results.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExitResult> {
        self.results.iter()
    }

    /// True when the path crossed more than one body.
    pub fn has_multiple_hits(&self) -> bool {
        self.results.len() > 1
    }

    /// Segments are in ascending path order and no two overlap by more than
    /// `tolerance`.
    pub fn is_ordered(&self, tolerance: f64) -> bool {
        self.results
            .windows(2)
            .all(|pair| pair[1].distance_along_path + tolerance >= pair[0].exit_distance_along_path())
    }
}

impl IntoIterator for ExitResults {
    type Item = ExitResult;
    type IntoIter = std::vec::IntoIter<ExitResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a> IntoIterator for &'a ExitResults {
    type Item = &'a ExitResult;
    type IntoIter = std::slice::Iter<'a, ExitResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// Finds where a path entering a body leaves it.
///
/// The search strategy follows the body kind: bodies with a collision
/// instance are stepped through, bodies without one are traced from the far
/// side, and skeletal bodies try stepping first and fall back to a far-side
/// trace pulled in to the closest point of their collision.
///
/// # Arguments
/// * `scene` - Host scene
/// * `entry` - Hit where the path enters the body
/// * `direction` - Direction of travel
/// * `resolution` - Forward-search step
///
/// # Returns
/// The traversal, or `None` when the component is gone or no exit exists.
pub fn find_exit(
    scene: &dyn SceneQuery,
    entry: &HitResult,
    direction: DVec3,
    resolution: Resolution,
) -> Option<ExitResult> {
    let path = Path::new(entry.impact_point, direction);
    let bounds = scene.component_bounds(entry.component)?;
    let step = resolution.resolve(&bounds);

    match scene.body_kind(entry.component) {
        BodyKind::BodyInstance => {
            step_through(scene, entry, &path, &bounds, step).or_else(|| trace_from_far_side(scene, entry, &path, &bounds, None))
        }
        BodyKind::NoBodyInstance => trace_from_far_side(scene, entry, &path, &bounds, None),
        BodyKind::Skeletal => step_through(scene, entry, &path, &bounds, step).or_else(|| {
            let far = path.point_at(bounds.diagonal() + step);
            let pulled_in = scene
                .closest_point_on_component(entry.component, far)
                .map(|closest| path.distance_along(closest))
                .filter(|distance| *distance > 0.0)
                .map(|distance| distance + step);
            trace_from_far_side(scene, entry, &path, &bounds, pulled_in)
                .or_else(|| trace_from_far_side(scene, entry, &path, &bounds, None))
        }),
    }
}

/// Steps forward from the entry until a trace back towards the entry hits
/// the component from outside.
fn step_through(
    scene: &dyn SceneQuery,
    entry: &HitResult,
    path: &Path,
    bounds: &Bounds,
    step: f64,
) -> Option<ExitResult> {
    let limit = bounds.diagonal() + step;
    let mut attempt = step;
    let mut iterations = 0;
    while attempt <= limit && iterations < MAX_EXIT_ITERATIONS {
        if let Some(exit) = scene.component_raycast(entry.component, path.point_at(attempt), path.start) {
            return Some(ExitResult::new(*entry, exit));
        }
        attempt += step;
        iterations += 1;
    }
    None
}

/// Traces back from a point past the body to the entry.
fn trace_from_far_side(
    scene: &dyn SceneQuery,
    entry: &HitResult,
    path: &Path,
    bounds: &Bounds,
    far_distance: Option<f64>,
) -> Option<ExitResult> {
    let far = path.point_at(far_distance.unwrap_or(bounds.diagonal() + 0.01));
    scene
        .component_raycast(entry.component, far, path.start)
        .map(|exit| ExitResult::new(*entry, exit))
}

/// Walks a path through every body it crosses, starting with the body of
/// `first_hit`.
///
/// After each exit a small sphere is swept just past the exit (and back
/// through the body just crossed, for overlapping geometry). A body found that way
/// becomes the next traversal. The walk stops after `max_penetrations - 1`
/// extra bodies, when nothing is found, or when the next hit does not lie
/// further along the path. The final exit is nudged forward by
/// [`DEPENETRATION_NUDGE`].
///
/// # Arguments
/// * `scene` - Host scene
/// * `first_hit` - Hit that started the walk
/// * `direction` - Direction of travel
/// * `radius` - Projectile radius (m)
/// * `params` - Query filters used for the probes
/// * `max_penetrations` - Walk budget
///
/// # Returns
/// The traversals in path order; empty when the first body has no exit.
pub fn get_exit_location(
    scene: &dyn SceneQuery,
    first_hit: &HitResult,
    direction: DVec3,
    radius: f64,
    params: &QueryParams,
    max_penetrations: u32,
) -> ExitResults {
    let path = Path::new(first_hit.impact_point, direction);
    let direction = path.direction();
    let mut results = ExitResults::new(path);

    let Some(mut current) = find_exit(scene, first_hit, direction, Resolution::Auto) else {
        return results;
    };
    let mut previous_distance = path.distance_along(current.impact_point);
    let mut previous_hit = current.entering_hit;
    let mut budget = max_penetrations.saturating_sub(1);

    loop {
        let probe_params = params.clone().with_ignored_component(current.component);
        let probe_start = current.impact_point + direction * MIN_RESOLUTION;
        let probe_end = current.exit_location + direction * (radius + CHAIN_PROBE);
        let next = if budget > 0 {
            scene.sweep_sphere(probe_start, probe_end, CHAIN_SWEEP_RADIUS, &probe_params)
        } else {
            None
        };

        let Some(mut next_hit) = next else {
            results.push(current);
            break;
        };

        let next_distance = path.distance_along(next_hit.impact_point);
        if next_distance <= previous_distance
            || (next_distance - previous_distance).abs() < CHAIN_LOOP_TOLERANCE
            || next_hit.same_hit(&previous_hit, CHAIN_LOOP_TOLERANCE)
        {
            results.push(current);
            break;
        }

        // Overlapping bodies: leave the current body where the next begins
        if next_distance < path.distance_along(current.exit_location) {
            let mut exiting = next_hit;
            exiting.normal = -next_hit.normal;
            exiting.component = current.component;
            exiting.actor = current.entering_hit.actor;
            current = ExitResult::new(current.entering_hit, exiting);
        }
        results.push(current);

        next_hit.trace_start = first_hit.trace_start;
        next_hit.trace_end = first_hit.trace_end;
        let Some(found) = find_exit(scene, &next_hit, direction, Resolution::Auto) else {
            break;
        };
        previous_distance = next_distance;
        previous_hit = next_hit;
        current = found;
        budget -= 1;
    }

    if let Some(last) = results.results.last_mut() {
        last.nudge_exit(direction, DEPENETRATION_NUDGE);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{AnalyticScene, SceneBody};
    use approx::assert_relative_eq;

    fn entry_hit(scene: &AnalyticScene, start: DVec3, end: DVec3) -> HitResult {
        scene
            .raycast(start, end, &QueryParams::default())
            .expect("path should hit a body")
    }

    #[test]
    fn test_path_closest_point_is_closest_and_idempotent() {
        let path = Path::new(DVec3::new(1.0, 0.0, 0.0), DVec3::new(1.0, 1.0, 0.0));
        for point in [DVec3::new(3.0, -2.0, 1.0), DVec3::new(-4.0, 0.5, 2.0), DVec3::new(7.0, 9.0, -3.0)] {
            let closest = path.closest_point(point);
            for i in 0..50 {
                let other = path.point_at(i as f64 * 0.37);
                assert!(closest.distance(point) <= other.distance(point) + 1e-12);
            }
            assert!(path.closest_point(closest).distance(closest) < 1e-12);
        }
        assert!((path.direction().length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_path_from_orientation_matches_direction() {
        let dir = DVec3::new(0.0, -1.0, 1.0).normalize();
        let path = Path::new(DVec3::ZERO, dir);
        let rebuilt = Path::from_orientation(DVec3::ZERO, path.orientation);
        assert!((rebuilt.direction() - dir).length() < 1e-9);
        assert_relative_eq!(Path::from_two_points(DVec3::ZERO, DVec3::X * 4.0).distance_along(DVec3::new(2.0, 5.0, 0.0)), 2.0);
    }

    #[test]
    fn test_resolution_auto_and_fixed() {
        let bounds = Bounds::from_center_half_extents(DVec3::ZERO, DVec3::new(0.05, 1.0, 2.0));
        assert_relative_eq!(Resolution::Auto.resolve(&bounds), 0.05);
        assert_relative_eq!(Resolution::Fixed(1.0).resolve(&bounds), 0.01);
        assert_relative_eq!(Resolution::Fixed(0.0).resolve(&bounds), MIN_RESOLUTION);
    }

    #[test]
    fn test_find_exit_through_box() {
        let mut scene = AnalyticScene::new();
        scene.add_body(SceneBody::cuboid(DVec3::new(5.05, 0.0, 0.0), DVec3::new(0.05, 2.0, 2.0)));
        let entry = entry_hit(&scene, DVec3::ZERO, DVec3::new(10.0, 0.0, 0.0));
        let exit = find_exit(&scene, &entry, DVec3::X, Resolution::Auto).expect("exit");
        assert_relative_eq!(exit.exit_location.x, 5.1, epsilon = 1e-9);
        assert_relative_eq!(exit.penetration_thickness, 0.1, epsilon = 1e-9);
        assert_eq!(exit.exiting_hit.normal, DVec3::X);
    }

    #[test]
    fn test_find_exit_oblique_sphere_chord() {
        let mut scene = AnalyticScene::new();
        scene.add_body(SceneBody::sphere(DVec3::new(5.0, 0.0, 0.0), 1.0));
        let start = DVec3::new(0.0, 0.5, 0.0);
        let entry = entry_hit(&scene, start, DVec3::new(10.0, 0.5, 0.0));
        for resolution in [Resolution::Auto, Resolution::Fixed(3.0)] {
            let exit = find_exit(&scene, &entry, DVec3::X, resolution).expect("exit");
            // Chord of a unit sphere at offset 0.5
            assert_relative_eq!(exit.penetration_thickness, 2.0 * 0.75f64.sqrt(), epsilon = 1e-9);
            let along = exit.exit_location - exit.impact_point;
            assert!(along.normalize().dot(DVec3::X) > 1.0 - 1e-9);
        }
    }

    #[test]
    fn test_find_exit_strategies_agree() {
        for kind in [BodyKind::BodyInstance, BodyKind::NoBodyInstance, BodyKind::Skeletal] {
            let mut scene = AnalyticScene::new();
            scene.add_body(SceneBody::cuboid(DVec3::new(2.0, 0.0, 0.0), DVec3::new(0.5, 0.5, 0.5)).with_kind(kind));
            let dir = DVec3::new(1.0, 0.1, 0.0).normalize();
            let entry = entry_hit(&scene, DVec3::ZERO, dir * 10.0);
            let exit = find_exit(&scene, &entry, dir, Resolution::Auto).expect("exit");
            assert_relative_eq!(exit.exit_location.x, 2.5, epsilon = 1e-9);
            assert_relative_eq!(exit.penetration_thickness, 1.0 / dir.x, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_find_exit_missing_component() {
        let scene = AnalyticScene::new();
        let entry = HitResult {
            component: ComponentId(42),
            ..Default::default()
        };
        assert!(find_exit(&scene, &entry, DVec3::X, Resolution::Auto).is_none());
    }

    #[test]
    fn test_chain_through_touching_and_separate_bodies() {
        let mut scene = AnalyticScene::new();
        let a = scene.add_body(SceneBody::cuboid(DVec3::new(1.01, 0.0, 0.0), DVec3::new(0.01, 1.0, 1.0)));
        let b = scene.add_body(SceneBody::cuboid(DVec3::new(1.03, 0.0, 0.0), DVec3::new(0.01, 1.0, 1.0)));
        // Far enough away to be left for the integrator
        scene.add_body(SceneBody::cuboid(DVec3::new(3.0, 0.0, 0.0), DVec3::new(0.01, 1.0, 1.0)));

        let first = entry_hit(&scene, DVec3::ZERO, DVec3::new(10.0, 0.0, 0.0));
        let results = get_exit_location(&scene, &first, DVec3::X, 0.0045, &QueryParams::default(), 8);
        assert_eq!(results.len(), 2);
        let components: Vec<_> = results.iter().map(|r| r.component).collect();
        assert_eq!(components, vec![a, b]);
        assert!(results.is_ordered(1e-3));
        assert!(results.has_multiple_hits());
        let last = results.last().expect("last");
        assert_relative_eq!(last.exit_location.x, 1.04 + DEPENETRATION_NUDGE, epsilon = 1e-9);
    }

    #[test]
    fn test_chain_sweep_reaches_a_body_just_past_the_probe() {
        let mut scene = AnalyticScene::new();
        let a = scene.add_body(SceneBody::cuboid(DVec3::new(1.01, 0.0, 0.0), DVec3::new(0.01, 1.0, 1.0)));
        // Gap wider than the probe distance, narrower than probe plus sweep radius
        let gap = CHAIN_PROBE + CHAIN_SWEEP_RADIUS * 0.4;
        let b = scene.add_body(SceneBody::cuboid(DVec3::new(1.03 + gap, 0.0, 0.0), DVec3::new(0.01, 1.0, 1.0)));

        let first = entry_hit(&scene, DVec3::ZERO, DVec3::new(10.0, 0.0, 0.0));
        let results = get_exit_location(&scene, &first, DVec3::X, 0.0, &QueryParams::default(), 8);
        let components: Vec<_> = results.iter().map(|r| r.component).collect();
        assert_eq!(components, vec![a, b]);
        assert_relative_eq!(results.iter().nth(1).expect("second").entering_hit.impact_point.x, 1.02 + gap, epsilon = 1e-9);
    }

    #[test]
    fn test_chain_truncates_overlapping_bodies() {
        let mut scene = AnalyticScene::new();
        scene.add_body(SceneBody::cuboid(DVec3::new(1.1, 0.0, 0.0), DVec3::new(0.1, 1.0, 1.0)));
        scene.add_body(SceneBody::cuboid(DVec3::new(1.25, 0.0, 0.0), DVec3::new(0.1, 0.5, 0.5)));
        let first = entry_hit(&scene, DVec3::ZERO, DVec3::new(10.0, 0.0, 0.0));
        let results = get_exit_location(&scene, &first, DVec3::X, 0.0, &QueryParams::default(), 8);
        assert_eq!(results.len(), 2);
        let first_segment = results.first().expect("first");
        assert_relative_eq!(first_segment.exit_location.x, 1.15, epsilon = 1e-9);
        assert!(results.is_ordered(1e-3));
        assert_relative_eq!(results.last().expect("last").exit_location.x, 1.35 + DEPENETRATION_NUDGE, epsilon = 1e-9);
    }

    #[test]
    fn test_chain_respects_budget() {
        let mut scene = AnalyticScene::new();
        for i in 0..4 {
            scene.add_body(SceneBody::cuboid(
                DVec3::new(1.01 + 0.02 * i as f64, 0.0, 0.0),
                DVec3::new(0.01, 1.0, 1.0),
            ));
        }
        let first = entry_hit(&scene, DVec3::ZERO, DVec3::new(10.0, 0.0, 0.0));
        assert_eq!(get_exit_location(&scene, &first, DVec3::X, 0.0, &QueryParams::default(), 2).len(), 2);
        assert_eq!(get_exit_location(&scene, &first, DVec3::X, 0.0, &QueryParams::default(), 8).len(), 4);
        assert_eq!(get_exit_location(&scene, &first, DVec3::X, 0.0, &QueryParams::default(), 1).len(), 1);
    }
}
