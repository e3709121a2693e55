//! Reference host made of axis-aligned boxes and spheres.
//!
//! Good enough for headless simulation, tests and benches. Queries are
//! brute force over every body.

use std::collections::HashMap;

use bevy::math::DVec3;

use super::{BodyKind, Bounds, HitResult, MaterialRef, QueryParams, SceneQuery, WindSample};
use crate::materials::SurfaceType;
use crate::math::closest_point_on_segment;
use crate::types::{ActorId, ComponentId};

/// Collision primitive of a scene body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SceneShape {
    Cuboid { center: DVec3, half_extents: DVec3 },
    Sphere { center: DVec3, radius: f64 },
}

impl SceneShape {
    fn bounds(&self) -> Bounds {
        match *self {
            SceneShape::Cuboid { center, half_extents } => Bounds::from_center_half_extents(center, half_extents),
            SceneShape::Sphere { center, radius } => Bounds::from_center_half_extents(center, DVec3::splat(radius)),
        }
    }

    fn closest_point(&self, point: DVec3) -> DVec3 {
        match *self {
            SceneShape::Cuboid { center, half_extents } => point.clamp(center - half_extents, center + half_extents),
            SceneShape::Sphere { center, radius } => {
                let offset = point - center;
                if offset.length() <= radius {
                    point
                } else {
                    center + offset.normalize() * radius
                }
            }
        }
    }

    fn distance_to(&self, point: DVec3) -> f64 {
        self.closest_point(point).distance(point)
    }

    /// Entering intersection of the segment `start..end` with the shape
    /// inflated by `radius`: `(fraction, outward normal)`.
    fn sweep(&self, start: DVec3, end: DVec3, radius: f64) -> Option<(f64, DVec3, i32)> {
        let delta = end - start;
        match *self {
            SceneShape::Cuboid { center, half_extents } => {
                let min = center - half_extents - DVec3::splat(radius);
                let max = center + half_extents + DVec3::splat(radius);
                if start.cmpgt(min).all() && start.cmplt(max).all() {
                    return None;
                }
                let mut t_enter = f64::NEG_INFINITY;
                let mut t_exit = f64::INFINITY;
                let mut enter_axis = 0;
                for axis in 0..3 {
                    let (s, d, lo, hi) = (start[axis], delta[axis], min[axis], max[axis]);
                    if d.abs() < 1e-15 {
                        if s < lo || s > hi {
                            return None;
                        }
                        continue;
                    }
                    let mut t0 = (lo - s) / d;
                    let mut t1 = (hi - s) / d;
                    if t0 > t1 {
                        std::mem::swap(&mut t0, &mut t1);
                    }
                    if t0 > t_enter {
                        t_enter = t0;
                        enter_axis = axis;
                    }
                    t_exit = t_exit.min(t1);
                }
                if t_enter > t_exit || !(0.0..=1.0).contains(&t_enter) {
                    return None;
                }
                let mut normal = DVec3::ZERO;
                normal[enter_axis] = -delta[enter_axis].signum();
                let face = enter_axis as i32 * 2 + i32::from(normal[enter_axis] > 0.0);
                Some((t_enter, normal, face))
            }
            SceneShape::Sphere { center, radius: body_radius } => {
                let r = body_radius + radius;
                let m = start - center;
                let c = m.length_squared() - r * r;
                if c < 0.0 {
                    return None;
                }
                let a = delta.length_squared();
                if a <= f64::EPSILON {
                    return None;
                }
                let b = m.dot(delta);
                let disc = b * b - a * c;
                if disc < 0.0 {
                    return None;
                }
                let t = (-b - disc.sqrt()) / a;
                if !(0.0..=1.0).contains(&t) {
                    return None;
                }
                let normal = (start + delta * t - center).normalize_or_zero();
                Some((t, normal, 0))
            }
        }
    }

    /// Minimum distance between the segment `a..b` and the shape.
    fn segment_distance(&self, a: DVec3, b: DVec3) -> f64 {
        match *self {
            SceneShape::Sphere { center, radius } => {
                (closest_point_on_segment(a, b, center).distance(center) - radius).max(0.0)
            }
            SceneShape::Cuboid { .. } => {
                // Distance to a convex set is convex along the segment
                let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
                for _ in 0..60 {
                    let m1 = lo + (hi - lo) / 3.0;
                    let m2 = hi - (hi - lo) / 3.0;
                    if self.distance_to(a.lerp(b, m1)) <= self.distance_to(a.lerp(b, m2)) {
                        hi = m2;
                    } else {
                        lo = m1;
                    }
                }
                self.distance_to(a.lerp(b, (lo + hi) / 2.0))
            }
        }
    }
}

/// A body placed in an [`AnalyticScene`].
///
/// # Example
/// ```
/// use bevy::math::DVec3;
/// use terminal_ballistics::materials::SurfaceType;
/// use terminal_ballistics::scene::SceneBody;
///
/// let wall = SceneBody::cuboid(DVec3::new(5.05, 0.0, 0.0), DVec3::new(0.05, 2.0, 2.0))
///     .with_surface(SurfaceType::Concrete)
///     .with_tag("Wall");
/// assert_eq!(wall.tags, vec!["Wall".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct SceneBody {
    pub component: ComponentId,
    pub actor: Option<ActorId>,
    pub shape: SceneShape,
    pub material: Option<MaterialRef>,
    pub tags: Vec<String>,
    pub gameplay_tags: Vec<String>,
    pub kind: BodyKind,
    pub object_type: u8,
}

impl SceneBody {
    pub fn new(shape: SceneShape) -> Self {
        Self {
            component: ComponentId::default(),
            actor: None,
            shape,
            material: None,
            tags: Vec::new(),
            gameplay_tags: Vec::new(),
            kind: BodyKind::BodyInstance,
            object_type: 0,
        }
    }

    pub fn cuboid(center: DVec3, half_extents: DVec3) -> Self {
        Self::new(SceneShape::Cuboid { center, half_extents })
    }

    pub fn sphere(center: DVec3, radius: f64) -> Self {
        Self::new(SceneShape::Sphere { center, radius })
    }

    pub fn with_surface(mut self, surface: SurfaceType) -> Self {
        self.material = Some(MaterialRef::Surface(surface));
        self
    }

    pub fn with_named_material(mut self, name: impl Into<String>) -> Self {
        self.material = Some(MaterialRef::Named(name.into()));
        self
    }

    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_gameplay_tag(mut self, tag: impl Into<String>) -> Self {
        self.gameplay_tags.push(tag.into());
        self
    }

    pub fn with_kind(mut self, kind: BodyKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_object_type(mut self, object_type: u8) -> Self {
        self.object_type = object_type;
        self
    }
}

/// Actor-level data shared by a group of bodies.
#[derive(Debug, Clone, Default)]
pub struct SceneActor {
    pub tags: Vec<String>,
    pub is_pawn: bool,
    pub fly_by: bool,
}

/// In-memory scene implementing [`SceneQuery`].
#[derive(Debug, Clone)]
pub struct AnalyticScene {
    bodies: Vec<SceneBody>,
    actors: HashMap<ActorId, SceneActor>,
    wind: Option<WindSample>,
    gravity_z: f64,
    world_bounds: Bounds,
    next_component: u64,
}

impl Default for AnalyticScene {
    fn default() -> Self {
        Self {
            bodies: Vec::new(),
            actors: HashMap::new(),
            wind: None,
            gravity_z: -9.81,
            world_bounds: Bounds::from_center_half_extents(DVec3::ZERO, DVec3::splat(1000.0)),
            next_component: 1,
        }
    }
}

impl AnalyticScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_world_bounds(mut self, bounds: Bounds) -> Self {
        self.world_bounds = bounds;
        self
    }

    pub fn with_gravity_z(mut self, gravity_z: f64) -> Self {
        self.gravity_z = gravity_z;
        self
    }

    pub fn with_wind(mut self, wind: WindSample) -> Self {
        self.wind = Some(wind);
        self
    }

    /// Adds a body and returns its component id.
    pub fn add_body(&mut self, mut body: SceneBody) -> ComponentId {
        let id = ComponentId(self.next_component);
        self.next_component += 1;
        body.component = id;
        self.bodies.push(body);
        id
    }

    /// Builder form of [`AnalyticScene::add_body`].
    pub fn with_body(mut self, body: SceneBody) -> Self {
        self.add_body(body);
        self
    }

    pub fn add_actor(&mut self, actor: ActorId, data: SceneActor) {
        self.actors.insert(actor, data);
    }

    pub fn bodies(&self) -> &[SceneBody] {
        &self.bodies
    }

    fn body(&self, component: ComponentId) -> Option<&SceneBody> {
        self.bodies.iter().find(|b| b.component == component)
    }

    fn filtered<'a>(&'a self, params: &'a QueryParams) -> impl Iterator<Item = &'a SceneBody> + 'a {
        self.bodies.iter().filter(move |b| {
            params.accepts(b.component, b.actor)
                && (params.object_types.is_empty() || params.object_types.contains(&b.object_type))
        })
    }

    fn make_hit(body: &SceneBody, start: DVec3, end: DVec3, radius: f64, hit: (f64, DVec3, i32)) -> HitResult {
        let (time, normal, face_index) = hit;
        let location = start.lerp(end, time);
        HitResult {
            location,
            impact_point: location - normal * radius,
            normal,
            distance: start.distance(location),
            time,
            trace_start: start,
            trace_end: end,
            face_index,
            component: body.component,
            actor: body.actor,
            start_penetrating: false,
        }
    }

    fn overlap_hit(body: &SceneBody, at: DVec3) -> HitResult {
        let point = body.shape.closest_point(at);
        HitResult {
            location: at,
            impact_point: point,
            normal: (at - point).normalize_or(DVec3::Z),
            component: body.component,
            actor: body.actor,
            start_penetrating: true,
            ..Default::default()
        }
    }
}

impl SceneQuery for AnalyticScene {
    fn raycast(&self, start: DVec3, end: DVec3, params: &QueryParams) -> Option<HitResult> {
        self.sweep_sphere(start, end, 0.0, params)
    }

    fn sweep_sphere(&self, start: DVec3, end: DVec3, radius: f64, params: &QueryParams) -> Option<HitResult> {
        self.filtered(params)
            .filter_map(|body| {
                body.shape
                    .sweep(start, end, radius)
                    .map(|hit| Self::make_hit(body, start, end, radius, hit))
            })
            .min_by(|a, b| a.time.total_cmp(&b.time))
    }

    fn overlap_sphere(&self, center: DVec3, radius: f64, params: &QueryParams) -> Vec<HitResult> {
        self.filtered(params)
            .filter(|body| body.shape.distance_to(center) <= radius)
            .map(|body| Self::overlap_hit(body, center))
            .collect()
    }

    fn overlap_capsule(&self, a: DVec3, b: DVec3, radius: f64, params: &QueryParams) -> Vec<HitResult> {
        self.filtered(params)
            .filter(|body| body.shape.segment_distance(a, b) <= radius)
            .map(|body| {
                let center = match body.shape {
                    SceneShape::Cuboid { center, .. } | SceneShape::Sphere { center, .. } => center,
                };
                Self::overlap_hit(body, closest_point_on_segment(a, b, center))
            })
            .collect()
    }

    fn component_raycast(&self, component: ComponentId, start: DVec3, end: DVec3) -> Option<HitResult> {
        let body = self.body(component)?;
        body.shape
            .sweep(start, end, 0.0)
            .map(|hit| Self::make_hit(body, start, end, 0.0, hit))
    }

    fn wind_at(&self, _position: DVec3) -> Option<WindSample> {
        self.wind
    }

    fn gravity_z(&self) -> f64 {
        self.gravity_z
    }

    fn physical_material_of(&self, component: ComponentId, _face_index: i32) -> Option<MaterialRef> {
        self.body(component).and_then(|b| b.material.clone())
    }

    fn component_tags(&self, component: ComponentId) -> Vec<String> {
        self.body(component).map(|b| b.tags.clone()).unwrap_or_default()
    }

    fn actor_tags(&self, actor: ActorId) -> Vec<String> {
        self.actors.get(&actor).map(|a| a.tags.clone()).unwrap_or_default()
    }

    fn gameplay_tags(&self, component: ComponentId) -> Vec<String> {
        self.body(component).map(|b| b.gameplay_tags.clone()).unwrap_or_default()
    }

    fn is_pawn(&self, actor: ActorId) -> bool {
        self.actors.get(&actor).is_some_and(|a| a.is_pawn)
    }

    fn body_kind(&self, component: ComponentId) -> BodyKind {
        self.body(component).map(|b| b.kind).unwrap_or_default()
    }

    fn component_bounds(&self, component: ComponentId) -> Option<Bounds> {
        self.body(component).map(|b| b.shape.bounds())
    }

    fn closest_point_on_component(&self, component: ComponentId, point: DVec3) -> Option<DVec3> {
        self.body(component).map(|b| b.shape.closest_point(point))
    }

    fn world_bounds(&self) -> Bounds {
        self.world_bounds
    }

    fn implements_fly_by(&self, actor: ActorId) -> bool {
        self.actors.get(&actor).is_some_and(|a| a.fly_by)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall_scene() -> (AnalyticScene, ComponentId) {
        let mut scene = AnalyticScene::new();
        let wall = scene.add_body(
            SceneBody::cuboid(DVec3::new(5.05, 0.0, 0.0), DVec3::new(0.05, 2.0, 2.0)).with_surface(SurfaceType::Concrete),
        );
        (scene, wall)
    }

    #[test]
    fn test_raycast_hits_front_face() {
        let (scene, wall) = wall_scene();
        let hit = scene
            .raycast(DVec3::ZERO, DVec3::new(10.0, 0.0, 0.0), &QueryParams::default())
            .expect("wall hit");
        assert_eq!(hit.component, wall);
        assert!((hit.impact_point.x - 5.0).abs() < 1e-9);
        assert_eq!(hit.normal, DVec3::new(-1.0, 0.0, 0.0));
        assert!((hit.distance - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_ray_starting_inside_reports_nothing() {
        let (scene, _) = wall_scene();
        assert!(scene
            .raycast(DVec3::new(5.05, 0.0, 0.0), DVec3::new(10.0, 0.0, 0.0), &QueryParams::default())
            .is_none());
    }

    #[test]
    fn test_sphere_sweep_contacts_earlier() {
        let (scene, _) = wall_scene();
        let hit = scene
            .sweep_sphere(DVec3::ZERO, DVec3::new(10.0, 0.0, 0.0), 0.01, &QueryParams::default())
            .expect("wall hit");
        assert!((hit.location.x - 4.99).abs() < 1e-9);
        assert!((hit.impact_point.x - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_ignore_lists_and_component_trace() {
        let (scene, wall) = wall_scene();
        let params = QueryParams::default().with_ignored_component(wall);
        assert!(scene.raycast(DVec3::ZERO, DVec3::new(10.0, 0.0, 0.0), &params).is_none());

        // Reverse trace finds the back face
        let back = scene
            .component_raycast(wall, DVec3::new(10.0, 0.0, 0.0), DVec3::ZERO)
            .expect("back face");
        assert!((back.impact_point.x - 5.1).abs() < 1e-9);
        assert_eq!(back.normal, DVec3::X);
    }

    #[test]
    fn test_sphere_body_and_overlaps() {
        let mut scene = AnalyticScene::new();
        let ball = scene.add_body(SceneBody::sphere(DVec3::new(3.0, 0.0, 0.0), 1.0));
        let hit = scene
            .raycast(DVec3::ZERO, DVec3::new(6.0, 0.0, 0.0), &QueryParams::default())
            .expect("ball hit");
        assert!((hit.impact_point.x - 2.0).abs() < 1e-9);

        let near = scene.overlap_capsule(DVec3::new(0.0, 1.5, 0.0), DVec3::new(6.0, 1.5, 0.0), 0.6, &QueryParams::default());
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].component, ball);
        let far = scene.overlap_capsule(DVec3::new(0.0, 3.0, 0.0), DVec3::new(6.0, 3.0, 0.0), 0.6, &QueryParams::default());
        assert!(far.is_empty());
        assert_eq!(scene.overlap_sphere(DVec3::new(3.0, 0.0, 1.5), 0.6, &QueryParams::default()).len(), 1);
    }

    #[test]
    fn test_capsule_overlap_against_box_edge() {
        let (scene, _) = wall_scene();
        let hits = scene.overlap_capsule(DVec3::new(4.0, 2.5, 0.0), DVec3::new(6.0, 2.5, 0.0), 0.6, &QueryParams::default());
        assert_eq!(hits.len(), 1);
        let misses = scene.overlap_capsule(DVec3::new(4.0, 2.7, 0.0), DVec3::new(6.0, 2.7, 0.0), 0.6, &QueryParams::default());
        assert!(misses.is_empty());
    }
}
