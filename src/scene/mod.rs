//! Host scene interface.
//!
//! The simulation never owns world geometry. Everything it needs from the
//! host (ray and sphere casts, overlaps, tags, materials, wind) goes
//! through [`SceneQuery`], which must be safe to call from worker threads.

pub mod analytic;

use bevy::math::DVec3;
use serde::{Deserialize, Serialize};

use crate::materials::SurfaceType;
use crate::math::vec_equals;
use crate::types::{ActorId, ComponentId};

pub use analytic::{AnalyticScene, SceneActor, SceneBody, SceneShape};

/// Default trace channel used by projectiles.
pub const DEFAULT_TRACE_CHANNEL: u8 = 10;

/// Tags the engine reacts to.
pub mod tags {
    /// Projectiles pass through without any interaction.
    pub const IGNORE: &str = "Ignore";
    /// Projectiles stop on contact.
    pub const IMPENETRABLE: &str = "IMPENETRABLE";
    /// Hit and exit are reported but the projectile keeps its velocity.
    pub const IGNORE_PENETRATION: &str = "IgnorePenetration";
    pub const HIT_ZONE: &str = "HitZone";
    pub const FLESH: &str = "Flesh";
    pub const BONE: &str = "Bone";
    pub const HIT_ZONE_FLESH: &str = "HitZone.Flesh";
    pub const HIT_ZONE_BONE: &str = "HitZone.Bone";
    pub const HIT_ZONE_DEAD: &str = "HitZone.Dead";
}

/// A single blocking contact returned by a scene query.
///
/// # Fields
/// * `location` - Centre of the swept shape at the moment of contact
/// * `impact_point` - Contact point on the surface
/// * `normal` - Surface normal at the contact, pointing out of the body
/// * `distance` - Distance travelled along the query before contact (m)
/// * `time` - Fraction of the query segment travelled before contact
/// * `face_index` - Host face index, -1 when unknown
/// * `start_penetrating` - The query started inside the body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitResult {
    pub location: DVec3,
    pub impact_point: DVec3,
    pub normal: DVec3,
    pub distance: f64,
    pub time: f64,
    pub trace_start: DVec3,
    pub trace_end: DVec3,
    pub face_index: i32,
    pub component: ComponentId,
    pub actor: Option<ActorId>,
    pub start_penetrating: bool,
}

impl Default for HitResult {
    fn default() -> Self {
        Self {
            location: DVec3::ZERO,
            impact_point: DVec3::ZERO,
            normal: DVec3::Z,
            distance: 0.0,
            time: 0.0,
            trace_start: DVec3::ZERO,
            trace_end: DVec3::ZERO,
            face_index: -1,
            component: ComponentId::default(),
            actor: None,
            start_penetrating: false,
        }
    }
}

impl HitResult {
    /// Strict comparison used to detect a task that keeps consuming the
    /// same impact.
    pub fn same_hit(&self, other: &HitResult, tolerance: f64) -> bool {
        self.component == other.component
            && self.face_index == other.face_index
            && vec_equals(self.impact_point, other.impact_point, tolerance)
            && vec_equals(self.normal, other.normal, tolerance)
    }

    pub fn is_finite(&self) -> bool {
        crate::math::is_finite_vec(self.impact_point)
            && crate::math::is_finite_vec(self.normal)
            && self.distance.is_finite()
    }
}

/// Filters applied to a scene query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParams {
    pub trace_channel: u8,
    pub ignore_actors: Vec<ActorId>,
    pub ignore_components: Vec<ComponentId>,
    /// Object-type mask; empty accepts all types.
    pub object_types: Vec<u8>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            trace_channel: DEFAULT_TRACE_CHANNEL,
            ignore_actors: Vec::new(),
            ignore_components: Vec::new(),
            object_types: Vec::new(),
        }
    }
}

impl QueryParams {
    pub fn with_ignored_actor(mut self, actor: ActorId) -> Self {
        self.ignore_actors.push(actor);
        self
    }

    pub fn with_ignored_component(mut self, component: ComponentId) -> Self {
        self.ignore_components.push(component);
        self
    }

    /// Whether a body passes the ignore lists.
    pub fn accepts(&self, component: ComponentId, actor: Option<ActorId>) -> bool {
        if self.ignore_components.contains(&component) {
            return false;
        }
        match actor {
            Some(actor) => !self.ignore_actors.contains(&actor),
            None => true,
        }
    }
}

/// How the exit solver may search inside a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BodyKind {
    /// Animated mesh made of per-bone bodies.
    Skeletal,
    /// A body with its own collision instance.
    #[default]
    BodyInstance,
    /// Geometry without a physics instance, only reachable by traces.
    NoBodyInstance,
}

/// Axis-aligned bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: DVec3,
    pub max: DVec3,
}

impl Bounds {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center_half_extents(center: DVec3, half_extents: DVec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> DVec3 {
        (self.max - self.min) * 0.5
    }

    pub fn diagonal(&self) -> f64 {
        (self.max - self.min).length()
    }

    pub fn contains(&self, point: DVec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn expanded(&self, amount: f64) -> Self {
        Self::new(self.min - DVec3::splat(amount), self.max + DVec3::splat(amount))
    }
}

/// Wind at a point in the world.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WindSample {
    /// Unit direction the wind blows towards.
    pub direction: DVec3,
    /// Speed (m/s).
    pub speed: f64,
    pub min_gust: f64,
    pub max_gust: f64,
}

impl WindSample {
    pub fn velocity(&self) -> DVec3 {
        self.direction.normalize_or_zero() * self.speed
    }
}

/// Reference to a physical material as known by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialRef {
    Surface(SurfaceType),
    Named(String),
}

/// Capabilities the engine needs from the host world.
///
/// Ray and sweep queries report the first blocking *entering* surface:
/// a query starting inside a body does not report that body's surface.
pub trait SceneQuery: Send + Sync {
    /// Line trace from `start` to `end`.
    fn raycast(&self, start: DVec3, end: DVec3, params: &QueryParams) -> Option<HitResult>;

    /// Sphere sweep from `start` to `end`. A zero radius behaves like
    /// [`SceneQuery::raycast`].
    fn sweep_sphere(&self, start: DVec3, end: DVec3, radius: f64, params: &QueryParams) -> Option<HitResult>;

    /// Bodies overlapping a sphere.
    fn overlap_sphere(&self, center: DVec3, radius: f64, params: &QueryParams) -> Vec<HitResult>;

    /// Bodies overlapping a capsule spanning `a` to `b`.
    fn overlap_capsule(&self, a: DVec3, b: DVec3, radius: f64, params: &QueryParams) -> Vec<HitResult>;

    /// Line trace against a single component.
    fn component_raycast(&self, component: ComponentId, start: DVec3, end: DVec3) -> Option<HitResult>;

    fn wind_at(&self, _position: DVec3) -> Option<WindSample> {
        None
    }

    fn gravity_z(&self) -> f64 {
        -9.81
    }

    fn physical_material_of(&self, component: ComponentId, face_index: i32) -> Option<MaterialRef>;

    fn component_tags(&self, _component: ComponentId) -> Vec<String> {
        Vec::new()
    }

    fn actor_tags(&self, _actor: ActorId) -> Vec<String> {
        Vec::new()
    }

    fn gameplay_tags(&self, _component: ComponentId) -> Vec<String> {
        Vec::new()
    }

    /// Whether the actor is a character-like object that carries hit zones.
    fn is_pawn(&self, _actor: ActorId) -> bool {
        false
    }

    fn body_kind(&self, _component: ComponentId) -> BodyKind {
        BodyKind::BodyInstance
    }

    fn component_bounds(&self, component: ComponentId) -> Option<Bounds>;

    /// Closest point on the component's collision to `point`.
    fn closest_point_on_component(&self, component: ComponentId, point: DVec3) -> Option<DVec3>;

    /// Region a projectile may fly in before completing.
    fn world_bounds(&self) -> Bounds;

    fn implements_fly_by(&self, _actor: ActorId) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_hit_tolerance() {
        let a = HitResult {
            impact_point: DVec3::new(1.0, 2.0, 3.0),
            normal: DVec3::X,
            component: ComponentId(4),
            ..Default::default()
        };
        let mut b = a;
        b.impact_point.x += 1e-7;
        assert!(a.same_hit(&b, 1e-5));
        b.impact_point.x += 1e-3;
        assert!(!a.same_hit(&b, 1e-5));
        let mut c = a;
        c.component = ComponentId(5);
        assert!(!a.same_hit(&c, 1e-5));
    }

    #[test]
    fn test_query_params_filters() {
        let params = QueryParams::default()
            .with_ignored_actor(ActorId(1))
            .with_ignored_component(ComponentId(9));
        assert!(!params.accepts(ComponentId(2), Some(ActorId(1))));
        assert!(!params.accepts(ComponentId(9), None));
        assert!(params.accepts(ComponentId(2), Some(ActorId(3))));
        assert_eq!(params.trace_channel, DEFAULT_TRACE_CHANNEL);
    }

    #[test]
    fn test_bounds() {
        let b = Bounds::new(DVec3::ONE, DVec3::ZERO);
        assert_eq!(b.min, DVec3::ZERO);
        assert!(b.contains(DVec3::splat(0.5)));
        assert!(!b.contains(DVec3::splat(1.5)));
        assert!((b.diagonal() - 3f64.sqrt()).abs() < 1e-12);
    }
}
