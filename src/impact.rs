//! Terminal ballistics: what happens when a projectile meets a surface.
//!
//! Everything here is a pure function of the projectile, the struck
//! material and the impact geometry. The simulation task decides when to
//! call these functions and turns their results into events.
//!
//! Solids are penetrated either by cavity expansion (mode I, Poncelet
//! resistance plus fracture work) or by shear plugging (mode II, thin
//! plates only). Fluids slow the projectile by exponential drag decay.
//! Ricochets keep the mirror direction and lose speed to restitution and
//! sliding friction.

use std::f64::consts::{PI, TAU};

use bevy::math::{DQuat, DVec3};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::materials::{BaseUnitProperties, PhysMatProperties, SurfaceType};
use crate::math::physics::{
    fluid_critical_ricochet_angle, froude_number, impact_stress, kinetic_energy, stress_concentration_factor,
};
use crate::math::{impact_angle_deg, map_range_clamped, mirror, sqr};
use crate::projectile::{BallisticBody, BulletVariation, Projectile};
use crate::resources::BallisticsConfig;
use crate::scene::HitResult;
use crate::types::ProjectileId;

/// Slowest impact (m/s) that can still ricochet.
pub const MIN_RICOCHET_SPEED: f64 = 25.0;
/// A projectile slower than this (m/s) inside a fluid has stopped.
pub const MIN_FLUID_SPEED: f64 = 1.0;
/// Standard deviation of the ricochet direction jitter (degrees).
pub const RICOCHET_JITTER_STD_DEV: f64 = 1.0;
/// Largest ricochet direction jitter (degrees).
pub const RICOCHET_JITTER_LIMIT: f64 = 3.0;
/// Impacts steeper than this (degrees from the surface) count as head-on.
pub const HEAD_ON_ANGLE: f64 = 75.0;

const CAVITY_COEFFICIENT: f64 = 0.29;

/// Everything reported about one surface contact.
///
/// # Fields
/// * `hit` - The scene hit (entry for impacts, exit for exit hits)
/// * `impact_velocity` - Velocity when the contact happened
/// * `exit_velocity` - Velocity leaving the contact (zero when arrested)
/// * `impact_angle` - Degrees from the surface, 90 = head on
/// * `penetration_depth` - Depth reached in the body (m)
/// * `imparted_energy` - Kinetic energy lost to the body (J)
/// * `time` - Simulated time of the contact (s)
/// * `is_valid` - False when the payload was built from stale data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactParams {
    pub projectile_id: ProjectileId,
    pub hit: HitResult,
    pub surface: SurfaceType,
    pub impact_velocity: DVec3,
    pub exit_velocity: DVec3,
    pub impact_angle: f64,
    pub penetration_depth: f64,
    pub imparted_energy: f64,
    pub time: f64,
    pub is_exit: bool,
    pub is_ricochet: bool,
    pub is_zero: bool,
    pub is_valid: bool,
}

impl ImpactParams {
    pub fn new(projectile_id: ProjectileId, hit: HitResult, surface: SurfaceType, velocity: DVec3, time: f64) -> Self {
        Self {
            projectile_id,
            hit,
            surface,
            impact_velocity: velocity,
            exit_velocity: velocity,
            impact_angle: impact_angle_deg(hit.normal, velocity),
            penetration_depth: 0.0,
            imparted_energy: 0.0,
            time,
            is_exit: false,
            is_ricochet: false,
            is_zero: false,
            is_valid: true,
        }
    }

    /// Default payload flagged as invalid, delivered in place of one whose
    /// data went stale.
    pub fn invalid(projectile_id: ProjectileId, time: f64) -> Self {
        Self {
            is_valid: false,
            ..Self::new(projectile_id, HitResult::default(), SurfaceType::Default, DVec3::ZERO, time)
        }
    }

    pub fn with_exit_velocity(mut self, velocity: DVec3) -> Self {
        self.exit_velocity = velocity;
        self
    }

    pub fn with_penetration(mut self, depth: f64, imparted_energy: f64) -> Self {
        self.penetration_depth = depth;
        self.imparted_energy = imparted_energy;
        self
    }

    /// Marks the payload as the exit side of a body.
    pub fn as_exit(mut self) -> Self {
        self.is_exit = true;
        self
    }

    pub fn as_ricochet(mut self) -> Self {
        self.is_ricochet = true;
        self
    }

    /// Marks the projectile as arrested by this contact.
    pub fn as_zero(mut self) -> Self {
        self.is_zero = true;
        self.exit_velocity = DVec3::ZERO;
        self
    }

    /// Whether every number in the payload is usable.
    pub fn has_valid_data(&self) -> bool {
        self.hit.is_finite()
            && crate::math::is_finite_vec(self.impact_velocity)
            && crate::math::is_finite_vec(self.exit_velocity)
            && self.imparted_energy.is_finite()
            && self.penetration_depth.is_finite()
    }
}

/// Damage channel left in tissue.
///
/// # Fields
/// * `permanent_radius` - Radius of the crushed channel (m)
/// * `temporary_radius` - Radius of the stretch cavity (m)
/// * `length` - Channel length (m)
/// * `entry` - Where the channel starts
/// * `exit` - Where the channel ends
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WoundCavity {
    pub permanent_radius: f64,
    pub temporary_radius: f64,
    pub length: f64,
    pub entry: DVec3,
    pub exit: DVec3,
}

impl WoundCavity {
    /// Computes the cavity left by a projectile.
    ///
    /// # Arguments
    /// * `body` - The projectile at impact
    /// * `tissue` - Struck tissue in SI units
    /// * `speed` - Impact speed (m/s)
    /// * `imparted_energy` - Energy deposited in the tissue (J)
    /// * `depth` - Penetration depth (m)
    ///
    /// # Returns
    /// A cavity spanning the origin; position it with [`WoundCavity::with_span`]
    pub fn new(body: &ImpactBody, tissue: &BaseUnitProperties, speed: f64, imparted_energy: f64, depth: f64) -> Self {
        let diameter = body.diameter();
        let permanent_radius =
            body.radius + CAVITY_COEFFICIENT * diameter * sqr(speed / 1000.0) * (body.density / 1000.0).cbrt();
        let depth = depth.max(1e-4);
        let strength = tissue.yield_strength.max(f64::MIN_POSITIVE);
        let stretch = ((imparted_energy.max(0.0) / depth) / (PI * strength)).sqrt();
        Self {
            permanent_radius,
            temporary_radius: permanent_radius + stretch,
            length: depth,
            entry: DVec3::ZERO,
            exit: DVec3::ZERO,
        }
    }

    pub fn with_span(mut self, entry: DVec3, exit: DVec3) -> Self {
        self.entry = entry;
        self.exit = exit;
        self
    }

    /// Volume of the permanent channel (m³).
    pub fn permanent_volume(&self) -> f64 {
        PI * sqr(self.permanent_radius) * self.length
    }
}

/// Injury report for a hit zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InjuryParams {
    pub impact: ImpactParams,
    pub cavity: WoundCavity,
    pub thickness: f64,
    pub is_flesh: bool,
    pub is_bone: bool,
    pub is_dead: bool,
}

/// Impact-relevant snapshot of a projectile.
///
/// # Fields
/// * `area` - Frontal area (m²)
/// * `shape_factor` - Nose factor of the cavity-expansion model
/// * `contact_length` - Nose length in contact with the target (m)
/// * `frontal_cd` - Drag coefficient at the impact speed
/// * `core` - Material the projectile is made of, in SI units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactBody {
    pub mass: f64,
    pub radius: f64,
    pub area: f64,
    pub density: f64,
    pub shape_factor: f64,
    pub contact_length: f64,
    pub penetration_multiplier: f64,
    pub frontal_cd: f64,
    pub core: BaseUnitProperties,
    pub is_bullet: bool,
    pub frangible: bool,
    pub hollow_point: bool,
}

impl ImpactBody {
    pub fn new(projectile: &Projectile, speed: f64) -> Self {
        Self {
            mass: projectile.mass(),
            radius: projectile.radius(),
            area: projectile.frontal_area(),
            density: projectile.density(),
            shape_factor: projectile.shape_factor(),
            contact_length: projectile.contact_length(),
            penetration_multiplier: projectile.penetration_multiplier(),
            frontal_cd: projectile.drag_coefficient(speed),
            core: crate::materials::table::preset(projectile.material()).in_base_units(),
            is_bullet: projectile.is_bullet(),
            frangible: projectile.has_variation(BulletVariation::Frangible),
            hollow_point: projectile.has_variation(BulletVariation::HollowPoint),
        }
    }

    pub fn diameter(&self) -> f64 {
        2.0 * self.radius
    }
}

/// One contact between a projectile and a body.
///
/// # Fields
/// * `velocity` - Velocity at the contact
/// * `normal` - Surface normal, pointing out of the body
/// * `thickness` - Path length through the body (m)
#[derive(Debug, Clone, Copy)]
pub struct Impact<'a> {
    pub body: &'a ImpactBody,
    pub material: &'a PhysMatProperties,
    pub velocity: DVec3,
    pub normal: DVec3,
    pub thickness: f64,
}

impl<'a> Impact<'a> {
    pub fn new(body: &'a ImpactBody, material: &'a PhysMatProperties, velocity: DVec3, normal: DVec3, thickness: f64) -> Self {
        Self {
            body,
            material,
            velocity,
            normal: normal.normalize_or_zero(),
            thickness,
        }
    }

    /// Degrees from the surface, 90 = head on.
    pub fn angle(&self) -> f64 {
        impact_angle_deg(self.normal, self.velocity)
    }

    pub fn speed(&self) -> f64 {
        self.velocity.length()
    }

    pub fn kinetic_energy(&self) -> f64 {
        kinetic_energy(self.body.mass, self.speed())
    }

    /// Energy carried by the velocity component into the surface (J).
    pub fn normal_kinetic_energy(&self) -> f64 {
        kinetic_energy(self.body.mass, self.velocity.dot(self.normal))
    }

    /// Normal pointing away from the surface on the projectile's side.
    fn outward_normal(&self) -> DVec3 {
        if self.velocity.dot(self.normal) <= 0.0 {
            self.normal
        } else {
            -self.normal
        }
    }
}

/// Which mechanism let the projectile through.
///
/// # Variants
/// * `Cavity` - Mode I: cavity expansion against compressive resistance
/// * `Plugging` - Mode II: a plug sheared out of a thin plate
/// * `Fluid` - Drag decay inside a fluid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureMode {
    Cavity,
    Plugging,
    Fluid,
}

/// Outcome of pushing a projectile into a body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penetration {
    pub exit_velocity: DVec3,
    pub depth: f64,
    pub imparted_energy: f64,
    pub mode: FailureMode,
    pub stopped: bool,
}

impl Penetration {
    pub fn exit_speed(&self) -> f64 {
        self.exit_velocity.length()
    }
}

/// Exit speed and depth along the path, before any direction change.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Passage {
    exit_speed: f64,
    depth: f64,
    mode: FailureMode,
}

/// Calculate the quasi-static cavity-expansion resistance of a solid.
///
/// # Arguments
/// * `material` - Target material in SI units
/// * `penetration_multiplier` - Projectile multiplier; values above 1 weaken the target
///
/// # Returns
/// Resistance pressure (Pa)
pub fn target_resistance(material: &BaseUnitProperties, penetration_multiplier: f64) -> f64 {
    let strength = material.flow_strength();
    let stiffness = (material.youngs_modulus / (3.0 * strength)).max(1.0);
    2.0 / 3.0 * strength * (1.0 + stiffness.ln()) / penetration_multiplier.max(f64::EPSILON)
}

/// Calculate the work (J) spent opening a crack ahead of the nose.
///
/// Uses the strain energy release rate `G = K²/(Eπℓ)`, hardened by the
/// material's strain-rate factor, over the projectile's frontal area.
pub fn fracture_work(material: &BaseUnitProperties, contact_length: f64, speed: f64, area: f64) -> f64 {
    if material.fracture_toughness <= 0.0 || material.youngs_modulus <= 0.0 || contact_length <= 0.0 {
        return 0.0;
    }
    let strain_rate = contact_length / 2.0 * speed;
    let release_rate = sqr(material.fracture_toughness) / (material.youngs_modulus * PI * contact_length)
        * strain_rate.max(0.0).powf(material.strain_rate_factor);
    release_rate * area
}

/// Calculate how deep a projectile sinks into a semi-infinite solid.
///
/// # Returns
/// Depth (m) at which the Poncelet model brings the projectile to rest
pub fn cavity_stop_depth(body: &ImpactBody, material: &BaseUnitProperties, speed: f64) -> f64 {
    let resistance = target_resistance(material, body.penetration_multiplier);
    let inertia = body.shape_factor * material.density.max(f64::MIN_POSITIVE);
    body.mass / (2.0 * body.area * inertia) * (1.0 + inertia * sqr(speed) / resistance).ln()
}

/// Calculate the kinetic energy (J) needed to perforate `thickness` of a
/// solid by cavity expansion.
pub fn perforation_energy(body: &ImpactBody, material: &BaseUnitProperties, thickness: f64) -> f64 {
    let resistance = target_resistance(material, body.penetration_multiplier);
    let inertia = body.shape_factor * material.density.max(f64::MIN_POSITIVE);
    let growth = (2.0 * body.area * inertia * thickness / body.mass).exp() - 1.0;
    0.5 * body.mass * resistance / inertia * growth
}

/// Calculate the shear work (J) needed to punch a plug of `thickness`.
pub fn plugging_energy(body: &ImpactBody, material: &BaseUnitProperties, thickness: f64) -> f64 {
    material.shear_strength * PI * body.diameter() * sqr(thickness) / 2.0
}

fn cavity_passage(body: &ImpactBody, material: &BaseUnitProperties, speed: f64, thickness: f64) -> Passage {
    let resistance = target_resistance(material, body.penetration_multiplier);
    let inertia = body.shape_factor * material.density.max(f64::MIN_POSITIVE);
    let ratio = resistance / inertia;
    let decay = (-2.0 * body.area * inertia * thickness / body.mass).exp();
    let mut exit_sq = (sqr(speed) + ratio) * decay - ratio;
    if exit_sq > 0.0 {
        exit_sq -= 2.0 * fracture_work(material, body.contact_length, speed, body.area) / body.mass;
    }

    if exit_sq > 0.0 {
        Passage {
            exit_speed: exit_sq.sqrt(),
            depth: thickness,
            mode: FailureMode::Cavity,
        }
    } else {
        Passage {
            exit_speed: 0.0,
            depth: cavity_stop_depth(body, material, speed).min(thickness),
            mode: FailureMode::Cavity,
        }
    }
}

fn plugging_passage(body: &ImpactBody, material: &BaseUnitProperties, speed: f64, thickness: f64) -> Option<Passage> {
    if thickness > body.diameter() || material.shear_strength <= 0.0 {
        return None;
    }
    let residual = sqr(speed) - 2.0 * plugging_energy(body, material, thickness) / body.mass;
    if residual <= 0.0 {
        return None;
    }
    let plug_mass = material.density * body.area * thickness;
    Some(Passage {
        exit_speed: residual.sqrt() * body.mass / (body.mass + plug_mass),
        depth: thickness,
        mode: FailureMode::Plugging,
    })
}

fn fluid_passage(body: &ImpactBody, fluid: &BaseUnitProperties, speed: f64, thickness: f64) -> Passage {
    let decay = fluid.density * body.frontal_cd * body.area / (2.0 * body.mass);
    if decay <= 0.0 || !decay.is_finite() {
        return Passage {
            exit_speed: speed,
            depth: thickness,
            mode: FailureMode::Fluid,
        };
    }
    let exit_speed = crate::math::physics::velocity_in_fluid(speed, decay, thickness);
    if exit_speed > MIN_FLUID_SPEED {
        Passage {
            exit_speed,
            depth: thickness,
            mode: FailureMode::Fluid,
        }
    } else {
        Passage {
            exit_speed: 0.0,
            depth: ((speed / MIN_FLUID_SPEED).ln() / decay).clamp(0.0, thickness),
            mode: FailureMode::Fluid,
        }
    }
}

/// Calculate the velocity after passing through a body.
///
/// The part of the exit velocity parallel to the surface is damped a
/// little more at steep impacts than at grazing ones.
///
/// # Arguments
/// * `velocity` - Velocity at the entry
/// * `normal` - Entry surface normal
/// * `exit_speed` - Speed left after the body
/// * `impact_angle` - Degrees from the surface
pub fn exit_velocity(velocity: DVec3, normal: DVec3, exit_speed: f64, impact_angle: f64) -> DVec3 {
    let out = velocity.normalize_or_zero() * exit_speed;
    let normal = normal.normalize_or_zero();
    let along = normal * out.dot(normal);
    let parallel = out - along;
    along + parallel * map_range_clamped(0.0, 90.0, 0.95, 0.85, impact_angle)
}

/// Penetrate the body described by `impact`.
///
/// Fluids use drag decay. Solids take whichever of cavity expansion and
/// plugging leaves the projectile faster.
///
/// # Returns
/// The exit velocity (zero when stopped), the depth reached and the
/// energy left in the body, which always equals the kinetic energy lost.
pub fn penetrate(impact: &Impact) -> Penetration {
    let body = impact.body;
    let material = impact.material.in_base_units();
    let speed = impact.speed();
    let thickness = impact.thickness.max(0.0);

    let passage = if material.is_fluid {
        fluid_passage(body, &material, speed, thickness)
    } else {
        let cavity = cavity_passage(body, &material, speed, thickness);
        match plugging_passage(body, &material, speed, thickness) {
            Some(plug) if plug.exit_speed > cavity.exit_speed => plug,
            _ => cavity,
        }
    };

    let stopped = passage.exit_speed <= 0.0;
    let exit = if stopped {
        DVec3::ZERO
    } else {
        exit_velocity(impact.velocity, impact.normal, passage.exit_speed, impact.angle())
    };
    Penetration {
        exit_velocity: exit,
        depth: passage.depth,
        imparted_energy: 0.5 * body.mass * (sqr(speed) - exit.length_squared()),
        mode: passage.mode,
        stopped,
    }
}

/// Which failure modes a solid would suffer instead of deflecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailureAssessment {
    pub mode_one: bool,
    pub mode_two: bool,
}

impl FailureAssessment {
    /// Both modes fail with less energy than the impact carries into the
    /// surface, so the projectile goes through instead of bouncing.
    pub fn perforates(&self) -> bool {
        self.mode_one && self.mode_two
    }
}

/// Check the struck solid for compressive (mode I) and shear (mode II)
/// failure.
///
/// A mode triggers when the impact stress, concentrated by the obliquity,
/// exceeds the matching strength and the work to fail the body is less
/// than the kinetic energy normal to the surface.
pub fn assess_failure(impact: &Impact) -> FailureAssessment {
    let material = impact.material.in_base_units();
    if material.is_fluid {
        return FailureAssessment::default();
    }
    let body = impact.body;
    let obliquity = 90.0 - impact.angle();
    let concentration = stress_concentration_factor(obliquity);
    let thickness = impact.thickness.max(1e-6);
    let stress = impact_stress(impact.kinetic_energy(), body.area, obliquity.to_radians(), thickness);
    let normal_energy = impact.normal_kinetic_energy();

    let mode_one = stress * concentration >= material.flow_strength()
        && perforation_energy(body, &material, thickness) < normal_energy;
    let mode_two = thickness <= body.diameter()
        && material.shear_strength > 0.0
        && stress > material.shear_strength * concentration
        && plugging_energy(body, &material, thickness) < normal_energy;
    FailureAssessment { mode_one, mode_two }
}

/// Why a ricochet was ruled out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RicochetVeto {
    /// Ricochets are switched off for this material or projectile kind.
    Disabled,
    Frangible,
    HollowPointHeadOn,
    TooSlow,
    /// Too slow to skip across a fluid (Froude number below 1).
    Sinks,
    AboveCriticalAngle,
    /// The deflection would absorb too much of the projectile's energy.
    AbsorbsEnergy,
    Perforates,
    FailedRoll,
}

/// Result of a successful deflection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ricochet {
    pub velocity: DVec3,
    pub imparted_energy: f64,
    pub depth: f64,
    pub impact_angle: f64,
}

/// Critical ricochet angle (degrees from the surface) of an impact.
pub fn critical_angle(impact: &Impact, config: &BallisticsConfig) -> f64 {
    let critical = if impact.material.is_fluid {
        let fluid = impact.material.in_base_units();
        fluid_critical_ricochet_angle(fluid.density, impact.body.core.density)
    } else {
        impact.material.critical_ricochet_angle()
    };
    critical.min(config.ricochet_global_angle_cutoff)
}

/// Likelihood of a ricochet at `angle` degrees from the surface.
///
/// Highest for a grazing impact: falls monotonically from 1 at 0° to 0 at
/// the critical angle and stays 0 beyond it, so steeper impacts approaching
/// the critical angle ricochet less often.
pub fn ricochet_probability(angle: f64, critical: f64) -> f64 {
    if critical <= 0.0 || angle >= critical {
        return 0.0;
    }
    1.0 - sqr(angle.max(0.0) / critical)
}

/// Restitution and friction of a deflection.
fn ricochet_coefficients(impact: &Impact) -> (f64, f64) {
    let object = impact.material.in_base_units();
    if object.is_fluid {
        let restitution = 1.0 - (object.density / impact.body.core.density.max(f64::MIN_POSITIVE)).sqrt();
        (restitution.clamp(0.0, 1.0), object.friction)
    } else {
        (object.restitution(), object.friction + impact.body.core.friction)
    }
}

/// Calculate the velocity left after bouncing off a surface.
///
/// The normal component rebounds scaled by the restitution and the
/// tangential component loses the friction impulse of the bounce.
///
/// # Arguments
/// * `velocity` - Incoming velocity
/// * `normal` - Surface normal
/// * `restitution` - Coefficient of restitution
/// * `friction` - Combined sliding friction
pub fn ricochet_velocity(velocity: DVec3, normal: DVec3, restitution: f64, friction: f64) -> DVec3 {
    let normal = normal.normalize_or_zero();
    let normal_component = velocity.dot(normal);
    let outward = if normal_component <= 0.0 { normal } else { -normal };
    let normal_speed = normal_component.abs();
    let tangent = velocity - normal * normal_component;
    let tangent_speed = (tangent.length() - friction * (1.0 + restitution) * normal_speed).max(0.0);
    tangent.normalize_or_zero() * tangent_speed + outward * (restitution * normal_speed)
}

/// Tilts `direction` by a normally distributed angle around a random axis.
pub fn jitter_direction<R: Rng + ?Sized>(direction: DVec3, rng: &mut R) -> DVec3 {
    let direction = direction.normalize_or_zero();
    let Ok(spread) = Normal::new(0.0, RICOCHET_JITTER_STD_DEV) else {
        return direction;
    };
    if direction == DVec3::ZERO {
        return direction;
    }
    let deviation = spread
        .sample(rng)
        .clamp(-RICOCHET_JITTER_LIMIT, RICOCHET_JITTER_LIMIT)
        .to_radians();
    let (u, _) = direction.any_orthonormal_pair();
    let axis = DQuat::from_axis_angle(direction, rng.random_range(0.0..TAU)) * u;
    DQuat::from_axis_angle(axis, deviation) * direction
}

/// Decide whether `impact` deflects and, if so, how.
///
/// # Arguments
/// * `impact` - The contact
/// * `config` - Global ricochet switches and thresholds
/// * `gravity_z` - World gravity, for the fluid skipping test
/// * `rng` - The task's random stream
///
/// # Returns
/// The deflected velocity and the energy lost, or the first reason the
/// ricochet was ruled out
pub fn evaluate_ricochet<R: Rng + ?Sized>(
    impact: &Impact,
    config: &BallisticsConfig,
    gravity_z: f64,
    rng: &mut R,
) -> Result<Ricochet, RicochetVeto> {
    let body = impact.body;
    let material = impact.material;
    let angle = impact.angle();
    let speed = impact.speed();

    if !material.can_ever_ricochet() || !config.ricochets_allowed(body.is_bullet) {
        return Err(RicochetVeto::Disabled);
    }
    if body.frangible {
        return Err(RicochetVeto::Frangible);
    }
    if body.hollow_point && angle >= HEAD_ON_ANGLE {
        return Err(RicochetVeto::HollowPointHeadOn);
    }
    if speed < MIN_RICOCHET_SPEED {
        return Err(RicochetVeto::TooSlow);
    }

    let (restitution, friction) = ricochet_coefficients(impact);
    let bounced = ricochet_velocity(impact.velocity, impact.normal, restitution, friction);
    let energy = impact.kinetic_energy();
    let imparted_energy = (energy - kinetic_energy(body.mass, bounced.length())).max(0.0);

    if material.probability_overrides_material() {
        if !material.roll_ricochet(rng.random::<f64>(), 1.0) {
            return Err(RicochetVeto::FailedRoll);
        }
    } else {
        if material.is_fluid && froude_number(body.radius, speed, gravity_z) < 1.0 {
            return Err(RicochetVeto::Sinks);
        }
        let critical = critical_angle(impact, config);
        if angle > critical {
            return Err(RicochetVeto::AboveCriticalAngle);
        }
        if energy < config.ricochet_energy_ratio_threshold * imparted_energy {
            return Err(RicochetVeto::AbsorbsEnergy);
        }
        if material.uses_ricochet_roll()
            && !material.roll_ricochet(rng.random::<f64>(), ricochet_probability(angle, critical))
        {
            return Err(RicochetVeto::FailedRoll);
        }
        if !material.is_fluid && assess_failure(impact).perforates() {
            return Err(RicochetVeto::Perforates);
        }
    }

    let reflected = mirror(impact.velocity, impact.normal).normalize_or_zero();
    let mut direction = jitter_direction(reflected, rng);
    if direction.dot(impact.outward_normal()) <= 0.0 {
        direction = reflected;
    }
    Ok(Ricochet {
        velocity: direction * (2.0 * (energy - imparted_energy) / body.mass).max(0.0).sqrt(),
        imparted_energy,
        depth: body.radius / 2.0,
        impact_angle: angle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::table::preset;
    use crate::materials::RicochetProperties;
    use crate::projectile::{Bullet, BulletPreset};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const HEAD_ON: DVec3 = DVec3::X;
    const FACING: DVec3 = DVec3::NEG_X;

    fn nine_mm() -> ImpactBody {
        ImpactBody::new(&Projectile::from(BulletPreset::Para9x19), 360.0)
    }

    fn oblique(angle_deg: f64, speed: f64) -> (DVec3, DVec3) {
        let a = angle_deg.to_radians();
        (DVec3::new(a.cos(), 0.0, -a.sin()) * speed, DVec3::Z)
    }

    #[test]
    fn test_9mm_stops_in_thick_concrete() {
        let body = nine_mm();
        let concrete = preset(SurfaceType::Concrete);
        let result = penetrate(&Impact::new(&body, &concrete, HEAD_ON * 360.0, FACING, 0.10));
        assert!(result.stopped);
        assert_eq!(result.mode, FailureMode::Cavity);
        assert_relative_eq!(result.depth, 0.0485, epsilon = 5e-4);
        assert_relative_eq!(result.imparted_energy, kinetic_energy(body.mass, 360.0), epsilon = 1e-9);
    }

    #[test]
    fn test_9mm_through_wood_then_drywall() {
        let body = nine_mm();
        let wood = penetrate(&Impact::new(&body, &preset(SurfaceType::Softwood), HEAD_ON * 360.0, FACING, 0.02));
        assert!(!wood.stopped);
        assert_relative_eq!(wood.exit_speed(), 284.5, epsilon = 0.5);

        let drywall = penetrate(&Impact::new(&body, &preset(SurfaceType::Drywall), wood.exit_velocity, FACING, 0.0125));
        assert!(!drywall.stopped);
        assert_relative_eq!(drywall.exit_speed(), 270.0, epsilon = 0.5);
    }

    #[test]
    fn test_imparted_energy_matches_speed_loss() {
        let body = nine_mm();
        let (velocity, normal) = oblique(60.0, 360.0);
        let result = penetrate(&Impact::new(&body, &preset(SurfaceType::Softwood), velocity, normal, 0.03));
        let lost = 0.5 * body.mass * (360.0f64.powi(2) - result.exit_speed().powi(2));
        assert!(result.imparted_energy > 0.0);
        assert!((lost - result.imparted_energy).abs() <= 0.01 * result.imparted_energy);
    }

    #[test]
    fn test_thin_plate_is_plugged() {
        let body = nine_mm();
        let result = penetrate(&Impact::new(&body, &preset(SurfaceType::Steel), HEAD_ON * 360.0, FACING, 0.002));
        assert_eq!(result.mode, FailureMode::Plugging);
        assert_relative_eq!(result.exit_speed(), 309.2, epsilon = 1.0);
    }

    #[test]
    fn test_fluid_slows_exponentially() {
        let body = nine_mm();
        let water = preset(SurfaceType::Water);
        let shallow = penetrate(&Impact::new(&body, &water, HEAD_ON * 360.0, FACING, 0.1));
        let deep = penetrate(&Impact::new(&body, &water, HEAD_ON * 360.0, FACING, 0.2));
        assert_eq!(shallow.mode, FailureMode::Fluid);
        let decay = shallow.exit_speed() / 360.0;
        assert_relative_eq!(deep.exit_speed() / 360.0, decay * decay, epsilon = 1e-9);

        let pool = penetrate(&Impact::new(&body, &water, HEAD_ON * 360.0, FACING, 50.0));
        assert!(pool.stopped);
        assert!(pool.depth > 0.2 && pool.depth < 50.0);
    }

    #[test]
    fn test_parallel_component_is_damped() {
        let velocity = DVec3::new(1.0, 0.0, -1.0).normalize() * 100.0;
        let out = exit_velocity(velocity, DVec3::Z, 100.0, 45.0);
        assert_relative_eq!(out.z, velocity.z, epsilon = 1e-9);
        assert_relative_eq!(out.x, velocity.x * 0.9, epsilon = 1e-9);
    }

    #[test]
    fn test_ap_glances_off_steel() {
        let bullet = Projectile::from(BulletPreset::Nato762x51Ap);
        let body = ImpactBody::new(&bullet, 820.0);
        let steel = preset(SurfaceType::Steel);
        let (velocity, normal) = oblique(20.0, 820.0);
        let impact = Impact::new(&body, &steel, velocity, normal, 0.01 / 20f64.to_radians().sin());
        let mut rng = StdRng::seed_from_u64(7);

        let ricochet = evaluate_ricochet(&impact, &BallisticsConfig::default(), -9.81, &mut rng)
            .expect("glancing AP round should ricochet");
        let loss = 820.0 - ricochet.velocity.length();
        assert!((100.0..=250.0).contains(&loss));
        assert_relative_eq!(loss, 167.6, epsilon = 1.0);

        let reflected = mirror(velocity, normal).normalize();
        let deviation = ricochet.velocity.normalize().angle_between(reflected).to_degrees();
        assert!(deviation <= RICOCHET_JITTER_LIMIT + 1e-9);
        assert_relative_eq!(ricochet.depth, body.radius / 2.0);
    }

    #[test]
    fn test_shallow_water_entry_skips() {
        let body = nine_mm();
        let water = preset(SurfaceType::Water);
        let (velocity, normal) = oblique(45.0, 360.0);
        let impact = Impact::new(&body, &water, velocity, normal, 1.0);
        assert_relative_eq!(critical_angle(&impact, &BallisticsConfig::default()), 60.8, epsilon = 0.1);

        let mut rng = StdRng::seed_from_u64(1);
        let ricochet = evaluate_ricochet(&impact, &BallisticsConfig::default(), -9.81, &mut rng).unwrap();
        assert_relative_eq!(ricochet.velocity.length(), 293.7, epsilon = 0.5);
        assert!(ricochet.velocity.z > 0.0);
    }

    #[test]
    fn test_steep_water_entry_dives() {
        let body = nine_mm();
        let water = preset(SurfaceType::Water);
        let (velocity, normal) = oblique(70.0, 360.0);
        let impact = Impact::new(&body, &water, velocity, normal, 1.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            evaluate_ricochet(&impact, &BallisticsConfig::default(), -9.81, &mut rng),
            Err(RicochetVeto::AboveCriticalAngle)
        );
    }

    #[test]
    fn test_head_on_concrete_never_ricochets() {
        let body = nine_mm();
        let concrete = preset(SurfaceType::Concrete);
        let impact = Impact::new(&body, &concrete, HEAD_ON * 360.0, FACING, 0.1);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(evaluate_ricochet(&impact, &BallisticsConfig::default(), -9.81, &mut rng).is_err());
    }

    #[test]
    fn test_ricochet_switches_and_variations() {
        let (velocity, normal) = oblique(10.0, 360.0);
        let steel = preset(SurfaceType::Steel);
        let mut rng = StdRng::seed_from_u64(3);

        let body = nine_mm();
        let impact = Impact::new(&body, &steel, velocity, normal, 0.05);
        let config = BallisticsConfig::default().with_ricochets(false);
        assert_eq!(evaluate_ricochet(&impact, &config, -9.81, &mut rng), Err(RicochetVeto::Disabled));

        let frangible = Bullet::preset(BulletPreset::Para9x19).with_variations(vec![BulletVariation::Frangible]);
        let body = ImpactBody::new(&Projectile::from(frangible), 360.0);
        let impact = Impact::new(&body, &steel, velocity, normal, 0.05);
        assert_eq!(
            evaluate_ricochet(&impact, &BallisticsConfig::default(), -9.81, &mut rng),
            Err(RicochetVeto::Frangible)
        );

        let body = nine_mm();
        let (slow, _) = oblique(10.0, 20.0);
        let impact = Impact::new(&body, &steel, slow, normal, 0.05);
        assert_eq!(
            evaluate_ricochet(&impact, &BallisticsConfig::default(), -9.81, &mut rng),
            Err(RicochetVeto::TooSlow)
        );
    }

    #[test]
    fn test_zero_probability_material_never_ricochets() {
        let body = nine_mm();
        let (velocity, normal) = oblique(10.0, 360.0);
        let rubber_wall = preset(SurfaceType::Steel).with_ricochet_properties(RicochetProperties {
            add_ricochet_randomness: true,
            probability_overrides_material: true,
            ricochet_probability: 0.0,
            ..Default::default()
        });
        let impact = Impact::new(&body, &rubber_wall, velocity, normal, 0.05);
        let mut rng = StdRng::seed_from_u64(11);
        assert!(evaluate_ricochet(&impact, &BallisticsConfig::default(), -9.81, &mut rng).is_err());
    }

    #[test]
    fn test_ricochet_probability_falls_with_angle() {
        let critical = 60.0;
        let mut previous = f64::INFINITY;
        for step in 0..=80 {
            let angle = step as f64;
            let p = ricochet_probability(angle, critical);
            assert!((0.0..=1.0).contains(&p));
            assert!(p <= previous);
            previous = p;
        }
        assert_eq!(ricochet_probability(61.0, critical), 0.0);
        assert_eq!(ricochet_probability(0.0, critical), 1.0);
    }

    #[test]
    fn test_ricochet_velocity_components() {
        let velocity = DVec3::new(3.0, 0.0, -4.0);
        let out = ricochet_velocity(velocity, DVec3::Z, 0.5, 0.1);
        assert_relative_eq!(out.z, 2.0, epsilon = 1e-12);
        assert_relative_eq!(out.x, 3.0 - 0.1 * 1.5 * 4.0, epsilon = 1e-12);

        let sticky = ricochet_velocity(velocity, DVec3::Z, 0.0, 10.0);
        assert_relative_eq!(sticky.x, 0.0);
    }

    #[test]
    fn test_jitter_stays_within_limit() {
        let mut rng = StdRng::seed_from_u64(99);
        let direction = DVec3::new(1.0, 2.0, 0.5).normalize();
        for _ in 0..200 {
            let jittered = jitter_direction(direction, &mut rng);
            assert_relative_eq!(jittered.length(), 1.0, epsilon = 1e-9);
            assert!(jittered.angle_between(direction).to_degrees() <= RICOCHET_JITTER_LIMIT + 1e-9);
        }
    }

    #[test]
    fn test_thick_armor_resists_both_modes() {
        let body = nine_mm();
        let armor = preset(SurfaceType::HardenedSteel);
        let impact = Impact::new(&body, &armor, HEAD_ON * 360.0, FACING, 0.05);
        let failure = assess_failure(&impact);
        assert!(!failure.mode_two);
        assert!(!failure.perforates());
    }

    #[test]
    fn test_wound_cavity_radii() {
        let body = nine_mm();
        let flesh = preset(SurfaceType::Flesh).in_base_units();
        let depth = cavity_stop_depth(&body, &flesh, 360.0);
        assert_relative_eq!(depth, 0.189, epsilon = 2e-3);

        let cavity = WoundCavity::new(&body, &flesh, 360.0, kinetic_energy(body.mass, 360.0), depth)
            .with_span(DVec3::ZERO, DVec3::X * depth);
        assert!(cavity.permanent_radius > body.radius);
        assert!(cavity.temporary_radius > cavity.permanent_radius);
        assert_relative_eq!(cavity.length, depth);
        assert!(cavity.permanent_volume() > 0.0);
    }

    #[test]
    fn test_invalid_payload() {
        let params = ImpactParams::invalid(ProjectileId::new(), 1.0);
        assert!(!params.is_valid);
        let mut stale = ImpactParams::new(ProjectileId::new(), HitResult::default(), SurfaceType::Steel, DVec3::X, 0.0);
        assert!(stale.has_valid_data());
        stale.imparted_energy = f64::NAN;
        assert!(!stale.has_valid_data());
    }
}
