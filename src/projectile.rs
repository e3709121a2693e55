//! Projectile descriptions: bullets with ogive geometry and generic rigid
//! bodies, plus the standard cartridge presets.
//!
//! Presets are authored in the units ballisticians publish them in
//! (centimetres, g/cm³, kilograms) and converted to SI on construction.

use std::f64::consts::PI;

use bevy::math::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{BallisticsError, Result};
use crate::materials::{BaseUnitProperties, SurfaceType};
use crate::math::atmosphere::reynolds_number;
use crate::math::constants::{AIR_DENSITY, AIR_DYNAMIC_VISCOSITY};
use crate::math::drag::{drag_coefficient, sphere_cd};
use crate::math::physics::dynamic_pressure;
use crate::math::sqr;
use crate::math::units::{cm_to_m, g_cm3_to_kg_m3, kg_to_grains};
use crate::shapes::{BulletShape, Cylinder, Nose, Ogive};
use crate::types::DragModel;

/// Side-on drag coefficient of a plain cylinder.
const CYLINDER_SIDE_CD: f64 = 1.17;

/// Nose shape factor of a sphere.
const SPHERE_SHAPE_FACTOR: f64 = 0.5;

/// Capabilities the integrator and impact model need from a projectile.
pub trait BallisticBody {
    /// Scalar drag coefficient at `speed` (m/s).
    fn drag_coefficient(&self, speed: f64) -> f64;

    /// Per-axis drag coefficient for a velocity expressed in the body frame.
    fn drag_coefficient_3d(&self, local_velocity: DVec3) -> DVec3;

    /// Per-axis cross-sectional area (m²) in the body frame.
    fn cross_sections(&self) -> DVec3;

    /// Frontal cross-sectional area (m²).
    fn frontal_area(&self) -> f64 {
        self.cross_sections().x
    }

    fn radius(&self) -> f64;

    fn mass(&self) -> f64;

    /// Density (kg/m³).
    fn density(&self) -> f64;

    /// Principal moments of inertia (axial, transverse, transverse).
    fn inertia(&self) -> DVec3;

    /// Material the projectile is made of.
    fn material(&self) -> SurfaceType;

    /// Nose shape factor used by cavity-expansion penetration.
    fn shape_factor(&self) -> f64 {
        SPHERE_SHAPE_FACTOR
    }

    /// Deforms the projectile after striking `object` at `impact_speed`.
    fn on_deform(&mut self, _impact_speed: f64, _object: &BaseUnitProperties) {}

    fn validate(&self) -> Result<()>;
}

/// Construction or loading variation of a bullet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BulletVariation {
    Fmj,
    HollowPoint,
    SoftPoint,
    Frangible,
    ArmorPiercing,
    Tracer,
}

/// Physical properties of a bullet in SI units.
///
/// # Fields
/// * `apparent_radius` - Radius of the contact patch during penetration (m)
/// * `apparent_length` - Length of the nose in contact during penetration (m)
/// * `apparent_impact_area` - Contact area during penetration (m²)
/// * `rigid_indenter_angle` - Half angle of the equivalent rigid indenter (degrees)
/// * `ballistic_coefficient` - G-model ballistic coefficient (lb/in²)
/// * `sectional_density` - Sectional density (lb/in²)
/// * `expansion_coefficient` - Maximum radius growth factor when deforming
/// * `deformation_resistance` - Multiple of the core yield strength needed to start deforming
/// * `penetration_multiplier` - Scales the target resistance down (> 1 penetrates more)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletProperties {
    pub mass: f64,
    pub length: f64,
    pub density: f64,
    pub radius: f64,
    pub apparent_radius: f64,
    pub apparent_length: f64,
    pub apparent_impact_area: f64,
    pub rigid_indenter_angle: f64,
    pub ballistic_coefficient: f64,
    pub sectional_density: f64,
    pub drag_model: DragModel,
    pub shape: Option<BulletShape>,
    pub is_spherical: bool,
    pub expansion_coefficient: f64,
    pub deformation_resistance: f64,
    pub penetration_multiplier: f64,
    original_radius: f64,
}

impl BulletProperties {
    /// Builds properties from published figures.
    ///
    /// # Arguments
    /// * `mass` - kg
    /// * `length_cm`, `radius_cm`, `apparent_radius_cm`, `apparent_length_cm` - cm
    /// * `density` - g/cm³
    /// * `apparent_impact_area_cm2` - cm²
    /// * `indenter_angle` - degrees
    /// * `ballistic_coefficient`, `sectional_density` - lb/in²
    #[allow(clippy::too_many_arguments)]
    pub fn from_cm(
        mass: f64,
        length_cm: f64,
        density: f64,
        radius_cm: f64,
        apparent_radius_cm: f64,
        apparent_length_cm: f64,
        apparent_impact_area_cm2: f64,
        indenter_angle: f64,
        ballistic_coefficient: f64,
        sectional_density: f64,
        drag_model: DragModel,
        shape: BulletShape,
    ) -> Self {
        let radius = cm_to_m(radius_cm);
        Self {
            mass,
            length: cm_to_m(length_cm),
            density: g_cm3_to_kg_m3(density),
            radius,
            apparent_radius: cm_to_m(apparent_radius_cm),
            apparent_length: cm_to_m(apparent_length_cm),
            apparent_impact_area: apparent_impact_area_cm2 * 1e-4,
            rigid_indenter_angle: indenter_angle,
            ballistic_coefficient,
            sectional_density,
            drag_model,
            shape: Some(shape),
            is_spherical: false,
            expansion_coefficient: 1.0,
            deformation_resistance: 2.0,
            penetration_multiplier: 1.0,
            original_radius: radius,
        }
    }

    /// Spherical shot of the given mass (kg), density (g/cm³) and radius (cm).
    ///
    /// The contact patch is the cap one third of a radius deep.
    pub fn sphere(mass: f64, density: f64, radius_cm: f64) -> Self {
        let radius = cm_to_m(radius_cm);
        let diameter_in = 2.0 * radius_cm / 2.54;
        let apparent_radius = radius * 5f64.sqrt() / 3.0;
        Self {
            mass,
            length: 2.0 * radius,
            density: g_cm3_to_kg_m3(density),
            radius,
            apparent_radius,
            apparent_length: radius / 3.0,
            apparent_impact_area: PI * sqr(apparent_radius),
            rigid_indenter_angle: 45.0,
            ballistic_coefficient: 1.0,
            sectional_density: kg_to_grains(mass) / 7000.0 / sqr(diameter_in),
            drag_model: DragModel::Sphere,
            shape: None,
            is_spherical: true,
            expansion_coefficient: 1.0,
            deformation_resistance: 2.0,
            penetration_multiplier: 1.0,
            original_radius: radius,
        }
    }

    pub fn with_expansion(mut self, expansion_coefficient: f64, deformation_resistance: f64) -> Self {
        self.expansion_coefficient = expansion_coefficient;
        self.deformation_resistance = deformation_resistance;
        self
    }

    pub fn with_penetration_multiplier(mut self, multiplier: f64) -> Self {
        self.penetration_multiplier = multiplier;
        self
    }

    /// Sectional density over ballistic coefficient.
    pub fn coefficient_of_form(&self) -> f64 {
        if self.is_spherical || self.ballistic_coefficient <= 0.0 {
            return 1.0;
        }
        self.sectional_density / self.ballistic_coefficient
    }

    /// Frontal area of the larger of the real and apparent radii.
    pub fn frontal_csa(&self) -> f64 {
        PI * sqr(self.radius.max(self.apparent_radius))
    }

    pub fn side_csa(&self) -> f64 {
        match &self.shape {
            Some(shape) => shape.side_csa(),
            None if self.is_spherical => PI * sqr(self.radius),
            None => 2.0 * self.radius * self.length,
        }
    }

    pub fn original_radius(&self) -> f64 {
        self.original_radius
    }

    fn sphere_cd(speed: f64, diameter: f64) -> f64 {
        sphere_cd(reynolds_number(AIR_DENSITY, AIR_DYNAMIC_VISCOSITY, diameter, speed))
    }
}

/// A bullet: physical properties plus how it is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bullet {
    pub name: String,
    pub properties: BulletProperties,
    pub variations: Vec<BulletVariation>,
    pub core: SurfaceType,
}

impl Bullet {
    pub fn new(name: impl Into<String>, properties: BulletProperties) -> Self {
        Self {
            name: name.into(),
            properties,
            variations: vec![BulletVariation::Fmj],
            core: SurfaceType::Lead,
        }
    }

    pub fn with_variations(mut self, variations: Vec<BulletVariation>) -> Self {
        self.variations = variations;
        self
    }

    pub fn with_core(mut self, core: SurfaceType) -> Self {
        self.core = core;
        self
    }

    pub fn has_variation(&self, variation: BulletVariation) -> bool {
        self.variations.contains(&variation)
    }

    /// Builds one of the bundled presets.
    pub fn preset(preset: BulletPreset) -> Self {
        match preset {
            BulletPreset::Para9x19 => {
                let shape = BulletShape::new(
                    Nose::Ogive(Ogive::tangent(0.0045, 0.0045)),
                    Cylinder::new(0.0045, 0.005583, 8675.0),
                );
                let properties = BulletProperties::from_cm(
                    0.00745, 1.5, 8.675, 0.45, 0.325943, 0.3132, 0.333759, 15.5, 0.166, 0.130, DragModel::G1, shape,
                )
                .with_expansion(2.0, 1.5);
                Bullet::new("9x19mm Parabellum FMJ", properties)
            }
            BulletPreset::Nato762x51 | BulletPreset::Nato762x51Ap => {
                let shape = BulletShape::new(
                    Nose::Ogive(Ogive::with_ogive_radius(0.0039116, 0.016256, 0.0383375)),
                    Cylinder::new(0.0039116, 0.013811, 9309.0),
                );
                let properties = BulletProperties::from_cm(
                    0.009525, 3.13, 9.309, 0.3912, 0.2348, 0.5419, 0.173199, 12.24, 0.209, 0.231, DragModel::G7, shape,
                )
                .with_expansion(1.1, 2.0);
                if preset == BulletPreset::Nato762x51Ap {
                    Bullet::new("7.62x51mm NATO AP", properties.with_penetration_multiplier(1.5))
                        .with_variations(vec![BulletVariation::ArmorPiercing])
                        .with_core(SurfaceType::HardenedSteel)
                } else {
                    Bullet::new("7.62x51mm NATO M80", properties)
                }
            }
            BulletPreset::Nato556x45 => {
                let shape = BulletShape::new(
                    Nose::Ogive(Ogive::with_ogive_radius(0.00285, 0.012, 0.05781)),
                    Cylinder::new(0.00285, 0.0114, 8859.0),
                );
                let properties = BulletProperties::from_cm(
                    0.0040175, 2.34, 8.859, 0.285, 0.18195, 0.6, 0.104005, 11.7, 0.152, 0.184, DragModel::G7, shape,
                )
                .with_expansion(1.25, 2.0);
                Bullet::new("5.56x45mm NATO M855A1", properties).with_core(SurfaceType::Copper)
            }
            BulletPreset::Acp45 => {
                let shape = BulletShape::new(
                    Nose::Ogive(Ogive::tangent(0.00533, 0.00907)),
                    Cylinder::new(0.00533, 0.0082321, 10853.0),
                );
                let properties = BulletProperties::from_cm(
                    0.014904, 1.73, 10.853, 0.533, 0.397267, 0.302, 0.495811, 18.7, 0.162, 0.161, DragModel::G7, shape,
                );
                Bullet::new(".45 ACP FMJ", properties)
            }
            BulletPreset::Buckshot00 => {
                let properties = BulletProperties::sphere(0.00350, 11.35, 0.4191).with_expansion(1.5, 1.0);
                Bullet::new("12 gauge 00 buckshot pellet", properties).with_variations(Vec::new())
            }
        }
    }
}

/// Bundled bullet presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BulletPreset {
    Para9x19,
    Nato762x51,
    Nato762x51Ap,
    Nato556x45,
    Acp45,
    Buckshot00,
}

impl BallisticBody for Bullet {
    fn drag_coefficient(&self, speed: f64) -> f64 {
        let p = &self.properties;
        if p.is_spherical {
            BulletProperties::sphere_cd(speed, 2.0 * p.radius)
        } else {
            drag_coefficient(p.drag_model, speed, 0.0) * p.coefficient_of_form()
        }
    }

    fn drag_coefficient_3d(&self, local_velocity: DVec3) -> DVec3 {
        let p = &self.properties;
        if p.is_spherical {
            let d = 2.0 * p.radius;
            return DVec3::new(
                BulletProperties::sphere_cd(local_velocity.x, d),
                BulletProperties::sphere_cd(local_velocity.y, d),
                BulletProperties::sphere_cd(local_velocity.z, d),
            );
        }
        let side = p.shape.as_ref().map_or(CYLINDER_SIDE_CD, BulletShape::side_cd);
        DVec3::new(self.drag_coefficient(local_velocity.x.abs()), side, side)
    }

    fn cross_sections(&self) -> DVec3 {
        let side = self.properties.side_csa();
        DVec3::new(self.properties.frontal_csa(), side, side)
    }

    fn radius(&self) -> f64 {
        self.properties.radius
    }

    fn mass(&self) -> f64 {
        self.properties.mass
    }

    fn density(&self) -> f64 {
        self.properties.density
    }

    fn inertia(&self) -> DVec3 {
        let p = &self.properties;
        match &p.shape {
            Some(shape) => {
                let props = shape.mass_properties();
                if props.mass > 0.0 {
                    props.inertia * (p.mass / props.mass)
                } else {
                    Cylinder::new(p.radius, p.length, p.density).inertia(p.mass)
                }
            }
            None => DVec3::splat(0.4 * p.mass * sqr(p.radius)),
        }
    }

    fn material(&self) -> SurfaceType {
        self.core
    }

    fn shape_factor(&self) -> f64 {
        match &self.properties.shape {
            Some(shape) if !self.properties.is_spherical => shape.nose.penetration_shape_factor(),
            _ => SPHERE_SHAPE_FACTOR,
        }
    }

    /// Mushrooms the bullet when the stagnation pressure of the target
    /// exceeds the core's yield strength times the deformation resistance.
    /// Mass is conserved and the radius never exceeds twice the original.
    fn on_deform(&mut self, impact_speed: f64, object: &BaseUnitProperties) {
        let core = crate::materials::table::preset(self.core).in_base_units();
        let threshold = self.properties.deformation_resistance * core.yield_strength;
        if threshold <= 0.0 || self.properties.expansion_coefficient <= 1.0 {
            return;
        }
        let extent = (dynamic_pressure(object.density, impact_speed) / threshold - 1.0).clamp(0.0, 1.0);
        if extent <= 0.0 {
            return;
        }
        let p = &mut self.properties;
        let growth = 1.0 + (p.expansion_coefficient - 1.0) * extent;
        let radius = (p.radius * growth).min(2.0 * p.original_radius);
        let scale = radius / p.radius;
        p.radius = radius;
        p.apparent_radius *= scale;
        p.apparent_impact_area *= sqr(scale);
    }

    fn validate(&self) -> Result<()> {
        let p = &self.properties;
        let values = [p.mass, p.radius, p.length, p.density];
        if values.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(BallisticsError::InvalidProjectile(format!(
                "{}: mass, radius, length and density must be positive",
                self.name
            )));
        }
        if !p.is_spherical && p.ballistic_coefficient <= 0.0 {
            return Err(BallisticsError::InvalidProjectile(format!(
                "{}: ballistic coefficient must be positive",
                self.name
            )));
        }
        Ok(())
    }
}

/// Generic rigid body with fixed per-axis drag.
///
/// # Fields
/// * `cd` - Drag coefficient per body axis
/// * `csa` - Cross-sectional area per body axis (m²)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileProperties {
    pub mass: f64,
    pub radius: f64,
    pub length: f64,
    pub density: f64,
    pub cd: DVec3,
    pub csa: DVec3,
    pub material: SurfaceType,
    pub is_spherical: bool,
}

impl Default for ProjectileProperties {
    fn default() -> Self {
        Self::sphere(0.01, 7800.0, SurfaceType::Steel)
    }
}

impl ProjectileProperties {
    /// Solid sphere of `radius` (m) and `density` (kg/m³).
    pub fn sphere(radius: f64, density: f64, material: SurfaceType) -> Self {
        let mass = 4.0 / 3.0 * PI * radius.powi(3) * density;
        let area = PI * sqr(radius);
        Self {
            mass,
            radius,
            length: 2.0 * radius,
            density,
            cd: DVec3::splat(crate::math::drag::SPHERE_CD),
            csa: DVec3::splat(area),
            material,
            is_spherical: true,
        }
    }

    /// Cylinder flying along its axis.
    pub fn cylinder(radius: f64, length: f64, density: f64, material: SurfaceType) -> Self {
        let body = Cylinder::new(radius, length, density);
        Self {
            mass: body.mass(),
            radius,
            length,
            density,
            cd: DVec3::new(body.frontal_cd(), body.cd(), body.cd()),
            csa: DVec3::new(body.frontal_csa(), body.side_csa(), body.side_csa()),
            material,
            is_spherical: false,
        }
    }

    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }
}

impl BallisticBody for ProjectileProperties {
    fn drag_coefficient(&self, speed: f64) -> f64 {
        if self.is_spherical {
            BulletProperties::sphere_cd(speed, 2.0 * self.radius)
        } else {
            self.cd.x
        }
    }

    fn drag_coefficient_3d(&self, local_velocity: DVec3) -> DVec3 {
        if self.is_spherical {
            DVec3::splat(self.drag_coefficient(local_velocity.length()))
        } else {
            self.cd
        }
    }

    fn cross_sections(&self) -> DVec3 {
        self.csa
    }

    fn radius(&self) -> f64 {
        self.radius
    }

    fn mass(&self) -> f64 {
        self.mass
    }

    fn density(&self) -> f64 {
        self.density
    }

    fn inertia(&self) -> DVec3 {
        if self.is_spherical {
            DVec3::splat(0.4 * self.mass * sqr(self.radius))
        } else {
            Cylinder::new(self.radius, self.length, self.density).inertia(self.mass)
        }
    }

    fn material(&self) -> SurfaceType {
        self.material
    }

    fn validate(&self) -> Result<()> {
        let values = [self.mass, self.radius, self.density];
        if values.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(BallisticsError::InvalidProjectile(
                "mass, radius and density must be positive".to_string(),
            ));
        }
        if !crate::math::is_finite_vec(self.cd) || !crate::math::is_finite_vec(self.csa) || self.csa.min_element() < 0.0 {
            return Err(BallisticsError::InvalidProjectile("drag data must be finite".to_string()));
        }
        Ok(())
    }
}

/// Anything the engine can fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projectile {
    Bullet(Bullet),
    Generic(ProjectileProperties),
}

impl From<Bullet> for Projectile {
    fn from(bullet: Bullet) -> Self {
        Projectile::Bullet(bullet)
    }
}

impl From<ProjectileProperties> for Projectile {
    fn from(properties: ProjectileProperties) -> Self {
        Projectile::Generic(properties)
    }
}

impl From<BulletPreset> for Projectile {
    fn from(preset: BulletPreset) -> Self {
        Projectile::Bullet(Bullet::preset(preset))
    }
}

impl Projectile {
    pub fn is_bullet(&self) -> bool {
        matches!(self, Projectile::Bullet(_))
    }

    pub fn as_bullet(&self) -> Option<&Bullet> {
        match self {
            Projectile::Bullet(b) => Some(b),
            Projectile::Generic(_) => None,
        }
    }

    /// Length along the flight axis (m).
    pub fn length(&self) -> f64 {
        match self {
            Projectile::Bullet(b) => b.properties.length,
            Projectile::Generic(p) => p.length,
        }
    }

    /// Divisor applied to the resistance of struck material.
    pub fn penetration_multiplier(&self) -> f64 {
        match self {
            Projectile::Bullet(b) if b.properties.penetration_multiplier > 0.0 => b.properties.penetration_multiplier,
            _ => 1.0,
        }
    }

    pub fn has_variation(&self, variation: BulletVariation) -> bool {
        self.as_bullet().is_some_and(|b| b.has_variation(variation))
    }

    /// Length of the nose in contact with a target (m).
    pub fn contact_length(&self) -> f64 {
        match self {
            Projectile::Bullet(b) => b.properties.apparent_length,
            Projectile::Generic(p) => p.radius / 3.0,
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $p:ident => $e:expr) => {
        match $self {
            Projectile::Bullet($p) => $e,
            Projectile::Generic($p) => $e,
        }
    };
}

impl BallisticBody for Projectile {
    fn drag_coefficient(&self, speed: f64) -> f64 {
        dispatch!(self, p => p.drag_coefficient(speed))
    }

    fn drag_coefficient_3d(&self, local_velocity: DVec3) -> DVec3 {
        dispatch!(self, p => p.drag_coefficient_3d(local_velocity))
    }

    fn cross_sections(&self) -> DVec3 {
        dispatch!(self, p => p.cross_sections())
    }

    fn radius(&self) -> f64 {
        dispatch!(self, p => p.radius())
    }

    fn mass(&self) -> f64 {
        dispatch!(self, p => p.mass())
    }

    fn density(&self) -> f64 {
        dispatch!(self, p => p.density())
    }

    fn inertia(&self) -> DVec3 {
        dispatch!(self, p => p.inertia())
    }

    fn material(&self) -> SurfaceType {
        dispatch!(self, p => p.material())
    }

    fn shape_factor(&self) -> f64 {
        dispatch!(self, p => p.shape_factor())
    }

    fn on_deform(&mut self, impact_speed: f64, object: &BaseUnitProperties) {
        dispatch!(self, p => p.on_deform(impact_speed, object))
    }

    fn validate(&self) -> Result<()> {
        dispatch!(self, p => p.validate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_presets_are_valid() {
        for preset in [
            BulletPreset::Para9x19,
            BulletPreset::Nato762x51,
            BulletPreset::Nato762x51Ap,
            BulletPreset::Nato556x45,
            BulletPreset::Acp45,
            BulletPreset::Buckshot00,
        ] {
            let bullet = Bullet::preset(preset);
            assert!(bullet.validate().is_ok(), "{preset:?}");
            assert!(bullet.frontal_area() > 0.0);
            assert!(bullet.inertia().min_element() > 0.0);
        }
    }

    #[test]
    fn test_9mm_numbers() {
        let bullet = Bullet::preset(BulletPreset::Para9x19);
        assert_relative_eq!(bullet.mass(), 0.00745);
        assert_relative_eq!(bullet.radius(), 0.0045, epsilon = 1e-12);
        assert_relative_eq!(bullet.properties.coefficient_of_form(), 0.130 / 0.166, epsilon = 1e-12);
        // Radius dominates the apparent radius
        assert_relative_eq!(bullet.frontal_area(), PI * 0.0045 * 0.0045, epsilon = 1e-12);
        // Hemispherical nose
        assert_relative_eq!(bullet.shape_factor(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_drag_coefficient_scales_with_form() {
        let bullet = Bullet::preset(BulletPreset::Nato762x51);
        let cd = bullet.drag_coefficient(800.0);
        let g7 = crate::math::drag::g7_cd(800.0 / crate::math::constants::MACH_1);
        assert_relative_eq!(cd, g7 * 0.231 / 0.209, epsilon = 1e-12);

        let cd3 = bullet.drag_coefficient_3d(DVec3::new(800.0, 5.0, 0.0));
        assert_relative_eq!(cd3.x, cd, epsilon = 1e-12);
        assert!(cd3.y > 0.59 && cd3.y < 1.17);
        assert_eq!(cd3.y, cd3.z);
    }

    #[test]
    fn test_secant_ogive_is_sharper_than_hemisphere() {
        let rifle = Bullet::preset(BulletPreset::Nato762x51);
        let pistol = Bullet::preset(BulletPreset::Para9x19);
        assert!(rifle.shape_factor() < pistol.shape_factor());
    }

    #[test]
    fn test_buckshot_uses_sphere_curve() {
        let pellet = Bullet::preset(BulletPreset::Buckshot00);
        assert!(pellet.properties.is_spherical);
        let cd = pellet.drag_coefficient(350.0);
        assert!(cd > 0.2 && cd < 0.7, "cd {cd}");
        assert_eq!(pellet.shape_factor(), 0.5);
        assert!(pellet.properties.apparent_radius < pellet.radius());
    }

    #[test]
    fn test_generic_projectile_validation() {
        let ball = ProjectileProperties::sphere(0.02, 7800.0, SurfaceType::Steel);
        assert!(ball.validate().is_ok());
        assert_relative_eq!(ball.mass, 4.0 / 3.0 * PI * 0.02f64.powi(3) * 7800.0);

        let broken = ProjectileProperties { mass: 0.0, ..ball.clone() };
        assert!(broken.validate().is_err());
        let nan = ProjectileProperties { radius: f64::NAN, ..ball };
        assert!(Projectile::from(nan).validate().is_err());
    }

    #[test]
    fn test_deformation_conserves_mass_and_caps_radius() {
        let mut bullet = Bullet::preset(BulletPreset::Para9x19);
        let flesh = crate::materials::table::preset(SurfaceType::Flesh).in_base_units();
        let mass = bullet.mass();
        bullet.on_deform(360.0, &flesh);
        assert!(bullet.radius() > 0.0045);
        bullet.on_deform(360.0, &flesh);
        bullet.on_deform(360.0, &flesh);
        assert!(bullet.radius() <= 2.0 * 0.0045 + 1e-12);
        assert_eq!(bullet.mass(), mass);

        // Slow impact against a light target does nothing
        let mut slow = Bullet::preset(BulletPreset::Para9x19);
        let paper = crate::materials::table::preset(SurfaceType::Paper).in_base_units();
        slow.on_deform(20.0, &paper);
        assert_eq!(slow.radius(), 0.0045);
    }
}
