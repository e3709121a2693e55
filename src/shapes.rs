//! Projectile shape model: ogive and elliptical noses on a cylindrical body.
//!
//! All lengths are in meters and densities in kg/m³. The body frame has its
//! origin at the base of the projectile with X pointing towards the tip.
//! Nose profiles are parameterised by the axial distance `x` from the nose
//! base (`x = 0`, full radius) to the tip (`x = length`, zero radius).

use std::f64::consts::PI;

use bevy::math::DVec3;
use serde::{Deserialize, Serialize};

use crate::math::sqr;

/// Number of slices used for numeric profile integration.
const PROFILE_STEPS: usize = 1000;

/// Drag coefficient of an ogive profile presented side-on.
const OGIVE_SIDE_CD: f64 = 0.59;

/// Right circular cylinder.
///
/// # Fields
/// * `radius` - Radius (m)
/// * `length` - Length along the axis (m)
/// * `density` - Material density (kg/m³)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cylinder {
    pub radius: f64,
    pub length: f64,
    pub density: f64,
}

impl Default for Cylinder {
    fn default() -> Self {
        Self {
            radius: 0.005,
            length: 0.01,
            density: 11_340.0,
        }
    }
}

impl Cylinder {
    pub fn new(radius: f64, length: f64, density: f64) -> Self {
        Self { radius, length, density }
    }

    pub fn volume(&self) -> f64 {
        PI * sqr(self.radius) * self.length
    }

    pub fn mass(&self) -> f64 {
        self.volume() * self.density
    }

    /// Lateral surface plus the base disc.
    pub fn surface_area(&self) -> f64 {
        2.0 * PI * self.radius * self.length + PI * sqr(self.radius)
    }

    pub fn frontal_csa(&self) -> f64 {
        PI * sqr(self.radius)
    }

    /// Projected area seen side-on.
    pub fn side_csa(&self) -> f64 {
        2.0 * self.radius * self.length
    }

    /// Side-on drag coefficient.
    pub fn cd(&self) -> f64 {
        1.17
    }

    /// End-on drag coefficient.
    pub fn frontal_cd(&self) -> f64 {
        1.15
    }

    /// Principal moments of inertia about the centre of mass for `mass`,
    /// `(axial, transverse, transverse)`.
    pub fn inertia(&self, mass: f64) -> DVec3 {
        let axial = mass * sqr(self.radius) / 2.0;
        let transverse = mass * (3.0 * sqr(self.radius) + sqr(self.length)) / 12.0;
        DVec3::new(axial, transverse, transverse)
    }
}

/// Integrals of a solid of revolution, per unit density.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProfileIntegrals {
    /// ∫πr² dx
    pub volume: f64,
    /// ∫πr²x dx
    pub first_moment: f64,
    /// ∫½πr⁴ dx, the axial moment of inertia
    pub axial_inertia: f64,
    /// ∫(¼πr⁴ + πr²x²) dx, transverse inertia about the base plane
    pub transverse_inertia_at_base: f64,
    /// Lateral surface area
    pub surface_area: f64,
    /// ∫2r dx, projected side area
    pub side_area: f64,
}

impl ProfileIntegrals {
    /// Integrates a profile with frustum slices.
    pub fn integrate(length: f64, radius_at: impl Fn(f64) -> f64) -> Self {
        let dx = length / PROFILE_STEPS as f64;
        let mut out = ProfileIntegrals::default();
        let mut r1 = radius_at(0.0);
        for i in 0..PROFILE_STEPS {
            let x1 = i as f64 * dx;
            let x2 = x1 + dx;
            let r2 = radius_at(x2).max(0.0);
            let mid_x = x1 + dx / 2.0;
            let mid_r = radius_at(mid_x).max(0.0);

            out.volume += PI / 3.0 * (sqr(r1) + r1 * r2 + sqr(r2)) * dx;
            out.surface_area += PI * (r1 + r2) * (sqr(r1 - r2) + sqr(dx)).sqrt();
            out.side_area += (r1 + r2) * dx;

            let slice_area = PI * sqr(mid_r);
            out.first_moment += slice_area * mid_x * dx;
            out.axial_inertia += 0.5 * PI * mid_r.powi(4) * dx;
            out.transverse_inertia_at_base += (0.25 * PI * mid_r.powi(4) + slice_area * sqr(mid_x)) * dx;

            r1 = r2;
        }
        out
    }

    /// Distance of the centroid from the base.
    pub fn centroid(&self) -> f64 {
        if self.volume <= 0.0 {
            0.0
        } else {
            self.first_moment / self.volume
        }
    }
}

/// Ogive nose, tangent or secant.
///
/// # Fields
/// * `radius` - Base radius of the nose (m)
/// * `length` - Axial length of the nose (m)
/// * `ogive_radius` - Radius of the generating arc (m)
///
/// # Example
/// ```
/// use terminal_ballistics::shapes::Ogive;
///
/// let nose = Ogive::tangent(0.0045, 0.0045);
/// assert!(nose.is_tangent());
/// assert!((nose.radius_at(0.0) - 0.0045).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ogive {
    pub radius: f64,
    pub length: f64,
    pub ogive_radius: f64,
}

impl Ogive {
    /// Tangent ogive: the generating arc meets the body without a kink.
    pub fn tangent(radius: f64, length: f64) -> Self {
        Self {
            radius,
            length,
            ogive_radius: Self::tangent_radius(radius, length),
        }
    }

    /// Ogive with an explicit arc radius. Radii smaller than the tangent
    /// radius cannot close the profile and are raised to it.
    pub fn with_ogive_radius(radius: f64, length: f64, ogive_radius: f64) -> Self {
        Self {
            radius,
            length,
            ogive_radius: ogive_radius.max(Self::tangent_radius(radius, length)),
        }
    }

    fn tangent_radius(radius: f64, length: f64) -> f64 {
        (sqr(radius) + sqr(length)) / (2.0 * radius)
    }

    /// `2R·ρ − L² = R²` within a relative tolerance.
    pub fn is_tangent(&self) -> bool {
        let lhs = 2.0 * self.radius * self.ogive_radius - sqr(self.length);
        (lhs - sqr(self.radius)).abs() <= 1e-6 * sqr(self.radius)
    }

    /// Secant offset angle α (radians).
    fn secant_alpha(&self) -> f64 {
        let chord = (sqr(self.length) + sqr(self.radius)).sqrt();
        (chord / (2.0 * self.ogive_radius)).clamp(-1.0, 1.0).acos() - (self.radius / self.length).atan()
    }

    /// Profile radius at axial distance `x` from the nose base.
    #[inline]
    pub fn radius_at(&self, x: f64) -> f64 {
        let x = x.clamp(0.0, self.length);
        let or = self.ogive_radius;
        if self.is_tangent() {
            ((sqr(or) - sqr(x)).max(0.0)).sqrt() + self.radius - or
        } else {
            let alpha = self.secant_alpha();
            let from_tip = self.length - x;
            ((sqr(or) - sqr(or * alpha.cos() - from_tip)).max(0.0)).sqrt() - or * alpha.sin()
        }
        .max(0.0)
    }

    /// Half-angle (radians) of the profile at the tip.
    pub fn tip_half_angle(&self) -> f64 {
        let h = self.length * 1e-4;
        let slope = (self.radius_at(self.length - h) - self.radius_at(self.length)) / h;
        slope.atan()
    }

    /// Calibre radius head, ψ = ρ / 2R.
    pub fn caliber_radius_head(&self) -> f64 {
        self.ogive_radius / (2.0 * self.radius)
    }

    /// Closed-form integrals of a tangent ogive of unit base radius with
    /// `f = ρ/R` (so its length is `λ = √(2f − 1)`).
    fn unit_tangent_integrals(f: f64) -> (f64, f64, f64, f64) {
        let lambda = (2.0 * f - 1.0).max(0.0).sqrt();
        let g = f - 1.0;
        let c = -g;
        let asin = (lambda / f).clamp(-1.0, 1.0).asin();

        let volume = PI * ((sqr(f) - sqr(lambda) / 3.0) * lambda - sqr(f) * g * asin);
        let first_moment = PI
            * (-(2.0 / 3.0) * g * (f.powi(3) - g.powi(3)) + 0.5 * (sqr(f) + sqr(g)) * sqr(lambda)
                - 0.25 * lambda.powi(4));

        let s1 = 0.5 * (lambda * g + sqr(f) * asin);
        let s2 = sqr(f) * lambda - lambda.powi(3) / 3.0;
        let s3 = lambda * g.powi(3) / 4.0 + 3.0 * sqr(f) * lambda * g / 8.0 + 3.0 * f.powi(4) * asin / 8.0;
        let s4 = f.powi(4) * lambda - 2.0 * sqr(f) * lambda.powi(3) / 3.0 + lambda.powi(5) / 5.0;
        let axial = PI / 2.0 * (s4 + 4.0 * c * s3 + 6.0 * sqr(c) * s2 + 4.0 * c.powi(3) * s1 + c.powi(4) * lambda);

        let transverse_at_base = PI / 4.0
            * (sqr(f) * (sqr(f) + 3.5 * sqr(g)) * lambda + lambda.powi(5) / 15.0
                - sqr(f) * g * (2.5 * sqr(f) + 2.0 * sqr(g)) * asin);

        (volume, first_moment, axial, transverse_at_base)
    }

    /// Volume, moments and areas of the nose.
    pub fn integrals(&self) -> ProfileIntegrals {
        let mut out = ProfileIntegrals::integrate(self.length, |x| self.radius_at(x));
        if self.is_tangent() {
            let r = self.radius;
            let (v, m1, axial, transverse) = Self::unit_tangent_integrals(self.ogive_radius / r);
            out.volume = v * r.powi(3);
            out.first_moment = m1 * r.powi(4);
            out.axial_inertia = axial * r.powi(5);
            out.transverse_inertia_at_base = transverse * r.powi(5);
        }
        out
    }
}

/// Half-spheroid nose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EllipticalNose {
    pub radius: f64,
    pub length: f64,
}

impl EllipticalNose {
    pub fn new(radius: f64, length: f64) -> Self {
        Self { radius, length }
    }

    #[inline]
    pub fn radius_at(&self, x: f64) -> f64 {
        let x = x.clamp(0.0, self.length);
        self.radius * (1.0 - sqr(x) / sqr(self.length)).max(0.0).sqrt()
    }

    pub fn volume(&self) -> f64 {
        2.0 / 3.0 * PI * self.length * sqr(self.radius)
    }

    /// Curved surface of the half-spheroid.
    pub fn surface_area(&self) -> f64 {
        let a = self.radius;
        let c = self.length;
        if (c - a).abs() < 1e-12 {
            2.0 * PI * sqr(a)
        } else if c > a {
            let e = (1.0 - sqr(a) / sqr(c)).sqrt();
            PI * sqr(a) * (1.0 + c / (a * e) * e.asin())
        } else {
            let e = (1.0 - sqr(c) / sqr(a)).sqrt();
            PI * sqr(a) + PI * sqr(c) / (2.0 * e) * ((1.0 + e) / (1.0 - e)).ln()
        }
    }

    pub fn integrals(&self) -> ProfileIntegrals {
        let mut out = ProfileIntegrals::integrate(self.length, |x| self.radius_at(x));
        out.volume = self.volume();
        out.surface_area = self.surface_area();
        out
    }
}

/// Nose variant of a bullet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Nose {
    Ogive(Ogive),
    Elliptical(EllipticalNose),
}

impl Nose {
    #[inline]
    pub fn radius_at(&self, x: f64) -> f64 {
        match self {
            Nose::Ogive(o) => o.radius_at(x),
            Nose::Elliptical(e) => e.radius_at(x),
        }
    }

    pub fn radius(&self) -> f64 {
        match self {
            Nose::Ogive(o) => o.radius,
            Nose::Elliptical(e) => e.radius,
        }
    }

    pub fn length(&self) -> f64 {
        match self {
            Nose::Ogive(o) => o.length,
            Nose::Elliptical(e) => e.length,
        }
    }

    pub fn integrals(&self) -> ProfileIntegrals {
        match self {
            Nose::Ogive(o) => o.integrals(),
            Nose::Elliptical(e) => e.integrals(),
        }
    }

    /// Calibre radius head of the nose, or of the equivalent tangent ogive.
    pub fn caliber_radius_head(&self) -> f64 {
        match self {
            Nose::Ogive(o) => o.caliber_radius_head(),
            Nose::Elliptical(e) => Ogive::tangent(e.radius, e.length).caliber_radius_head(),
        }
    }

    /// Nose shape factor for cavity-expansion penetration,
    /// `(8ψ − 1) / 24ψ²`, capped at the hemispherical value.
    pub fn penetration_shape_factor(&self) -> f64 {
        let psi = self.caliber_radius_head().max(0.5);
        ((8.0 * psi - 1.0) / (24.0 * sqr(psi))).min(0.5)
    }

    pub fn tip_half_angle(&self) -> f64 {
        match self {
            Nose::Ogive(o) => o.tip_half_angle(),
            Nose::Elliptical(_) => std::f64::consts::FRAC_PI_2,
        }
    }
}

/// Full bullet geometry: a nose on a cylindrical body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BulletShape {
    pub nose: Nose,
    pub body: Cylinder,
}

/// Mass properties of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MassProperties {
    pub mass: f64,
    pub volume: f64,
    /// Distance of the centre of mass from the base along X (m)
    pub center_of_mass: f64,
    /// Principal moments (axial, transverse, transverse) about the centre of mass
    pub inertia: DVec3,
}

impl BulletShape {
    pub fn new(nose: Nose, body: Cylinder) -> Self {
        Self { nose, body }
    }

    pub fn length(&self) -> f64 {
        self.body.length + self.nose.length()
    }

    pub fn surface_area(&self) -> f64 {
        self.nose.integrals().surface_area + self.body.surface_area()
    }

    /// Projected side area of the whole bullet.
    pub fn side_csa(&self) -> f64 {
        self.nose.integrals().side_area + self.body.side_csa()
    }

    /// Side-on drag coefficient: the nose and body coefficients weighted by
    /// their projected side areas.
    pub fn side_cd(&self) -> f64 {
        let nose_area = self.nose.integrals().side_area;
        let body_area = self.body.side_csa();
        let total = nose_area + body_area;
        if total <= 0.0 {
            return self.body.cd();
        }
        (nose_area * OGIVE_SIDE_CD + body_area * self.body.cd()) / total
    }

    /// Mass, centre of mass and inertia tensor diagonal.
    pub fn mass_properties(&self) -> MassProperties {
        let density = self.body.density;
        let nose = self.nose.integrals();
        let body_length = self.body.length;

        let body_mass = self.body.mass();
        let body_com = body_length / 2.0;

        let nose_mass = nose.volume * density;
        let nose_com = body_length + nose.centroid();

        let mass = body_mass + nose_mass;
        if mass <= 0.0 {
            return MassProperties::default();
        }
        let com = (body_mass * body_com + nose_mass * nose_com) / mass;

        let body_inertia = self.body.inertia(body_mass);
        let axial = body_inertia.x + nose.axial_inertia * density;

        // Nose transverse inertia about its own centroid, then shifted.
        let nose_transverse_own = nose.transverse_inertia_at_base * density - nose_mass * sqr(nose.centroid());
        let transverse = body_inertia.y
            + body_mass * sqr(body_com - com)
            + nose_transverse_own
            + nose_mass * sqr(nose_com - com);

        MassProperties {
            mass,
            volume: self.body.volume() + nose.volume,
            center_of_mass: com,
            inertia: DVec3::new(axial, transverse, transverse),
        }
    }
}
