//! Pure math kernel: constants, unit conversions, angle helpers and
//! geometry primitives shared by every other module.
//!
//! Everything in here is side-effect free and safe to call from worker
//! threads.

pub mod atmosphere;
pub mod drag;
pub mod lattice;
pub mod physics;

use bevy::math::DVec3;

/// Physical constants (SI units).
pub mod constants {
    /// Sea-level air density (kg/m³)
    pub const AIR_DENSITY: f64 = 1.225;
    /// Dynamic viscosity of air at sea level (Pa·s)
    pub const AIR_DYNAMIC_VISCOSITY: f64 = 1.789e-5;
    /// Density of fresh water (kg/m³)
    pub const WATER_DENSITY: f64 = 1000.0;
    /// Dynamic viscosity of water at 20 °C (Pa·s)
    pub const WATER_DYNAMIC_VISCOSITY: f64 = 1.0e-3;
    /// Molar mass of dry air (kg/mol)
    pub const MOLAR_MASS_AIR: f64 = 0.0289644;
    /// Universal gas constant (J/(mol·K))
    pub const UNIVERSAL_GAS_CONSTANT: f64 = 8.31432;
    /// Specific gas constant of dry air (J/(kg·K))
    pub const GAS_CONSTANT_DRY_AIR: f64 = 287.0500676;
    /// Specific gas constant of water vapour (J/(kg·K))
    pub const GAS_CONSTANT_WATER_VAPOR: f64 = 461.495;
    /// Standard sea-level pressure (Pa)
    pub const SEA_LEVEL_PRESSURE: f64 = 101_325.0;
    /// Speed of sound used to express drag-curve inputs as Mach numbers (m/s)
    pub const MACH_1: f64 = 343.0;
    /// Sidereal angular speed of the Earth (rad/s)
    pub const EARTH_ANGULAR_SPEED: f64 = 7.2921159e-5;
    /// Standard gravity (m/s²)
    pub const STANDARD_GRAVITY: f64 = 9.80665;
}

/// Unit conversions. Names read `from_to`.
pub mod units {
    pub const CM_PER_M: f64 = 100.0;

    #[inline]
    pub fn cm_to_m(cm: f64) -> f64 {
        cm / CM_PER_M
    }

    #[inline]
    pub fn m_to_cm(m: f64) -> f64 {
        m * CM_PER_M
    }

    #[inline]
    pub fn celsius_to_kelvin(c: f64) -> f64 {
        c + 273.15
    }

    #[inline]
    pub fn kelvin_to_celsius(k: f64) -> f64 {
        k - 273.15
    }

    #[inline]
    pub fn kpa_to_pa(kpa: f64) -> f64 {
        kpa * 1.0e3
    }

    #[inline]
    pub fn pa_to_kpa(pa: f64) -> f64 {
        pa / 1.0e3
    }

    #[inline]
    pub fn mpa_to_pa(mpa: f64) -> f64 {
        mpa * 1.0e6
    }

    #[inline]
    pub fn gpa_to_pa(gpa: f64) -> f64 {
        gpa * 1.0e9
    }

    /// g/cm³ to kg/m³.
    #[inline]
    pub fn g_cm3_to_kg_m3(density: f64) -> f64 {
        density * 1.0e3
    }

    #[inline]
    pub fn kg_to_grains(kg: f64) -> f64 {
        15_432.358_352_9 * kg
    }
}

/// Squares a value.
#[inline]
pub fn sqr(x: f64) -> f64 {
    x * x
}

/// Normalizes an angle in degrees to the range (-180, 180].
pub fn normalize_angle_deg(angle: f64) -> f64 {
    let mut a = angle % 360.0;
    if a <= -180.0 {
        a += 360.0;
    } else if a > 180.0 {
        a -= 360.0;
    }
    a
}

/// Folds an angle in degrees into [-90, 90] by reflecting about ±90.
pub fn normalize_angle_90(angle: f64) -> f64 {
    let a = normalize_angle_deg(angle);
    if a > 90.0 {
        180.0 - a
    } else if a < -90.0 {
        -180.0 - a
    } else {
        a
    }
}

/// Linearly maps `value` from `[in_a, in_b]` to `[out_a, out_b]`, clamping
/// to the output range.
pub fn map_range_clamped(in_a: f64, in_b: f64, out_a: f64, out_b: f64, value: f64) -> f64 {
    if (in_b - in_a).abs() < f64::EPSILON {
        return out_a;
    }
    let t = ((value - in_a) / (in_b - in_a)).clamp(0.0, 1.0);
    out_a + (out_b - out_a) * t
}

/// Angle of impact in degrees measured from the surface plane.
///
/// 90° is a head-on impact, 0° a grazing one. The result is always in
/// [0, 90] regardless of which side of the surface the normal points to.
///
/// # Arguments
/// * `normal` - Surface normal at the impact point
/// * `velocity` - Projectile velocity at impact
pub fn impact_angle_deg(normal: DVec3, velocity: DVec3) -> f64 {
    let n = normal.normalize_or_zero();
    let v = velocity.normalize_or_zero();
    if n == DVec3::ZERO || v == DVec3::ZERO {
        return 0.0;
    }
    let from_normal = (-n).dot(v).clamp(-1.0, 1.0).acos().to_degrees();
    normalize_angle_90(90.0 - from_normal).abs()
}

/// Closest point to `point` on the infinite line through `origin` with
/// direction `direction` (unit length).
pub fn closest_point_on_line(origin: DVec3, direction: DVec3, point: DVec3) -> DVec3 {
    origin + direction * (point - origin).dot(direction)
}

/// Closest point to `point` on the segment `[a, b]`.
pub fn closest_point_on_segment(a: DVec3, b: DVec3, point: DVec3) -> DVec3 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f64::EPSILON {
        return a;
    }
    let t = ((point - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Reflects `v` about the plane with normal `n`.
pub fn mirror(v: DVec3, n: DVec3) -> DVec3 {
    let n = n.normalize_or_zero();
    v - 2.0 * v.dot(n) * n
}

/// True when two vectors are equal component-wise within `tolerance`.
pub fn vec_equals(a: DVec3, b: DVec3, tolerance: f64) -> bool {
    (a - b).abs().max_element() <= tolerance
}

/// Rejects NaN and infinite components.
pub fn is_finite_vec(v: DVec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}
