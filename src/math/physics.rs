//! Elementary mechanics used by the integrator and the impact model.

use bevy::math::{DQuat, DVec3};

use super::constants::EARTH_ANGULAR_SPEED;
use super::sqr;

/// Kinetic energy (J) of a mass (kg) moving at `speed` (m/s).
#[inline]
pub fn kinetic_energy(mass: f64, speed: f64) -> f64 {
    0.5 * mass * sqr(speed)
}

/// Dynamic pressure (Pa) of a fluid of `density` flowing at `speed`.
#[inline]
pub fn dynamic_pressure(density: f64, speed: f64) -> f64 {
    0.5 * density * sqr(speed)
}

/// Speed (m/s) of a mass carrying `kinetic_energy`.
///
/// A negative energy yields a negative speed so energy deficits stay
/// visible to the caller.
pub fn velocity_from_kinetic_energy(kinetic_energy: f64, mass: f64) -> f64 {
    if mass <= 0.0 {
        return 0.0;
    }
    let v = (2.0 * kinetic_energy.abs() / mass).sqrt();
    v.copysign(kinetic_energy)
}

/// Froude number of a body of `radius` moving at `velocity` under `gravity`.
pub fn froude_number(radius: f64, velocity: f64, gravity: f64) -> f64 {
    velocity / (radius * gravity.abs()).sqrt()
}

/// Elastic strain energy density (J/m³) of a body compressed from
/// `original_length` to `deformed_length`.
pub fn elastic_deformation_energy(deformed_length: f64, original_length: f64, youngs_modulus: f64) -> f64 {
    let strain = (original_length - deformed_length) / original_length;
    0.5 * youngs_modulus * sqr(strain)
}

/// Terminal velocity (m/s) of a falling body.
pub fn terminal_velocity(mass: f64, gravity: f64, cd: f64, csa: f64, fluid_density: f64) -> f64 {
    if cd <= 0.0 || csa <= 0.0 || fluid_density <= 0.0 {
        return f64::INFINITY;
    }
    (2.0 * mass * gravity.abs() / (fluid_density * csa * cd)).sqrt()
}

/// Critical ricochet angle (degrees) for an impact on a fluid surface.
///
/// Both densities may use any unit as long as it is the same one.
pub fn fluid_critical_ricochet_angle(fluid_density: f64, object_density: f64) -> f64 {
    18.0 / (fluid_density / object_density).sqrt()
}

/// Speed after travelling `depth` through a fluid with exponential decay
/// constant `decay` (1/m).
pub fn velocity_in_fluid(initial_velocity: f64, decay: f64, depth: f64) -> f64 {
    initial_velocity * (-decay * depth).exp()
}

/// Nominal impact stress (Pa): energy spread over the struck volume.
///
/// # Arguments
/// * `kinetic_energy` - Energy at impact (J)
/// * `impact_area` - Contact area (m²)
/// * `impact_angle` - Angle between velocity and surface normal (radians)
/// * `thickness` - Object thickness along the normal (m)
pub fn impact_stress(kinetic_energy: f64, impact_area: f64, impact_angle: f64, thickness: f64) -> f64 {
    let mut cos_angle = impact_angle.cos();
    if cos_angle.abs() < 1e-6 {
        cos_angle = 1e-6;
    }
    kinetic_energy / (impact_area * thickness * cos_angle)
}

/// Impact stress (Pa) accounting for the stiffness of both bodies and the
/// fracture toughness of the target.
pub fn impact_stress_with_toughness(
    kinetic_energy: f64,
    impact_area: f64,
    impact_angle: f64,
    thickness: f64,
    object_e: f64,
    projectile_e: f64,
    object_kic: f64,
) -> f64 {
    let mut cos_angle = impact_angle.cos();
    if cos_angle.abs() < 1e-6 {
        cos_angle = 1e-6;
    }
    let denominator = (object_e + projectile_e) * thickness * (std::f64::consts::PI * impact_area * cos_angle).sqrt() / 2.0;
    kinetic_energy * object_kic / denominator
}

/// Coriolis acceleration (m/s²) of a body moving with `velocity` in a
/// local Z-up frame at `latitude` whose X axis points along `azimuth`
/// clockwise from north and whose Y axis points left of X (both angles in
/// radians).
///
/// `a = -2 Ω × v`, with Earth's spin `Ω` expressed in the local frame.
pub fn coriolis_acceleration(velocity: DVec3, latitude: f64, azimuth: f64) -> DVec3 {
    let (sin_lat, cos_lat) = latitude.sin_cos();
    let (sin_az, cos_az) = azimuth.sin_cos();
    let omega = DVec3::new(cos_lat * cos_az, cos_lat * sin_az, sin_lat) * EARTH_ANGULAR_SPEED;
    -2.0 * omega.cross(velocity)
}

/// Integrates an orientation by an angular velocity: `R' = R + ½(ω⊗R)dt`,
/// renormalized.
pub fn integrate_angular_velocity(rotation: DQuat, angular_velocity: DVec3, dt: f64) -> DQuat {
    let omega = DQuat::from_xyzw(angular_velocity.x, angular_velocity.y, angular_velocity.z, 0.0);
    let delta = (omega * rotation) * (0.5 * dt);
    let next = rotation + delta;
    if next.length_squared() <= f64::EPSILON {
        rotation
    } else {
        next.normalize()
    }
}

/// Converts power to work over a time step.
///
/// Kept with the historical `power / dt` form that existing call sites
/// were tuned against; returns 0 for non-positive `dt`.
pub fn convert_power_to_work(power: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        return 0.0;
    }
    power / dt
}

/// Absolute speed after doing `work` on a body already moving at `speed`.
#[deprecated(note = "returns an absolute speed, use `velocity_change_from_work` for the delta")]
pub fn velocity_from_work_legacy(work: f64, mass: f64, speed: f64) -> f64 {
    (2.0 * work + mass * sqr(speed)).sqrt() / mass.sqrt()
}

/// Change in speed (m/s) caused by doing `work` (J, negative to brake) on a
/// body of `mass` moving at `speed`.
pub fn velocity_change_from_work(work: f64, mass: f64, speed: f64) -> f64 {
    if mass <= 0.0 {
        return 0.0;
    }
    let final_energy = (kinetic_energy(mass, speed) + work).max(0.0);
    velocity_from_kinetic_energy(final_energy, mass) - speed
}

/// Peterson stress concentration factor for an oblique strike.
pub fn stress_concentration_factor(impact_angle_deg: f64) -> f64 {
    1.0 + 2.0 * (1.0 - (impact_angle_deg.to_radians() / 2.0).cos())
}
