//! Drag curves (G1, G7, sphere) and drag force helpers.
//!
//! The G-model curves are smooth analytic fits of the standard reference
//! tables, split at a transition Mach number. The sphere curve is a
//! three-region fit in a compressed Reynolds-number space.

use bevy::math::{DQuat, DVec3};

use super::constants::{AIR_DENSITY, MACH_1};
use crate::types::DragModel;

/// Drag coefficient of a sphere when no Reynolds number is available.
pub const SPHERE_CD: f64 = 0.47;

/// Transition Mach number of the G1 curve.
pub const G1_TRANSITION_MACH: f64 = 1.198;
/// Transition Mach number of the G7 curve.
pub const G7_TRANSITION_MACH: f64 = 1.018;

mod g1 {
    // Subsonic
    const A1: f64 = -0.637957;
    const B1: f64 = 8.02114;
    const C1: f64 = 6.62363;
    const D1: f64 = 0.887957;
    const N1: f64 = -0.75;

    // Supersonic
    const A2: f64 = 151.103604911;
    const B2: f64 = 1313.50068422;
    const C2: f64 = 0.497675503145;
    const D2: f64 = 8.46571089406;
    const N2: f64 = -0.199438891387;

    pub fn subsonic(mach: f64) -> f64 {
        N1 + A1 * mach.powf(B1) + mach.powf(C1) + D1.powf(mach)
    }

    pub fn supersonic(mach: f64) -> f64 {
        C2 + A2 / (B2 + mach.powf(D2)) - N2 * mach.powf(-4.0)
    }
}

mod g7 {
    // Supersonic
    const A1: f64 = 0.217877;
    const B1: f64 = 0.975364;
    const C1: f64 = -0.747357;
    const N1: f64 = 1.18208;

    // Subsonic
    const A2: f64 = 2.22098;
    const B2: f64 = -1.0134e-11;
    const C2: f64 = 1.908e11;
    const D2: f64 = 0.125;
    const N2: f64 = 23.8977;

    pub fn supersonic(mach: f64) -> f64 {
        A1 / mach.powf(N1) + B1.powf(mach) + C1
    }

    pub fn subsonic(mach: f64) -> f64 {
        A2 * mach.powf(N2) + B2 * C2.powf(mach) + D2
    }
}

mod sphere {
    const SCALING_FACTOR: f64 = 0.0600859;

    const A1: f64 = -2.50006166693;
    const B1: f64 = 1.00721623437;
    const C1: f64 = 0.79600185584;
    const D1: f64 = 3.47403874616;
    const F1: f64 = -0.146607907256;
    const G1: f64 = 2.67441459061;

    const REGION_2_START: f64 = 1.562;
    const A2: f64 = -3.5548304213e-8;
    const B2: f64 = 21.4299726796;
    const C2: f64 = 0.705502803231;
    const D2: f64 = -3.4696050421e-54;
    const F2: f64 = 5.9270619937e25;

    const REGION_3_START: f64 = 2.028;
    const A3: f64 = 4.81506451168e7;
    const B3: f64 = -10.628048444;
    const C3: f64 = 0.632906908083;
    const D3: f64 = 1.2308623e67;
    const F3: f64 = 3.4397202946e-34;
    const G3: f64 = -4.81415953863e7;
    const H3: f64 = -10.6277666902;

    fn region_1(re: f64) -> f64 {
        A1 * re.powf(B1) + D1.powf(re) + F1 * G1.powf(2.0 * re) + C1
    }

    fn region_2(re: f64) -> f64 {
        A2 * re.powf(B2) + D2 * F2.powf(re) + C2
    }

    fn region_3(re: f64) -> f64 {
        A3 * re.powf(B3) + D3 * F3.powf(re) + G3 * re.powf(H3) + C3
    }

    pub fn cd(reynolds: f64) -> f64 {
        let correction = 1.1 * reynolds.powf(-SCALING_FACTOR / 2.0);
        let re = reynolds.powf(SCALING_FACTOR).abs();
        let base = if re < REGION_2_START {
            region_1(re)
        } else if re < REGION_3_START {
            region_2(re)
        } else {
            region_3(re)
        };
        correction * base
    }
}

/// G1 drag coefficient at the given Mach number.
pub fn g1_cd(mach: f64) -> f64 {
    let mach = mach.abs();
    if mach < G1_TRANSITION_MACH {
        g1::subsonic(mach)
    } else {
        g1::supersonic(mach)
    }
}

/// G7 drag coefficient at the given Mach number.
pub fn g7_cd(mach: f64) -> f64 {
    let mach = mach.abs();
    if mach < G7_TRANSITION_MACH {
        g7::subsonic(mach)
    } else {
        g7::supersonic(mach)
    }
}

/// Drag coefficient of a sphere at the given Reynolds number.
///
/// Returns [`SPHERE_CD`] for non-positive Reynolds numbers.
pub fn sphere_cd(reynolds: f64) -> f64 {
    if reynolds <= 0.0 {
        return SPHERE_CD;
    }
    sphere::cd(reynolds)
}

/// Drag coefficient for a reference model.
///
/// # Arguments
/// * `model` - Reference curve
/// * `speed` - Speed in m/s (converted to Mach with a fixed speed of sound)
/// * `reynolds` - Reynolds number, only read by [`DragModel::Sphere`]
pub fn drag_coefficient(model: DragModel, speed: f64, reynolds: f64) -> f64 {
    match model {
        DragModel::G1 => g1_cd(speed / MACH_1),
        DragModel::G7 => g7_cd(speed / MACH_1),
        DragModel::Sphere => sphere_cd(reynolds),
    }
}

/// Magnitude of the drag force (N) on a body moving at `speed` with a
/// scalar coefficient.
///
/// Wind speed is absolute: a negative value opposes the motion.
pub fn drag_force(cd: f64, csa: f64, speed: f64, wind_speed: f64, fluid_density: Option<f64>) -> f64 {
    let rho = fluid_density.unwrap_or(AIR_DENSITY);
    0.5 * (speed + wind_speed).powi(2) * rho * csa * cd
}

/// Drag force vector (N) on a body with per-axis coefficients and areas.
///
/// `cd` and `csa` are given in the body frame (X forward). The force
/// opposes the velocity relative to the air on each body axis.
///
/// # Arguments
/// * `cd` - Drag coefficient per body axis
/// * `csa` - Cross-sectional area per body axis (m²)
/// * `air_velocity` - Velocity of the body relative to the air, world frame (m/s)
/// * `orientation` - Body-to-world rotation
/// * `fluid_density` - Density of the medium (kg/m³)
pub fn drag_force_3d(cd: DVec3, csa: DVec3, air_velocity: DVec3, orientation: DQuat, fluid_density: f64) -> DVec3 {
    let local = orientation.inverse() * air_velocity;
    let magnitude = 0.5 * fluid_density * local * local * csa * cd;
    let local_force = -local.signum() * magnitude;
    orientation * local_force
}
