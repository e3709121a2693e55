//! Atmosphere model: pressure, density, humidity, viscosity and speed of
//! sound as functions of altitude and temperature.

use super::constants::*;
use super::units::{celsius_to_kelvin, kelvin_to_celsius, kpa_to_pa};
use super::map_range_clamped;
use crate::error::{BallisticsError, Result};

/// Saturation vapour pressure of water (kPa) at temperature `t` (°C).
///
/// Tetens form over water above freezing and over ice below it.
pub fn saturation_vapor_pressure(t: f64) -> f64 {
    if t >= 0.0 {
        0.61078 * (17.27 * t / (t + 237.3)).exp()
    } else {
        0.61078 * (21.875 * t / (t + 265.5)).exp()
    }
}

/// Density of (optionally humid) air.
///
/// # Arguments
/// * `pressure` - Absolute pressure (Pa)
/// * `temperature_k` - Absolute temperature (K)
/// * `rh` - Relative humidity in (0, 1]; anything else is treated as dry air
///
/// # Errors
/// [`BallisticsError::BadInput`] when `pressure <= 0` or `temperature_k <= 0`.
pub fn air_density(pressure: f64, temperature_k: f64, rh: f64) -> Result<f64> {
    if pressure <= 0.0 {
        return Err(BallisticsError::BadInput("pressure must be positive"));
    }
    if temperature_k <= 0.0 {
        return Err(BallisticsError::BadInput("absolute temperature must be positive"));
    }

    if rh > 0.0 && rh <= 1.0 {
        let pv = kpa_to_pa(saturation_vapor_pressure(kelvin_to_celsius(temperature_k)) * rh);
        let pd = pressure - pv;
        Ok(pd / (GAS_CONSTANT_DRY_AIR * temperature_k) + pv / (GAS_CONSTANT_WATER_VAPOR * temperature_k))
    } else {
        Ok(pressure / (GAS_CONSTANT_DRY_AIR * temperature_k))
    }
}

/// Barometric pressure (Pa) at altitude `h` (m).
///
/// `g` may be given with either sign (hosts usually report gravity as a
/// negative Z component); only its magnitude is used.
pub fn air_pressure_at_altitude(g: f64, h: f64, temperature_c: f64, p0: f64) -> f64 {
    let exponent = (-g.abs() * MOLAR_MASS_AIR * h) / (UNIVERSAL_GAS_CONSTANT * celsius_to_kelvin(temperature_c));
    p0 * exponent.exp()
}

/// Air density (kg/m³) at altitude, falling back to sea-level density when
/// the inputs produce a non-finite or invalid result.
pub fn air_density_at_altitude(g: f64, h: f64, temperature_c: f64, p0: f64, rh: f64) -> f64 {
    let pressure = air_pressure_at_altitude(g, h, temperature_c, p0);
    match air_density(pressure, celsius_to_kelvin(temperature_c), rh) {
        Ok(rho) if rho.is_finite() && rho > 0.0 => rho,
        _ => AIR_DENSITY,
    }
}

/// Relative humidity at altitude.
///
/// The vapour mixing ratio is conserved while the parcel rises, so the
/// vapour partial pressure scales with total pressure; the result is then
/// compared against saturation at the (colder) altitude temperature and
/// clamped to `[0, base_humidity]`.
///
/// # Arguments
/// * `g` - Gravity (m/s², either sign)
/// * `h` - Altitude above the reference (m)
/// * `base_temperature` - Temperature at the reference altitude (°C)
/// * `temperature` - Temperature at `h` (°C)
/// * `base_humidity` - Relative humidity at the reference altitude
/// * `p0` - Pressure at the reference altitude (Pa)
pub fn humidity_at_altitude(g: f64, h: f64, base_temperature: f64, temperature: f64, base_humidity: f64, p0: f64) -> f64 {
    let base = base_humidity.clamp(0.0, 1.0);
    if base >= 1.0 || base <= 0.0 || h <= 0.0 {
        return base;
    }

    let p0 = if p0 > 0.0 { p0 } else { SEA_LEVEL_PRESSURE };
    let pressure = air_pressure_at_altitude(g, h, temperature, p0);
    let base_vapor = saturation_vapor_pressure(base_temperature) * base;
    let vapor = base_vapor * (pressure / p0);
    let saturation = saturation_vapor_pressure(temperature);
    if saturation <= 0.0 || !saturation.is_finite() {
        return base;
    }

    (vapor / saturation).clamp(0.0, base)
}

/// Dynamic viscosity of air (Pa·s), Sutherland's law with a pressure
/// correction.
pub fn air_viscosity(temperature_c: f64, pressure: f64) -> f64 {
    const T0: f64 = 273.15;
    const C: f64 = 120.0;

    let t1 = temperature_c + T0;
    let mu = AIR_DYNAMIC_VISCOSITY * (T0 + C) / (t1 + C) * (t1 / T0).powf(1.5);
    if pressure > 0.0 {
        mu * (SEA_LEVEL_PRESSURE / pressure)
    } else {
        mu
    }
}

/// Heat capacity ratio (γ) of air at temperature `t` (°C).
pub fn heat_capacity_ratio(t: f64) -> f64 {
    if t < 0.0 {
        map_range_clamped(0.0, -15.0, 1.403, 1.404, t)
    } else {
        map_range_clamped(0.0, 1000.0, 1.403, 1.365, t)
    }
}

/// Speed of sound in air (m/s) at temperature `t` (°C).
pub fn speed_of_sound(t: f64) -> f64 {
    (celsius_to_kelvin(t) * heat_capacity_ratio(t) * GAS_CONSTANT_DRY_AIR).sqrt()
}

/// Reynolds number of a body of characteristic length `diameter` (m)
/// moving at `speed` (m/s) through a fluid.
pub fn reynolds_number(fluid_density: f64, dynamic_viscosity: f64, diameter: f64, speed: f64) -> f64 {
    if dynamic_viscosity <= 0.0 {
        return 0.0;
    }
    fluid_density * speed.abs() * diameter / dynamic_viscosity
}

/// Low-Reynolds correction of a drag coefficient.
pub fn reynolds_cd(reynolds: f64, cd: f64) -> f64 {
    if reynolds <= 0.0 {
        return cd;
    }
    cd / (cd / (std::f64::consts::PI * reynolds) + 1.0)
}
