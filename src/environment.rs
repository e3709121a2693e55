//! Atmosphere snapshots.
//!
//! A task copies an [`EnvironmentSnapshot`] out of the engine when it starts
//! and evaluates everything altitude-dependent from that value, so worker
//! threads never touch shared state while integrating.

use bevy::math::DVec3;

use crate::math::atmosphere::{
    air_density_at_altitude, air_pressure_at_altitude, air_viscosity, humidity_at_altitude, speed_of_sound,
};
use crate::math::map_range_clamped;
use crate::resources::BallisticsEnvironment;
use crate::scene::SceneQuery;

/// Temperature lapse rate of dry air (°C per km).
pub const DRY_LAPSE_RATE: f64 = 9.8;
/// Temperature lapse rate of saturated air (°C per km).
pub const SATURATED_LAPSE_RATE: f64 = 5.0;

/// Air properties at one altitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtmosphereSample {
    pub temperature: f64,
    pub pressure: f64,
    pub humidity: f64,
    pub density: f64,
    pub speed_of_sound: f64,
    pub viscosity: f64,
}

/// Immutable copy of the world atmosphere taken when a task starts.
///
/// # Fields
/// * `altitude` - Altitude of the world origin (m)
/// * `temperature` - Temperature at the world origin (°C)
/// * `humidity` - Relative humidity at the world origin
/// * `pressure` - Sea-level pressure (Pa)
/// * `gravity_z` - Gravity along world Z (m/s²)
/// * `latitude` - Latitude (radians)
/// * `azimuth` - Bearing of world X from north (radians)
/// * `wind` - Fallback wind (m/s)
/// * `wind_speed_multiplier` - Combined wind multiplier
/// * `air_density` - Air density at the world origin (kg/m³)
/// * `speed_of_sound` - Speed of sound at the world origin (m/s)
/// * `dynamic_viscosity` - Air viscosity at the world origin (Pa·s)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentSnapshot {
    pub altitude: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub gravity_z: f64,
    pub latitude: f64,
    pub azimuth: f64,
    pub wind: DVec3,
    pub wind_speed_multiplier: f64,
    pub air_density: f64,
    pub speed_of_sound: f64,
    pub dynamic_viscosity: f64,
}

impl Default for EnvironmentSnapshot {
    fn default() -> Self {
        BallisticsEnvironment::default().snapshot()
    }
}

impl BallisticsEnvironment {
    /// Takes a value snapshot with the origin air properties precomputed.
    pub fn snapshot(&self) -> EnvironmentSnapshot {
        let humidity = self.humidity.clamp(0.0, 1.0);
        let base_pressure = air_pressure_at_altitude(self.gravity_z, self.altitude, self.temperature, self.pressure);
        EnvironmentSnapshot {
            altitude: self.altitude,
            temperature: self.temperature,
            humidity,
            pressure: self.pressure,
            gravity_z: self.gravity_z,
            latitude: self.latitude.to_radians(),
            azimuth: self.azimuth.to_radians(),
            wind: self.wind,
            wind_speed_multiplier: self.wind_speed_multiplier,
            air_density: air_density_at_altitude(self.gravity_z, self.altitude, self.temperature, self.pressure, humidity),
            speed_of_sound: speed_of_sound(self.temperature),
            dynamic_viscosity: air_viscosity(self.temperature, base_pressure),
        }
    }
}

impl EnvironmentSnapshot {
    /// Replaces gravity, typically with the value the scene reports.
    pub fn with_gravity_z(mut self, gravity_z: f64) -> Self {
        self.gravity_z = gravity_z;
        self
    }

    /// Scales every wind sample by an extra factor.
    pub fn with_wind_multiplier(mut self, multiplier: f64) -> Self {
        self.wind_speed_multiplier *= multiplier;
        self
    }

    /// Lapse rate in °C per metre, interpolated between dry and saturated
    /// air by the base humidity.
    pub fn lapse_rate(&self) -> f64 {
        map_range_clamped(0.0, 1.0, DRY_LAPSE_RATE, SATURATED_LAPSE_RATE, self.humidity) / 1000.0
    }

    /// Temperature (°C) at world height `z` (m).
    pub fn temperature_at(&self, z: f64) -> f64 {
        self.temperature - self.lapse_rate() * z
    }

    /// Air properties at world height `z` (m).
    pub fn sample(&self, z: f64) -> AtmosphereSample {
        if z.abs() < 1e-3 {
            return AtmosphereSample {
                temperature: self.temperature,
                pressure: air_pressure_at_altitude(self.gravity_z, self.altitude, self.temperature, self.pressure),
                humidity: self.humidity,
                density: self.air_density,
                speed_of_sound: self.speed_of_sound,
                viscosity: self.dynamic_viscosity,
            };
        }

        let temperature = self.temperature_at(z);
        let altitude = self.altitude + z;
        let base_pressure = air_pressure_at_altitude(self.gravity_z, self.altitude, self.temperature, self.pressure);
        let pressure = air_pressure_at_altitude(self.gravity_z, altitude, temperature, self.pressure);
        let humidity = humidity_at_altitude(self.gravity_z, z, self.temperature, temperature, self.humidity, base_pressure);
        AtmosphereSample {
            temperature,
            pressure,
            humidity,
            density: air_density_at_altitude(self.gravity_z, altitude, temperature, self.pressure, humidity),
            speed_of_sound: speed_of_sound(temperature),
            viscosity: air_viscosity(temperature, pressure),
        }
    }

    /// Wind velocity (m/s) at `position`, from the scene when it reports
    /// one and the snapshot's fallback wind otherwise.
    pub fn wind_at(&self, scene: &dyn SceneQuery, position: DVec3) -> DVec3 {
        let wind = match scene.wind_at(position) {
            Some(sample) => sample.velocity(),
            None => self.wind,
        };
        let wind = wind * self.wind_speed_multiplier;
        if crate::math::is_finite_vec(wind) {
            wind
        } else {
            DVec3::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::constants::AIR_DENSITY;
    use crate::scene::{AnalyticScene, WindSample};
    use approx::assert_relative_eq;

    #[test]
    fn test_snapshot_precomputes_origin_air() {
        let snapshot = BallisticsEnvironment::default().snapshot();
        assert!(snapshot.air_density > 1.2 && snapshot.air_density < 1.26);
        assert_relative_eq!(snapshot.latitude, 45f64.to_radians());
        assert!(snapshot.speed_of_sound > 330.0 && snapshot.speed_of_sound < 345.0);
        assert!(snapshot.dynamic_viscosity > 1.6e-5 && snapshot.dynamic_viscosity < 1.9e-5);
    }

    #[test]
    fn test_lapse_rate_follows_humidity() {
        let dry = BallisticsEnvironment::default().with_humidity(0.0).snapshot();
        let wet = BallisticsEnvironment::default().with_humidity(1.0).snapshot();
        assert_relative_eq!(dry.lapse_rate(), 0.0098);
        assert_relative_eq!(wet.lapse_rate(), 0.005);
        assert_relative_eq!(dry.temperature_at(1000.0), 10.0 - 9.8, epsilon = 1e-9);
    }

    #[test]
    fn test_air_thins_with_height() {
        let snapshot = BallisticsEnvironment::default().snapshot();
        let low = snapshot.sample(0.0);
        let high = snapshot.sample(2000.0);
        assert!(high.density < low.density);
        assert!(high.pressure < low.pressure);
        assert!(high.humidity <= snapshot.humidity);
        assert!(high.temperature < low.temperature);
    }

    #[test]
    fn test_base_altitude_lowers_density() {
        let snapshot = BallisticsEnvironment::default().with_altitude(1500.0).snapshot();
        assert!(snapshot.air_density < AIR_DENSITY);
    }

    #[test]
    fn test_wind_prefers_scene_sample() {
        let snapshot = BallisticsEnvironment::default()
            .with_wind(DVec3::new(0.0, 3.0, 0.0))
            .snapshot()
            .with_wind_multiplier(2.0);
        let calm = AnalyticScene::new();
        assert_eq!(snapshot.wind_at(&calm, DVec3::ZERO), DVec3::new(0.0, 6.0, 0.0));

        let windy = AnalyticScene::new().with_wind(WindSample {
            direction: DVec3::X,
            speed: 5.0,
            ..Default::default()
        });
        assert_eq!(snapshot.wind_at(&windy, DVec3::ZERO), DVec3::new(10.0, 0.0, 0.0));
    }
}
