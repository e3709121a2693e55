//! Global resources for the ballistics system.

use bevy::prelude::*;

use crate::types::ExitCodeLogFilter;

/// How much of the atmosphere model the integrator evaluates.
///
/// # Variants
/// * `Basic` - Scalar drag with sea-level air
/// * `Atmospheric` - Scalar drag with air density at the projectile's altitude
/// * `Wind` - Atmospheric drag relative to the local wind
/// * `Wind3D` - Per-axis drag relative to the local wind
/// * `Complex` - Per-axis drag, altitude, wind and Coriolis acceleration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
pub enum DragComplexity {
    Basic,
    Atmospheric,
    Wind,
    Wind3D,
    #[default]
    Complex,
}

impl DragComplexity {
    pub fn uses_altitude(&self) -> bool {
        !matches!(self, DragComplexity::Basic)
    }

    pub fn uses_wind(&self) -> bool {
        matches!(self, DragComplexity::Wind | DragComplexity::Wind3D | DragComplexity::Complex)
    }

    pub fn uses_3d_drag(&self) -> bool {
        matches!(self, DragComplexity::Wind3D | DragComplexity::Complex)
    }

    pub fn uses_coriolis(&self) -> bool {
        matches!(self, DragComplexity::Complex)
    }
}

/// Global configuration for the ballistics engine.
///
/// # Fields
/// * `min_penetration_depth` - Bodies thinner than this (cm) are passed through without penetration physics
/// * `max_penetrations` - Maximum number of bodies penetrated in one impact chain
/// * `max_simulation_duration` - Simulated seconds after which a flight is cut off (plus one second of grace)
/// * `max_substep` - Longest integration step (s)
/// * `wind_speed_multiplier` - Scales every wind sample
/// * `fly_by_trace_radius` - Radius of the fly-by capsule (cm)
/// * `trace_channel` - Default scene-query channel for projectiles
/// * `enable_ricochets` - Master switch for ricochets
/// * `enable_bullet_ricochets` - Allows bullets to ricochet
/// * `enable_projectile_ricochets` - Allows generic projectiles to ricochet
/// * `enable_bullet_deformation` - Lets bullets expand after impacts
/// * `ignore_impact_events_with_invalid_data` - Drop (true) or flag (false) events whose data went stale
/// * `ricochet_global_angle_cutoff` - No ricochet above this impact angle (degrees)
/// * `ricochet_energy_ratio_threshold` - Kinetic energy must be at least this multiple of the imparted energy to ricochet
/// * `drag_complexity` - Atmosphere model used by the integrator
/// * `exit_code_log_filter` - Which task kinds log their exit code
///
/// # Example
/// ```
/// use terminal_ballistics::resources::BallisticsConfig;
///
/// let config = BallisticsConfig::default()
///     .with_max_penetrations(4)
///     .with_ricochets(false);
/// assert_eq!(config.max_penetrations, 4);
/// assert!(!config.enable_ricochets);
/// ```
#[derive(Resource, Reflect, Clone, Debug)]
#[reflect(Resource)]
pub struct BallisticsConfig {
    pub min_penetration_depth: f64,
    pub max_penetrations: u32,
    pub max_simulation_duration: f64,
    pub max_substep: f64,
    pub wind_speed_multiplier: f64,
    pub fly_by_trace_radius: f64,
    pub trace_channel: u8,
    pub enable_ricochets: bool,
    pub enable_bullet_ricochets: bool,
    pub enable_projectile_ricochets: bool,
    pub enable_bullet_deformation: bool,
    pub ignore_impact_events_with_invalid_data: bool,
    pub ricochet_global_angle_cutoff: f64,
    pub ricochet_energy_ratio_threshold: f64,
    pub drag_complexity: DragComplexity,
    pub exit_code_log_filter: ExitCodeLogFilter,
}

impl Default for BallisticsConfig {
    fn default() -> Self {
        Self {
            min_penetration_depth: 0.1,
            max_penetrations: 8,
            max_simulation_duration: 10.0,
            max_substep: 1.0 / 240.0,
            wind_speed_multiplier: 1.0,
            fly_by_trace_radius: 200.0,
            trace_channel: crate::scene::DEFAULT_TRACE_CHANNEL,
            enable_ricochets: true,
            enable_bullet_ricochets: true,
            enable_projectile_ricochets: true,
            enable_bullet_deformation: false,
            ignore_impact_events_with_invalid_data: true,
            ricochet_global_angle_cutoff: 85.0,
            ricochet_energy_ratio_threshold: 2.0,
            drag_complexity: DragComplexity::Complex,
            exit_code_log_filter: ExitCodeLogFilter::Both,
        }
    }
}

impl BallisticsConfig {
    pub fn with_max_penetrations(mut self, max_penetrations: u32) -> Self {
        self.max_penetrations = max_penetrations;
        self
    }

    pub fn with_ricochets(mut self, enabled: bool) -> Self {
        self.enable_ricochets = enabled;
        self
    }

    pub fn with_bullet_deformation(mut self, enabled: bool) -> Self {
        self.enable_bullet_deformation = enabled;
        self
    }

    pub fn with_drag_complexity(mut self, complexity: DragComplexity) -> Self {
        self.drag_complexity = complexity;
        self
    }

    pub fn with_max_simulation_duration(mut self, seconds: f64) -> Self {
        self.max_simulation_duration = seconds;
        self
    }

    pub fn with_max_substep(mut self, seconds: f64) -> Self {
        self.max_substep = seconds;
        self
    }

    pub fn with_min_penetration_depth(mut self, cm: f64) -> Self {
        self.min_penetration_depth = cm;
        self
    }

    pub fn with_ignore_invalid_impact_events(mut self, ignore: bool) -> Self {
        self.ignore_impact_events_with_invalid_data = ignore;
        self
    }

    /// Minimum penetration depth in meters.
    pub fn min_penetration_depth_m(&self) -> f64 {
        crate::math::units::cm_to_m(self.min_penetration_depth)
    }

    /// Fly-by capsule radius in meters.
    pub fn fly_by_trace_radius_m(&self) -> f64 {
        crate::math::units::cm_to_m(self.fly_by_trace_radius)
    }

    /// Hard ceiling on simulated time.
    pub fn time_limit(&self) -> f64 {
        self.max_simulation_duration + 1.0
    }

    /// Whether a projectile of the given kind may ricochet at all.
    pub fn ricochets_allowed(&self, is_bullet: bool) -> bool {
        self.enable_ricochets
            && if is_bullet {
                self.enable_bullet_ricochets
            } else {
                self.enable_projectile_ricochets
            }
    }
}

/// Baseline atmosphere of the world.
///
/// The integrator never reads this directly: it works from an
/// [`EnvironmentSnapshot`](crate::environment::EnvironmentSnapshot) taken
/// when a task starts.
///
/// # Fields
/// * `altitude` - Altitude of the world origin (m)
/// * `temperature` - Temperature at the world origin (°C)
/// * `humidity` - Relative humidity at the world origin (0..1)
/// * `pressure` - Air pressure at sea level (Pa)
/// * `gravity_z` - Gravity along world Z (m/s²), overridden by the scene when it reports one
/// * `latitude` - Latitude of the world (degrees, positive north)
/// * `azimuth` - Bearing of the world X axis from true north (degrees)
/// * `wind` - Wind used where the scene reports none (m/s)
/// * `wind_speed_multiplier` - Scales every wind sample
///
/// # Example
/// ```
/// use terminal_ballistics::resources::BallisticsEnvironment;
///
/// let env = BallisticsEnvironment::default().with_altitude(1500.0);
/// assert!(env.snapshot().air_density < 1.225);
/// ```
#[derive(Resource, Reflect, Clone, Copy, Debug, PartialEq)]
#[reflect(Resource)]
pub struct BallisticsEnvironment {
    pub altitude: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub gravity_z: f64,
    pub latitude: f64,
    pub azimuth: f64,
    pub wind: bevy::math::DVec3,
    pub wind_speed_multiplier: f64,
}

impl Default for BallisticsEnvironment {
    fn default() -> Self {
        Self {
            altitude: 0.0,
            temperature: 10.0,
            humidity: 0.5,
            pressure: crate::math::constants::SEA_LEVEL_PRESSURE,
            gravity_z: -9.81,
            latitude: 45.0,
            azimuth: 0.0,
            wind: bevy::math::DVec3::ZERO,
            wind_speed_multiplier: 1.0,
        }
    }
}

impl BallisticsEnvironment {
    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = altitude;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_humidity(mut self, humidity: f64) -> Self {
        self.humidity = humidity.clamp(0.0, 1.0);
        self
    }

    pub fn with_wind(mut self, wind: bevy::math::DVec3) -> Self {
        self.wind = wind;
        self
    }

    pub fn with_latitude(mut self, latitude: f64) -> Self {
        self.latitude = latitude;
        self
    }

    pub fn with_azimuth(mut self, azimuth: f64) -> Self {
        self.azimuth = azimuth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = BallisticsConfig::default();
        assert_eq!(config.min_penetration_depth, 0.1);
        assert_eq!(config.max_penetrations, 8);
        assert_eq!(config.max_simulation_duration, 10.0);
        assert_eq!(config.fly_by_trace_radius, 200.0);
        assert!(config.enable_ricochets && config.enable_bullet_ricochets && config.enable_projectile_ricochets);
        assert!(config.ignore_impact_events_with_invalid_data);
        assert!(!config.enable_bullet_deformation);
        assert_eq!(config.exit_code_log_filter, ExitCodeLogFilter::Both);
        assert_eq!(config.time_limit(), 11.0);
        assert!((config.min_penetration_depth_m() - 0.001).abs() < 1e-15);
    }

    #[test]
    fn test_ricochet_switches() {
        let mut config = BallisticsConfig::default();
        config.enable_bullet_ricochets = false;
        assert!(!config.ricochets_allowed(true));
        assert!(config.ricochets_allowed(false));
        let config = config.with_ricochets(false);
        assert!(!config.ricochets_allowed(false));
    }

    #[test]
    fn test_drag_complexity_levels() {
        assert!(!DragComplexity::Basic.uses_altitude());
        assert!(DragComplexity::Atmospheric.uses_altitude());
        assert!(!DragComplexity::Atmospheric.uses_wind());
        assert!(DragComplexity::Wind.uses_wind() && !DragComplexity::Wind.uses_3d_drag());
        assert!(DragComplexity::Complex.uses_coriolis());
    }

    #[test]
    fn test_environment_defaults() {
        let env = BallisticsEnvironment::default();
        assert_eq!(env.temperature, 10.0);
        assert_eq!(env.humidity, 0.5);
        assert_eq!(env.latitude, 45.0);
        assert_eq!(env.with_humidity(3.0).humidity, 1.0);
    }
}
