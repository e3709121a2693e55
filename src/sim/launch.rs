use bevy::math::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::error::{BallisticsError, Result};
use crate::scene::{QueryParams, DEFAULT_TRACE_CHANNEL};
use crate::types::{ActorId, SimulationType};

/// How a projectile leaves the muzzle.
///
/// # Fields
/// * `projectile_speed` - Muzzle speed (m/s)
/// * `effective_range` - Path length after which the flight ends (m)
/// * `timescale` - Multiplies wall-clock time for realtime flights
/// * `owner_ignore_distance` - The owner is ignored until the projectile has travelled this far (m)
/// * `location` - Muzzle position
/// * `direction` - Launch direction (normalized on use)
/// * `to_ignore` - Actors the projectile never collides with
/// * `object_types` - Object-type mask for scene queries, empty for all
/// * `owner_velocity` - Velocity of the shooter, added when `add_owner_velocity` is set
///
/// # Example
/// ```
/// use bevy::math::DVec3;
/// use terminal_ballistics::sim::LaunchParams;
///
/// let launch = LaunchParams::new(DVec3::ZERO, DVec3::X).with_speed(820.0);
/// assert!(launch.validate().is_ok());
/// assert_eq!(launch.effective_range, 150.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchParams {
    pub projectile_speed: f64,
    pub effective_range: f64,
    pub timescale: f64,
    pub owner_ignore_distance: f64,
    pub location: DVec3,
    pub direction: DVec3,
    pub to_ignore: Vec<ActorId>,
    pub object_types: Vec<u8>,
    pub trace_channel: u8,
    pub owner: Option<ActorId>,
    pub instigator: Option<ActorId>,
    pub owner_velocity: DVec3,
    pub ignore_owner: bool,
    pub add_owner_velocity: bool,
    pub force_no_tracer: bool,
    pub simulation_type: SimulationType,
}

impl Default for LaunchParams {
    fn default() -> Self {
        Self {
            projectile_speed: 360.0,
            effective_range: 150.0,
            timescale: 1.0,
            owner_ignore_distance: 10.0,
            location: DVec3::ZERO,
            direction: DVec3::X,
            to_ignore: Vec::new(),
            object_types: Vec::new(),
            trace_channel: DEFAULT_TRACE_CHANNEL,
            owner: None,
            instigator: None,
            owner_velocity: DVec3::ZERO,
            ignore_owner: true,
            add_owner_velocity: true,
            force_no_tracer: false,
            simulation_type: SimulationType::Instant,
        }
    }
}

impl LaunchParams {
    pub fn new(location: DVec3, direction: DVec3) -> Self {
        Self {
            location,
            direction,
            ..Default::default()
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.projectile_speed = speed;
        self
    }

    pub fn with_range(mut self, range: f64) -> Self {
        self.effective_range = range;
        self
    }

    pub fn with_timescale(mut self, timescale: f64) -> Self {
        self.timescale = timescale;
        self
    }

    pub fn with_owner(mut self, owner: ActorId, velocity: DVec3) -> Self {
        self.owner = Some(owner);
        self.owner_velocity = velocity;
        self
    }

    pub fn with_instigator(mut self, instigator: ActorId) -> Self {
        self.instigator = Some(instigator);
        self
    }

    pub fn with_ignored_actor(mut self, actor: ActorId) -> Self {
        self.to_ignore.push(actor);
        self
    }

    pub fn with_trace_channel(mut self, channel: u8) -> Self {
        self.trace_channel = channel;
        self
    }

    pub fn with_simulation_type(mut self, simulation_type: SimulationType) -> Self {
        self.simulation_type = simulation_type;
        self
    }

    pub fn with_object_types(mut self, object_types: Vec<u8>) -> Self {
        self.object_types = object_types;
        self
    }

    /// Copies of these parameters whose directions cover the unit sphere
    /// evenly, for fragment bursts.
    ///
    /// # Example
    /// ```
    /// use bevy::math::DVec3;
    /// use terminal_ballistics::sim::LaunchParams;
    ///
    /// let burst = LaunchParams::new(DVec3::ZERO, DVec3::X).distributed_on_sphere(64);
    /// assert_eq!(burst.len(), 64);
    /// ```
    pub fn distributed_on_sphere(&self, count: usize) -> Vec<LaunchParams> {
        crate::math::lattice::offset_fibonacci_lattice(1.0, count)
            .into_iter()
            .map(|direction| LaunchParams {
                direction,
                ..self.clone()
            })
            .collect()
    }

    /// Checks every number and the direction.
    pub fn validate(&self) -> Result<()> {
        let scalars = [
            ("projectile speed", self.projectile_speed),
            ("effective range", self.effective_range),
            ("timescale", self.timescale),
            ("owner ignore distance", self.owner_ignore_distance),
        ];
        for (name, value) in scalars {
            if !value.is_finite() || value < 0.0 {
                return Err(BallisticsError::InvalidLaunchParams(format!("{name} must be finite and non-negative")));
            }
        }
        if self.timescale <= 0.0 {
            return Err(BallisticsError::InvalidLaunchParams("timescale must be positive".to_string()));
        }
        if !crate::math::is_finite_vec(self.location) || !crate::math::is_finite_vec(self.owner_velocity) {
            return Err(BallisticsError::InvalidLaunchParams("location and owner velocity must be finite".to_string()));
        }
        if !crate::math::is_finite_vec(self.direction) || self.direction.length_squared() < 1e-12 {
            return Err(BallisticsError::InvalidLaunchParams("direction must be a non-zero vector".to_string()));
        }
        Ok(())
    }

    /// Muzzle velocity including the owner's motion when requested.
    pub fn initial_velocity(&self) -> DVec3 {
        let muzzle = self.direction.normalize_or_zero() * self.projectile_speed;
        if self.add_owner_velocity {
            muzzle + self.owner_velocity
        } else {
            muzzle
        }
    }

    /// Orientation with the body X axis along the launch direction.
    pub fn orientation(&self) -> DQuat {
        DQuat::from_rotation_arc(DVec3::X, self.direction.normalize_or(DVec3::X))
    }

    /// Scene query filters for a projectile that has travelled `distance`.
    pub fn query_params(&self, distance: f64) -> QueryParams {
        let mut params = QueryParams {
            trace_channel: self.trace_channel,
            ignore_actors: self.to_ignore.clone(),
            object_types: self.object_types.clone(),
            ..Default::default()
        };
        if let Some(owner) = self.owner {
            if self.ignore_owner && distance < self.owner_ignore_distance {
                params.ignore_actors.push(owner);
            }
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_defaults() {
        let launch = LaunchParams::default();
        assert_eq!(launch.projectile_speed, 360.0);
        assert_eq!(launch.effective_range, 150.0);
        assert_eq!(launch.timescale, 1.0);
        assert_eq!(launch.owner_ignore_distance, 10.0);
        assert_eq!(launch.trace_channel, 10);
        assert!(launch.ignore_owner && launch.add_owner_velocity && !launch.force_no_tracer);
        assert_eq!(launch.simulation_type, SimulationType::Instant);
    }

    #[test]
    fn test_validation_rejects_bad_numbers() {
        assert!(LaunchParams::default().with_speed(f64::NAN).validate().is_err());
        assert!(LaunchParams::default().with_timescale(0.0).validate().is_err());
        assert!(LaunchParams::new(DVec3::ZERO, DVec3::ZERO).validate().is_err());
        assert!(LaunchParams::default().with_range(-1.0).validate().is_err());
    }

    #[test]
    fn test_owner_is_ignored_only_near_the_muzzle() {
        let launch = LaunchParams::default().with_owner(ActorId(7), DVec3::new(0.0, 2.0, 0.0));
        assert!(launch.query_params(1.0).ignore_actors.contains(&ActorId(7)));
        assert!(!launch.query_params(20.0).ignore_actors.contains(&ActorId(7)));
        assert_eq!(launch.initial_velocity(), DVec3::new(360.0, 2.0, 0.0));
    }

    #[test]
    fn test_burst_directions_cover_the_sphere() {
        let base = LaunchParams::new(DVec3::new(1.0, 2.0, 3.0), DVec3::X).with_speed(500.0);
        let burst = base.distributed_on_sphere(100);
        assert_eq!(burst.len(), 100);
        assert!(burst.iter().all(|l| l.location == base.location && l.projectile_speed == 500.0));
        assert!(burst.iter().all(|l| (l.direction.length() - 1.0).abs() < 1e-9));
        let mean = burst.iter().map(|l| l.direction).sum::<DVec3>() / 100.0;
        assert!(mean.length() < 0.05);
        assert!(base.distributed_on_sphere(0).is_empty());
    }

    #[test]
    fn test_orientation_points_along_direction() {
        let launch = LaunchParams::new(DVec3::ZERO, DVec3::new(0.0, 3.0, 0.0));
        let forward = launch.orientation() * DVec3::X;
        assert!((forward - DVec3::Y).length() < 1e-12);
    }
}
