use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bevy::log::{debug, info, trace};
use bevy::math::{DQuat, DVec3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{EventSink, LaunchParams, PathPoint, ProjectileState, SimContext, TaskResult};
use crate::error::Result;
use crate::events::{FlyByParams, TaskEvent};
use crate::exit::{get_exit_location, ExitResult, DEPENETRATION_NUDGE};
use crate::impact::{evaluate_ricochet, penetrate, Impact, ImpactBody, ImpactParams, InjuryParams, WoundCavity};
use crate::materials::{PhysicalMaterialResolver, SurfaceClassification};
use crate::math::constants::AIR_DENSITY;
use crate::math::drag::{drag_force, drag_force_3d};
use crate::math::physics::{coriolis_acceleration, integrate_angular_velocity};
use crate::math::{closest_point_on_segment, is_finite_vec};
use crate::projectile::{BallisticBody, Projectile};
use crate::scene::{tags, HitResult, QueryParams};
use crate::types::{ActorId, ComponentId, ExitCode, ImpactOutcome, ProjectileId, SimState, SimulationType};

/// Tolerance of the stuck-state check between consecutive hits.
const SAME_HIT_TOLERANCE: f64 = 1e-5;
/// Below this speed (m/s) the projectile counts as arrested.
const ZERO_SPEED: f64 = 1e-3;
/// Step used when the configured substep is unusable.
const FALLBACK_SUBSTEP: f64 = 1.0 / 240.0;
/// Substep ceiling for an instant flight with an unbounded duration.
const MAX_STEP_BUDGET: u64 = 1 << 32;

/// One projectile from launch to termination.
///
/// The task is a state machine: `Launching`, then `Integrating` steps that
/// drop into `ConsumingHit` whenever the sweep finds a surface, until it
/// reaches `Done`. Every step is sequential; a task is never stepped from
/// two threads at once.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use bevy::math::DVec3;
/// use terminal_ballistics::projectile::BulletPreset;
/// use terminal_ballistics::scene::AnalyticScene;
/// use terminal_ballistics::sim::{LaunchParams, NullSink, SimContext, SimTask};
/// use terminal_ballistics::types::{ExitCode, ProjectileId};
///
/// let ctx = SimContext::new(Arc::new(AnalyticScene::new()));
/// let launch = LaunchParams::new(DVec3::ZERO, DVec3::X).with_range(20.0);
/// let mut task = SimTask::new(ProjectileId::new(), BulletPreset::Para9x19.into(), launch, ctx).unwrap();
/// assert_eq!(task.run_to_completion(&NullSink), ExitCode::RangeExhausted);
/// ```
pub struct SimTask {
    id: ProjectileId,
    projectile: Projectile,
    launch: LaunchParams,
    ctx: SimContext,
    state: SimState,
    position: DVec3,
    velocity: DVec3,
    orientation: DQuat,
    angular_velocity: DVec3,
    time: f64,
    distance: f64,
    iterations: u32,
    previous_hit: Option<HitResult>,
    ignored_components: Vec<ComponentId>,
    exited_component: Option<ComponentId>,
    fly_by_notified: HashSet<ActorId>,
    rng: StdRng,
    result: TaskResult,
    cancel: Arc<AtomicBool>,
    exit_code: Option<ExitCode>,
}

impl SimTask {
    /// Creates a task after validating its inputs.
    ///
    /// # Arguments
    /// * `id` - Identity of the flight; also seeds the task's random stream
    /// * `projectile` - What is fired
    /// * `launch` - Muzzle state and query filters
    /// * `ctx` - Scene, materials, configuration and atmosphere for the flight
    ///
    /// # Returns
    /// The task, or the validation error of the projectile or launch params
    pub fn new(id: ProjectileId, projectile: Projectile, launch: LaunchParams, ctx: SimContext) -> Result<Self> {
        projectile.validate()?;
        launch.validate()?;

        let position = launch.location;
        let velocity = launch.initial_velocity();
        let orientation = launch.orientation();
        let result = TaskResult {
            projectile_id: id,
            simulation_type: launch.simulation_type,
            is_bullet: projectile.is_bullet(),
            path: vec![PathPoint {
                position,
                velocity,
                time: 0.0,
            }],
            final_position: position,
            final_velocity: velocity,
            ..Default::default()
        };

        trace!("Launching {:?} at {:.1} m/s", id, velocity.length());
        Ok(Self {
            id,
            projectile,
            launch,
            ctx,
            state: SimState::Launching,
            position,
            velocity,
            orientation,
            angular_velocity: DVec3::ZERO,
            time: 0.0,
            distance: 0.0,
            iterations: 0,
            previous_hit: None,
            ignored_components: Vec::new(),
            exited_component: None,
            fly_by_notified: HashSet::new(),
            rng: StdRng::seed_from_u64(id.seed()),
            result,
            cancel: Arc::new(AtomicBool::new(false)),
            exit_code: None,
        })
    }

    /// Shares the task's cancellation flag with the caller.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> ProjectileId {
        self.id
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    pub fn simulation_type(&self) -> SimulationType {
        self.launch.simulation_type
    }

    pub fn exit_code(&self) -> Option<ExitCode> {
        self.exit_code
    }

    pub fn is_finished(&self) -> bool {
        self.exit_code.is_some()
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Requests cancellation; takes effect at the next checkpoint.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Number of bodies consumed so far.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn projectile_state(&self) -> ProjectileState {
        ProjectileState {
            projectile_id: self.id,
            position: self.position,
            velocity: self.velocity,
            orientation: self.orientation,
            time: self.time,
            distance: self.distance,
        }
    }

    /// Integration step length for instant flights.
    pub fn substep(&self) -> f64 {
        let step = self.ctx.config.max_substep;
        if step.is_finite() && step > 0.0 {
            step
        } else {
            FALLBACK_SUBSTEP
        }
    }

    /// Advances a realtime flight by `elapsed` wall-clock seconds, scaled by
    /// the launch timescale and split into substeps.
    ///
    /// # Returns
    /// The exit code once the flight has terminated
    pub fn advance(&mut self, elapsed: f64, sink: &dyn EventSink) -> Option<ExitCode> {
        if let Some(code) = self.exit_code {
            return Some(code);
        }
        let substep = self.substep();
        let mut remaining = (elapsed * self.launch.timescale).max(0.0);
        loop {
            let dt = remaining.min(substep);
            if let Some(code) = self.step(dt, sink) {
                return Some(code);
            }
            remaining -= dt;
            if remaining <= f64::EPSILON {
                return None;
            }
        }
    }

    /// Runs up to `steps` substeps. Returns true once the flight is over.
    pub fn run_steps(&mut self, steps: usize, sink: &dyn EventSink) -> bool {
        let dt = self.substep();
        for _ in 0..steps {
            if self.step(dt, sink).is_some() {
                return true;
            }
        }
        self.is_finished()
    }

    /// Most substeps an instant flight may take before it is cut off.
    pub fn step_budget(&self) -> u64 {
        let steps = (self.ctx.config.time_limit() / self.substep()).ceil();
        if steps.is_nan() {
            return MAX_STEP_BUDGET;
        }
        (steps.max(1.0) as u64).saturating_mul(2).saturating_add(16).min(MAX_STEP_BUDGET)
    }

    /// Runs the whole flight on the calling thread.
    pub fn run_to_completion(&mut self, sink: &dyn EventSink) -> ExitCode {
        let dt = self.substep();
        for _ in 0..self.step_budget() {
            if let Some(code) = self.step(dt, sink) {
                return code;
            }
        }
        self.finish(ExitCode::TimeExhausted, sink)
    }

    /// One integration step of `dt` simulated seconds.
    ///
    /// # Returns
    /// The exit code when this step ended the flight
    pub fn step(&mut self, dt: f64, sink: &dyn EventSink) -> Option<ExitCode> {
        if let Some(code) = self.exit_code {
            return Some(code);
        }
        if self.is_cancelled() {
            self.state = SimState::ShuttingDown;
            return Some(self.finish(ExitCode::Cancelled, sink));
        }
        if !(dt.is_finite() && dt > 0.0) {
            return None;
        }
        self.state = SimState::Integrating;

        let start = self.position;
        let start_time = self.time;
        let (end, velocity, orientation, angular_velocity) = self.integrate(dt);
        self.velocity = velocity;
        self.orientation = orientation;
        self.angular_velocity = angular_velocity;

        match self.sweep(start, end) {
            Some(hit) => {
                self.distance += start.distance(hit.location);
                self.position = hit.location;
                self.time = start_time + dt * hit.time.clamp(0.0, 1.0);
                self.record_point();
                self.state = SimState::ConsumingHit;
                if let Some(code) = self.consume_hit(hit, sink) {
                    return Some(self.finish(code, sink));
                }
                if self.exit_code.is_none() {
                    self.state = SimState::Integrating;
                }
            }
            None => {
                self.distance += start.distance(end);
                self.position = end;
                self.time = start_time + dt;
                self.record_point();
            }
        }

        self.broadcast_fly_by(start, self.position, sink);

        if let Some(code) = self.post_step_check() {
            return Some(self.finish(code, sink));
        }
        if sink.wants_updates() {
            sink.emit(TaskEvent::Update(self.projectile_state()));
        }
        None
    }

    /// Ends the flight, hands the result over and reports the exit code.
    /// Only the first call has any effect.
    pub fn finish(&mut self, code: ExitCode, sink: &dyn EventSink) -> ExitCode {
        if let Some(existing) = self.exit_code {
            return existing;
        }
        self.exit_code = Some(code);
        self.state = SimState::Done;

        self.result.exit_code = code;
        self.result.final_position = self.position;
        self.result.final_velocity = self.velocity;
        self.result.total_time = self.time;
        self.result.distance = self.distance;
        self.result.draw_debug = !self.launch.force_no_tracer;

        if self.ctx.config.exit_code_log_filter.allows(self.projectile.is_bullet()) {
            if code.is_normal() {
                debug!("Projectile {:?} finished: {:?} after {:.3}s", self.id, code, self.time);
            } else {
                info!("Projectile {:?} finished: {:?} after {:.3}s", self.id, code, self.time);
            }
        }

        sink.emit(TaskEvent::Complete(Box::new(std::mem::take(&mut self.result))));
        code
    }

    /// Next position, velocity, orientation and angular velocity after `dt`.
    fn integrate(&self, dt: f64) -> (DVec3, DVec3, DQuat, DVec3) {
        let config = &self.ctx.config;
        let env = &self.ctx.environment;
        let complexity = config.drag_complexity;

        let wind = if complexity.uses_wind() {
            env.wind_at(self.ctx.scene.as_ref(), self.position)
        } else {
            DVec3::ZERO
        };
        let air_velocity = self.velocity - wind;
        let density = if complexity.uses_altitude() {
            env.sample(self.position.z).density
        } else {
            AIR_DENSITY
        };

        let drag = if complexity.uses_3d_drag() {
            let local = self.orientation.inverse() * air_velocity;
            drag_force_3d(
                self.projectile.drag_coefficient_3d(local),
                self.projectile.cross_sections(),
                air_velocity,
                self.orientation,
                density,
            )
        } else {
            let air_speed = air_velocity.length();
            let cd = self.projectile.drag_coefficient(air_speed);
            -air_velocity.normalize_or_zero() * drag_force(cd, self.projectile.frontal_area(), air_speed, 0.0, Some(density))
        };

        let mut drag_dv = drag / self.projectile.mass() * dt;
        // Drag can at most bring the projectile to rest relative to the air
        if drag_dv.length_squared() > air_velocity.length_squared() {
            drag_dv = -air_velocity;
        }
        let mut acceleration = DVec3::new(0.0, 0.0, env.gravity_z);
        if complexity.uses_coriolis() {
            acceleration += coriolis_acceleration(self.velocity, env.latitude, env.azimuth);
        }

        let velocity = self.velocity + drag_dv + acceleration * dt;
        let position = self.position + velocity * dt;

        let (orientation, angular_velocity) = if self.projectile.is_bullet() {
            // Spin-stabilised: the nose follows the relative wind
            let forward = self.orientation * DVec3::X;
            let target = (velocity - wind).normalize_or(forward);
            let angle = forward.angle_between(target);
            let omega = if angle > 1e-9 {
                forward.cross(target).normalize_or_zero() * (angle / dt)
            } else {
                DVec3::ZERO
            };
            (integrate_angular_velocity(self.orientation, omega, dt), omega)
        } else {
            (
                integrate_angular_velocity(self.orientation, self.angular_velocity, dt),
                self.angular_velocity,
            )
        };
        (position, velocity, orientation, angular_velocity)
    }

    fn query_params(&self) -> QueryParams {
        let mut params = self.launch.query_params(self.distance);
        params.ignore_components.extend(self.ignored_components.iter().copied());
        params
    }

    /// First usable contact between `start` and `end`.
    fn sweep(&mut self, start: DVec3, end: DVec3) -> Option<HitResult> {
        let mut params = self.query_params();
        if let Some(exited) = self.exited_component.take() {
            params.ignore_components.push(exited);
        }
        let hit = self
            .ctx
            .scene
            .sweep_sphere(start, end, self.projectile.radius(), &params)?;
        if hit.start_penetrating || !hit.is_finite() || !is_finite_vec(hit.location) {
            trace!("Projectile {:?} discarded unusable hit on {:?}", self.id, hit.component);
            return None;
        }
        Some(hit)
    }

    /// Drains the chain of bodies behind `hit`.
    fn consume_hit(&mut self, hit: HitResult, sink: &dyn EventSink) -> Option<ExitCode> {
        if self.is_cancelled() {
            self.state = SimState::ShuttingDown;
            return Some(ExitCode::Cancelled);
        }

        let scene = self.ctx.scene.clone();
        let materials = self.ctx.materials.clone();
        let resolver = PhysicalMaterialResolver::new(scene.as_ref(), materials.as_ref());

        if resolver.has_tag(&hit, tags::IGNORE) {
            self.ignored_components.push(hit.component);
            return None;
        }
        if let Some(previous) = &self.previous_hit {
            if previous.same_hit(&hit, SAME_HIT_TOLERANCE) {
                return Some(ExitCode::EarlyTermination);
            }
        }
        self.previous_hit = Some(hit);

        let speed = self.velocity.length();
        if speed <= ZERO_SPEED {
            return Some(ExitCode::ZeroVelocity);
        }
        let direction = self.velocity / speed;
        let exits = get_exit_location(
            scene.as_ref(),
            &hit,
            direction,
            self.projectile.radius(),
            &self.query_params(),
            self.ctx.config.max_penetrations,
        );

        if exits.is_empty() {
            let class = resolver.classify(&hit);
            let params = ImpactParams::new(self.id, hit, class.surface, self.velocity, self.time).as_zero();
            self.report_entry(params, &class, None, sink);
            self.velocity = DVec3::ZERO;
            return Some(ExitCode::ZeroVelocity);
        }

        for exit in exits.iter() {
            if self.is_cancelled() {
                self.state = SimState::ShuttingDown;
                return Some(ExitCode::Cancelled);
            }
            match self.consume_exit(&resolver, exit, direction, sink) {
                ImpactOutcome::Ignore | ImpactOutcome::Penetration => {}
                ImpactOutcome::Ricochet | ImpactOutcome::Invalid => return None,
                ImpactOutcome::Kill => return Some(ExitCode::ZeroVelocity),
            }
        }
        None
    }

    /// Applies the decision machine to one traversal.
    fn consume_exit(
        &mut self,
        resolver: &PhysicalMaterialResolver,
        exit: &ExitResult,
        direction: DVec3,
        sink: &dyn EventSink,
    ) -> ImpactOutcome {
        let entry = exit.entering_hit;
        if resolver.has_tag(&entry, tags::IGNORE) {
            self.ignored_components.push(exit.component);
            return ImpactOutcome::Ignore;
        }
        let velocity = self.velocity;
        let speed = velocity.length();
        if speed <= ZERO_SPEED {
            return ImpactOutcome::Kill;
        }

        let class = resolver.classify(&entry);
        let impact_params = ImpactParams::new(self.id, entry, class.surface, velocity, self.time);
        let exit_params = ImpactParams::new(self.id, exit.exiting_hit, class.surface, velocity, self.time).as_exit();

        if exit.penetration_thickness < self.ctx.config.min_penetration_depth_m() {
            // Too thin to wound: a plain hit even for hit zones
            self.report_hit(impact_params, sink);
            self.report_exit(exit_params, sink);
            self.move_through(exit);
            return ImpactOutcome::Penetration;
        }
        if resolver.has_tag(&entry, tags::IMPENETRABLE) {
            self.report_entry(impact_params.as_zero(), &class, None, sink);
            self.velocity = DVec3::ZERO;
            return ImpactOutcome::Kill;
        }
        if resolver.has_tag(&entry, tags::IGNORE_PENETRATION) {
            self.report_entry(impact_params, &class, None, sink);
            self.report_exit(exit_params, sink);
            self.move_through(exit);
            return ImpactOutcome::Penetration;
        }

        let body = ImpactBody::new(&self.projectile, speed);
        let impact = Impact::new(&body, &class.properties, velocity, entry.normal, exit.penetration_thickness);

        if !class.is_hit_zone || class.is_bone {
            let outcome = evaluate_ricochet(&impact, &self.ctx.config, self.ctx.environment.gravity_z, &mut self.rng);
            match outcome {
                Ok(ricochet) => {
                    let params = impact_params
                        .with_exit_velocity(ricochet.velocity)
                        .with_penetration(ricochet.depth, ricochet.imparted_energy)
                        .as_ricochet();
                    let outward = if velocity.dot(entry.normal) <= 0.0 {
                        entry.normal
                    } else {
                        -entry.normal
                    };
                    let span = (entry.impact_point, entry.impact_point - outward * ricochet.depth);
                    self.report_entry(params, &class, Some((&body, speed, span, exit.penetration_thickness)), sink);
                    self.deform(speed, &class);
                    self.velocity = ricochet.velocity;
                    self.position = entry.location + outward * DEPENETRATION_NUDGE;
                    self.orientation = DQuat::from_rotation_arc(DVec3::X, ricochet.velocity.normalize_or(DVec3::X));
                    self.previous_hit = Some(entry);
                    self.record_point();
                    self.iterations += 1;
                    return ImpactOutcome::Ricochet;
                }
                Err(veto) => trace!("Projectile {:?} no ricochet: {:?}", self.id, veto),
            }
        }

        let penetration = penetrate(&impact);
        self.deform(speed, &class);
        let stop_point = entry.impact_point + direction * penetration.depth;
        let mut params = impact_params
            .with_exit_velocity(penetration.exit_velocity)
            .with_penetration(penetration.depth, penetration.imparted_energy);
        if penetration.stopped {
            params = params.as_zero();
        }
        let span_end = if penetration.stopped {
            stop_point
        } else {
            exit.exit_location
        };
        self.report_entry(
            params,
            &class,
            Some((&body, speed, (entry.impact_point, span_end), exit.penetration_thickness)),
            sink,
        );
        self.iterations += 1;

        if penetration.stopped {
            self.move_to(stop_point);
            self.velocity = DVec3::ZERO;
            return ImpactOutcome::Kill;
        }

        let exit_params =
            ImpactParams::new(self.id, exit.exiting_hit, class.surface, penetration.exit_velocity, self.time)
                .with_penetration(penetration.depth, penetration.imparted_energy)
                .as_exit();
        self.report_exit(exit_params, sink);
        self.move_through(exit);
        self.velocity = penetration.exit_velocity;
        ImpactOutcome::Penetration
    }

    fn deform(&mut self, speed: f64, class: &SurfaceClassification) {
        if self.ctx.config.enable_bullet_deformation && self.projectile.is_bullet() {
            self.projectile.on_deform(speed, &class.properties.in_base_units());
        }
    }

    fn move_to(&mut self, point: DVec3) {
        self.distance += self.position.distance(point);
        self.position = point;
        self.record_point();
    }

    fn move_through(&mut self, exit: &ExitResult) {
        self.move_to(exit.exit_location);
        self.exited_component = Some(exit.component);
    }

    fn record_point(&mut self) {
        self.result.path.push(PathPoint {
            position: self.position,
            velocity: self.velocity,
            time: self.time,
        });
    }

    /// Applies the invalid-payload policy.
    fn checked(&self, params: ImpactParams) -> Option<ImpactParams> {
        if params.has_valid_data() {
            Some(params)
        } else if self.ctx.config.ignore_impact_events_with_invalid_data {
            debug!("Projectile {:?} dropped an impact event with invalid data", self.id);
            None
        } else {
            Some(ImpactParams::invalid(self.id, params.time))
        }
    }

    fn report_hit(&mut self, params: ImpactParams, sink: &dyn EventSink) {
        let Some(params) = self.checked(params) else {
            return;
        };
        self.result.hits.push(params);
        sink.emit(TaskEvent::Hit(params));
    }

    /// Reports an entry contact as a hit, or as an injury for hit zones.
    fn report_entry(
        &mut self,
        params: ImpactParams,
        class: &SurfaceClassification,
        wound: Option<(&ImpactBody, f64, (DVec3, DVec3), f64)>,
        sink: &dyn EventSink,
    ) {
        if !class.is_hit_zone {
            self.report_hit(params, sink);
            return;
        }
        let Some(params) = self.checked(params) else {
            return;
        };

        let body = ImpactBody::new(&self.projectile, params.impact_velocity.length());
        let (body, speed, (entry, exit), thickness) =
            wound.unwrap_or((&body, params.impact_velocity.length(), (params.hit.impact_point, params.hit.impact_point), 0.0));
        let tissue = class.properties.in_base_units();
        let cavity = WoundCavity::new(body, &tissue, speed, params.imparted_energy, params.penetration_depth)
            .with_span(entry, exit);
        let injury = InjuryParams {
            impact: params,
            cavity,
            thickness,
            is_flesh: class.is_flesh,
            is_bone: class.is_bone,
            is_dead: class.is_dead,
        };
        self.result.injuries.push(injury);
        sink.emit(TaskEvent::Injure(injury));
    }

    fn report_exit(&mut self, params: ImpactParams, sink: &dyn EventSink) {
        let Some(params) = self.checked(params) else {
            return;
        };
        self.result.exit_hits.push(params);
        sink.emit(TaskEvent::ExitHit(params));
    }

    /// Notifies each listening actor near the segment once per flight.
    fn broadcast_fly_by(&mut self, start: DVec3, end: DVec3, sink: &dyn EventSink) {
        let radius = self.ctx.config.fly_by_trace_radius_m();
        if radius <= 0.0 {
            return;
        }
        let scene = self.ctx.scene.clone();
        let overlaps = scene.overlap_capsule(start, end, radius, &self.query_params());
        for overlap in overlaps {
            let Some(actor) = overlap.actor else {
                continue;
            };
            if Some(actor) == self.launch.owner || Some(actor) == self.launch.instigator {
                continue;
            }
            if !scene.implements_fly_by(actor) || !self.fly_by_notified.insert(actor) {
                continue;
            }
            let location = closest_point_on_segment(start, end, overlap.impact_point);
            sink.emit(TaskEvent::FlyBy(FlyByParams {
                projectile_id: self.id,
                actor,
                location,
                velocity: self.velocity,
                distance: location.distance(overlap.impact_point),
                time: self.time,
            }));
        }
    }

    fn post_step_check(&self) -> Option<ExitCode> {
        if self.velocity.length_squared() < ZERO_SPEED * ZERO_SPEED {
            Some(ExitCode::ZeroVelocity)
        } else if self.distance >= self.launch.effective_range {
            Some(ExitCode::RangeExhausted)
        } else if self.time >= self.ctx.config.time_limit() {
            Some(ExitCode::TimeExhausted)
        } else if !self.ctx.scene.world_bounds().contains(self.position) {
            Some(ExitCode::Completed)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::SurfaceType;
    use crate::math::constants::EARTH_ANGULAR_SPEED;
    use crate::projectile::{BulletPreset, ProjectileProperties};
    use crate::resources::BallisticsConfig;
    use crate::scene::{AnalyticScene, Bounds, SceneActor, SceneBody};
    use crate::sim::RecordingSink;
    use approx::assert_relative_eq;

    fn task_in(scene: AnalyticScene, launch: LaunchParams) -> SimTask {
        let ctx = SimContext::new(Arc::new(scene));
        SimTask::new(ProjectileId::new(), BulletPreset::Para9x19.into(), launch, ctx).unwrap()
    }

    fn concrete_wall() -> AnalyticScene {
        AnalyticScene::new().with_body(
            SceneBody::cuboid(DVec3::new(5.05, 0.0, 0.0), DVec3::new(0.05, 2.0, 2.0)).with_surface(SurfaceType::Concrete),
        )
    }

    #[test]
    fn test_free_flight_reaches_effective_range() {
        let launch = LaunchParams::new(DVec3::ZERO, DVec3::X).with_range(30.0);
        let mut task = task_in(AnalyticScene::new(), launch);
        let sink = RecordingSink::default();

        assert_eq!(task.run_to_completion(&sink), ExitCode::RangeExhausted);
        let result = sink.result().unwrap();
        assert!(result.distance >= 30.0);
        assert!(result.final_position.z < 0.0, "gravity should pull the bullet down");
        assert!(result.final_velocity.length() < 360.0);
        assert!(result.path.len() > 2);
        assert!(result.path.windows(2).all(|w| w[1].time >= w[0].time));
    }

    #[test]
    fn test_cancelled_task_completes_once() {
        let mut task = task_in(AnalyticScene::new(), LaunchParams::default());
        let sink = RecordingSink::default();
        task.cancel();

        assert_eq!(task.step(task.substep(), &sink), Some(ExitCode::Cancelled));
        assert_eq!(task.step(task.substep(), &sink), Some(ExitCode::Cancelled));
        assert_eq!(sink.completions(), 1);
        assert_eq!(sink.result().unwrap().exit_code, ExitCode::Cancelled);
        assert_eq!(task.state(), SimState::Done);
    }

    #[test]
    fn test_concrete_wall_arrests_bullet() {
        let launch = LaunchParams::new(DVec3::ZERO, DVec3::X);
        let mut task = task_in(concrete_wall(), launch);
        let sink = RecordingSink::default();

        assert_eq!(task.run_to_completion(&sink), ExitCode::ZeroVelocity);
        let result = sink.result().unwrap();
        assert_eq!(result.hits.len(), 1);
        assert!(result.exit_hits.is_empty());
        let hit = result.hits[0];
        assert!(hit.is_zero);
        assert!(hit.penetration_depth > 0.04 && hit.penetration_depth < 0.06, "depth {}", hit.penetration_depth);
        assert_relative_eq!(result.final_position.x, 5.0 + hit.penetration_depth, epsilon = 1e-3);
    }

    #[test]
    fn test_ignore_tag_passes_through() {
        let scene = concrete_wall().with_body(
            SceneBody::cuboid(DVec3::new(2.0, 0.0, 0.0), DVec3::new(0.5, 2.0, 2.0))
                .with_surface(SurfaceType::Steel)
                .with_tag(tags::IGNORE),
        );
        let mut task = task_in(scene, LaunchParams::new(DVec3::ZERO, DVec3::X));
        let sink = RecordingSink::default();

        assert_eq!(task.run_to_completion(&sink), ExitCode::ZeroVelocity);
        let result = sink.result().unwrap();
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].surface, SurfaceType::Concrete);
    }

    #[test]
    fn test_impenetrable_body_kills() {
        let scene = AnalyticScene::new().with_body(
            SceneBody::cuboid(DVec3::new(3.0, 0.0, 0.0), DVec3::new(0.01, 2.0, 2.0))
                .with_surface(SurfaceType::Paper)
                .with_tag(tags::IMPENETRABLE),
        );
        let mut task = task_in(scene, LaunchParams::new(DVec3::ZERO, DVec3::X));
        let sink = RecordingSink::default();

        assert_eq!(task.run_to_completion(&sink), ExitCode::ZeroVelocity);
        let result = sink.result().unwrap();
        assert_eq!(result.hits.len(), 1);
        assert!(result.hits[0].is_zero);
        assert_eq!(result.final_velocity, DVec3::ZERO);
    }

    #[test]
    fn test_ignore_penetration_keeps_velocity() {
        let scene = AnalyticScene::new()
            .with_body(
                SceneBody::cuboid(DVec3::new(3.0, 0.0, 0.0), DVec3::new(0.2, 2.0, 2.0))
                    .with_surface(SurfaceType::Steel)
                    .with_tag(tags::IGNORE_PENETRATION),
            )
            .with_world_bounds(Bounds::from_center_half_extents(DVec3::ZERO, DVec3::splat(10.0)));
        let mut task = task_in(scene, LaunchParams::new(DVec3::ZERO, DVec3::X));
        let sink = RecordingSink::default();

        assert_eq!(task.run_to_completion(&sink), ExitCode::Completed);
        let result = sink.result().unwrap();
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.exit_hits.len(), 1);
        assert!(result.final_velocity.length() > 340.0);
    }

    #[test]
    fn test_paper_thin_body_reports_zero_depth_pair() {
        let scene = AnalyticScene::new()
            .with_body(
                SceneBody::cuboid(DVec3::new(3.0, 0.0, 0.0), DVec3::new(0.0002, 2.0, 2.0))
                    .with_surface(SurfaceType::Steel),
            )
            .with_world_bounds(Bounds::from_center_half_extents(DVec3::ZERO, DVec3::splat(10.0)));
        let mut task = task_in(scene, LaunchParams::new(DVec3::ZERO, DVec3::X));
        let sink = RecordingSink::default();

        assert_eq!(task.run_to_completion(&sink), ExitCode::Completed);
        let result = sink.result().unwrap();
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.exit_hits.len(), 1);
        assert_eq!(result.hits[0].penetration_depth, 0.0);
        assert_eq!(result.hits[0].impact_velocity, result.hits[0].exit_velocity);
    }

    #[test]
    fn test_leaving_world_bounds_completes() {
        let scene =
            AnalyticScene::new().with_world_bounds(Bounds::from_center_half_extents(DVec3::ZERO, DVec3::splat(5.0)));
        let mut task = task_in(scene, LaunchParams::new(DVec3::ZERO, DVec3::X));
        assert_eq!(task.run_to_completion(&RecordingSink::default()), ExitCode::Completed);
    }

    #[test]
    fn test_time_limit_stops_slow_projectiles() {
        let ctx = SimContext::new(Arc::new(AnalyticScene::new().with_gravity_z(0.0)))
            .with_config(BallisticsConfig::default().with_max_simulation_duration(0.5));
        let launch = LaunchParams::new(DVec3::ZERO, DVec3::X).with_speed(5.0).with_range(1000.0);
        let ball = ProjectileProperties::sphere(0.02, 7850.0, SurfaceType::Steel);
        let mut task = SimTask::new(ProjectileId::new(), ball.into(), launch, ctx).unwrap();
        let sink = RecordingSink::default();

        assert_eq!(task.run_to_completion(&sink), ExitCode::TimeExhausted);
        assert!(sink.result().unwrap().total_time >= 1.5);
    }

    #[test]
    fn test_unbounded_duration_keeps_a_usable_budget() {
        let ctx = SimContext::new(Arc::new(AnalyticScene::new()))
            .with_config(BallisticsConfig::default().with_max_simulation_duration(f64::INFINITY));
        let launch = LaunchParams::new(DVec3::ZERO, DVec3::X).with_range(30.0);
        let mut task = SimTask::new(ProjectileId::new(), BulletPreset::Para9x19.into(), launch, ctx).unwrap();
        assert_eq!(task.step_budget(), MAX_STEP_BUDGET);

        let sink = RecordingSink::default();
        assert_eq!(task.run_to_completion(&sink), ExitCode::RangeExhausted);
        assert!(sink.result().unwrap().distance >= 30.0);
    }

    fn coriolis_drift(latitude: f64) -> (f64, TaskResult) {
        let environment = crate::resources::BallisticsEnvironment::default().with_latitude(latitude).snapshot();
        let ctx = SimContext::new(Arc::new(AnalyticScene::new().with_gravity_z(0.0)))
            .with_config(BallisticsConfig::default().with_drag_complexity(crate::resources::DragComplexity::Complex))
            .with_environment(environment);
        let launch = LaunchParams::new(DVec3::ZERO, DVec3::X).with_range(300.0);
        let mut task = SimTask::new(ProjectileId::new(), BulletPreset::Para9x19.into(), launch, ctx).unwrap();
        let sink = RecordingSink::default();
        task.run_to_completion(&sink);
        let result = sink.result().unwrap();
        (result.final_position.y, result)
    }

    #[test]
    fn test_coriolis_drift_matches_pole_closed_form() {
        let (north, result) = coriolis_drift(90.0);
        let (south, _) = coriolis_drift(-90.0);

        // Deflection to the right (-Y) in the north, mirrored in the south
        assert!(north < 0.0, "north drift {north}");
        assert!(south > 0.0, "south drift {south}");
        assert_relative_eq!(north, -south, max_relative = 1e-3);

        // |y| = Ω v t² for constant speed; drag keeps it between the final and muzzle speed bounds
        let t2 = result.total_time * result.total_time;
        let upper = EARTH_ANGULAR_SPEED * 360.0 * t2 * 1.05;
        let lower = EARTH_ANGULAR_SPEED * result.final_velocity.length() * t2 * 0.5;
        assert!((lower..=upper).contains(&north.abs()), "drift {north} outside {lower}..{upper}");
    }

    #[test]
    fn test_thin_hit_zone_is_a_plain_hit() {
        let scene = AnalyticScene::new().with_body(
            SceneBody::cuboid(DVec3::new(3.0, 0.0, 0.0), DVec3::new(0.0002, 0.5, 0.5))
                .with_gameplay_tag(crate::scene::tags::HIT_ZONE_FLESH),
        );
        let mut task = task_in(scene, LaunchParams::new(DVec3::ZERO, DVec3::X).with_range(10.0));
        let sink = RecordingSink::default();

        assert_eq!(task.run_to_completion(&sink), ExitCode::RangeExhausted);
        let result = sink.result().unwrap();
        assert!(result.injuries.is_empty());
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.exit_hits.len(), 1);
        assert!(sink.events().iter().all(|e| !matches!(e, TaskEvent::Injure(_))));
    }

    #[test]
    fn test_realtime_advance_respects_timescale() {
        let launch = LaunchParams::new(DVec3::ZERO, DVec3::X)
            .with_simulation_type(SimulationType::Realtime)
            .with_timescale(0.5);
        let mut task = task_in(AnalyticScene::new(), launch);
        let sink = RecordingSink::default();

        assert_eq!(task.advance(0.1, &sink), None);
        assert_relative_eq!(task.projectile_state().time, 0.05, epsilon = 1e-9);
        assert!(sink.events().iter().all(|e| !e.is_complete()));
    }

    #[test]
    fn test_updates_only_when_requested() {
        let mut task = task_in(AnalyticScene::new(), LaunchParams::default());
        let quiet = RecordingSink::default();
        task.run_steps(3, &quiet);
        assert!(quiet.events().is_empty());

        let chatty = RecordingSink::with_updates();
        task.run_steps(3, &chatty);
        assert_eq!(chatty.events().len(), 3);
        assert!(matches!(chatty.events()[0], TaskEvent::Update(_)));
    }

    #[test]
    fn test_fly_by_once_per_actor() {
        let listener = ActorId(42);
        let mut scene = AnalyticScene::new();
        scene.add_actor(
            listener,
            SceneActor {
                fly_by: true,
                ..Default::default()
            },
        );
        scene.add_body(SceneBody::sphere(DVec3::new(10.0, 1.0, 0.0), 0.3).with_actor(listener));
        let mut task = task_in(scene, LaunchParams::new(DVec3::ZERO, DVec3::X).with_range(40.0));
        let sink = RecordingSink::default();

        task.run_to_completion(&sink);
        let fly_bys: Vec<_> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                TaskEvent::FlyBy(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(fly_bys.len(), 1);
        assert_eq!(fly_bys[0].actor, listener);
        assert!(fly_bys[0].distance <= 2.0);
    }

    #[test]
    fn test_owner_never_gets_fly_by() {
        let owner = ActorId(1);
        let mut scene = AnalyticScene::new();
        scene.add_actor(
            owner,
            SceneActor {
                fly_by: true,
                ..Default::default()
            },
        );
        scene.add_body(SceneBody::sphere(DVec3::new(0.0, 0.5, 0.0), 0.3).with_actor(owner));
        let launch = LaunchParams::new(DVec3::ZERO, DVec3::X)
            .with_owner(owner, DVec3::ZERO)
            .with_range(20.0);
        let mut task = task_in(scene, launch);
        let sink = RecordingSink::default();

        task.run_to_completion(&sink);
        assert!(sink.events().iter().all(|e| !matches!(e, TaskEvent::FlyBy(_))));
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        let ctx = SimContext::new(Arc::new(AnalyticScene::new()));
        let launch = LaunchParams::default().with_speed(f64::INFINITY);
        assert!(SimTask::new(ProjectileId::new(), BulletPreset::Para9x19.into(), launch, ctx).is_err());
    }
}
