//! The ballistics engine: submission, worker-pool placement, cancellation
//! and event marshalling.
//!
//! Instant flights run on Bevy's [`AsyncComputeTaskPool`] and yield between
//! slices of substeps. Realtime flights are kept by the engine and advanced
//! by [`BallisticsEngine::tick`]. Every event a task produces is queued and
//! handed to consumers by [`BallisticsEngine::dispatch`] on the caller's
//! thread, so callbacks never run on a worker.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use bevy::log::{debug, info, warn};
use bevy::prelude::*;
use bevy::tasks::futures_lite::future::yield_now;
use bevy::tasks::{AsyncComputeTaskPool, ComputeTaskPool, TaskPool};

use crate::events::{Callbacks, TaskEvent};
use crate::materials::MaterialTable;
use crate::projectile::Projectile;
use crate::resources::{BallisticsConfig, BallisticsEnvironment};
use crate::scene::{AnalyticScene, SceneQuery};
use crate::sim::{EventSink, LaunchParams, RecordingSink, SimContext, SimTask, TaskResult};
use crate::types::{ExitCode, ProjectileId, SimulationType};

/// Batches at least this large are submitted in parallel.
pub const PARALLEL_THRESHOLD: usize = 16;
/// Substeps an instant flight runs before yielding the worker.
const STEPS_PER_YIELD: usize = 32;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T: Clone>(lock: &RwLock<T>) -> T {
    lock.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn write<T>(lock: &RwLock<T>, value: T) {
    *lock.write().unwrap_or_else(PoisonError::into_inner) = value;
}

/// Counts in-flight work so shutdown can wait for it to drain.
#[derive(Default)]
pub struct PendingTaskSynch {
    count: Mutex<usize>,
    idle: Condvar,
}

impl PendingTaskSynch {
    pub fn begin(&self) {
        *lock(&self.count) += 1;
    }

    pub fn end(&self) {
        let mut count = lock(&self.count);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    pub fn count(&self) -> usize {
        *lock(&self.count)
    }

    /// Blocks until nothing is pending or `timeout` passes.
    ///
    /// # Returns
    /// True when the count reached zero
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = lock(&self.count);
        let (guard, _) = self
            .idle
            .wait_timeout_while(guard, timeout, |count| *count > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *guard == 0
    }
}

/// Stable reference to an arena slot. A handle whose generation no longer
/// matches its slot refers to a finished task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    index: u32,
    generation: u32,
}

struct LiveTask {
    id: ProjectileId,
    cancel: Arc<AtomicBool>,
}

#[derive(Default)]
struct Slot {
    generation: u32,
    live: Option<LiveTask>,
}

/// Generation-indexed table of live tasks.
#[derive(Default)]
struct TaskArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_id: HashMap<ProjectileId, TaskHandle>,
}

impl TaskArena {
    /// Registers a live task. `None` when `id` is already live.
    fn insert(&mut self, id: ProjectileId, cancel: Arc<AtomicBool>) -> Option<TaskHandle> {
        if self.lookup(id).is_some() {
            return None;
        }
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.live = Some(LiveTask { id, cancel });
        let handle = TaskHandle {
            index,
            generation: slot.generation,
        };
        self.by_id.insert(id, handle);
        Some(handle)
    }

    fn get(&self, handle: TaskHandle) -> Option<&LiveTask> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation == handle.generation {
            slot.live.as_ref()
        } else {
            None
        }
    }

    fn lookup(&self, id: ProjectileId) -> Option<&LiveTask> {
        self.by_id.get(&id).and_then(|handle| self.get(*handle))
    }

    fn release(&mut self, handle: TaskHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation {
            return false;
        }
        let Some(live) = slot.live.take() else {
            return false;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        if self.by_id.get(&live.id) == Some(&handle) {
            self.by_id.remove(&live.id);
        }
        true
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }

    fn cancel_all(&self) {
        for live in self.slots.iter().filter_map(|s| s.live.as_ref()) {
            live.cancel.store(true, Ordering::Release);
        }
    }
}

struct EngineInner {
    scene: RwLock<Arc<dyn SceneQuery>>,
    materials: RwLock<Arc<MaterialTable>>,
    config: RwLock<Arc<BallisticsConfig>>,
    environment: RwLock<BallisticsEnvironment>,
    arena: Mutex<TaskArena>,
    realtime: Mutex<Vec<(SimTask, EngineSink)>>,
    events: Mutex<VecDeque<TaskEvent>>,
    callbacks: Mutex<HashMap<ProjectileId, Callbacks>>,
    pending: Arc<PendingTaskSynch>,
    shutting_down: AtomicBool,
}

/// Routes a task's events into the engine's dispatcher queue.
struct EngineSink {
    engine: Weak<EngineInner>,
    handle: TaskHandle,
    updates: bool,
}

impl EventSink for EngineSink {
    fn emit(&self, event: TaskEvent) {
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        if event.is_complete() {
            lock(&engine.arena).release(self.handle);
        } else if engine.shutting_down.load(Ordering::Acquire) {
            return;
        }
        lock(&engine.events).push_back(event);
    }

    fn wants_updates(&self) -> bool {
        self.updates
    }
}

/// Runs and tracks every projectile of a world.
///
/// Cloning is cheap: clones share the same engine.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use bevy::math::DVec3;
/// use terminal_ballistics::projectile::BulletPreset;
/// use terminal_ballistics::scheduler::BallisticsEngine;
/// use terminal_ballistics::sim::LaunchParams;
/// use terminal_ballistics::types::ProjectileId;
///
/// let engine = BallisticsEngine::default();
/// let id = engine.fire(
///     BulletPreset::Para9x19.into(),
///     LaunchParams::new(DVec3::ZERO, DVec3::X).with_range(10.0),
///     ProjectileId::NONE,
/// );
/// assert!(!id.is_none());
/// assert!(engine.wait_for_idle(Duration::from_secs(10)));
/// assert!(engine.dispatch() >= 1);
/// ```
#[derive(Resource, Clone)]
pub struct BallisticsEngine {
    inner: Arc<EngineInner>,
}

impl Default for BallisticsEngine {
    fn default() -> Self {
        Self::new(Arc::new(AnalyticScene::new()))
    }
}

impl BallisticsEngine {
    pub fn new(scene: Arc<dyn SceneQuery>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                scene: RwLock::new(scene),
                materials: RwLock::new(Arc::new(MaterialTable::default())),
                config: RwLock::new(Arc::new(BallisticsConfig::default())),
                environment: RwLock::new(BallisticsEnvironment::default()),
                arena: Mutex::new(TaskArena::default()),
                realtime: Mutex::new(Vec::new()),
                events: Mutex::new(VecDeque::new()),
                callbacks: Mutex::new(HashMap::new()),
                pending: Arc::new(PendingTaskSynch::default()),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn with_config(self, config: BallisticsConfig) -> Self {
        self.set_config(config);
        self
    }

    pub fn with_materials(self, materials: MaterialTable) -> Self {
        self.set_material_table(materials);
        self
    }

    pub fn with_environment(self, environment: BallisticsEnvironment) -> Self {
        self.set_environment(environment);
        self
    }

    pub fn config(&self) -> Arc<BallisticsConfig> {
        read(&self.inner.config)
    }

    /// Replaces the configuration. Flights already in the air keep theirs.
    pub fn set_config(&self, config: BallisticsConfig) {
        write(&self.inner.config, Arc::new(config));
    }

    pub fn environment(&self) -> BallisticsEnvironment {
        read(&self.inner.environment)
    }

    pub fn set_environment(&self, environment: BallisticsEnvironment) {
        write(&self.inner.environment, environment);
    }

    pub fn material_table(&self) -> Arc<MaterialTable> {
        read(&self.inner.materials)
    }

    /// Swaps the material table. Running flights keep the table they were
    /// fired with.
    pub fn set_material_table(&self, materials: MaterialTable) {
        write(&self.inner.materials, Arc::new(materials));
    }

    pub fn scene(&self) -> Arc<dyn SceneQuery> {
        read(&self.inner.scene)
    }

    pub fn set_scene(&self, scene: Arc<dyn SceneQuery>) {
        write(&self.inner.scene, scene);
    }

    /// Snapshot of everything a new flight needs.
    pub fn context(&self) -> SimContext {
        let config = self.config();
        let environment = self
            .environment()
            .snapshot()
            .with_wind_multiplier(config.wind_speed_multiplier);
        let mut ctx = SimContext::new(self.scene())
            .with_materials(self.material_table())
            .with_environment(environment);
        ctx.config = config;
        ctx
    }

    /// Fire-and-forget submission.
    ///
    /// # Arguments
    /// * `projectile` - What to fire
    /// * `launch` - Muzzle state; its simulation type picks the runner
    /// * `id` - Id to use, or [`ProjectileId::NONE`] to generate one
    ///
    /// # Returns
    /// The flight's id, or [`ProjectileId::NONE`] when the submission was rejected
    pub fn fire(&self, projectile: Projectile, launch: LaunchParams, id: ProjectileId) -> ProjectileId {
        self.submit(projectile, launch, id, None)
    }

    /// Like [`BallisticsEngine::fire`], with callbacks run by [`BallisticsEngine::dispatch`].
    pub fn fire_with_callbacks(
        &self,
        projectile: Projectile,
        launch: LaunchParams,
        callbacks: Callbacks,
        id: ProjectileId,
    ) -> ProjectileId {
        self.submit(projectile, launch, id, Some(callbacks))
    }

    /// Submits many independent flights, in parallel for large batches.
    ///
    /// `ids` may be shorter than `projectiles`; missing ids are generated.
    ///
    /// # Returns
    /// One id per projectile, [`ProjectileId::NONE`] where the submission was rejected
    pub fn fire_batch(
        &self,
        projectiles: Vec<Projectile>,
        launches: Vec<LaunchParams>,
        ids: Vec<ProjectileId>,
    ) -> Vec<ProjectileId> {
        if projectiles.len() != launches.len() {
            warn!(
                "Batch rejected: {} projectiles but {} launch params",
                projectiles.len(),
                launches.len()
            );
            return vec![ProjectileId::NONE; projectiles.len()];
        }

        let mut ids = ids.into_iter();
        let jobs: Vec<_> = projectiles
            .into_iter()
            .zip(launches)
            .map(|(projectile, launch)| (projectile, launch, ids.next().unwrap_or(ProjectileId::NONE)))
            .collect();

        if jobs.len() < PARALLEL_THRESHOLD {
            return jobs
                .into_iter()
                .map(|(projectile, launch, id)| self.fire(projectile, launch, id))
                .collect();
        }

        let pool = ComputeTaskPool::get_or_init(TaskPool::default);
        let chunk_size = jobs.len().div_ceil(pool.thread_num().max(1));
        let mut jobs = jobs.into_iter().peekable();
        let mut chunks = Vec::new();
        while jobs.peek().is_some() {
            chunks.push(jobs.by_ref().take(chunk_size).collect::<Vec<_>>());
        }
        pool.scope(|scope| {
            for chunk in chunks {
                scope.spawn(async move {
                    chunk
                        .into_iter()
                        .map(|(projectile, launch, id)| self.fire(projectile, launch, id))
                        .collect::<Vec<_>>()
                });
            }
        })
        .into_iter()
        .flatten()
        .collect()
    }

    /// Predicts a flight without side effects: the flight runs on the
    /// calling thread, produces no queued events, and `completion` receives
    /// the result before this returns.
    pub fn fire_test(
        &self,
        projectile: Projectile,
        launch: LaunchParams,
        id: ProjectileId,
        completion: impl FnOnce(TaskResult),
    ) -> ProjectileId {
        let id = id.or_generate();
        let mut task = match SimTask::new(id, projectile, launch, self.context()) {
            Ok(task) => task,
            Err(err) => {
                warn!("Test fire rejected: {err}");
                return ProjectileId::NONE;
            }
        };
        let sink = RecordingSink::default();
        task.run_to_completion(&sink);
        if let Some(result) = sink.result() {
            completion(result);
        }
        id
    }

    fn submit(
        &self,
        projectile: Projectile,
        launch: LaunchParams,
        id: ProjectileId,
        callbacks: Option<Callbacks>,
    ) -> ProjectileId {
        if self.is_shutting_down() {
            warn!("Fire rejected: engine is shutting down");
            return ProjectileId::NONE;
        }
        let id = id.or_generate();

        let task = match SimTask::new(id, projectile, launch, self.context()) {
            Ok(task) => task,
            Err(err) => {
                warn!("Fire rejected: {err}");
                return ProjectileId::NONE;
            }
        };
        let updates = callbacks.as_ref().is_some_and(Callbacks::wants_updates);
        // Check and registration share one lock so an id goes live once
        let Some(handle) = lock(&self.inner.arena).insert(id, task.cancel_flag()) else {
            warn!("Fire rejected: {id:?} is already in flight");
            return ProjectileId::NONE;
        };
        if let Some(callbacks) = callbacks {
            lock(&self.inner.callbacks).insert(id, callbacks);
        }
        let sink = EngineSink {
            engine: Arc::downgrade(&self.inner),
            handle,
            updates,
        };

        self.inner.pending.begin();
        debug!("Fired {id:?} ({:?})", task.simulation_type());
        match task.simulation_type() {
            SimulationType::Instant => self.spawn_instant(task, sink),
            SimulationType::Realtime => lock(&self.inner.realtime).push((task, sink)),
        }
        id
    }

    fn spawn_instant(&self, mut task: SimTask, sink: EngineSink) {
        let pending = self.inner.pending.clone();
        AsyncComputeTaskPool::get_or_init(TaskPool::default)
            .spawn(async move {
                let budget = task.step_budget();
                let mut steps = 0u64;
                while !task.run_steps(STEPS_PER_YIELD, &sink) {
                    steps += STEPS_PER_YIELD as u64;
                    if steps >= budget {
                        task.finish(ExitCode::TimeExhausted, &sink);
                        break;
                    }
                    yield_now().await;
                }
                pending.end();
            })
            .detach();
    }

    /// Advances every realtime flight by `dt` wall-clock seconds.
    pub fn tick(&self, dt: f64) {
        let mut tasks = std::mem::take(&mut *lock(&self.inner.realtime));
        if tasks.is_empty() {
            return;
        }

        if tasks.len() >= PARALLEL_THRESHOLD {
            let pool = ComputeTaskPool::get_or_init(TaskPool::default);
            let chunk_size = tasks.len().div_ceil(pool.thread_num().max(1));
            pool.scope(|scope| {
                for chunk in tasks.chunks_mut(chunk_size) {
                    scope.spawn(async move {
                        for (task, sink) in chunk {
                            task.advance(dt, &*sink);
                        }
                    });
                }
            });
        } else {
            for (task, sink) in tasks.iter_mut() {
                task.advance(dt, &*sink);
            }
        }

        let (finished, running): (Vec<_>, Vec<_>) = tasks.into_iter().partition(|(task, _)| task.is_finished());
        for _ in &finished {
            self.inner.pending.end();
        }
        lock(&self.inner.realtime).extend(running);
    }

    /// Delivers queued events to their callbacks on the calling thread.
    ///
    /// # Returns
    /// The number of events delivered
    pub fn dispatch(&self) -> usize {
        self.dispatch_with(|_| {})
    }

    /// Like [`BallisticsEngine::dispatch`], also handing every event to `forward`
    /// after its callbacks ran.
    pub fn dispatch_with(&self, mut forward: impl FnMut(&TaskEvent)) -> usize {
        let events: Vec<TaskEvent> = lock(&self.inner.events).drain(..).collect();
        for event in &events {
            let id = event.projectile_id();
            // Callbacks run without the map locked so they may fire again
            let callbacks = lock(&self.inner.callbacks).remove(&id);
            if let Some(mut callbacks) = callbacks {
                callbacks.invoke(event);
                if !event.is_complete() {
                    lock(&self.inner.callbacks).insert(id, callbacks);
                }
            }
            forward(event);
        }
        events.len()
    }

    /// Requests cancellation of a live flight.
    ///
    /// # Returns
    /// False when no flight with this id is live
    pub fn cancel(&self, id: ProjectileId) -> bool {
        match lock(&self.inner.arena).lookup(id) {
            Some(live) => {
                live.cancel.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        lock(&self.inner.arena).cancel_all();
    }

    pub fn is_live(&self, id: ProjectileId) -> bool {
        lock(&self.inner.arena).lookup(id).is_some()
    }

    pub fn live_count(&self) -> usize {
        lock(&self.inner.arena).len()
    }

    /// Outstanding flights, including realtime ones waiting for ticks.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.count()
    }

    /// Blocks until every flight has finished or `timeout` passes.
    ///
    /// Realtime flights only finish while someone calls
    /// [`BallisticsEngine::tick`].
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        self.inner.pending.wait(timeout)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Acquire)
    }

    /// Stops accepting work, cancels every flight and waits for them to drain.
    /// Only completion events are queued from here on.
    ///
    /// # Returns
    /// True when all flights finished within `timeout`
    pub fn shutdown(&self, timeout: Duration) -> bool {
        if self.inner.shutting_down.swap(true, Ordering::AcqRel) {
            return self.wait_for_idle(timeout);
        }
        info!("Ballistics engine shutting down with {} live flights", self.live_count());
        self.cancel_all();
        // Cancelled realtime flights finish on their next step
        self.tick(0.0);
        let drained = self.wait_for_idle(timeout);
        if !drained {
            warn!("{} flights still pending after shutdown timeout", self.pending_count());
        }
        drained
    }
}
