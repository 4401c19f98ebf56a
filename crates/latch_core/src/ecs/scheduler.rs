//! scheduler.rs - C7: dependency-aware system scheduler
//!
//! Four ordered stages run every tick: `TickSequential` (always run
//! single-threaded, e.g. input ingestion), `Tick`, `Update`, and
//! `PostUpdate`. Within a stage, systems form a DAG: an explicit
//! dependency edge from `add_dependency`, plus an implicit edge whenever
//! one system's declared writes overlap another's reads or writes. The
//! scheduler collapses the DAG into waves (topological layers); sequential
//! dispatch runs wave members back to back, parallel dispatch hands a
//! wave to a `rayon` scope.
//!
//! Systems reach component data through `World`'s per-container locks, not
//! through anything the scheduler hands them directly — the read/write
//! sets declared here are a scheduling hint, not the source of memory
//! safety.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use latch_metrics::SystemProfiler;

use crate::time::TICK_DURATION;

use super::component::ComponentTypeIndex;
use super::error::debug_fail;
use super::world::World;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    TickSequential,
    Tick,
    Update,
    PostUpdate,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::TickSequential, Stage::Tick, Stage::Update, Stage::PostUpdate];
}

/// A named unit of per-tick work. `setup`/`destroy`/`reset` are lifecycle
/// hooks the scheduler or an embedder drives around a system's time in the
/// world; `fixed_update`/`update` are the actual per-tick work, with
/// `run` as the simplest entry point for systems that don't care about
/// `dt`. Only `name`, `stage`, and `run` are mandatory — everything else
/// defaults to a no-op or forwards to `run`.
pub trait System: Send + Sync {
    fn name(&self) -> &str;
    fn stage(&self) -> Stage;
    fn reads(&self) -> &[ComponentTypeIndex] {
        &[]
    }
    fn writes(&self) -> &[ComponentTypeIndex] {
        &[]
    }

    /// Called once by the scheduler immediately before this system's first
    /// `fixed_update`.
    fn setup(&self, _world: &World) {}

    /// Not driven by `Scheduler` itself (it has no system-removal API yet);
    /// available for an embedder that owns a system's lifetime to call
    /// before dropping it.
    fn destroy(&self, _world: &World) {}

    /// Clears any per-run accumulated state. Not driven by `Scheduler`;
    /// available for an embedder to call between runs.
    fn reset(&self) {}

    /// Variable-timestep update, for systems driven outside the fixed-tick
    /// scheduler loop. Defaults to `run`.
    fn update(&self, world: &World, _dt: Duration) {
        self.run(world);
    }

    /// Fixed-timestep update; this is what `Scheduler::run_stage` actually
    /// calls every tick. Defaults to `run`.
    fn fixed_update(&self, world: &World, _dt: Duration) {
        self.run(world);
    }

    fn run(&self, world: &World);
}

/// Opaque reference to a system registered with the scheduler, usable to
/// declare an ordering dependency via `Scheduler::add_dependency`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TaskHandle {
    stage: Stage,
    index: usize,
}

struct Entry {
    system: Box<dyn System>,
    explicit_deps: Vec<usize>,
    first_time_only: bool,
    has_run: AtomicBool,
}

enum Dispatch {
    Sequential,
    Parallel(rayon::ThreadPool),
}

pub struct Scheduler {
    stages: [Vec<Entry>; 4],
    dispatch: Dispatch,
    profiler: Mutex<SystemProfiler>,
}

fn stage_slot(stage: Stage) -> usize {
    Stage::ALL.iter().position(|&s| s == stage).expect("Stage::ALL is exhaustive")
}

impl Scheduler {
    pub fn sequential() -> Self {
        Self {
            stages: Default::default(),
            dispatch: Dispatch::Sequential,
            profiler: Mutex::new(SystemProfiler::new()),
        }
    }

    pub fn parallel(pool: rayon::ThreadPool) -> Self {
        Self {
            stages: Default::default(),
            dispatch: Dispatch::Parallel(pool),
            profiler: Mutex::new(SystemProfiler::new()),
        }
    }

    /// Accumulated time spent inside `name`'s `System::run`, since the
    /// last `reset_profiler`. Zero when the `metrics` feature is off.
    pub fn system_timing(&self, name: &str) -> Duration {
        self.profiler.lock().expect("profiler lock poisoned").get_timing(name)
    }

    pub fn reset_profiler(&self) {
        self.profiler.lock().expect("profiler lock poisoned").reset();
    }

    pub fn add_system(&mut self, system: Box<dyn System>) -> TaskHandle {
        self.add_system_inner(system, false)
    }

    /// Registers `system` as a one-shot task: it runs on the first tick of
    /// its stage after registration and never again.
    pub fn add_system_first_time_only(&mut self, system: Box<dyn System>) -> TaskHandle {
        self.add_system_inner(system, true)
    }

    fn add_system_inner(&mut self, system: Box<dyn System>, first_time_only: bool) -> TaskHandle {
        let stage = system.stage();
        let slot = &mut self.stages[stage_slot(stage)];
        let index = slot.len();
        slot.push(Entry {
            system,
            explicit_deps: Vec::new(),
            first_time_only,
            has_run: AtomicBool::new(false),
        });
        TaskHandle { stage, index }
    }

    /// `task` will not run in a wave before `depends_on` has completed.
    /// Both handles must belong to the same stage.
    pub fn add_dependency(&mut self, task: TaskHandle, depends_on: TaskHandle) {
        if task.stage != depends_on.stage {
            debug_fail!("scheduler dependency must stay within a single stage");
            return;
        }
        self.stages[stage_slot(task.stage)][task.index]
            .explicit_deps
            .push(depends_on.index);
    }

    fn conflicts(a: &Entry, b: &Entry) -> bool {
        let writes_a = a.system.writes();
        let writes_b = b.system.writes();
        let reads_a = a.system.reads();
        let reads_b = b.system.reads();
        writes_a.iter().any(|w| writes_b.contains(w) || reads_b.contains(w))
            || writes_b.iter().any(|w| reads_a.contains(w))
    }

    /// Layer a stage's systems into waves: each wave is a maximal set of
    /// systems with no dependency or read/write conflict between them and
    /// every earlier wave already dispatched.
    fn waves(entries: &[Entry]) -> Vec<Vec<usize>> {
        let n = entries.len();
        let mut remaining: Vec<usize> = (0..n).collect();
        let mut done = vec![false; n];
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let mut wave = Vec::new();
            for &i in &remaining {
                let deps_satisfied = entries[i].explicit_deps.iter().all(|&d| done[d]);
                if !deps_satisfied {
                    continue;
                }
                let conflicts_with_wave = wave.iter().any(|&j: &usize| Self::conflicts(&entries[i], &entries[j]));
                if !conflicts_with_wave {
                    wave.push(i);
                }
            }
            if wave.is_empty() {
                debug_fail!("scheduler dependency cycle detected");
                return waves;
            }
            for &i in &wave {
                done[i] = true;
            }
            remaining.retain(|i| !done[*i]);
            waves.push(wave);
        }
        waves
    }

    /// Runs `entry`, handling the automatic one-time `setup` call and the
    /// `first_time_only` skip, then times the actual `fixed_update` call.
    fn run_entry(&self, entry: &Entry, world: &World) {
        let already_ran = entry.has_run.swap(true, Ordering::SeqCst);
        if entry.first_time_only && already_ran {
            return;
        }
        if !already_ran {
            entry.system.setup(world);
        }
        self.profiler
            .lock()
            .expect("profiler lock poisoned")
            .time_system(entry.system.name(), || entry.system.fixed_update(world, TICK_DURATION));
    }

    pub fn run_stage(&self, stage: Stage, world: &World) {
        let entries = &self.stages[stage_slot(stage)];
        if entries.is_empty() {
            return;
        }
        let waves = Self::waves(entries);
        let span = tracing::debug_span!("scheduler_stage", stage = ?stage, systems = entries.len());
        let _enter = span.enter();

        // TickSequential always runs single-threaded, in registration
        // order, even when the scheduler otherwise dispatches in parallel.
        let force_sequential = matches!(stage, Stage::TickSequential);

        for wave in waves {
            match &self.dispatch {
                Dispatch::Sequential => {
                    for i in wave {
                        self.run_entry(&entries[i], world);
                    }
                }
                Dispatch::Parallel(_) if force_sequential => {
                    for i in wave {
                        self.run_entry(&entries[i], world);
                    }
                }
                Dispatch::Parallel(pool) => {
                    pool.install(|| {
                        use rayon::prelude::*;
                        wave.par_iter().for_each(|&i| self.run_entry(&entries[i], world));
                    });
                }
            }
        }
    }

    /// Run every stage, in declared order, once.
    pub fn run_tick(&self, world: &World) {
        for stage in Stage::ALL {
            self.run_stage(stage, world);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Recorder {
        name: &'static str,
        stage: Stage,
        order: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    impl System for Recorder {
        fn name(&self) -> &str {
            self.name
        }
        fn stage(&self) -> Stage {
            self.stage
        }
        fn run(&self, _world: &World) {
            self.order.lock().unwrap().push(self.name);
        }
    }

    #[test]
    fn explicit_dependency_orders_systems_into_separate_waves() {
        let mut scheduler = Scheduler::sequential();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let first = scheduler.add_system(Box::new(Recorder {
            name: "first",
            stage: Stage::Update,
            order: order.clone(),
        }));
        let second = scheduler.add_system(Box::new(Recorder {
            name: "second",
            stage: Stage::Update,
            order: order.clone(),
        }));
        scheduler.add_dependency(second, first);

        let world = World::new();
        scheduler.run_stage(Stage::Update, &world);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn independent_systems_both_run_without_explicit_ordering() {
        let mut scheduler = Scheduler::sequential();
        let counter = Arc::new(AtomicUsize::new(0));

        struct Counting(Arc<AtomicUsize>, Stage);
        impl System for Counting {
            fn name(&self) -> &str {
                "counting"
            }
            fn stage(&self) -> Stage {
                self.1
            }
            fn run(&self, _world: &World) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        scheduler.add_system(Box::new(Counting(counter.clone(), Stage::Tick)));
        scheduler.add_system(Box::new(Counting(counter.clone(), Stage::Tick)));

        let world = World::new();
        scheduler.run_stage(Stage::Tick, &world);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tick_sequential_runs_in_registration_order_under_parallel_dispatch() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let mut scheduler = Scheduler::parallel(pool);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for name in ["a", "b", "c"] {
            scheduler.add_system(Box::new(Recorder {
                name,
                stage: Stage::TickSequential,
                order: order.clone(),
            }));
        }

        let world = World::new();
        scheduler.run_stage(Stage::TickSequential, &world);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn first_time_only_task_runs_once_across_ticks() {
        let mut scheduler = Scheduler::sequential();
        let counter = Arc::new(AtomicUsize::new(0));

        struct Counting(Arc<AtomicUsize>, Stage);
        impl System for Counting {
            fn name(&self) -> &str {
                "counting"
            }
            fn stage(&self) -> Stage {
                self.1
            }
            fn run(&self, _world: &World) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        scheduler.add_system_first_time_only(Box::new(Counting(counter.clone(), Stage::Update)));

        let world = World::new();
        scheduler.run_stage(Stage::Update, &world);
        scheduler.run_stage(Stage::Update, &world);
        scheduler.run_stage(Stage::Update, &world);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
