#![allow(missing_docs)]
#![cfg(not(feature = "loom"))]

mod common;

use common::{options, runtime};
use rayon::prelude::*;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};
use vtg::{
    access::{Access, AccessKind, AccessProperties},
    config::{Config, DefaultConfig, Readiness},
    executor::Runtime,
    queue::{Deque, PinnedDeque, PriorityDeque, XorLinkedList},
    task::{Deallocate, Disposal, Priority, Task},
};

struct XorConfig;

impl Config for XorConfig {
    type AccessKind = Access;
    type Queue = Deque<Self, XorLinkedList>;
    type Disposal = Deallocate;
}

struct PriorityConfig;

impl Config for PriorityConfig {
    type AccessKind = Access;
    type Queue = PriorityDeque<Self>;
    type Disposal = Deallocate;
}

struct PinnedConfig;

impl Config for PinnedConfig {
    type AccessKind = Access;
    type Queue = PinnedDeque<Self, XorLinkedList>;
    type Disposal = Deallocate;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Matrix {
    Read,
    Write,
    Mul,
}

impl AccessKind for Matrix {
    const ALL: &'static [Self] = &[Self::Read, Self::Write, Self::Mul];

    fn properties(self) -> AccessProperties {
        match self {
            Self::Read => AccessProperties::READ,
            Self::Write => AccessProperties::WRITE,
            Self::Mul => AccessProperties::ACCUMULATE,
        }
    }
}

struct MatrixConfig;

impl Config for MatrixConfig {
    type AccessKind = Matrix;
    type Queue = Deque<Self>;
    type Disposal = Deallocate;
}

/// Counts disposed tasks.
#[derive(Default)]
struct Counting(Arc<AtomicUsize>);

impl<C: Config> Disposal<C> for Counting {
    fn dispose(&self, task: Task<C>) {
        assert!(task.is_executed());
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

struct CountingConfig;

impl Config for CountingConfig {
    type AccessKind = Access;
    type Queue = Deque<Self>;
    type Disposal = Counting;
}

fn wait_until(timeout: Duration, done: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while !done() {
        if start.elapsed() > timeout {
            return false;
        }
        thread::yield_now();
    }
    true
}

fn chained_writes_run_in_order<C>(num_workers: usize, readiness: Readiness)
where
    C: Config<AccessKind = Access>,
    C::Disposal: Default,
{
    let mut runtime = runtime::<C>(num_workers, readiness);
    let handle = runtime.create_handle();
    let log = Arc::new(Mutex::new(Vec::with_capacity(1000)));
    for step in 0..1000 {
        let log = Arc::clone(&log);
        runtime.submit(Task::new(
            move |_| log.lock().unwrap().push(step),
            [(&handle, Access::Write)],
        ));
    }
    runtime.barrier();
    assert_eq!(*log.lock().unwrap(), (0..1000).collect::<Vec<_>>());
    assert_eq!(handle.completed_version(), 1000);
}

#[test]
fn chained_writes_eager() {
    chained_writes_run_in_order::<DefaultConfig>(4, Readiness::Eager);
}

#[test]
fn chained_writes_lazy() {
    chained_writes_run_in_order::<DefaultConfig>(4, Readiness::Lazy);
}

#[test]
fn chained_writes_on_xor_lists() {
    chained_writes_run_in_order::<XorConfig>(3, Readiness::Eager);
}

#[test]
fn chained_writes_on_priority_queues() {
    chained_writes_run_in_order::<PriorityConfig>(3, Readiness::Lazy);
}

#[test]
fn chained_writes_on_a_single_worker() {
    chained_writes_run_in_order::<DefaultConfig>(1, Readiness::Eager);
}

#[test]
fn barrier_waits_for_every_task_after_paused_start() {
    let mut runtime =
        Runtime::<DefaultConfig>::new(options(4, Readiness::Eager).start_paused(true))
            .expect("runtime starts");
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..1000 {
        let counter = Arc::clone(&counter);
        runtime.submit(
            Task::builder(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .build(),
        );
    }
    thread::sleep(Duration::from_millis(20));
    assert_eq!(counter.load(Ordering::Relaxed), 0);

    runtime.start_executing();
    runtime.barrier();
    assert_eq!(counter.load(Ordering::Relaxed), 1000);
}

#[test]
fn workers_released_while_tasks_are_being_submitted() {
    for _ in 0..20 {
        let mut runtime =
            Runtime::<DefaultConfig>::new(options(4, Readiness::Eager).start_paused(true))
                .expect("runtime starts");
        let counter = Arc::new(AtomicUsize::new(0));
        thread::scope(|scope| {
            let runtime = &runtime;
            scope.spawn(move || {
                thread::yield_now();
                runtime.start_executing();
            });
            for _ in 0..1000 {
                let counter = Arc::clone(&counter);
                runtime.submit(
                    Task::builder(move |_| {
                        counter.fetch_add(1, Ordering::Relaxed);
                    })
                    .build(),
                );
            }
        });
        runtime.barrier();
        assert_eq!(counter.load(Ordering::Relaxed), 1000);
    }
}

#[test]
fn idle_workers_steal_from_the_submitting_thread() {
    let mut runtime = runtime::<DefaultConfig>(4, Readiness::Eager);
    let runs: Arc<Vec<AtomicUsize>> = Arc::new((0..1000).map(|_| AtomicUsize::new(0)).collect());
    let on_caller = Arc::new(AtomicUsize::new(0));
    for index in 0..1000 {
        let runs = Arc::clone(&runs);
        let on_caller = Arc::clone(&on_caller);
        runtime.submit(
            Task::builder(move |worker| {
                runs[index].fetch_add(1, Ordering::Relaxed);
                if worker.id() == 0 {
                    on_caller.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build(),
        );
    }
    // Worker 0 only runs tasks inside `barrier`, so everything so far was
    // stolen by the worker threads.
    assert!(wait_until(Duration::from_secs(30), || {
        runs.iter().all(|count| count.load(Ordering::Relaxed) == 1)
    }));
    runtime.barrier();
    assert!(runs.iter().all(|count| count.load(Ordering::Relaxed) == 1));
    assert_eq!(on_caller.load(Ordering::Relaxed), 0);
}

#[test]
fn tasks_submitted_from_payloads_are_awaited() {
    let mut runtime = runtime::<DefaultConfig>(4, Readiness::Eager);
    let handle = runtime.create_handle();
    let log = Arc::new(Mutex::new(Vec::new()));

    let (h, l) = (handle.clone(), Arc::clone(&log));
    runtime.submit(Task::new(
        move |worker| {
            l.lock().unwrap().push("root");
            for name in ["left", "right"] {
                let inner_log = Arc::clone(&l);
                let inner_handle = h.clone();
                worker.submit(Task::new(
                    move |worker| {
                        inner_log.lock().unwrap().push(name);
                        let leaf_log = Arc::clone(&inner_log);
                        worker.submit(Task::new(
                            move |_| leaf_log.lock().unwrap().push("leaf"),
                            [(&inner_handle, Access::Write)],
                        ));
                    },
                    [(&h, Access::Read)],
                ));
            }
        },
        [(&handle, Access::Write)],
    ));
    runtime.barrier();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 5);
    assert_eq!(log[0], "root");
    assert!(log[1..3].contains(&"left"));
    assert!(log[1..3].contains(&"right"));
    assert_eq!(log[3..], ["leaf", "leaf"]);
    assert_eq!(handle.completed_version(), 4);
}

#[test]
fn readers_share_one_version() {
    let mut runtime = runtime::<DefaultConfig>(4, Readiness::Eager);
    let handle = runtime.create_handle();
    let value = Arc::new(AtomicU64::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let v = Arc::clone(&value);
    runtime.submit(Task::new(
        move |_| v.store(7, Ordering::Relaxed),
        [(&handle, Access::Write)],
    ));
    let mut versions = Vec::new();
    for _ in 0..64 {
        let (h, v, seen) = (handle.clone(), Arc::clone(&value), Arc::clone(&seen));
        let reader = Task::new(
            move |_| {
                let observed = (h.completed_version(), v.load(Ordering::Relaxed));
                seen.lock().unwrap().push(observed);
            },
            [(&handle, Access::Read)],
        );
        versions.push(reader.dependencies()[0].version());
        runtime.submit(reader);
    }
    let v = Arc::clone(&value);
    runtime.submit(Task::new(
        move |_| v.store(8, Ordering::Relaxed),
        [(&handle, Access::Write)],
    ));
    runtime.barrier();

    assert!(versions.iter().all(|&version| version == 1));
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 64);
    assert!(seen.iter().all(|&observed| observed == (1, 7)));
    assert_eq!(handle.completed_version(), 3);
    assert_eq!(value.load(Ordering::Relaxed), 8);
}

#[test]
fn accumulations_never_overlap() {
    let mut runtime = runtime::<DefaultConfig>(4, Readiness::Eager);
    let handle = runtime.create_handle();
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));
    let sum = Arc::new(AtomicU64::new(0));
    for value in 1..=200_u64 {
        let (inside, max_inside, sum) =
            (Arc::clone(&inside), Arc::clone(&max_inside), Arc::clone(&sum));
        runtime.submit(Task::new(
            move |_| {
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                // Deliberately non-atomic read-modify-write.
                let current = sum.load(Ordering::Relaxed);
                thread::yield_now();
                sum.store(current + value, Ordering::Relaxed);
                inside.fetch_sub(1, Ordering::SeqCst);
            },
            [(&handle, Access::Add)],
        ));
    }
    runtime.barrier();
    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert_eq!(sum.load(Ordering::Relaxed), 200 * 201 / 2);
    assert_eq!(handle.completed_version(), 1);
}

#[test]
fn locks_of_several_handles_do_not_deadlock() {
    let mut runtime = runtime::<DefaultConfig>(4, Readiness::Eager);
    let a = runtime.create_handle();
    let b = runtime.create_handle();
    let total = Arc::new(Mutex::new((0_u64, 0_u64)));
    for round in 0..200_u64 {
        let total = Arc::clone(&total);
        let accesses = if round % 2 == 0 {
            [(&a, Access::Add), (&b, Access::Add)]
        } else {
            [(&b, Access::Add), (&a, Access::Add)]
        };
        runtime.submit(Task::new(
            move |_| {
                let mut total = total.lock().unwrap();
                total.0 += round;
                total.1 += 1;
            },
            accesses,
        ));
    }
    runtime.barrier();
    assert_eq!(*total.lock().unwrap(), (200 * 199 / 2, 200));
}

#[test]
fn writes_hold_the_data_exclusively() {
    let mut runtime = runtime::<DefaultConfig>(4, Readiness::Lazy);
    let handle = runtime.create_handle();
    let data = Arc::new(Mutex::new(0_u64));
    let contended = Arc::new(AtomicUsize::new(0));
    for _ in 0..300 {
        let (data, contended) = (Arc::clone(&data), Arc::clone(&contended));
        runtime.submit(Task::new(
            move |_| match data.try_lock() {
                Ok(mut value) => {
                    thread::yield_now();
                    *value += 1;
                }
                Err(_) => {
                    contended.fetch_add(1, Ordering::Relaxed);
                }
            },
            [(&handle, Access::Write)],
        ));
    }
    runtime.barrier();
    assert_eq!(contended.load(Ordering::Relaxed), 0);
    assert_eq!(*data.lock().unwrap(), 300);
}

#[test]
fn no_task_runs_before_its_dependencies() {
    for readiness in [Readiness::Eager, Readiness::Lazy] {
        let mut runtime = runtime::<DefaultConfig>(4, readiness);
        let premature = Arc::new(AtomicUsize::new(0));
        let joined = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let a = runtime.create_handle();
            let b = runtime.create_handle();
            let a_done = Arc::new(AtomicBool::new(false));
            let b_done = Arc::new(AtomicBool::new(false));

            let flag = Arc::clone(&a_done);
            runtime.submit(Task::new(
                move |_| {
                    thread::sleep(Duration::from_micros(200));
                    flag.store(true, Ordering::Release);
                },
                [(&a, Access::Write)],
            ));
            let flag = Arc::clone(&b_done);
            runtime.submit(Task::new(
                move |_| flag.store(true, Ordering::Release),
                [(&b, Access::Write)],
            ));
            let (premature, joined) = (Arc::clone(&premature), Arc::clone(&joined));
            runtime.submit(Task::new(
                move |_| {
                    if !a_done.load(Ordering::Acquire) || !b_done.load(Ordering::Acquire) {
                        premature.fetch_add(1, Ordering::Relaxed);
                    }
                    joined.fetch_add(1, Ordering::Relaxed);
                },
                [(&a, Access::Read), (&b, Access::Read)],
            ));
        }
        runtime.barrier();
        assert_eq!(premature.load(Ordering::Relaxed), 0, "{readiness}");
        assert_eq!(joined.load(Ordering::Relaxed), 50, "{readiness}");
    }
}

#[test]
fn custom_kind_set_with_multiplication() {
    let mut runtime = runtime::<MatrixConfig>(4, Readiness::Eager);
    let handle = runtime.create_handle();
    let value = Arc::new(Mutex::new(0_u64));

    let v = Arc::clone(&value);
    runtime.submit(Task::new(
        move |_| *v.lock().unwrap() = 1,
        [(&handle, Matrix::Write)],
    ));
    for factor in [2_u64, 3, 5, 7] {
        let v = Arc::clone(&value);
        runtime.submit(Task::new(
            move |_| *v.lock().unwrap() *= factor,
            [(&handle, Matrix::Mul)],
        ));
    }
    let observed = Arc::new(AtomicU64::new(0));
    let (v, o) = (Arc::clone(&value), Arc::clone(&observed));
    runtime.submit(Task::new(
        move |_| o.store(*v.lock().unwrap(), Ordering::Relaxed),
        [(&handle, Matrix::Read)],
    ));
    runtime.barrier();
    assert_eq!(observed.load(Ordering::Relaxed), 210);
    assert_eq!(handle.completed_version(), 3);
}

#[test]
fn tasks_built_on_many_threads() {
    let mut runtime = runtime::<DefaultConfig>(4, Readiness::Eager);
    let handle = runtime.create_handle();
    let sum = Arc::new(AtomicU64::new(0));
    {
        let runtime = &runtime;
        (0..1000_u64).into_par_iter().for_each(|value| {
            let sum = Arc::clone(&sum);
            runtime.submit(Task::new(
                move |_| {
                    sum.fetch_add(value, Ordering::Relaxed);
                },
                [(&handle, Access::Add)],
            ));
        });
    }
    let total = Arc::new(AtomicU64::new(0));
    let (s, t) = (Arc::clone(&sum), Arc::clone(&total));
    runtime.submit(Task::new(
        move |_| t.store(s.load(Ordering::Relaxed), Ordering::Relaxed),
        [(&handle, Access::Read)],
    ));
    runtime.barrier();
    assert_eq!(total.load(Ordering::Relaxed), 1000 * 999 / 2);
}

#[test]
fn high_priority_tasks_run_first() {
    let mut runtime = runtime::<PriorityConfig>(1, Readiness::Eager);
    let log = Arc::new(Mutex::new(Vec::new()));
    for (label, priority) in [
        ("normal-1", Priority::Normal),
        ("high", Priority::High),
        ("normal-2", Priority::Normal),
    ] {
        let log = Arc::clone(&log);
        runtime.submit(
            Task::builder(move |_| log.lock().unwrap().push(label))
                .priority(priority)
                .label(label)
                .build(),
        );
    }
    runtime.barrier();
    assert_eq!(*log.lock().unwrap(), ["high", "normal-2", "normal-1"]);
}

#[test]
fn pinned_tasks_run_on_their_worker() {
    let mut runtime = runtime::<PinnedConfig>(3, Readiness::Eager);
    let misplaced = Arc::new(AtomicUsize::new(0));
    let executed = Arc::new(AtomicUsize::new(0));
    for index in 0..300 {
        let (misplaced, executed) = (Arc::clone(&misplaced), Arc::clone(&executed));
        let pinned = index % 3 == 0;
        let builder = Task::builder(move |worker| {
            if pinned && worker.id() != 2 {
                misplaced.fetch_add(1, Ordering::Relaxed);
            }
            executed.fetch_add(1, Ordering::Relaxed);
        });
        let builder = if pinned { builder.pin_to(2) } else { builder };
        runtime.submit(builder.build());
    }
    runtime.barrier();
    assert_eq!(misplaced.load(Ordering::Relaxed), 0);
    assert_eq!(executed.load(Ordering::Relaxed), 300);
}

#[test]
fn default_queues_keep_pinned_tasks_on_their_worker() {
    let mut runtime = runtime::<DefaultConfig>(4, Readiness::Eager);
    let misplaced = Arc::new(AtomicUsize::new(0));
    let executed = Arc::new(AtomicUsize::new(0));
    for _ in 0..2000 {
        let (misplaced, executed) = (Arc::clone(&misplaced), Arc::clone(&executed));
        runtime.submit(
            Task::builder(move |worker| {
                if worker.id() != 2 {
                    misplaced.fetch_add(1, Ordering::Relaxed);
                }
                executed.fetch_add(1, Ordering::Relaxed);
            })
            .pin_to(2)
            .build(),
        );
    }
    runtime.barrier();
    assert_eq!(misplaced.load(Ordering::Relaxed), 0);
    assert_eq!(executed.load(Ordering::Relaxed), 2000);
}

#[test]
fn priority_queues_keep_pinned_tasks_on_their_worker() {
    let mut runtime = runtime::<PriorityConfig>(3, Readiness::Lazy);
    let misplaced = Arc::new(AtomicUsize::new(0));
    for index in 0..600 {
        let misplaced = Arc::clone(&misplaced);
        let priority = if index % 2 == 0 { Priority::High } else { Priority::Normal };
        runtime.submit(
            Task::builder(move |worker| {
                if worker.id() != 1 {
                    misplaced.fetch_add(1, Ordering::Relaxed);
                }
            })
            .priority(priority)
            .pin_to(1)
            .build(),
        );
    }
    runtime.barrier();
    assert_eq!(misplaced.load(Ordering::Relaxed), 0);
}

#[test]
fn finished_tasks_go_through_the_disposal_policy() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let mut runtime = Runtime::<CountingConfig>::with_disposal(
        options(2, Readiness::Eager),
        Counting(Arc::clone(&disposed)),
    )
    .expect("runtime starts");
    let handle = runtime.create_handle();
    for _ in 0..100 {
        runtime.submit(Task::new(|_| {}, [(&handle, Access::Write)]));
    }
    runtime.barrier();
    assert_eq!(disposed.load(Ordering::Relaxed), 100);
}

#[test]
fn dropping_the_runtime_runs_pending_tasks() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let runtime = Runtime::<DefaultConfig>::new(options(3, Readiness::Eager).start_paused(true))
            .expect("runtime starts");
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            runtime.submit(
                Task::builder(move |_| {
                    counter.fetch_add(1, Ordering::Relaxed);
                })
                .build(),
            );
        }
    }
    assert_eq!(counter.load(Ordering::Relaxed), 100);
}

#[test]
fn barrier_can_be_repeated() {
    let mut runtime = runtime::<DefaultConfig>(4, Readiness::Eager);
    let handle = runtime.create_handle();
    let counter = Arc::new(AtomicUsize::new(0));
    for round in 1..=20 {
        for _ in 0..25 {
            let counter = Arc::clone(&counter);
            runtime.submit(Task::new(
                move |_| {
                    counter.fetch_add(1, Ordering::Relaxed);
                },
                [(&handle, Access::Read)],
            ));
        }
        runtime.barrier();
        assert_eq!(counter.load(Ordering::Relaxed), round * 25);
    }
}
