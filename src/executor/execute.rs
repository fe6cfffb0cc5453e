use crate::{
    access::AccessKind,
    config::Config,
    executor::Shared,
    handle::Handle,
    queue::TaskQueue,
    sync::{Arc, Ordering},
    task::{Dependency, Disposal, Task},
    types::WorkerId,
    utils::{AbortOnUnwind, StealOrder},
};
use core::cell::{RefCell, RefMut};
use crossbeam_utils::Backoff;
use derive_more::Debug;

/// One executor: the state a worker keeps between tasks.
#[derive(Debug)]
pub(crate) struct Executor<C: Config> {
    id: WorkerId,
    #[debug(skip)]
    pub(super) shared: Arc<Shared<C>>,
    steal_order: StealOrder,
    #[debug(skip)]
    scratch: RefCell<Vec<u8>>,
    /// Last barrier round this worker has seen.
    pub(super) barrier_round: u32,
}

impl<C: Config> Executor<C> {
    pub(super) fn new(id: WorkerId, shared: Arc<Shared<C>>, scratch: Vec<u8>) -> Self {
        let steal_order = StealOrder::new(id, shared.num_workers());
        Self {
            id,
            shared,
            steal_order,
            scratch: RefCell::new(scratch),
            barrier_round: 0,
        }
    }

    pub(super) fn into_scratch(self) -> Vec<u8> {
        self.scratch.into_inner()
    }

    pub(super) fn own_queue(&self) -> &C::Queue {
        &self.shared.queues[self.id]
    }

    /// Worker thread body.
    pub(super) fn run(mut self) {
        tracing::trace!(worker = self.id, "worker started");
        let backoff = Backoff::new();
        while !self.shared.started.load(Ordering::Acquire) {
            if self.shared.shutdown.load(Ordering::Acquire) {
                return;
            }
            backoff.snooze();
        }
        let idle = Backoff::new();
        while !self.shared.shutdown.load(Ordering::Acquire) {
            self.serve_barrier();
            match self.own_queue().pop().or_else(|| self.steal()) {
                Some(task) => {
                    self.execute(task);
                    idle.reset();
                }
                None => idle.snooze(),
            }
        }
        tracing::trace!(worker = self.id, "worker exited");
    }

    fn steal(&mut self) -> Option<Task<C>> {
        let queues = &self.shared.queues;
        let task = self
            .steal_order
            .victims()
            .find_map(|victim| queues[victim].steal().map(|task| (victim, task)));
        task.map(|(victim, task)| {
            tracing::trace!(worker = self.id, victim, task = task.label(), "stole a task");
            task
        })
    }

    /// Execute tasks from the own queue until it is empty.
    pub(super) fn drain(&self) {
        while let Some(task) = self.own_queue().pop() {
            self.execute(task);
        }
    }

    /// Run `task` if it is ready, then release its versions and queue the
    /// tasks this unblocks. A task that is not ready is parked instead.
    fn execute(&self, task: Task<C>) {
        let Some(mut task) = task.ready_or_park() else {
            return;
        };
        let payload = task.take_payload();
        {
            let _locks = HandleLocks::acquire(task.dependencies());
            let guard = AbortOnUnwind::new(self.id, task.label());
            payload(&Worker { executor: self });
            drop(guard);
        }
        for dependency in task.dependencies() {
            let woken = dependency
                .handle()
                .advance_and_notify(dependency.version());
            for woken in woken {
                if let Some(ready) = woken.ready_or_park() {
                    self.shared.enqueue(self.id, ready);
                }
            }
        }
        self.shared.disposal.dispose(task);
    }
}

/// Critical sections of the `needs_lock` accesses of one task.
///
/// Locks are taken in handle address order and released on drop.
struct HandleLocks<'t, C: Config> {
    handles: Vec<&'t Handle<C>>,
}

impl<'t, C: Config> HandleLocks<'t, C> {
    fn acquire(dependencies: &'t [Dependency<C>]) -> Self {
        let mut handles: Vec<_> = dependencies
            .iter()
            .filter(|dependency| dependency.kind().needs_lock())
            .map(Dependency::handle)
            .collect();
        handles.sort_unstable_by_key(|handle| handle.addr());
        for handle in &handles {
            let backoff = Backoff::new();
            while !handle.try_lock() {
                backoff.snooze();
            }
        }
        Self { handles }
    }
}

impl<C: Config> Drop for HandleLocks<'_, C> {
    fn drop(&mut self) {
        for handle in self.handles.iter().rev() {
            handle.unlock();
        }
    }
}

/// The executor a payload runs on.
///
/// Passed to every payload; use it to submit follow-up tasks or to borrow
/// the executor's scratch buffer.
pub struct Worker<'a, C: Config> {
    executor: &'a Executor<C>,
}

impl<C: Config> Worker<'_, C> {
    /// Id of this worker. `0` is the thread that owns the runtime.
    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.executor.id
    }

    /// Total number of workers of the runtime.
    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.executor.shared.num_workers()
    }

    /// Submit a task to this worker's queue, or to the worker it is pinned
    /// to.
    ///
    /// # Panics
    /// If the task is pinned to a worker the runtime does not have.
    pub fn submit(&self, task: Task<C>) {
        self.executor.shared.submit(self.executor.id, task);
    }

    /// Scratch buffer owned by this worker. Its content survives between
    /// tasks running on the same worker.
    ///
    /// # Panics
    /// If the buffer is already borrowed by the same payload.
    pub fn scratch(&self) -> RefMut<'_, Vec<u8>> {
        self.executor.scratch.borrow_mut()
    }
}

impl<C: Config> core::fmt::Debug for Worker<'_, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.executor.id)
            .finish_non_exhaustive()
    }
}
