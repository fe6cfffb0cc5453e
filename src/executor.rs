mod barrier;
mod execute;
mod setup;

/// The payload's view of the worker running it.
pub use crate::executor::execute::Worker;
/// Error returned when a [`Runtime`] cannot be started.
pub use crate::executor::setup::RuntimeError;
use crate::{
    config::{Config, DefaultConfig, Readiness, RuntimeOptions},
    executor::{barrier::BarrierState, execute::Executor},
    handle::Handle,
    queue::TaskQueue,
    sync::{Arc, AtomicBool, JoinHandle, Ordering},
    task::Task,
    types::WorkerId,
};
use crossbeam_utils::CachePadded;
use derive_more::Debug;
use std::mem;

/// Work-stealing runtime executing tasks in the order implied by their
/// declared accesses.
///
/// The thread creating the runtime owns worker `0`: tasks queued there run
/// on worker threads through stealing, and on the owning thread itself while
/// it waits in [`barrier`](Runtime::barrier). Workers `1..n` run on their own
/// threads.
///
/// Dropping the runtime waits for every queued task, then stops and joins the
/// worker threads.
#[must_use]
#[derive(Debug)]
pub struct Runtime<C: Config = DefaultConfig> {
    #[debug(skip)]
    shared: Arc<Shared<C>>,
    #[debug(skip)]
    threads: Vec<JoinHandle<()>>,
    #[debug(skip)]
    scratch: Vec<u8>,
}

/// State shared by every executor of a runtime.
pub(crate) struct Shared<C: Config> {
    queues: Box<[CachePadded<C::Queue>]>,
    barrier: BarrierState,
    started: AtomicBool,
    shutdown: AtomicBool,
    readiness: Readiness,
    disposal: C::Disposal,
}

impl<C: Config> Shared<C> {
    fn num_workers(&self) -> usize {
        self.queues.len()
    }

    /// Admit a freshly built task on behalf of worker `origin`.
    fn submit(&self, origin: WorkerId, task: Task<C>) {
        if let Some(worker) = task.pinned_to() {
            assert!(
                worker < self.num_workers(),
                "{task:?} is pinned to worker {worker} but the runtime has {} workers",
                self.num_workers()
            );
        }
        let task = match self.readiness {
            Readiness::Eager => {
                let label = task.label();
                let Some(task) = task.ready_or_park() else {
                    tracing::trace!(worker = origin, task = label, "task parked at submission");
                    return;
                };
                task
            }
            Readiness::Lazy => task,
        };
        self.enqueue(origin, task);
    }

    /// Push a task to its pinned worker's queue, or to `origin`'s.
    fn enqueue(&self, origin: WorkerId, task: Task<C>) {
        let target = task.pinned_to().unwrap_or(origin);
        self.queues[target].push(task);
    }
}

impl<C: Config> Runtime<C>
where
    C::Disposal: Default,
{
    /// Start a runtime with the default disposal policy.
    ///
    /// # Errors
    /// If the machine parallelism cannot be queried or a worker thread cannot
    /// be spawned.
    ///
    /// # Panics
    /// If the access kind set of `C` is invalid.
    pub fn new(options: RuntimeOptions) -> Result<Self, RuntimeError> {
        Self::with_disposal(options, C::Disposal::default())
    }
}

impl<C: Config> Runtime<C> {
    /// Create a handle for this runtime's configuration.
    pub fn create_handle(&self) -> Handle<C> {
        Handle::new()
    }

    /// Submit a task to worker `0`, or to the worker it is pinned to.
    ///
    /// May be called from any thread. With [`Readiness::Eager`] a task whose
    /// dependencies are not yet satisfied is parked on its handles and queued
    /// once they are.
    ///
    /// # Panics
    /// If the task is pinned to a worker the runtime does not have.
    pub fn submit(&self, task: Task<C>) {
        self.shared.submit(0, task);
    }

    /// Release workers of a runtime created with
    /// [`start_paused`](RuntimeOptions::start_paused).
    pub fn start_executing(&self) {
        self.shared.started.store(true, Ordering::Release);
    }

    /// Number of workers, the calling thread's own included.
    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.shared.num_workers()
    }

    /// Readiness discipline in use.
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        self.shared.readiness
    }

    /// Block until every submitted task, and every task those tasks
    /// submitted, has executed.
    ///
    /// The calling thread executes tasks queued on worker `0` meanwhile.
    /// Starts a paused runtime.
    ///
    /// Tasks parked on a version that is never released (because a built
    /// task was never submitted) are not waited for.
    pub fn barrier(&mut self) {
        self.start_executing();
        let lead = Executor::new(0, Arc::clone(&self.shared), mem::take(&mut self.scratch));
        let rounds = lead.lead_barrier();
        self.scratch = lead.into_scratch();
        tracing::debug!(rounds, "barrier completed");
    }
}

impl<C: Config> Drop for Runtime<C> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.barrier();
        }
        self.shared.started.store(true, Ordering::Release);
        self.shared.shutdown.store(true, Ordering::Release);
        for (index, thread) in self.threads.drain(..).enumerate() {
            if thread.join().is_err() {
                tracing::error!(worker = index + 1, "worker thread panicked");
            }
        }
        tracing::debug!("runtime stopped");
    }
}
