use crate::{
    access,
    config::{Config, RuntimeOptions},
    executor::{Executor, Runtime, Shared, barrier::BarrierState},
    sync::{Arc, AtomicBool, JoinHandle, Ordering, ThreadBuilder},
    types::WorkerId,
};
use core_affinity::CoreId;
use crossbeam_utils::CachePadded;
use std::io;
use thiserror::Error;

/// Errors raised while starting a runtime.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// The number of workers was not configured and the available parallelism
    /// of the machine could not be determined.
    #[error("unable to determine available parallelism")]
    Parallelism(#[source] io::Error),
    /// A worker thread could not be spawned. Workers spawned before it have
    /// been stopped and joined.
    #[error("failed to spawn worker {worker}")]
    Spawn {
        /// Id of the worker that failed to start.
        worker: WorkerId,
        /// Error reported by the OS.
        #[source]
        source: io::Error,
    },
}

impl<C: Config> Runtime<C> {
    /// Start a runtime releasing finished tasks through `disposal`.
    ///
    /// # Errors
    /// If the machine parallelism cannot be queried or a worker thread cannot
    /// be spawned.
    ///
    /// # Panics
    /// If the access kind set of `C` is invalid.
    pub fn with_disposal(options: RuntimeOptions, disposal: C::Disposal) -> Result<Self, RuntimeError> {
        access::validate::<C::AccessKind>();
        let RuntimeOptions {
            num_workers,
            pin_workers,
            start_paused,
            readiness,
        } = options;
        let num_workers = match num_workers {
            Some(num_workers) => num_workers.get(),
            None => std::thread::available_parallelism()
                .map_err(RuntimeError::Parallelism)?
                .get(),
        };
        let shared = Arc::new(Shared {
            queues: (0..num_workers)
                .map(|_| CachePadded::new(C::Queue::default()))
                .collect(),
            barrier: BarrierState::new(),
            started: AtomicBool::new(!start_paused),
            shutdown: AtomicBool::new(false),
            readiness,
            disposal,
        });
        let cores = if pin_workers { core_ids() } else { Vec::new() };

        let mut threads = Vec::with_capacity(num_workers - 1);
        for id in 1..num_workers {
            let core = (!cores.is_empty()).then(|| cores[id % cores.len()]);
            match spawn_worker(id, Arc::clone(&shared), core) {
                Ok(thread) => threads.push(thread),
                Err(source) => {
                    shared.shutdown.store(true, Ordering::Release);
                    for thread in threads {
                        let _ = thread.join();
                    }
                    return Err(RuntimeError::Spawn { worker: id, source });
                }
            }
        }
        tracing::debug!(
            workers = num_workers,
            paused = start_paused,
            readiness = %readiness,
            pinned = !cores.is_empty(),
            "runtime started"
        );
        Ok(Self {
            shared,
            threads,
            scratch: Vec::new(),
        })
    }
}

fn core_ids() -> Vec<CoreId> {
    let cores = core_affinity::get_core_ids().unwrap_or_default();
    if cores.is_empty() {
        tracing::warn!("core ids unavailable, worker threads are not pinned");
    }
    cores
}

fn spawn_worker<C: Config>(
    id: WorkerId,
    shared: Arc<Shared<C>>,
    core: Option<CoreId>,
) -> io::Result<JoinHandle<()>> {
    ThreadBuilder::new()
        .name(format!("vtg-worker-{id}"))
        .spawn(move || {
            if let Some(core) = core {
                if !core_affinity::set_for_current(core) {
                    tracing::warn!(worker = id, core = core.id, "failed to pin worker thread");
                }
            }
            Executor::new(id, shared, Vec::new()).run();
        })
}
