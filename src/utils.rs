use crate::types::WorkerId;

/// Order in which a worker visits the other workers' queues when stealing.
///
/// Each round starts at a pseudo-random victim drawn from a linear
/// congruential generator seeded with the worker id, then walks the remaining
/// queues linearly with wrap-around. The worker's own queue is never visited.
#[derive(Debug, Clone)]
pub(crate) struct StealOrder {
    id: WorkerId,
    num_workers: usize,
    state: u64,
}

impl StealOrder {
    const MULTIPLIER: u64 = 6_364_136_223_846_793_005;
    const INCREMENT: u64 = 1_442_695_040_888_963_407;

    pub(crate) fn new(id: WorkerId, num_workers: usize) -> Self {
        assert!(id < num_workers, "StealOrder::new: [1]");
        Self {
            id,
            num_workers,
            state: id as u64,
        }
    }

    /// Victims for one stealing round.
    pub(crate) fn victims(&mut self) -> impl Iterator<Item = WorkerId> + use<> {
        self.state = self
            .state
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::INCREMENT);
        let n = self.num_workers;
        let id = self.id;
        #[allow(clippy::cast_possible_truncation)]
        let start = ((self.state >> 33) as usize) % n;
        (0..n)
            .map(move |offset| (start + offset) % n)
            .filter(move |&victim| victim != id)
    }
}

/// Aborts the process if dropped while the thread is unwinding.
///
/// Held around a task payload: a panicking task leaves handle versions it
/// holds unreleased, so nothing waiting on them could ever make progress.
pub(crate) struct AbortOnUnwind {
    worker: WorkerId,
    label: Option<&'static str>,
}

impl AbortOnUnwind {
    pub(crate) fn new(worker: WorkerId, label: Option<&'static str>) -> Self {
        Self { worker, label }
    }
}

impl Drop for AbortOnUnwind {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!(
                worker = self.worker,
                task = self.label,
                "task panicked, aborting"
            );
            std::process::abort();
        }
    }
}
