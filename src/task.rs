use crate::{
    config::{Config, DefaultConfig},
    executor::Worker,
    handle::Handle,
    types::{Payload, Version, WorkerId},
};
use core::fmt;
use derive_more::Debug;

/// Scheduling priority honoured by [`PriorityDeque`](crate::queue::PriorityDeque).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Served after every queued high-priority task.
    #[default]
    Normal,
    /// Served first, by the owner and by thieves.
    High,
}

/// One resolved access of a task: the handle, how it is accessed and the
/// handle version the access waits for.
#[derive(Debug)]
pub struct Dependency<C: Config> {
    handle: Handle<C>,
    kind: C::AccessKind,
    version: Version,
}

impl<C: Config> Dependency<C> {
    /// Accessed handle.
    pub fn handle(&self) -> &Handle<C> {
        &self.handle
    }

    /// Kind of the access.
    pub fn kind(&self) -> C::AccessKind {
        self.kind
    }

    /// Version the handle must reach before the access may run.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Whether the handle currently allows this access.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.handle.is_ready(self.version)
    }
}

/// A unit of work plus its resolved dependencies.
///
/// Created with [`Task::builder`] or [`Task::new`]. Dependency versions are
/// fixed when the task is built, so the order in which tasks are built on a
/// handle is the order in which their accesses are applied.
///
/// A built task holds its versions until it executes: it must be submitted,
/// otherwise every later access of its handles waits forever.
#[must_use = "a built task holds its dependency versions until it is submitted"]
pub struct Task<C: Config = DefaultConfig> {
    inner: Box<TaskInner<C>>,
}

struct TaskInner<C: Config> {
    payload: Option<Payload<C>>,
    dependencies: Vec<Dependency<C>>,
    /// Index of the first dependency not yet known to be satisfied.
    cursor: usize,
    priority: Priority,
    pinned_to: Option<WorkerId>,
    label: Option<&'static str>,
}

impl<C: Config> Task<C> {
    /// Start building a task running `payload`.
    pub fn builder<F>(payload: F) -> TaskBuilder<C>
    where
        F: FnOnce(&Worker<'_, C>) + Send + 'static,
    {
        TaskBuilder {
            payload: Box::new(payload),
            accesses: Vec::new(),
            priority: Priority::default(),
            pinned_to: None,
            label: None,
        }
    }

    /// Build a task from a payload and its access list in one go.
    ///
    /// # Panics
    /// If a handle appears twice in `accesses`.
    pub fn new<'h, F, I>(payload: F, accesses: I) -> Self
    where
        F: FnOnce(&Worker<'_, C>) + Send + 'static,
        I: IntoIterator<Item = (&'h Handle<C>, C::AccessKind)>,
    {
        accesses
            .into_iter()
            .fold(Self::builder(payload), |builder, (handle, kind)| {
                builder.access(handle, kind)
            })
            .build()
    }

    /// Resolved dependencies in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[Dependency<C>] {
        &self.inner.dependencies
    }

    /// Scheduling priority.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.inner.priority
    }

    /// Worker this task must run on, if any.
    #[must_use]
    pub fn pinned_to(&self) -> Option<WorkerId> {
        self.inner.pinned_to
    }

    /// Label used in log events.
    #[must_use]
    pub fn label(&self) -> Option<&'static str> {
        self.inner.label
    }

    /// Whether the payload has already run.
    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.inner.payload.is_none()
    }

    /// Whether every dependency is currently satisfied. Has no side effects.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.dependencies.iter().all(Dependency::is_ready)
    }

    /// Return the task if all of its dependencies are satisfied, otherwise
    /// park it on the first handle that blocks it and return `None`.
    ///
    /// A parked task comes back out of [`Handle::advance_and_notify`] and has
    /// to pass through this method again; the check resumes at the dependency
    /// that blocked it, since satisfied dependencies stay satisfied until the
    /// task itself completes.
    pub fn ready_or_park(mut self) -> Option<Self> {
        while let Some(dependency) = self.inner.dependencies.get(self.inner.cursor) {
            if !dependency.is_ready() {
                let handle = dependency.handle.clone();
                let version = dependency.version;
                match handle.register_listener(self, version) {
                    Ok(()) => return None,
                    Err(task) => self = task,
                }
            }
            self.inner.cursor += 1;
        }
        Some(self)
    }

    pub(crate) fn take_payload(&mut self) -> Payload<C> {
        self.inner.payload.take().expect("Task::take_payload: [1]")
    }
}

impl<C: Config> fmt::Debug for Task<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let TaskInner {
            payload,
            dependencies,
            cursor,
            priority,
            pinned_to,
            label,
        } = &*self.inner;
        f.debug_struct("Task")
            .field("label", label)
            .field("executed", &payload.is_none())
            .field("dependencies", dependencies)
            .field("cursor", cursor)
            .field("priority", priority)
            .field("pinned_to", pinned_to)
            .finish()
    }
}

/// Collects the payload, access list and options of a task.
#[must_use]
#[derive(Debug)]
pub struct TaskBuilder<C: Config = DefaultConfig> {
    #[debug(skip)]
    payload: Payload<C>,
    accesses: Vec<(Handle<C>, C::AccessKind)>,
    priority: Priority,
    pinned_to: Option<WorkerId>,
    label: Option<&'static str>,
}

impl<C: Config> TaskBuilder<C> {
    /// Declare an access of `kind` to `handle`.
    ///
    /// # Panics
    /// If `handle` was already declared for this task.
    pub fn access(mut self, handle: &Handle<C>, kind: C::AccessKind) -> Self {
        assert!(
            !self.accesses.iter().any(|(known, _)| known.same_as(handle)),
            "{handle:?} is declared twice by one task"
        );
        self.accesses.push((handle.clone(), kind));
        self
    }

    /// Set the scheduling priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Run the task on `worker` only. Every queue strategy keeps pinned
    /// tasks away from thieves.
    pub fn pin_to(mut self, worker: WorkerId) -> Self {
        self.pinned_to = Some(worker);
        self
    }

    /// Attach a label shown in log events.
    pub fn label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    /// Resolve the required version of every declared access, in declaration
    /// order, and produce the task.
    pub fn build(self) -> Task<C> {
        let Self {
            payload,
            accesses,
            priority,
            pinned_to,
            label,
        } = self;
        let dependencies = accesses
            .into_iter()
            .map(|(handle, kind)| {
                let version = handle.schedule(kind);
                Dependency {
                    handle,
                    kind,
                    version,
                }
            })
            .collect();
        Task {
            inner: Box::new(TaskInner {
                payload: Some(payload),
                dependencies,
                cursor: 0,
                priority,
                pinned_to,
                label,
            }),
        }
    }
}

/// Policy releasing tasks after they executed and their dependencies were
/// released.
pub trait Disposal<C: Config>: Send + Sync + 'static {
    /// Take ownership of a finished task.
    fn dispose(&self, task: Task<C>);
}

/// Drops finished tasks right away.
#[derive(Debug, Copy, Clone, Default)]
pub struct Deallocate;

impl<C: Config> Disposal<C> for Deallocate {
    #[inline]
    fn dispose(&self, task: Task<C>) {
        drop(task);
    }
}
