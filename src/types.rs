use crate::executor::Worker;

/// Version number of a handle.
///
/// Version `0` is the initial state of every handle; each fully applied
/// access group advances the handle by exactly one.
pub type Version = u64;

/// Index of a worker (executor) inside a runtime.
///
/// Worker `0` is the executor owned by the thread that created the runtime;
/// workers `1..n` run on their own OS threads.
pub type WorkerId = usize;

/// Executable part of a task.
///
/// Invoked exactly once with the executing worker, which may be used to submit
/// further tasks or to borrow executor-scoped scratch memory.
pub type Payload<C> = Box<dyn for<'w> FnOnce(&Worker<'w, C>) + Send + 'static>;
