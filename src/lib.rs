//! Work-stealing task runtime ordering tasks by their declared data accesses.
//!
//! Instead of wiring an explicit graph, every task lists the [`Handle`]s it
//! touches and how (read, write, commutative accumulation, or any custom kind
//! set). The runtime turns those declarations into per-handle version numbers
//! when the task is built, and runs a task only once every handle it uses has
//! reached the version the task was assigned:
//! - consecutive writes to a handle get consecutive versions and run in
//!   submission order;
//! - consecutive reads share one version and run in parallel;
//! - consecutive accumulations share one version but run one at a time under
//!   the handle lock, in any order.
//!
//! Key modules:
//! - `access`: access kinds and their properties.
//! - `handle`: versioned dependency units and the version scheduler.
//! - `task`: task construction, readiness and disposal.
//! - `queue`: per-worker queues with work stealing.
//! - `executor`: the [`Runtime`], its worker threads and the global barrier.
//! - `config`: type-level strategy selection and run-time options.
//!
//! Quick start:
//! ```
//! use std::sync::{Arc, Mutex};
//! use vtg::{access::Access, config::RuntimeOptions, executor::Runtime, task::Task};
//!
//! let mut runtime: Runtime = Runtime::new(RuntimeOptions::new().num_workers(2)).unwrap();
//! let handle = runtime.create_handle();
//! let log = Arc::new(Mutex::new(Vec::new()));
//! for step in 0..3 {
//!     let log = Arc::clone(&log);
//!     runtime.submit(Task::new(
//!         move |_| log.lock().unwrap().push(step),
//!         [(&handle, Access::Write)],
//!     ));
//! }
//! runtime.barrier();
//! assert_eq!(*log.lock().unwrap(), [0, 1, 2]);
//! ```
//!
//! [`Handle`]: handle::Handle
//! [`Runtime`]: executor::Runtime

/// Access kinds: the properties that drive version assignment and locking.
pub mod access;
/// Type-level configuration (`Config`) and run-time options.
pub mod config;
/// The runtime: worker threads, task execution and the barrier.
pub mod executor;
/// Versioned dependency units.
pub mod handle;
/// Per-worker task queues and their backing sequences.
pub mod queue;
mod sync;
/// Tasks, their dependencies and disposal policies.
pub mod task;
/// Common aliases: versions, worker ids, payloads.
pub mod types;
mod utils;
