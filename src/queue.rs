mod list;
mod xor_list;

pub use crate::queue::{
    list::{ListFamily, TaskList, VecDequeList, XorLinkedList},
    xor_list::XorList,
};
use crate::{
    config::Config,
    sync::{AtomicUsize, Mutex, MutexExt, MutexGuard, Ordering},
    task::{Priority, Task},
};
use core::fmt;
use derive_more::Debug;

/// A per-worker collection of ready tasks.
///
/// The owning worker pushes and pops at one end; other workers steal from the
/// opposite end. Every mutation goes through the queue lock, and `steal` only
/// ever *tries* to take it: a contended queue is skipped rather than waited
/// for.
pub trait TaskQueue<C: Config>: Default + Send + Sync + 'static {
    /// Push at the owner end.
    fn push(&self, task: Task<C>);
    /// Pop at the owner end.
    fn pop(&self) -> Option<Task<C>>;
    /// Take a task from the steal end. Returns `None` when the queue is empty,
    /// holds nothing stealable, or its lock is held by someone else.
    ///
    /// Tasks pinned to a worker are never returned.
    fn steal(&self) -> Option<Task<C>>;
    /// Number of queued tasks, read without taking the lock.
    fn len(&self) -> usize;
    /// Whether the queue is empty, read without taking the lock.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn stealable<C: Config>(task: &Task<C>) -> bool {
    task.pinned_to().is_none()
}

/// Take the back task of `list` unless it is pinned.
fn pop_stealable<C: Config, L: TaskList<Task<C>>>(list: &mut L) -> Option<Task<C>> {
    if list.back().is_some_and(stealable) {
        list.pop_back()
    } else {
        None
    }
}

/// Sequence behind a lock, with its length mirrored in an atomic.
struct Locked<S> {
    inner: Mutex<S>,
    len: AtomicUsize,
}

impl<S: Default> Default for Locked<S> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(S::default()),
            len: AtomicUsize::new(0),
        }
    }
}

impl<S> fmt::Debug for Locked<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locked")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<S> Locked<S> {
    fn lock(&self) -> LockedGuard<'_, S> {
        LockedGuard {
            guard: self.inner.lock_unpoisoned(),
            len: &self.len,
        }
    }

    fn try_lock(&self) -> Option<LockedGuard<'_, S>> {
        self.inner.try_lock_unpoisoned().map(|guard| LockedGuard {
            guard,
            len: &self.len,
        })
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }
}

/// Publishes the new length after each mutation.
struct LockedGuard<'a, S> {
    guard: MutexGuard<'a, S>,
    len: &'a AtomicUsize,
}

impl<S> LockedGuard<'_, S> {
    fn update<R>(&mut self, len_of: impl FnOnce(&S) -> usize, f: impl FnOnce(&mut S) -> R) -> R {
        let result = f(&mut self.guard);
        self.len.store(len_of(&self.guard), Ordering::SeqCst);
        result
    }
}

/// Plain per-worker deque.
///
/// Thieves only look at the back task: a pinned task there blocks stealing
/// until its owner reaches it. The backing sequence is chosen with `L`; see
/// [`VecDequeList`] and [`XorLinkedList`].
#[derive(Debug)]
pub struct Deque<C: Config, L: ListFamily = VecDequeList> {
    list: Locked<L::List<Task<C>>>,
}

impl<C: Config, L: ListFamily> Default for Deque<C, L> {
    fn default() -> Self {
        Self {
            list: Locked::default(),
        }
    }
}

impl<C: Config, L: ListFamily> TaskQueue<C> for Deque<C, L> {
    fn push(&self, task: Task<C>) {
        self.list
            .lock()
            .update(|list| list.len(), |list| list.push_front(task));
    }

    fn pop(&self) -> Option<Task<C>> {
        if self.list.len() == 0 {
            return None;
        }
        self.list
            .lock()
            .update(|list| list.len(), |list| list.pop_front())
    }

    fn steal(&self) -> Option<Task<C>> {
        if self.list.len() == 0 {
            return None;
        }
        self.list
            .try_lock()?
            .update(|list| list.len(), |list| pop_stealable::<C, _>(list))
    }

    fn len(&self) -> usize {
        self.list.len()
    }
}

/// Two sub-lists per worker: high-priority tasks are served first by the
/// owner and by thieves.
#[derive(Debug)]
pub struct PriorityDeque<C: Config, L: ListFamily = VecDequeList> {
    lists: Locked<PriorityLists<C, L>>,
}

struct PriorityLists<C: Config, L: ListFamily> {
    high: L::List<Task<C>>,
    normal: L::List<Task<C>>,
}

impl<C: Config, L: ListFamily> Default for PriorityLists<C, L> {
    fn default() -> Self {
        Self {
            high: Default::default(),
            normal: Default::default(),
        }
    }
}

impl<C: Config, L: ListFamily> PriorityLists<C, L> {
    fn len(&self) -> usize {
        self.high.len() + self.normal.len()
    }
}

impl<C: Config, L: ListFamily> Default for PriorityDeque<C, L> {
    fn default() -> Self {
        Self {
            lists: Locked::default(),
        }
    }
}

impl<C: Config, L: ListFamily> TaskQueue<C> for PriorityDeque<C, L> {
    fn push(&self, task: Task<C>) {
        self.lists
            .lock()
            .update(PriorityLists::len, |lists| match task.priority() {
                Priority::High => lists.high.push_front(task),
                Priority::Normal => lists.normal.push_front(task),
            });
    }

    fn pop(&self) -> Option<Task<C>> {
        if self.lists.len() == 0 {
            return None;
        }
        self.lists.lock().update(PriorityLists::len, |lists| {
            lists.high.pop_front().or_else(|| lists.normal.pop_front())
        })
    }

    fn steal(&self) -> Option<Task<C>> {
        if self.lists.len() == 0 {
            return None;
        }
        self.lists.try_lock()?.update(PriorityLists::len, |lists| {
            pop_stealable(&mut lists.high).or_else(|| pop_stealable(&mut lists.normal))
        })
    }

    fn len(&self) -> usize {
        self.lists.len()
    }
}

/// Per-worker deque whose pinned tasks are never stolen.
///
/// Thieves take the rearmost task that is not pinned to a worker, looking
/// past pinned tasks at the back. The search stops at the first match but
/// may visit every queued task while holding the lock.
#[derive(Debug)]
pub struct PinnedDeque<C: Config, L: ListFamily = VecDequeList> {
    list: Locked<L::List<Task<C>>>,
}

impl<C: Config, L: ListFamily> Default for PinnedDeque<C, L> {
    fn default() -> Self {
        Self {
            list: Locked::default(),
        }
    }
}

impl<C: Config, L: ListFamily> TaskQueue<C> for PinnedDeque<C, L> {
    fn push(&self, task: Task<C>) {
        self.list
            .lock()
            .update(|list| list.len(), |list| list.push_front(task));
    }

    fn pop(&self) -> Option<Task<C>> {
        if self.list.len() == 0 {
            return None;
        }
        self.list
            .lock()
            .update(|list| list.len(), |list| list.pop_front())
    }

    fn steal(&self) -> Option<Task<C>> {
        if self.list.len() == 0 {
            return None;
        }
        self.list
            .try_lock()?
            .update(|list| list.len(), |list| list.remove_last_matching(stealable))
    }

    fn len(&self) -> usize {
        self.list.len()
    }
}
