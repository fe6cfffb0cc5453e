use crate::{
    access::AccessKind,
    config::{Config, DefaultConfig},
    sync::{Arc, AtomicBool, AtomicU64, Mutex, MutexExt, Ordering},
    task::Task,
    types::Version,
};
use core::{fmt, mem, ptr};
use std::collections::VecDeque;

/// A versioned dependency unit attached to a piece of user data.
///
/// Tasks declare accesses to handles; the handle turns the sequence of
/// declared accesses into version numbers and releases blocked tasks as
/// versions complete.
///
/// Cloning a `Handle` yields another reference to the same unit. The unit is
/// destroyed when the last clone is dropped, so it cannot disappear while a
/// task still lists it.
#[must_use]
pub struct Handle<C: Config = DefaultConfig> {
    inner: Arc<HandleInner<C>>,
}

struct HandleInner<C: Config> {
    /// Mirror of `HandleState::completed`, readable without the listener lock.
    completed: AtomicU64,
    /// Guards the critical section of `needs_lock` accesses.
    access_lock: AtomicBool,
    /// Listener lock.
    state: Mutex<HandleState<C>>,
}

/// Bookkeeping mutated under the listener lock.
struct HandleState<C: Config> {
    completed: Version,
    /// Version the next access of each kind (by `AccessKind::index`) requires.
    next_required: Box<[Version]>,
    /// `slots[i]` describes version `completed + i`. Every version between the
    /// completed one and the newest scheduled one has a slot.
    slots: VecDeque<VersionSlot<C>>,
}

struct VersionSlot<C: Config> {
    /// Scheduled accesses of this version that have not completed yet.
    holders: u32,
    /// Tasks waiting for the handle to reach this version.
    listeners: Vec<Task<C>>,
}

impl<C: Config> Handle<C> {
    /// Create a handle at version `0` with no scheduled accesses.
    pub fn new() -> Self {
        let kinds = <C::AccessKind as AccessKind>::ALL.len();
        Self {
            inner: Arc::new(HandleInner {
                completed: AtomicU64::new(0),
                access_lock: AtomicBool::new(false),
                state: Mutex::new(HandleState {
                    completed: 0,
                    next_required: vec![0; kinds].into_boxed_slice(),
                    slots: VecDeque::new(),
                }),
            }),
        }
    }

    /// Reserve a version for a new access of `kind` and return it.
    ///
    /// Called while a task is constructed; the returned version must later be
    /// released through exactly one [`advance_and_notify`] call, otherwise
    /// every later access of this handle waits forever.
    ///
    /// [`advance_and_notify`]: Handle::advance_and_notify
    pub fn schedule(&self, kind: C::AccessKind) -> Version {
        self.inner.state.lock_unpoisoned().schedule(kind)
    }

    /// Version of the most recently fully applied access group.
    #[must_use]
    pub fn completed_version(&self) -> Version {
        self.inner.completed.load(Ordering::Acquire)
    }

    /// Whether an access requiring `version` may run now.
    #[must_use]
    pub fn is_ready(&self, version: Version) -> bool {
        self.completed_version() == version
    }

    /// Park `task` until this handle reaches `version`.
    ///
    /// # Errors
    /// Hands the task back if the handle reached `version` in the meantime.
    ///
    /// # Panics
    /// If `version` was never scheduled or has already been passed.
    pub fn register_listener(&self, task: Task<C>, version: Version) -> Result<(), Task<C>> {
        let mut state = self.inner.state.lock_unpoisoned();
        if state.completed == version {
            return Err(task);
        }
        let offset = version
            .checked_sub(state.completed)
            .expect("Handle::register_listener: [1]");
        let offset = usize::try_from(offset).expect("Handle::register_listener: [2]");
        state
            .slots
            .get_mut(offset)
            .expect("Handle::register_listener: [3]")
            .listeners
            .push(task);
        Ok(())
    }

    /// Release one holder of `version`, the currently completed version.
    ///
    /// When it was the last holder the handle advances by one and the tasks
    /// waiting for the new version are returned. Those tasks may still be
    /// blocked on other handles.
    ///
    /// # Panics
    /// If `version` is not the completed version or has no holder left.
    pub fn advance_and_notify(&self, version: Version) -> Vec<Task<C>> {
        let mut state = self.inner.state.lock_unpoisoned();
        assert_eq!(
            state.completed, version,
            "Handle::advance_and_notify: [1]"
        );
        let front = state
            .slots
            .front_mut()
            .expect("Handle::advance_and_notify: [2]");
        front.holders = front
            .holders
            .checked_sub(1)
            .expect("Handle::advance_and_notify: [3]");
        if front.holders != 0 {
            return Vec::new();
        }
        let drained = state.slots.pop_front().expect("Handle::advance_and_notify: [4]");
        debug_assert!(drained.listeners.is_empty(), "Handle::advance_and_notify: [5]");
        state.completed += 1;
        self.inner.completed.store(state.completed, Ordering::Release);
        state
            .slots
            .front_mut()
            .map(|slot| mem::take(&mut slot.listeners))
            .unwrap_or_default()
    }

    /// Try to enter the critical section of a `needs_lock` access.
    #[must_use]
    pub fn try_lock(&self) -> bool {
        self.inner
            .access_lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Leave the critical section entered with [`try_lock`](Handle::try_lock).
    pub fn unlock(&self) {
        let was_locked = self.inner.access_lock.swap(false, Ordering::Release);
        debug_assert!(was_locked, "Handle::unlock: [1]");
    }

    /// Whether two handles refer to the same unit.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }

    /// Stable address used to order lock acquisition.
    pub(crate) fn addr(&self) -> usize {
        ptr::from_ref::<HandleInner<C>>(&self.inner).addr()
    }
}

impl<C: Config> fmt::Debug for Handle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("completed", &self.completed_version())
            .finish()
    }
}

impl<C: Config> Clone for Handle<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Config> Default for Handle<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Config> HandleState<C> {
    fn schedule(&mut self, kind: C::AccessKind) -> Version {
        let kind_index = kind.index();
        let commutative = kind.commutative();
        let mut version = self.next_required[kind_index];
        if version < self.completed {
            // The commutative group this access would join has already drained.
            debug_assert!(commutative, "HandleState::schedule: [1]");
            version = self.completed;
        }
        let offset = usize::try_from(version - self.completed).expect("HandleState::schedule: [2]");
        if let Some(slot) = self.slots.get_mut(offset) {
            slot.holders = slot
                .holders
                .checked_add(1)
                .expect("HandleState::schedule: [3]");
        } else {
            assert_eq!(offset, self.slots.len(), "HandleState::schedule: [4]");
            self.slots.push_back(VersionSlot {
                holders: 1,
                listeners: Vec::new(),
            });
        }
        let following = version + 1;
        for (index, next) in self.next_required.iter_mut().enumerate() {
            *next = if index == kind_index && commutative {
                version
            } else {
                following
            };
        }
        version
    }
}
