use crate::queue::list::TaskList;
use core::fmt;

/// Slot index meaning "no node". Slot `0` is never handed out.
const NIL: usize = 0;

/// Arena-backed doubly linked list storing a single link word per node.
///
/// Each node keeps `prev ^ next` (slot indexes, with [`NIL`] at both ends);
/// walking from either end recovers the neighbour by XOR-ing the link with
/// the index of the node just left. Freed slots are recycled, so a list that
/// reaches a steady size stops allocating.
pub struct XorList<T> {
    /// `slots[0]` is a permanently empty sentinel.
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    len: usize,
}

struct Slot<T> {
    link: usize,
    value: Option<T>,
}

impl<T> XorList<T> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![Slot {
                link: NIL,
                value: None,
            }],
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    /// Iterate from the front to the back.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let mut prev = NIL;
        let mut current = self.head;
        core::iter::from_fn(move || {
            if current == NIL {
                return None;
            }
            let slot = &self.slots[current];
            let next = slot.link ^ prev;
            prev = current;
            current = next;
            slot.value.as_ref()
        })
    }

    fn alloc(&mut self, value: T, link: usize) -> usize {
        if let Some(index) = self.free.pop() {
            self.slots[index] = Slot {
                link,
                value: Some(value),
            };
            index
        } else {
            self.slots.push(Slot {
                link,
                value: Some(value),
            });
            self.slots.len() - 1
        }
    }

    fn release(&mut self, index: usize) -> T {
        let slot = &mut self.slots[index];
        slot.link = NIL;
        let value = slot.value.take().expect("XorList::release: [1]");
        self.free.push(index);
        self.len -= 1;
        value
    }

    /// Unlink `index`, whose neighbours are `prev` and `next`.
    fn unlink(&mut self, index: usize, prev: usize, next: usize) -> T {
        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev].link ^= index ^ next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slots[next].link ^= index ^ prev;
        }
        self.release(index)
    }
}

impl<T> Default for XorList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for XorList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Send> TaskList<T> for XorList<T> {
    fn len(&self) -> usize {
        self.len
    }

    fn push_front(&mut self, value: T) {
        let old_head = self.head;
        let index = self.alloc(value, old_head);
        if old_head == NIL {
            self.tail = index;
        } else {
            self.slots[old_head].link ^= index;
        }
        self.head = index;
        self.len += 1;
    }

    fn push_back(&mut self, value: T) {
        let old_tail = self.tail;
        let index = self.alloc(value, old_tail);
        if old_tail == NIL {
            self.head = index;
        } else {
            self.slots[old_tail].link ^= index;
        }
        self.tail = index;
        self.len += 1;
    }

    fn pop_front(&mut self) -> Option<T> {
        let index = self.head;
        if index == NIL {
            return None;
        }
        let next = self.slots[index].link;
        Some(self.unlink(index, NIL, next))
    }

    fn pop_back(&mut self) -> Option<T> {
        let index = self.tail;
        if index == NIL {
            return None;
        }
        let prev = self.slots[index].link;
        Some(self.unlink(index, prev, NIL))
    }

    fn back(&self) -> Option<&T> {
        if self.tail == NIL {
            return None;
        }
        self.slots[self.tail].value.as_ref()
    }

    fn erase_if(&mut self, mut pred: impl FnMut(&T) -> bool, mut sink: impl FnMut(T)) {
        // Walk from the back: `after` is the node closer to the tail.
        let mut after = NIL;
        let mut current = self.tail;
        while current != NIL {
            let before = self.slots[current].link ^ after;
            let matches = self.slots[current]
                .value
                .as_ref()
                .is_some_and(&mut pred);
            if matches {
                sink(self.unlink(current, before, after));
            } else {
                after = current;
            }
            current = before;
        }
    }

    fn remove_last_matching(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        let mut after = NIL;
        let mut current = self.tail;
        while current != NIL {
            let before = self.slots[current].link ^ after;
            let matches = self.slots[current]
                .value
                .as_ref()
                .is_some_and(&mut pred);
            if matches {
                return Some(self.unlink(current, before, after));
            }
            after = current;
            current = before;
        }
        None
    }
}
