use crate::queue::xor_list::XorList;
use std::collections::VecDeque;

/// A double-ended sequence with O(1) push/pop at both ends.
///
/// The front is the owner end of a queue, the back is the steal end.
pub trait TaskList<T>: Default + Send {
    /// Number of elements.
    fn len(&self) -> usize;
    /// Whether the list is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Insert at the front.
    fn push_front(&mut self, value: T);
    /// Insert at the back.
    fn push_back(&mut self, value: T);
    /// Remove from the front.
    fn pop_front(&mut self) -> Option<T>;
    /// Remove from the back.
    fn pop_back(&mut self) -> Option<T>;
    /// The element at the back.
    fn back(&self) -> Option<&T>;
    /// Remove every element matching `pred` and hand it to `sink`.
    ///
    /// Elements are visited from the back to the front; the relative order of
    /// the remaining elements is preserved.
    fn erase_if(&mut self, pred: impl FnMut(&T) -> bool, sink: impl FnMut(T));
    /// Remove the element closest to the back that matches `pred`.
    ///
    /// Stops at the first match; the relative order of the remaining elements
    /// is preserved.
    fn remove_last_matching(&mut self, pred: impl FnMut(&T) -> bool) -> Option<T>;
}

impl<T: Send> TaskList<T> for VecDeque<T> {
    fn len(&self) -> usize {
        VecDeque::len(self)
    }

    fn push_front(&mut self, value: T) {
        VecDeque::push_front(self, value);
    }

    fn push_back(&mut self, value: T) {
        VecDeque::push_back(self, value);
    }

    fn pop_front(&mut self) -> Option<T> {
        VecDeque::pop_front(self)
    }

    fn pop_back(&mut self) -> Option<T> {
        VecDeque::pop_back(self)
    }

    fn back(&self) -> Option<&T> {
        VecDeque::back(self)
    }

    fn erase_if(&mut self, mut pred: impl FnMut(&T) -> bool, mut sink: impl FnMut(T)) {
        let mut index = VecDeque::len(self);
        while index > 0 {
            index -= 1;
            if pred(&self[index]) {
                if let Some(value) = self.remove(index) {
                    sink(value);
                }
            }
        }
    }

    fn remove_last_matching(&mut self, pred: impl FnMut(&T) -> bool) -> Option<T> {
        let index = self.iter().rposition(pred)?;
        self.remove(index)
    }
}

/// Selects the sequence type backing a queue.
pub trait ListFamily: Send + Sync + 'static {
    /// The sequence holding elements of type `T`.
    type List<T: Send>: TaskList<T>;
}

/// Queues backed by [`VecDeque`].
#[derive(Debug, Copy, Clone, Default)]
pub struct VecDequeList;

impl ListFamily for VecDequeList {
    type List<T: Send> = VecDeque<T>;
}

/// Queues backed by [`XorList`].
#[derive(Debug, Copy, Clone, Default)]
pub struct XorLinkedList;

impl ListFamily for XorLinkedList {
    type List<T: Send> = XorList<T>;
}
