//! Global barrier: detects the moment no task is queued or running.
//!
//! The caller's executor leads rounds; worker threads join a round only while
//! their own queue is empty, and leave it as soon as work shows up anywhere
//! they can see it. A round succeeds when every worker has joined, every queue
//! is empty and nobody raised `abort`.

use crate::{
    config::Config,
    executor::execute::Executor,
    queue::TaskQueue,
    sync::{AtomicBool, AtomicU64, Ordering},
};
use crossbeam_utils::{Backoff, CachePadded};
use derive_more::Debug;

const JOINED_BITS: u32 = 30;
const JOINED_MASK: u64 = (1 << JOINED_BITS) - 1;
const PHASE_SHIFT: u32 = JOINED_BITS;
const PHASE_MASK: u64 = 0b11;
const ROUND_SHIFT: u32 = 32;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Phase {
    /// No round is open.
    Idle,
    /// Workers are joining the current round.
    Entering,
    /// Every worker joined; the caller is verifying quiescence.
    Draining,
}

/// Decoded content of the barrier word.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Word {
    pub(crate) round: u32,
    pub(crate) phase: Phase,
    pub(crate) joined: u32,
}

impl Word {
    fn pack(self) -> u64 {
        let phase = match self.phase {
            Phase::Idle => 0,
            Phase::Entering => 1,
            Phase::Draining => 2,
        };
        debug_assert!(u64::from(self.joined) <= JOINED_MASK, "Word::pack: [1]");
        (u64::from(self.round) << ROUND_SHIFT)
            | (phase << PHASE_SHIFT)
            | (u64::from(self.joined) & JOINED_MASK)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn unpack(raw: u64) -> Self {
        let phase = match (raw >> PHASE_SHIFT) & PHASE_MASK {
            0 => Phase::Idle,
            1 => Phase::Entering,
            2 => Phase::Draining,
            _ => unreachable!("Word::unpack: [1]"),
        };
        Self {
            round: (raw >> ROUND_SHIFT) as u32,
            phase,
            joined: (raw & JOINED_MASK) as u32,
        }
    }
}

/// Shared barrier state: the packed word plus the `abort` flag.
#[derive(Debug)]
pub(crate) struct BarrierState {
    #[debug("{:?}", Word::unpack(word.load(Ordering::Relaxed)))]
    word: CachePadded<AtomicU64>,
    abort: CachePadded<AtomicBool>,
}

impl BarrierState {
    pub(crate) fn new() -> Self {
        Self {
            word: CachePadded::new(AtomicU64::new(
                Word {
                    round: 0,
                    phase: Phase::Idle,
                    joined: 0,
                }
                .pack(),
            )),
            abort: CachePadded::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn load(&self) -> Word {
        Word::unpack(self.word.load(Ordering::SeqCst))
    }

    /// Open the round following the current one and return its number.
    fn open(&self) -> u32 {
        let current = self.load();
        debug_assert_eq!(current.phase, Phase::Idle, "BarrierState::open: [1]");
        let round = current.round.wrapping_add(1);
        self.abort.store(false, Ordering::SeqCst);
        self.word.store(
            Word {
                round,
                phase: Phase::Entering,
                joined: 0,
            }
            .pack(),
            Ordering::SeqCst,
        );
        round
    }

    fn close(&self, round: u32) {
        self.word.store(
            Word {
                round,
                phase: Phase::Idle,
                joined: 0,
            }
            .pack(),
            Ordering::SeqCst,
        );
    }

    /// Join `round` if it is still accepting workers. The last of
    /// `participants` to join moves the round to [`Phase::Draining`].
    fn join(&self, round: u32, participants: u32) -> bool {
        let mut raw = self.word.load(Ordering::SeqCst);
        loop {
            let word = Word::unpack(raw);
            if word.round != round || word.phase != Phase::Entering {
                return false;
            }
            let joined = word.joined + 1;
            let phase = if joined == participants {
                Phase::Draining
            } else {
                Phase::Entering
            };
            let next = Word {
                round,
                phase,
                joined,
            }
            .pack();
            match self
                .word
                .compare_exchange_weak(raw, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return true,
                Err(actual) => raw = actual,
            }
        }
    }

    fn raise_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}

impl<C: Config> Executor<C> {
    /// Caller side: run rounds until one succeeds. Returns the number of
    /// rounds it took.
    pub(super) fn lead_barrier(&self) -> u32 {
        let participants =
            u32::try_from(self.shared.num_workers() - 1).expect("Executor::lead_barrier: [1]");
        let barrier = &self.shared.barrier;
        let retry = Backoff::new();
        let mut rounds = 0;
        loop {
            self.drain();
            rounds += 1;
            if participants == 0 {
                return rounds;
            }
            let round = barrier.open();
            let spin = Backoff::new();
            let quiescent = loop {
                if barrier.is_aborted() || !self.own_queue().is_empty() {
                    break false;
                }
                if barrier.load().phase == Phase::Draining {
                    break self.shared.queues.iter().all(|queue| queue.is_empty())
                        && !barrier.is_aborted();
                }
                spin.snooze();
            };
            barrier.close(round);
            if quiescent {
                return rounds;
            }
            tracing::trace!(round, "barrier round aborted");
            retry.snooze();
        }
    }

    /// Worker side: called between tasks. Returns right away unless a round
    /// this worker has not seen yet is open.
    pub(super) fn serve_barrier(&mut self) {
        let word = self.shared.barrier.load();
        if word.phase == Phase::Idle || word.round == self.barrier_round {
            return;
        }
        self.barrier_round = word.round;
        let barrier = &self.shared.barrier;
        if !self.own_queue().is_empty() {
            barrier.raise_abort();
            return;
        }
        let participants =
            u32::try_from(self.shared.num_workers() - 1).expect("Executor::serve_barrier: [1]");
        if !barrier.join(word.round, participants) {
            return;
        }
        let backoff = Backoff::new();
        loop {
            let now = barrier.load();
            if now.round != word.round || now.phase == Phase::Idle || barrier.is_aborted() {
                return;
            }
            if !self.own_queue().is_empty() {
                barrier.raise_abort();
                return;
            }
            if self.shared.shutdown.load(Ordering::Acquire) {
                return;
            }
            backoff.snooze();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_fields_do_not_overlap() {
        for word in [
            Word {
                round: 0,
                phase: Phase::Idle,
                joined: 0,
            },
            Word {
                round: u32::MAX,
                phase: Phase::Draining,
                joined: u32::try_from(JOINED_MASK).unwrap(),
            },
            Word {
                round: 7,
                phase: Phase::Entering,
                joined: 3,
            },
        ] {
            assert_eq!(Word::unpack(word.pack()), word);
        }
    }

    #[cfg(not(feature = "loom"))]
    #[test]
    fn last_joiner_starts_draining() {
        let barrier = BarrierState::new();
        let round = barrier.open();
        assert_eq!(round, 1);
        assert!(barrier.join(round, 2));
        assert_eq!(barrier.load().phase, Phase::Entering);
        assert!(barrier.join(round, 2));
        let word = barrier.load();
        assert_eq!((word.phase, word.joined), (Phase::Draining, 2));

        // Joining after the round left `Entering` is refused.
        assert!(!barrier.join(round, 2));
        barrier.close(round);
        assert!(!barrier.join(round, 2));
    }

    #[cfg(not(feature = "loom"))]
    #[test]
    fn stale_rounds_cannot_be_joined() {
        let barrier = BarrierState::new();
        let first = barrier.open();
        barrier.raise_abort();
        barrier.close(first);
        let second = barrier.open();
        assert!(!barrier.is_aborted());
        assert!(!barrier.join(first, 1));
        assert!(barrier.join(second, 1));
        assert_eq!(barrier.load().phase, Phase::Draining);
    }
}
