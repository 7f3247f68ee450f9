//! `TokenQueue<T>` — a bounded, mutex-guarded FIFO used for each `[priority][owner]` slot of the
//! work-stealing grid.
//!
//! The source's queue is lock-free; ours trades that for `parking_lot::Mutex`, which is the
//! pattern this workspace already uses for its own hot-path locks (see
//! `consensus-metrics::InFlightGuard` and the narwhal primary's batch store). A contended
//! `try_lock` failure is surfaced to the caller rather than spun on, so a worker can move on to
//! the next candidate queue instead of stalling behind a peer.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Outcome of a non-blocking push. Failure variants hand the item back so the caller can retry
/// elsewhere.
pub enum PushOutcome<T> {
    Success,
    Full(T),
    TryLockFail(T),
}

impl<T> PushOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, PushOutcome::Success)
    }

    /// Recovers the item from a failed push, if any.
    pub fn into_item(self) -> Option<T> {
        match self {
            PushOutcome::Success => None,
            PushOutcome::Full(item) | PushOutcome::TryLockFail(item) => Some(item),
        }
    }
}

/// Outcome of a non-blocking pop.
pub enum PopOutcome<T> {
    Success(T),
    Empty,
    TryLockFail,
}

impl<T> PopOutcome<T> {
    pub fn into_item(self) -> Option<T> {
        match self {
            PopOutcome::Success(item) => Some(item),
            PopOutcome::Empty | PopOutcome::TryLockFail => None,
        }
    }
}

pub struct TokenQueue<T> {
    inner: Mutex<VecDeque<T>>,
    /// `0` means unbounded.
    max_size: usize,
}

impl<T> TokenQueue<T> {
    pub fn new(max_size: usize) -> Self {
        Self { inner: Mutex::new(VecDeque::new()), max_size }
    }

    /// Pushes without blocking. Fails with `Full` if at capacity, `TryLockFail` if contended.
    pub fn try_push(&self, item: T) -> PushOutcome<T> {
        match self.inner.try_lock() {
            Some(mut guard) => {
                if self.max_size > 0 && guard.len() >= self.max_size {
                    PushOutcome::Full(item)
                } else {
                    guard.push_back(item);
                    PushOutcome::Success
                }
            }
            None => PushOutcome::TryLockFail(item),
        }
    }

    /// Pushes unconditionally, blocking for the lock and ignoring `max_size`. Used as the last
    /// resort after every candidate owner has refused a `try_push`.
    pub fn force_push(&self, item: T) {
        self.inner.lock().push_back(item);
    }

    /// Atomically pushes `item` to the back and pops the front, returning the popped element. On
    /// an empty queue this pushes then immediately pops the same item back out, so the queue
    /// stays empty and the input is returned unchanged.
    pub fn force_push_pop(&self, item: T) -> T {
        let mut guard = self.inner.lock();
        guard.push_back(item);
        guard.pop_front().expect("queue holds at least the just-pushed item")
    }

    pub fn try_pop(&self) -> PopOutcome<T> {
        match self.inner.try_lock() {
            Some(mut guard) => match guard.pop_front() {
                Some(item) => PopOutcome::Success(item),
                None => PopOutcome::Empty,
            },
            None => PopOutcome::TryLockFail,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_roundtrip() {
        let queue: TokenQueue<u32> = TokenQueue::new(0);
        assert!(queue.try_push(1).is_success());
        assert!(queue.try_push(2).is_success());
        assert_eq!(queue.try_pop().into_item(), Some(1));
        assert_eq!(queue.try_pop().into_item(), Some(2));
        assert!(matches!(queue.try_pop(), PopOutcome::Empty));
    }

    #[test]
    fn try_push_reports_full() {
        let queue: TokenQueue<u32> = TokenQueue::new(1);
        assert!(queue.try_push(1).is_success());
        let outcome = queue.try_push(2);
        assert!(!outcome.is_success());
        assert_eq!(outcome.into_item(), Some(2));
    }

    #[test]
    fn force_push_ignores_capacity() {
        let queue: TokenQueue<u32> = TokenQueue::new(1);
        queue.force_push(1);
        queue.force_push(2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn force_push_pop_on_empty_returns_input() {
        let queue: TokenQueue<u32> = TokenQueue::new(0);
        assert_eq!(queue.force_push_pop(7), 7);
        assert!(queue.is_empty());
    }

    #[test]
    fn force_push_pop_on_nonempty_returns_previous_front() {
        let queue: TokenQueue<u32> = TokenQueue::new(0);
        queue.force_push(1);
        queue.force_push(2);
        assert_eq!(queue.force_push_pop(3), 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_pop().into_item(), Some(2));
        assert_eq!(queue.try_pop().into_item(), Some(3));
    }
}
