//! Tasks and their continuations.
//!
//! A task is a one-shot closure that returns a [`TaskResult`]; the engine enqueues whatever
//! continuation that result carries. This replaces the source's tagged union of task kinds with
//! a Rust sum type the engine matches on (see `DESIGN.md`).

use std::time::{Duration, Instant};

/// Priority `0` is highest; larger numbers are lower priority. Only a preference, never a hard
/// guarantee (spec.md glossary).
pub type Priority = u8;

/// A ready-to-run unit of work carrying its scheduling priority.
pub struct SimpleTask {
    pub priority: Priority,
    callable: Box<dyn FnOnce() -> TaskResult + Send + 'static>,
}

impl SimpleTask {
    pub fn new(priority: Priority, callable: impl FnOnce() -> TaskResult + Send + 'static) -> Self {
        Self { priority, callable: Box::new(callable) }
    }

    /// Runs the task, catching any panic so a single bad task cannot poison its worker. Returns
    /// `TaskResult::Empty` if the callable panicked; the failed task's continuation (if any) is
    /// necessarily lost, matching spec.md §4.A.2.
    pub(crate) fn run(self) -> TaskResult {
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(self.callable)) {
            Ok(result) => result,
            Err(_) => TaskResult::Empty,
        }
    }
}

/// `{start_time, duration}` describing when a [`SleepyTask`] becomes eligible to run.
///
/// `start_time` is `None` ("unset") until the engine resolves it to the monotonic clock reading
/// at first submission; this lets callers build a continuation whose delay is relative to when
/// it is actually scheduled rather than when it was constructed.
#[derive(Clone, Copy, Debug)]
pub struct WakeTime {
    start_time: Option<Instant>,
    duration: Duration,
}

impl WakeTime {
    /// A wake time relative to whenever this task is actually submitted.
    pub fn relative(duration: Duration) -> Self {
        Self { start_time: None, duration }
    }

    /// A wake time anchored to an already-known instant, e.g. when replaying a saved delay.
    pub fn absolute(start_time: Instant, duration: Duration) -> Self {
        Self { start_time: Some(start_time), duration }
    }

    pub fn is_resolved(&self) -> bool {
        self.start_time.is_some()
    }

    /// Fixes an unset `start_time` to `now`. No-op if already resolved.
    pub(crate) fn resolve(&mut self, now: Instant) {
        self.start_time.get_or_insert(now);
    }

    pub fn wake_instant(&self) -> Instant {
        self.start_time.expect("WakeTime must be resolved before computing its wake instant")
            + self.duration
    }

    pub fn is_awake(&self, now: Instant) -> bool {
        self.start_time.is_some_and(|start| now >= start + self.duration)
    }
}

/// A [`SimpleTask`] deferred until its [`WakeTime`] is reached.
pub struct SleepyTask {
    pub task: SimpleTask,
    pub wake_time: WakeTime,
}

impl SleepyTask {
    pub fn new(task: SimpleTask, wake_time: WakeTime) -> Self {
        Self { task, wake_time }
    }
}

/// Fires an arbitrary notifier exactly once, on drop, even if the owning task panicked.
///
/// Rust's move semantics already give us "a moved-from notification never fires" for free: once
/// ownership of a `ScopedNotification` moves, the old binding is inaccessible and can never be
/// dropped. The source's "null out a moved-from function pointer" idiom has no Rust equivalent to
/// write because the compiler enforces it structurally (spec.md §9).
pub struct ScopedNotification {
    notifier: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl ScopedNotification {
    pub fn new(notifier: impl FnOnce() + Send + 'static) -> Self {
        Self { notifier: Some(Box::new(notifier)) }
    }
}

impl Drop for ScopedNotification {
    fn drop(&mut self) {
        if let Some(notifier) = self.notifier.take() {
            // Swallow panics from the notifier, mirroring the source's "exceptions from the
            // notifier are swallowed".
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(notifier));
        }
    }
}

/// What a task produces after running: nothing, a continuation to resubmit, a continuation to
/// defer, or a one-shot completion signal.
pub enum TaskResult {
    Empty,
    Simple(SimpleTask),
    Sleepy(SleepyTask),
    Notify(ScopedNotification),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    #[test]
    fn scoped_notification_fires_on_drop() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let notification = ScopedNotification::new(move || flag.store(true, Ordering::SeqCst));
        assert!(!fired.load(Ordering::SeqCst));
        drop(notification);
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn scoped_notification_fires_exactly_once() {
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = count.clone();
        let notification = ScopedNotification::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(notification);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_notifier_is_swallowed() {
        let notification = ScopedNotification::new(|| panic!("boom"));
        drop(notification); // must not propagate the panic
    }

    #[test]
    fn wake_time_resolves_once() {
        let mut wake_time = WakeTime::relative(Duration::from_millis(10));
        assert!(!wake_time.is_resolved());
        let first = Instant::now();
        wake_time.resolve(first);
        let second = first + Duration::from_secs(1);
        wake_time.resolve(second);
        assert_eq!(wake_time.wake_instant(), first + Duration::from_millis(10));
    }

    #[test]
    fn panicking_task_yields_empty_result() {
        let task = SimpleTask::new(0, || panic!("boom"));
        assert!(matches!(task.run(), TaskResult::Empty));
    }
}
