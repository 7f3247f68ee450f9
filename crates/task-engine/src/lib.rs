//! A concurrent, work-stealing, priority-aware, time-deferred thread pool.
//!
//! Workers pull from their own `[priority][owner]` queue grid first, then steal from peers; tasks
//! that ask to run later go into a per-worker sleepy queue instead of being resubmitted eagerly.
//! See `DESIGN.md` for how each piece is grounded in this workspace's existing crates.

pub mod pool;
pub mod queue;
pub mod sleepy_queue;
pub mod task;
pub mod waiter;

pub use pool::ThreadPool;
pub use task::{Priority, ScopedNotification, SimpleTask, SleepyTask, TaskResult, WakeTime};
pub use waiter::{ConditionalWaitResult, WaitPolicy, WaitResult};
