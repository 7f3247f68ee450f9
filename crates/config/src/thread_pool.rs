use std::time::Duration;

use thiserror::Error;

/// Construction-time errors for [`ThreadPoolConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ThreadPoolConfigError {
    #[error("num_priority_levels must be at least 1")]
    NoPriorityLevels,
    #[error("num_workers must be at least 1")]
    NoWorkers,
}

/// Configuration for a [`tn_task_engine::ThreadPool`](../tn_task_engine/struct.ThreadPool.html).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ThreadPoolConfig {
    /// Number of priority levels; priority `0` is highest.
    pub num_priority_levels: u8,
    /// Number of OS worker threads backing the pool.
    pub num_workers: usize,
    /// Soft cap enforced by `try_push`; `force_push` bypasses it.
    pub max_queue_size: usize,
    /// Number of peer owners a submitter tries with `try_push` before falling back to
    /// `force_push` on its round-robin cursor's current owner.
    pub submit_cycle_attempts: usize,
    /// Upper bound an idle worker parks for before re-checking its queues and shutdown state.
    #[serde(with = "duration_millis")]
    pub max_wait_duration: Duration,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_priority_levels: 4,
            num_workers: num_cpus_fallback(),
            max_queue_size: 10_000,
            submit_cycle_attempts: 3,
            max_wait_duration: Duration::from_millis(100),
        }
    }
}

impl ThreadPoolConfig {
    pub fn validate(&self) -> Result<(), ThreadPoolConfigError> {
        if self.num_priority_levels == 0 {
            return Err(ThreadPoolConfigError::NoPriorityLevels);
        }
        if self.num_workers == 0 {
            return Err(ThreadPoolConfigError::NoWorkers);
        }
        Ok(())
    }
}

/// Avoids a dependency on `num_cpus` for a single fallback default; not load-bearing for
/// correctness, only for out-of-the-box ergonomics.
fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
