use prometheus::{register_int_counter_vec_with_registry, register_int_gauge_with_registry};

use crate::{IntCounterVec, IntGauge, Registry};

/// Metrics for a `tn_task_engine::ThreadPool`.
#[derive(Clone)]
pub struct TaskEngineMetrics {
    /// Total tasks completed, labeled by priority.
    pub tasks_completed: IntCounterVec,
    /// Number of sleepy tasks currently parked across all workers.
    pub sleepy_tasks_pending: IntGauge,
    /// Number of parked waiters (normal + sleepy + conditional).
    pub waiters_parked: IntGauge,
}

impl TaskEngineMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            tasks_completed: register_int_counter_vec_with_registry!(
                "task_engine_tasks_completed_total",
                "Total tasks completed by the thread pool, labeled by priority",
                &["priority"],
                registry
            )
            .expect("task_engine_tasks_completed_total metric registers exactly once"),
            sleepy_tasks_pending: register_int_gauge_with_registry!(
                "task_engine_sleepy_tasks_pending",
                "Number of sleepy tasks currently waiting for their wake time",
                registry
            )
            .expect("task_engine_sleepy_tasks_pending metric registers exactly once"),
            waiters_parked: register_int_gauge_with_registry!(
                "task_engine_waiters_parked",
                "Number of worker threads currently parked in the waiter manager",
                registry
            )
            .expect("task_engine_waiters_parked metric registers exactly once"),
        }
    }
}
