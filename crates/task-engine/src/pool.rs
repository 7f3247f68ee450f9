//! `ThreadPool` — ties the priority/owner queue grid, per-worker sleepy queues, and the
//! [`WaiterManager`] together into a work-stealing, priority-aware, time-deferred executor.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Instant,
};

use tn_config::ThreadPoolConfig;
use tracing::{debug, trace, warn};

use crate::{
    queue::{PopOutcome, PushOutcome, TokenQueue},
    sleepy_queue::{ReservedSleepyTask, SleepyTaskQueue},
    task::{Priority, SimpleTask, TaskResult},
    waiter::{WaitPolicy, WaitResult, WaiterManager},
};

#[cfg(feature = "metrics")]
use consensus_metrics::task_engine::TaskEngineMetrics;

/// Shared engine state: the `[priority][owner]` queue grid, one sleepy queue per worker, a
/// round-robin submission cursor, and the waiter manager every worker idles on.
struct Shared {
    config: ThreadPoolConfig,
    /// `queues[priority][owner]`.
    queues: Vec<Vec<TokenQueue<SimpleTask>>>,
    sleepy_queues: Vec<SleepyTaskQueue>,
    waiters: WaiterManager,
    submit_cursor: AtomicUsize,
    #[cfg(feature = "metrics")]
    metrics: Option<TaskEngineMetrics>,
}

impl Shared {
    fn num_priorities(&self) -> usize {
        self.queues.len()
    }

    fn num_workers(&self) -> usize {
        self.sleepy_queues.len()
    }

    /// Tries up to `submit_cycle_attempts` successive owners at `priority`, starting from the
    /// round-robin cursor, before falling back to a force-push on the cursor's current owner.
    fn submit(&self, priority: Priority, task: SimpleTask) {
        let priority = (priority as usize).min(self.num_priorities() - 1);
        let attempts = self.config.submit_cycle_attempts.max(1).min(self.num_workers());
        let start = self.submit_cursor.fetch_add(1, Ordering::Relaxed) % self.num_workers();

        let mut remaining = Some(task);
        for step in 0..attempts {
            let owner = (start + step) % self.num_workers();
            match self.queues[priority][owner].try_push(remaining.take().unwrap()) {
                PushOutcome::Success => {
                    self.waiters.notify_one();
                    return;
                }
                PushOutcome::Full(task) | PushOutcome::TryLockFail(task) => {
                    remaining = Some(task);
                }
            }
        }

        self.queues[priority][start].force_push(remaining.expect("loop always restores the task"));
        self.waiters.notify_one();
    }

    fn submit_sleepy(&self, task: SimpleTask, wake_time: crate::task::WakeTime) {
        let owner = self.submit_cursor.fetch_add(1, Ordering::Relaxed) % self.num_workers();
        self.sleepy_queues[owner].push(task, wake_time);
        self.waiters.notify_one();
    }

    /// A worker's own queues, highest priority first.
    fn try_pop_own(&self, owner: usize) -> Option<SimpleTask> {
        for priority in 0..self.num_priorities() {
            if let PopOutcome::Success(task) = self.queues[priority][owner].try_pop() {
                return Some(task);
            }
        }
        None
    }

    /// Round-robin over every other worker's queues, highest priority first.
    fn try_steal(&self, owner: usize) -> Option<SimpleTask> {
        let num_workers = self.num_workers();
        for priority in 0..self.num_priorities() {
            for step in 1..num_workers {
                let peer = (owner + step) % num_workers;
                if let PopOutcome::Success(task) = self.queues[priority][peer].try_pop() {
                    return Some(task);
                }
            }
        }
        None
    }

    fn handle_result(&self, owner: usize, priority: Priority, result: TaskResult) {
        match result {
            TaskResult::Empty => {}
            TaskResult::Simple(task) => self.submit(priority, task),
            TaskResult::Sleepy(sleepy) => {
                self.sleepy_queues[owner].push(sleepy.task, sleepy.wake_time);
            }
            TaskResult::Notify(notification) => drop(notification),
        }
    }

    #[cfg(feature = "metrics")]
    fn record_completion(&self, priority: Priority) {
        if let Some(metrics) = &self.metrics {
            metrics.tasks_completed.with_label_values(&[&priority.to_string()]).inc();
        }
    }

    #[cfg(not(feature = "metrics"))]
    fn record_completion(&self, _priority: Priority) {}
}

/// A running, work-stealing, priority-aware, time-deferred executor.
///
/// Dropping the pool does not join its workers; call [`ThreadPool::shut_down`] and then join the
/// handles from [`ThreadPool::into_join_handles`] if a clean shutdown is required.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawns `config.num_workers` OS threads and starts their run loops immediately.
    pub fn start(config: ThreadPoolConfig) -> Self {
        Self::start_inner(config, #[cfg(feature = "metrics")] None)
    }

    #[cfg(feature = "metrics")]
    pub fn start_with_metrics(config: ThreadPoolConfig, metrics: TaskEngineMetrics) -> Self {
        Self::start_inner(config, Some(metrics))
    }

    fn start_inner(
        config: ThreadPoolConfig,
        #[cfg(feature = "metrics")] metrics: Option<TaskEngineMetrics>,
    ) -> Self {
        let num_priorities = config.num_priority_levels as usize;
        let num_workers = config.num_workers;

        let queues = (0..num_priorities)
            .map(|_| (0..num_workers).map(|_| TokenQueue::new(config.max_queue_size)).collect())
            .collect();
        let sleepy_queues = (0..num_workers).map(|_| SleepyTaskQueue::new()).collect();
        // One conditional slot per worker, so callers can target a specific worker's condition.
        let waiters = WaiterManager::new(num_workers);

        let shared = Arc::new(Shared {
            config,
            queues,
            sleepy_queues,
            waiters,
            submit_cursor: AtomicUsize::new(0),
            #[cfg(feature = "metrics")]
            metrics,
        });

        let workers = (0..num_workers)
            .map(|owner| {
                let shared = shared.clone();
                std::thread::Builder::new()
                    .name(format!("tn-task-engine-{owner}"))
                    .spawn(move || run_worker(shared, owner))
                    .expect("failed to spawn task engine worker thread")
            })
            .collect();

        Self { shared, workers }
    }

    /// Submits a ready-to-run task, attempting to place it onto a round-robin chain of owners at
    /// its priority before forcing it onto whichever owner the cursor lands on.
    pub fn submit(&self, task: SimpleTask) {
        let priority = task.priority;
        self.shared.submit(priority, task);
    }

    /// Submits a task deferred until its wake time, onto a round-robin-chosen worker's sleepy
    /// queue.
    pub fn submit_sleepy(&self, task: SimpleTask, wake_time: crate::task::WakeTime) {
        self.shared.submit_sleepy(task, wake_time);
    }

    /// Parks the calling thread on conditional slot `index` until `predicate` is true, `timeout`
    /// elapses, or the pool shuts down.
    pub fn conditional_wait(
        &self,
        index: usize,
        predicate: impl Fn() -> bool + std::panic::RefUnwindSafe,
        timeout: std::time::Duration,
        policy: WaitPolicy,
    ) -> crate::waiter::ConditionalWaitResult {
        self.shared.waiters.conditional_wait(index, predicate, timeout, policy)
    }

    /// Runs `setter` then wakes every waiter parked on conditional slot `index`.
    pub fn notify_conditional_waiter(&self, index: usize, setter: impl FnOnce()) {
        self.shared.waiters.notify_conditional_waiter(index, setter);
    }

    pub fn num_workers(&self) -> usize {
        self.shared.num_workers()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.waiters.is_shutting_down()
    }

    /// Flags shutdown and wakes every parked waiter. Workers finish their current task, drain
    /// their own queue opportunistically, then exit; in-flight `conditional_wait` callers observe
    /// `ShuttingDown` rather than hanging forever.
    pub fn shut_down(&self) {
        debug!(target: "tn_task_engine", "thread pool shutting down");
        self.shared.waiters.shut_down();
    }

    /// Signals shutdown and blocks until every worker thread has exited.
    pub fn shut_down_and_join(mut self) {
        self.shut_down();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if !self.is_shutting_down() {
            self.shut_down();
        }
    }
}

fn run_worker(shared: Arc<Shared>, owner: usize) {
    let mut current_sleepy: Option<ReservedSleepyTask> = None;

    loop {
        if let Some(task) = shared.try_pop_own(owner).or_else(|| shared.try_steal(owner)) {
            run_task(&shared, owner, task);
            continue;
        }

        let woken = shared.sleepy_queues[owner].try_perform_maintenance(Instant::now());
        if !woken.is_empty() {
            for task in woken {
                run_task(&shared, owner, task);
            }
            continue;
        }

        current_sleepy = shared.sleepy_queues[owner].try_swap(current_sleepy.take());

        if shared.waiters.is_shutting_down() {
            trace!(target: "tn_task_engine", worker = owner, "worker exiting on shutdown");
            if let Some(reserved) = current_sleepy {
                shared.sleepy_queues[owner].dismiss(reserved);
            }
            return;
        }

        let wait = match &current_sleepy {
            Some(reserved) => {
                let now = Instant::now();
                reserved.wake_time.wake_instant().saturating_duration_since(now)
            }
            None => shared.config.max_wait_duration,
        };

        match shared.waiters.wait_for(wait, WaitPolicy::ExitEarly) {
            WaitResult::ShuttingDown => {
                if let Some(reserved) = current_sleepy {
                    shared.sleepy_queues[owner].dismiss(reserved);
                }
                return;
            }
            WaitResult::Timeout | WaitResult::DoneWaiting => {}
        }
    }
}

fn run_task(shared: &Shared, owner: usize, task: SimpleTask) {
    let priority = task.priority;
    let result = task.run();
    shared.record_completion(priority);
    shared.handle_result(owner, priority, result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn test_config(num_workers: usize) -> ThreadPoolConfig {
        ThreadPoolConfig {
            num_priority_levels: 3,
            num_workers,
            max_queue_size: 0,
            submit_cycle_attempts: num_workers,
            max_wait_duration: Duration::from_millis(10),
        }
    }

    #[test]
    fn runs_a_single_submitted_task() {
        let pool = ThreadPool::start(test_config(2));
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        pool.submit(SimpleTask::new(0, move || {
            flag.store(true, Ordering::SeqCst);
            TaskResult::Empty
        }));

        for _ in 0..200 {
            if ran.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(ran.load(Ordering::SeqCst));
        pool.shut_down_and_join();
    }

    #[test]
    fn continuation_tasks_eventually_run() {
        let pool = ThreadPool::start(test_config(2));
        let counter = Arc::new(AtomicUsize::new(0));

        fn make_task(counter: Arc<AtomicUsize>) -> SimpleTask {
            SimpleTask::new(0, move || {
                let value = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if value < 5 {
                    TaskResult::Simple(make_task(counter))
                } else {
                    TaskResult::Empty
                }
            })
        }

        pool.submit(make_task(counter.clone()));

        for _ in 0..200 {
            if counter.load(Ordering::SeqCst) >= 5 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        pool.shut_down_and_join();
    }

    #[test]
    fn sleepy_tasks_run_in_wake_time_order() {
        let pool = ThreadPool::start(test_config(1));
        let order = Arc::new(Mutex::new(Vec::new()));

        for (id, delay_ms) in [(1u32, 30u64), (2, 10), (3, 20)] {
            let order = order.clone();
            pool.submit_sleepy(
                SimpleTask::new(0, move || {
                    order.lock().push(id);
                    TaskResult::Empty
                }),
                crate::task::WakeTime::relative(Duration::from_millis(delay_ms)),
            );
        }

        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(*order.lock(), vec![2, 3, 1]);
        pool.shut_down_and_join();
    }

    #[test]
    fn shut_down_drains_without_hanging() {
        let pool = ThreadPool::start(test_config(2));
        pool.submit(SimpleTask::new(0, || TaskResult::Empty));
        pool.shut_down_and_join();
    }
}
