//! `SleepyTaskQueue` — one worker's collection of tasks deferred until a future wake time.
//!
//! The source stores a multimap keyed by wake time and hands out raw pointers into it, relying on
//! the map never invalidating references on insert. We replace that with a mutex-protected
//! `Vec<Entry>` addressed by a small generational id ([`SleepyTaskHandle`]): a `try_swap` caller
//! holds only the id and the task it took ownership of, never a reference into the collection, so
//! there is nothing for another thread to invalidate. `Status` stays a plain field guarded by the
//! same mutex rather than a separate atomic, since every read and write of it already happens
//! while the lock is held (see `DESIGN.md`).

use std::{
    collections::HashSet,
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use parking_lot::Mutex;

use crate::task::{SimpleTask, WakeTime};

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum Status {
    Unclaimed,
    Reserved,
}

struct Entry {
    id: u64,
    wake_time: WakeTime,
    status: Status,
    task: Option<SimpleTask>,
}

/// Identifies an entry this caller currently holds `Reserved`.
#[derive(Clone, Copy, Debug)]
pub struct SleepyTaskHandle(u64);

/// A sleepy task a caller has exclusively reserved via [`SleepyTaskQueue::try_swap`].
pub struct ReservedSleepyTask {
    handle: SleepyTaskHandle,
    pub task: SimpleTask,
    pub wake_time: WakeTime,
}

pub struct SleepyTaskQueue {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

impl Default for SleepyTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SleepyTaskQueue {
    pub fn new() -> Self {
        Self { entries: Mutex::new(Vec::new()), next_id: AtomicU64::new(0) }
    }

    /// Inserts a task, resolving its wake time against the current instant if unset.
    pub fn push(&self, task: SimpleTask, wake_time: WakeTime) {
        self.push_at(task, wake_time, Instant::now());
    }

    /// Inserts a task whose wake time is resolved against the given instant.
    pub fn push_at(&self, task: SimpleTask, mut wake_time: WakeTime, now: Instant) {
        wake_time.resolve(now);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push(Entry { id, wake_time, status: Status::Unclaimed, task: Some(task) });
    }

    /// If `current` is `None`, reserves the Unclaimed entry with the lowest wake time, if any. If
    /// `current` is `Some`, reserves a strictly-earlier-waking Unclaimed entry instead, returning
    /// `current` to Unclaimed in the process. Returns whichever reservation is now held.
    pub fn try_swap(&self, current: Option<ReservedSleepyTask>) -> Option<ReservedSleepyTask> {
        let mut entries = self.entries.lock();

        let candidate_idx = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.status == Status::Unclaimed)
            .min_by_key(|(_, e)| e.wake_time.wake_instant())
            .map(|(i, _)| i);

        let Some(candidate_idx) = candidate_idx else {
            return current;
        };

        if let Some(cur) = &current {
            if entries[candidate_idx].wake_time.wake_instant() >= cur.wake_time.wake_instant() {
                return current;
            }
        }

        let candidate_id = entries[candidate_idx].id;
        let candidate_wake_time = entries[candidate_idx].wake_time;
        let candidate_task =
            entries[candidate_idx].task.take().expect("unclaimed entry always holds a task");
        entries[candidate_idx].status = Status::Reserved;

        if let Some(cur) = current {
            if let Some(entry) = entries.iter_mut().find(|e| e.id == cur.handle.0) {
                entry.status = Status::Unclaimed;
                entry.task = Some(cur.task);
            }
        }

        Some(ReservedSleepyTask {
            handle: SleepyTaskHandle(candidate_id),
            task: candidate_task,
            wake_time: candidate_wake_time,
        })
    }

    /// Returns a reservation to Unclaimed without running it.
    pub fn dismiss(&self, reserved: ReservedSleepyTask) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.iter_mut().find(|e| e.id == reserved.handle.0) {
            entry.status = Status::Unclaimed;
            entry.task = Some(reserved.task);
        }
    }

    /// Permanently removes a reservation, handing back the task to run.
    pub fn consume(&self, reserved: ReservedSleepyTask) -> SimpleTask {
        let mut entries = self.entries.lock();
        entries.retain(|e| e.id != reserved.handle.0);
        reserved.task
    }

    /// Walks entries in ascending wake-time order, extracting every Unclaimed entry that has
    /// already woken, skipping Reserved entries, and stopping at the first asleep Unclaimed
    /// entry. Returns the extracted tasks in wake-time order.
    pub fn try_perform_maintenance(&self, now: Instant) -> Vec<SimpleTask> {
        let mut entries = self.entries.lock();
        entries.sort_by_key(|e| e.wake_time.wake_instant());

        let mut extracted = Vec::new();
        let mut remove_ids = HashSet::new();

        for entry in entries.iter_mut() {
            match entry.status {
                Status::Reserved => continue,
                Status::Unclaimed => {
                    if entry.wake_time.is_awake(now) {
                        extracted
                            .push(entry.task.take().expect("unclaimed entry always holds a task"));
                        remove_ids.insert(entry.id);
                    } else {
                        break;
                    }
                }
            }
        }

        entries.retain(|e| !remove_ids.contains(&e.id));
        extracted
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
