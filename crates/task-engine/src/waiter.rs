//! `WaiterManager` — parks worker threads (and, via the conditional class, arbitrary callers)
//! until there is something for them to do, a timeout elapses, or the pool is shutting down.
//!
//! Three waiter classes share one manager: Normal (parked indefinitely), Sleepy (parked with a
//! timeout; this is what a worker uses while idling), and Conditional (`N` independently indexed
//! slots, each parked only while a caller-supplied predicate is false). A reader-writer lock
//! fences shutdown against in-flight waits: a waiter takes the shared side only to evaluate its
//! predicate and register itself as parked, then drops it before actually parking on the condvar —
//! `Condvar::wait`/`wait_for` release the parked-count mutex but have no idea the fence guard
//! exists, so holding it across the park would let `shut_down`'s exclusive side block forever on a
//! reader that only drops once woken. `shut_down` takes the exclusive side only after flipping the
//! flag, so no waiter can observe the flag clear, register, and then still park unseen.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use parking_lot::{Condvar, Mutex, RwLock};

/// Controls what happens when a waiter observes shutdown has already begun.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Return `ShuttingDown` immediately without parking.
    ExitEarly,
    /// Park anyway; the wake from `shut_down` will still report `ShuttingDown`.
    Wait,
}

/// Outcome of [`WaiterManager::wait`] / [`WaiterManager::wait_for`]. Priority when more than one
/// condition applies: `ShuttingDown` > `Timeout` > `DoneWaiting`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitResult {
    Timeout,
    ShuttingDown,
    DoneWaiting,
}

/// Outcome of [`WaiterManager::conditional_wait`]. Priority: `ConditionTriggered` >
/// `ShuttingDown` > `Timeout` > `DoneWaiting`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionalWaitResult {
    ConditionTriggered,
    ShuttingDown,
    Timeout,
    DoneWaiting,
}

struct ConditionalSlot {
    fence: RwLock<()>,
    parked: Mutex<usize>,
    condvar: Condvar,
}

impl ConditionalSlot {
    fn new() -> Self {
        Self { fence: RwLock::new(()), parked: Mutex::new(0), condvar: Condvar::new() }
    }
}

pub struct WaiterManager {
    shutdown: AtomicBool,
    fence: RwLock<()>,
    normal_parked: Mutex<usize>,
    normal_condvar: Condvar,
    sleepy_parked: Mutex<usize>,
    sleepy_condvar: Condvar,
    conditional: Vec<ConditionalSlot>,
}

impl WaiterManager {
    /// `num_conditional_slots` is clamped to at least one slot so index-clamping is always well
    /// defined.
    pub fn new(num_conditional_slots: usize) -> Self {
        let num_conditional_slots = num_conditional_slots.max(1);
        Self {
            shutdown: AtomicBool::new(false),
            fence: RwLock::new(()),
            normal_parked: Mutex::new(0),
            normal_condvar: Condvar::new(),
            sleepy_parked: Mutex::new(0),
            sleepy_condvar: Condvar::new(),
            conditional: (0..num_conditional_slots).map(|_| ConditionalSlot::new()).collect(),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Parks indefinitely on the Normal class until woken by `notify_one`/`notify_all` or
    /// `shut_down`.
    pub fn wait(&self, policy: WaitPolicy) -> WaitResult {
        let mut parked = self.normal_parked.lock();
        {
            // Registering under `parked` while holding the fence's shared side, then dropping the
            // fence before parking, is what lets `shut_down`'s exclusive side observe every
            // soon-to-be-parked waiter without itself waiting out the park.
            let _fence = self.fence.read();
            if policy == WaitPolicy::ExitEarly && self.is_shutting_down() {
                return WaitResult::ShuttingDown;
            }
            *parked += 1;
        }
        self.normal_condvar.wait(&mut parked);
        *parked -= 1;
        drop(parked);

        if self.is_shutting_down() {
            WaitResult::ShuttingDown
        } else {
            WaitResult::DoneWaiting
        }
    }

    /// Parks on the Sleepy class for at most `duration`. This is what a worker's idle loop calls
    /// while it has nothing ready and no sleepy task of its own to wait out.
    pub fn wait_for(&self, duration: Duration, policy: WaitPolicy) -> WaitResult {
        let mut parked = self.sleepy_parked.lock();
        {
            let _fence = self.fence.read();
            if policy == WaitPolicy::ExitEarly && self.is_shutting_down() {
                return WaitResult::ShuttingDown;
            }
            *parked += 1;
        }
        let timed_out = self.sleepy_condvar.wait_for(&mut parked, duration).timed_out();
        *parked -= 1;
        drop(parked);

        if self.is_shutting_down() {
            WaitResult::ShuttingDown
        } else if timed_out {
            WaitResult::Timeout
        } else {
            WaitResult::DoneWaiting
        }
    }

    /// Parks on conditional slot `index` (clamped into range) until `predicate` is true, `timeout`
    /// elapses, or shutdown. A panicking predicate is treated as satisfied, mirroring the
    /// source's "an exception from the predicate counts as the condition being met".
    pub fn conditional_wait(
        &self,
        index: usize,
        predicate: impl Fn() -> bool + std::panic::RefUnwindSafe,
        timeout: Duration,
        policy: WaitPolicy,
    ) -> ConditionalWaitResult {
        let slot = &self.conditional[self.clamp_index(index)];

        let mut parked = slot.parked.lock();
        {
            let _fence = slot.fence.read();
            if eval_predicate(&predicate) {
                return ConditionalWaitResult::ConditionTriggered;
            }
            if policy == WaitPolicy::ExitEarly && self.is_shutting_down() {
                return ConditionalWaitResult::ShuttingDown;
            }
            *parked += 1;
        }
        let timed_out = slot.condvar.wait_for(&mut parked, timeout).timed_out();
        *parked -= 1;
        drop(parked);

        if eval_predicate(&predicate) {
            ConditionalWaitResult::ConditionTriggered
        } else if self.is_shutting_down() {
            ConditionalWaitResult::ShuttingDown
        } else if timed_out {
            ConditionalWaitResult::Timeout
        } else {
            ConditionalWaitResult::DoneWaiting
        }
    }

    /// Runs `setter` (meant to flip whatever state a conditional waiter's predicate reads), then
    /// wakes every waiter parked on slot `index`.
    pub fn notify_conditional_waiter(&self, index: usize, setter: impl FnOnce()) {
        let slot = &self.conditional[self.clamp_index(index)];
        setter();
        {
            let _fence = slot.fence.write();
        }
        slot.condvar.notify_all();
    }

    /// Wakes one waiter, preferring Normal, then Sleepy, then Conditional in index order.
    pub fn notify_one(&self) {
        if *self.normal_parked.lock() > 0 {
            self.normal_condvar.notify_one();
            return;
        }
        if *self.sleepy_parked.lock() > 0 {
            self.sleepy_condvar.notify_one();
            return;
        }
        for slot in &self.conditional {
            if *slot.parked.lock() > 0 {
                slot.condvar.notify_one();
                return;
            }
        }
    }

    /// Wakes every parked waiter across all three classes.
    pub fn notify_all(&self) {
        self.normal_condvar.notify_all();
        self.sleepy_condvar.notify_all();
        for slot in &self.conditional {
            slot.condvar.notify_all();
        }
    }

    /// Idempotent. Sets the shutdown flag, fences against in-flight waits by briefly taking every
    /// exclusive lock, then wakes everyone so they can observe the flag and return.
    pub fn shut_down(&self) {
        self.shutdown.store(true, Ordering::Release);
        {
            let _fence = self.fence.write();
        }
        for slot in &self.conditional {
            let _fence = slot.fence.write();
        }
        self.notify_all();
    }

    fn clamp_index(&self, index: usize) -> usize {
        index.min(self.conditional.len() - 1)
    }
}

fn eval_predicate(predicate: &impl Fn() -> bool) -> bool {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(predicate)).unwrap_or(true)
}
