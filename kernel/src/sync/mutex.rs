//! Sleeping lock with single-owner tracking (spec §3 "Mutex", §4.5). The
//! single owner field is what the specification calls out as implying
//! priority inheritance without actually doing it — this kernel follows
//! its explicit fallback (spec §9 Open Question): no inheritance, FIFO
//! acquisition order instead, to bound unfairness.

use crate::sync::spinlock::SpinLock;
use crate::sync::wait_queue::{self, Parkable, SleepMode, WaitQueue, WaitResult};
use crate::task::{self, TaskId};

struct MutexInner {
    owner: Option<TaskId>,
    queue: WaitQueue,
}

/// A sleeping mutual-exclusion lock. No recursive acquisition (spec §3:
/// "No recursive acquisition").
pub struct Mutex {
    name: &'static str,
    inner: SpinLock<MutexInner>,
}

impl Mutex {
    pub const fn new(name: &'static str) -> Self {
        Mutex {
            name,
            inner: SpinLock::new(MutexInner {
                owner: None,
                queue: WaitQueue::new(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// spec §4.5 `lock`: under the mutex spinlock, if free, take it; else
    /// enqueue and sleep. Returns once this task owns the mutex.
    ///
    /// Takes `&'static self` because a blocked task keeps a
    /// `&'static dyn Parkable` back-pointer to whatever it is parked on
    /// (spec §3 "blocked-on back-pointer") — every sync primitive this
    /// kernel uses is declared as a `static`, never allocated per-call.
    pub fn lock(&'static self) {
        loop {
            let mut guard = self.inner.lock();
            if guard.owner.is_none() {
                guard.owner = Some(task::current_id().expect("mutex lock with no current task"));
                return;
            }
            let result = wait_queue::sleep(guard, |inner| &mut inner.queue, self, SleepMode::Wakeable, None);
            // Pass-the-baton already assigned ownership before waking us
            // (see `unlock`); a `Canceled` result means we were pulled back
            // out before that happened, so loop and contend again.
            if result == WaitResult::Woken {
                return;
            }
        }
    }

    /// Non-blocking acquisition. `true` iff the mutex was free and is now
    /// held by the caller.
    pub fn try_lock(&self) -> bool {
        let mut guard = self.inner.lock();
        if guard.owner.is_none() {
            guard.owner = Some(task::current_id().expect("mutex try_lock with no current task"));
            true
        } else {
            false
        }
    }

    /// spec §4.5 `unlock`: requires the caller to be the owner. Pass the
    /// baton to the head waiter *before* waking it, preserving FIFO
    /// fairness and avoiding a thundering-herd re-contend.
    pub fn unlock(&self) {
        let me = task::current_id().expect("mutex unlock with no current task");
        let mut guard = self.inner.lock();
        if guard.owner != Some(me) {
            panic!("mutex '{}' unlocked by non-owner", self.name);
        }
        match guard.queue.peek_front() {
            Some(next) => {
                guard.owner = Some(next);
                wait_queue::wake_one(&mut guard.queue);
            }
            None => guard.owner = None,
        }
    }

    /// Read-only owner check (spec §4.5 `holding`).
    pub fn holding(&self) -> Option<TaskId> {
        self.inner.lock().owner
    }
}

impl Parkable for Mutex {
    fn cancel(&self, task: TaskId) -> bool {
        let mut guard = self.inner.lock();
        guard.queue.remove(task)
    }
}
