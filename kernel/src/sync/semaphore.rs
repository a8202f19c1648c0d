//! Counted sleeping primitive (spec §3 "Semaphore", §4.7).

use crate::sync::spinlock::SpinLock;
use crate::sync::wait_queue::{self, Parkable, SleepMode, WaitQueue, WaitResult};
use crate::task::TaskId;

struct SemaphoreInner {
    count: u64,
    queue: WaitQueue,
}

pub struct Semaphore {
    inner: SpinLock<SemaphoreInner>,
}

impl Semaphore {
    pub const fn new(initial: u64) -> Self {
        Semaphore {
            inner: SpinLock::new(SemaphoreInner {
                count: initial,
                queue: WaitQueue::new(),
            }),
        }
    }

    /// spec §4.7 `try_get`: non-blocking decrement if the counter is > 0.
    pub fn try_get(&self) -> bool {
        let mut guard = self.inner.lock();
        if guard.count > 0 {
            guard.count -= 1;
            true
        } else {
            false
        }
    }

    /// spec §4.7 `get(timeout)`: decrement, or sleep until `put` raises the
    /// counter or the optional timeout (in ticks) expires.
    pub fn get(&'static self, timeout_ticks: Option<u64>) -> WaitResult {
        loop {
            let mut guard = self.inner.lock();
            if guard.count > 0 {
                guard.count -= 1;
                return WaitResult::Woken;
            }
            let result = wait_queue::sleep(
                guard,
                |inner| &mut inner.queue,
                self,
                SleepMode::Wakeable,
                timeout_ticks,
            );
            match result {
                WaitResult::Woken => {
                    // `put` handed the wakeup but did not itself decrement
                    // (see below) — loop to claim the unit ourselves,
                    // re-checking in case another waiter beat us to it.
                    continue;
                }
                WaitResult::TimedOut | WaitResult::Canceled => return result,
            }
        }
    }

    /// spec §4.7 `put`: increment, then wake one waiter. Never blocks;
    /// the counter is unbounded (limited only by the integer range).
    pub fn put(&self) {
        let mut guard = self.inner.lock();
        guard.count += 1;
        wait_queue::wake_one(&mut guard.queue);
    }

    pub fn count(&self) -> u64 {
        self.inner.lock().count
    }
}

impl Parkable for Semaphore {
    fn cancel(&self, task: TaskId) -> bool {
        self.inner.lock().queue.remove(task)
    }
}
