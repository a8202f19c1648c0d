//! Condition variable (spec §3 "Condvar", §4.6). Always used paired with an
//! externally supplied [`Mutex`](super::mutex::Mutex); mesa semantics (spec
//! §4.3, §5, GLOSSARY) mean every waiter must retest its predicate in a
//! loop after `wait` returns — this module cannot enforce that, it only
//! guarantees the wake/re-lock handshake.

use crate::sync::mutex::Mutex;
use crate::sync::spinlock::SpinLock;
use crate::sync::wait_queue::{self, Parkable, SleepMode, WaitQueue, WaitResult};
use crate::task::TaskId;

struct CondvarInner {
    queue: WaitQueue,
}

pub struct Condvar {
    inner: SpinLock<CondvarInner>,
}

impl Condvar {
    pub const fn new() -> Self {
        Condvar {
            inner: SpinLock::new(CondvarInner {
                queue: WaitQueue::new(),
            }),
        }
    }

    /// spec §4.6 `wait(cv, m)`: requires `m` held by the caller; unlocks it,
    /// blocks, and re-locks it before returning. Caller must retest its
    /// predicate afterward (mesa semantics).
    pub fn wait(&'static self, m: &'static Mutex) -> WaitResult {
        // Take the condvar's own spinlock first and hold it across `m`'s
        // unlock and the park below — that's what keeps a concurrent
        // `signal`/`broadcast` (which also needs this spinlock) from racing
        // between "we dropped m" and "we're actually linked into the
        // queue", i.e. no lost wakeup.
        let guard = self.inner.lock();
        m.unlock();
        let result = wait_queue::sleep(guard, |inner| &mut inner.queue, self, SleepMode::Wakeable, None);
        m.lock();
        result
    }

    /// Timed variant; on timeout `m` is still re-locked before returning.
    pub fn wait_timeout(&'static self, m: &'static Mutex, timeout_ticks: u64) -> WaitResult {
        let guard = self.inner.lock();
        m.unlock();
        let result = wait_queue::sleep(
            guard,
            |inner| &mut inner.queue,
            self,
            SleepMode::Wakeable,
            Some(timeout_ticks),
        );
        m.lock();
        result
    }

    /// spec §4.6 `signal`: wake one waiter.
    pub fn signal(&self) {
        wait_queue::wake_one(&mut self.inner.lock().queue);
    }

    /// spec §4.6 `broadcast`: wake every waiter.
    pub fn broadcast(&self) {
        wait_queue::wake_all(&mut self.inner.lock().queue);
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

impl Parkable for Condvar {
    fn cancel(&self, task: TaskId) -> bool {
        self.inner.lock().queue.remove(task)
    }
}
