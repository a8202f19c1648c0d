//! FIFO of parked tasks (spec §3 "Wait queue", §4.4). A `WaitQueue` is bare
//! data — it is always reached through whichever spinlock the embedding
//! primitive (mutex, condvar, semaphore, mailbox) already holds, per spec
//! §3: "mutated only under a caller-supplied spinlock... or an internal
//! spinlock." There is no single grounding file for this in the teacher
//! kernel (it keeps wait/wake ad hoc per subsystem, e.g. `ipc::Channel`'s
//! `recv_waiter`/`send_waiter`); this generalizes that shape into one
//! reusable primitive.

use crate::arch::IrqToken;
use crate::sched;
use crate::sync::spinlock::SpinLockGuard;
use crate::task::{self, TaskId, TaskState};
use alloc::collections::VecDeque;
use core::sync::atomic::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepMode {
    /// May be removed early by `task_cancel` (spec §5 Cancellation).
    Wakeable,
    /// Ignores `task_cancel`; only for kernel-internal atomic steps (spec §9).
    Unwakeable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Woken,
    TimedOut,
    Canceled,
}

/// Implemented by every primitive that can have a task parked on it, so
/// `task_cancel` can reach into an arbitrary wait queue without knowing its
/// concrete type (spec §3 "blocked-on back-pointer").
pub trait Parkable: Sync {
    /// Remove `task` from this object's wait queue if it is still there.
    /// Returns `true` if it was removed (and therefore needs waking with a
    /// canceled result) — `false` if it had already been woken by someone
    /// else in the interim.
    fn cancel(&self, task: TaskId) -> bool;
}

#[derive(Debug, Default)]
pub struct WaitQueue {
    tasks: VecDeque<TaskId>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        WaitQueue {
            tasks: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    fn push_back(&mut self, id: TaskId) {
        self.tasks.push_back(id);
    }

    pub fn peek_front(&self) -> Option<TaskId> {
        self.tasks.front().copied()
    }

    fn pop_front(&mut self) -> Option<TaskId> {
        self.tasks.pop_front()
    }

    /// Remove a specific task (used by `cancel`). `true` if it was present.
    pub fn remove(&mut self, id: TaskId) -> bool {
        if let Some(pos) = self.tasks.iter().position(|&t| t == id) {
            self.tasks.remove(pos);
            true
        } else {
            false
        }
    }
}

/// Park the current task on the wait queue reached by `project` inside
/// `guard`'s data, releasing `guard` atomically with the switch away (spec
/// §4.4 `sleep(wq, lock)`). `project` is a field accessor rather than a
/// plain `&mut WaitQueue` because the queue and the lock protecting it
/// always live in the same guarded structure (mutex, condvar, semaphore,
/// mailbox) — taking a separate `&mut` to the field would alias the `guard`
/// value this function also needs to consume. Returns once woken, timed
/// out, or canceled; the caller's lock is *not* re-acquired here — spec
/// requires "returns with `lock` re-acquired", so callers re-lock
/// immediately after this returns, same as any other `lock()` call.
pub fn sleep<T>(
    mut guard: SpinLockGuard<'_, T>,
    project: impl FnOnce(&mut T) -> &mut WaitQueue,
    owner: &'static dyn Parkable,
    mode: SleepMode,
    timeout_ticks: Option<u64>,
) -> WaitResult {
    let me = task::current_id().expect("sleep() called with no current task");
    project(&mut guard).push_back(me);
    {
        let task = task::lookup(me).unwrap();
        *task.blocked_on.lock() = Some((owner, mode));
        task.state.store(TaskState::Sleeping, Ordering::Release);
    }
    let timer = timeout_ticks.map(|ticks| crate::time::arm_wait_timeout(me, ticks));

    let token: IrqToken = guard.unlock_for_park();
    sched::block_current(token, mode);

    if let Some(timer) = timer {
        crate::time::cancel_wait_timeout(timer);
    }

    let task = task::lookup(me).unwrap();
    *task.blocked_on.lock() = None;
    match *task.wait_result.lock() {
        task::WaitOutcome::Woken => WaitResult::Woken,
        task::WaitOutcome::TimedOut => WaitResult::TimedOut,
        task::WaitOutcome::Canceled => WaitResult::Canceled,
    }
}

/// Move the head task to its core's ready queue (spec §4.4 `wake_one`).
/// Requires the associated lock held by the caller. Returns whether a task
/// was actually woken.
pub fn wake_one(queue: &mut WaitQueue) -> bool {
    if let Some(id) = queue.pop_front() {
        sched::wake(id, task::WaitOutcome::Woken);
        true
    } else {
        false
    }
}

/// Move every task to the ready queue (spec §4.4 `wake_all`).
pub fn wake_all(queue: &mut WaitQueue) -> usize {
    let mut n = 0;
    while wake_one(queue) {
        n += 1;
    }
    n
}
