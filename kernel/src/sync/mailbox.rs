//! Fixed-capacity message queue with blocking send/receive (spec §3
//! "Mailbox", §4.8). Messages are copied by value, the caller supplies
//! storage — in Rust terms, `T: Copy` and the ring buffer owns its own
//! `T`s rather than pointers into caller buffers.

use crate::consts::DEFAULT_MAILBOX_CAPACITY;
use crate::sync::spinlock::SpinLock;
use crate::sync::wait_queue::{self, Parkable, SleepMode, WaitQueue, WaitResult};
use crate::task::TaskId;
use alloc::collections::VecDeque;

struct MailboxInner<T> {
    ring: VecDeque<T>,
    capacity: usize,
    senders: WaitQueue,
    receivers: WaitQueue,
}

/// Invariant (spec §3): `senders` non-empty ⇒ `ring` is full; `receivers`
/// non-empty ⇒ `ring` is empty. Both are consequences of always retrying
/// the condition under the same spinlock before parking, never asserted
/// directly.
pub struct Mailbox<T: Copy + 'static> {
    inner: SpinLock<MailboxInner<T>>,
}

impl<T: Copy + 'static> Mailbox<T> {
    pub fn new(capacity: usize) -> Self {
        Mailbox {
            inner: SpinLock::new(MailboxInner {
                ring: VecDeque::with_capacity(capacity),
                capacity,
                senders: WaitQueue::new(),
                receivers: WaitQueue::new(),
            }),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }

    /// spec §4.8 `send`: if full, sleep on the senders queue (subject to
    /// `mode`); otherwise push and wake one receiver. Callers wanting the
    /// non-blocking WOULD_BLOCK surface (spec §7.4) instead of sleeping on
    /// a full box should use [`Mailbox::try_send`].
    pub fn send(&'static self, msg: T, timeout_ticks: Option<u64>, mode: SleepMode) -> WaitResult {
        loop {
            let mut guard = self.inner.lock();
            if guard.ring.len() < guard.capacity {
                guard.ring.push_back(msg);
                wait_queue::wake_one(&mut guard.receivers);
                return WaitResult::Woken;
            }
            let result = wait_queue::sleep(
                guard,
                |inner| &mut inner.senders,
                self,
                mode,
                timeout_ticks,
            );
            match result {
                WaitResult::Woken => continue,
                other => return other,
            }
        }
    }

    /// Non-blocking send (spec §7.4 WOULD_BLOCK surface). `true` iff the
    /// message was queued.
    pub fn try_send(&self, msg: T) -> bool {
        let mut guard = self.inner.lock();
        if guard.ring.len() < guard.capacity {
            guard.ring.push_back(msg);
            wait_queue::wake_one(&mut guard.receivers);
            true
        } else {
            false
        }
    }

    /// spec §4.8 `receive`: symmetric to `send`.
    pub fn receive(&'static self, timeout_ticks: Option<u64>, mode: SleepMode) -> Result<T, WaitResult> {
        loop {
            let mut guard = self.inner.lock();
            if let Some(msg) = guard.ring.pop_front() {
                wait_queue::wake_one(&mut guard.senders);
                return Ok(msg);
            }
            let result = wait_queue::sleep(
                guard,
                |inner| &mut inner.receivers,
                self,
                mode,
                timeout_ticks,
            );
            match result {
                WaitResult::Woken => continue,
                other => return Err(other),
            }
        }
    }

    pub fn try_receive(&self) -> Option<T> {
        let mut guard = self.inner.lock();
        let msg = guard.ring.pop_front();
        if msg.is_some() {
            wait_queue::wake_one(&mut guard.senders);
        }
        msg
    }
}

/// A task can be on at most one of the two queues at a time (spec §3's "at
/// most one wait queue" invariant), so `cancel` just checks both.
impl<T: Copy + 'static> Parkable for Mailbox<T> {
    fn cancel(&self, task: TaskId) -> bool {
        let mut guard = self.inner.lock();
        guard.senders.remove(task) || guard.receivers.remove(task)
    }
}
