//! Busy-wait mutual exclusion with IRQ-disable discipline (spec §4.2).
//!
//! Shaped like the `spin` crate's `Mutex` (the grounding kernel's usual
//! choice for short critical sections, see `gdt.rs`/`memory/cpu_local_data.rs`)
//! but hand-rolled: a real spinlock here must raise the owning core's
//! IRQ-save counter before spinning and record the owner CPU, so that
//! holding the same lock twice on one core is a detectable programming
//! error (spec §7.1) rather than a silent deadlock.

use crate::arch::{self, IrqToken};
use core::cell::UnsafeCell;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

const NO_OWNER: u32 = u32::MAX;

pub struct SpinLock<T: ?Sized> {
    locked: AtomicBool,
    owner: AtomicU32,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

pub struct SpinLockGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
    irq_token: Option<IrqToken>,
}

impl<T> SpinLock<T> {
    pub const fn new(data: T) -> Self {
        SpinLock {
            locked: AtomicBool::new(false),
            owner: AtomicU32::new(NO_OWNER),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Acquire: raise the IRQ-save counter, then busy-wait on the lock word
    /// (spec §4.2). Panics if this core already holds the lock.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let irq_token = arch::irq_save();
        let me = arch::cpu_id();
        if self.owner.load(Ordering::Relaxed) == me {
            panic!("spinlock self-deadlock: core {me} already holds this lock");
        }
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        self.owner.store(me, Ordering::Relaxed);
        SpinLockGuard {
            lock: self,
            irq_token: Some(irq_token),
        }
    }

    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        let irq_token = arch::irq_save();
        let me = arch::cpu_id();
        if self.owner.load(Ordering::Relaxed) == me {
            panic!("spinlock self-deadlock: core {me} already holds this lock");
        }
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.owner.store(me, Ordering::Relaxed);
            Some(SpinLockGuard {
                lock: self,
                irq_token: Some(irq_token),
            })
        } else {
            arch::irq_restore(irq_token);
            None
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl<'a, T: ?Sized> SpinLockGuard<'a, T> {
    /// Release the lock word but keep the IRQ-save counter raised, handing
    /// the matching [`IrqToken`] to the caller instead of restoring it.
    /// Used by `sync::wait_queue::sleep` to implement "release atomically
    /// with parking" (spec §4.3/§4.4): the token is only restored once this
    /// task is actually off the CPU.
    pub(crate) fn unlock_for_park(self) -> IrqToken {
        let mut this = ManuallyDrop::new(self);
        this.lock.owner.store(NO_OWNER, Ordering::Relaxed);
        this.lock.locked.store(false, Ordering::Release);
        this.irq_token.take().expect("guard already unlocked")
    }
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    /// Release: clear the lock word with memory-order release, then lower
    /// the IRQ-save counter (spec §4.2) — the reverse order of acquire.
    fn drop(&mut self) {
        self.lock.owner.store(NO_OWNER, Ordering::Relaxed);
        self.lock.locked.store(false, Ordering::Release);
        if let Some(token) = self.irq_token.take() {
            arch::irq_restore(token);
        }
    }
}
