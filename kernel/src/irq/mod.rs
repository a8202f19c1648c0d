//! Hardware IRQ demultiplexing (spec §4.10), attaching device handlers onto
//! the vectors the HAL raises through [`crate::arch::interrupt_id`]. Direct
//! attach is grounded on `brianmayclone-anyos`'s `arch/x86/irq.rs` — a flat
//! `AtomicPtr` table indexed by IRQ number, lock-free from interrupt
//! context; thread-attach has no counterpart there and is built fresh on
//! top of [`Semaphore`], the way the rest of this kernel's deferred-work
//! paths (the timer thread in [`crate::time`]) are built.

use crate::consts::DEFAULT_PRIORITY;
use crate::sync::semaphore::Semaphore;
use crate::task::{self, TaskFn};
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

/// ISA IRQ lines 0-15; this kernel never routes anything past the legacy
/// range (spec's broader device surface is out of scope).
const MAX_IRQS: usize = 16;

pub type IrqHandler = fn(irq: u32, arg: usize);

struct DirectSlot {
    handler: AtomicPtr<()>,
    arg: AtomicUsize,
}

const NULL_DIRECT: DirectSlot = DirectSlot {
    handler: AtomicPtr::new(core::ptr::null_mut()),
    arg: AtomicUsize::new(0),
};

static DIRECT: [DirectSlot; MAX_IRQS] = [NULL_DIRECT; MAX_IRQS];

struct ThreadSlot {
    handler: AtomicPtr<()>,
    arg: AtomicUsize,
    wakeup: Semaphore,
}

const NULL_THREAD: ThreadSlot = ThreadSlot {
    handler: AtomicPtr::new(core::ptr::null_mut()),
    arg: AtomicUsize::new(0),
    wakeup: Semaphore::new(0),
};

static THREAD: [ThreadSlot; MAX_IRQS] = [NULL_THREAD; MAX_IRQS];

/// spec §6 `irq_attach`: register a handler invoked directly from IRQ
/// context on the epilogue of `num`'s interrupt. Must be fast and must
/// never take a sleeping lock (spec §5 "IRQ handlers may take spinlocks
/// but never sleeping locks").
pub fn irq_attach(num: u32, handler: IrqHandler, arg: usize) {
    let slot = &DIRECT[num as usize];
    slot.arg.store(arg, Ordering::Relaxed);
    slot.handler.store(handler as *mut (), Ordering::Release);
    crate::arch::interrupt_unmask(num);
}

/// spec §6 `irq_attach_thread`: register a handler that runs in a
/// dedicated kernel thread instead of IRQ context. The IRQ epilogue masks
/// the line, posts to the handler thread's semaphore and returns; the
/// thread loops acquiring the semaphore, running the handler, then
/// unmasking.
pub fn irq_attach_thread(num: u32, handler: IrqHandler, arg: usize) {
    let slot = &THREAD[num as usize];
    slot.arg.store(arg, Ordering::Relaxed);
    slot.handler.store(handler as *mut (), Ordering::Release);
    let thread = task::task_create(thread_entries(num), DEFAULT_PRIORITY);
    task::task_start(&thread);
    crate::arch::interrupt_unmask(num);
}

/// Picks the task entry point generated for IRQ line `num` — task entries
/// carry no closure environment (`extern "C" fn() -> !`), so the line
/// number is recovered from a fixed one-entry-per-line dispatch table
/// instead of being captured.
fn thread_entries(num: u32) -> TaskFn {
    IRQ_THREAD_ENTRIES[num as usize]
}

macro_rules! thread_entry {
    ($name:ident, $num:expr) => {
        extern "C" fn $name() -> ! {
            handler_thread_loop($num)
        }
    };
}

thread_entry!(thread_entry_00, 0);
thread_entry!(thread_entry_01, 1);
thread_entry!(thread_entry_02, 2);
thread_entry!(thread_entry_03, 3);
thread_entry!(thread_entry_04, 4);
thread_entry!(thread_entry_05, 5);
thread_entry!(thread_entry_06, 6);
thread_entry!(thread_entry_07, 7);
thread_entry!(thread_entry_08, 8);
thread_entry!(thread_entry_09, 9);
thread_entry!(thread_entry_10, 10);
thread_entry!(thread_entry_11, 11);
thread_entry!(thread_entry_12, 12);
thread_entry!(thread_entry_13, 13);
thread_entry!(thread_entry_14, 14);
thread_entry!(thread_entry_15, 15);

static IRQ_THREAD_ENTRIES: [TaskFn; 16] = [
    thread_entry_00, thread_entry_01, thread_entry_02, thread_entry_03,
    thread_entry_04, thread_entry_05, thread_entry_06, thread_entry_07,
    thread_entry_08, thread_entry_09, thread_entry_10, thread_entry_11,
    thread_entry_12, thread_entry_13, thread_entry_14, thread_entry_15,
];

fn handler_thread_loop(num: u32) -> ! {
    let slot = &THREAD[num as usize];
    loop {
        slot.wakeup.get(None);
        let handler = slot.handler.load(Ordering::Acquire);
        if !handler.is_null() {
            let func: IrqHandler = unsafe { core::mem::transmute(handler) };
            func(num, slot.arg.load(Ordering::Relaxed));
        }
        crate::arch::interrupt_unmask(num);
    }
}

/// Called from the keyboard/ISA IRQ epilogue (the only routed ISA line in
/// this kernel — spec's driver surface is out of scope, but the dispatch
/// mechanism it would hang off of is not). Runs the direct handler if one
/// is attached, else masks and hands off to the thread handler if one is.
pub fn dispatch(num: u32) {
    let direct = &DIRECT[num as usize];
    let handler = direct.handler.load(Ordering::Acquire);
    if !handler.is_null() {
        let func: IrqHandler = unsafe { core::mem::transmute(handler) };
        func(num, direct.arg.load(Ordering::Relaxed));
        return;
    }

    let thread = &THREAD[num as usize];
    if !thread.handler.load(Ordering::Acquire).is_null() {
        crate::arch::interrupt_mask(num);
        thread.wakeup.put();
    }
}
