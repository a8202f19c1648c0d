//! Preemptive scheduler (spec §4.3): one set of per-priority ready FIFOs
//! shared by every core under a single scheduler spinlock (spec §5:
//! "parallel threads across all cores ... shares global ready queues"),
//! consulted on every timer tick and voluntary reschedule. Grounded on the
//! grounding kernel's `task/local_scheduler.rs::schedule_from_interrupt` for
//! the requeue-outgoing/pick-incoming bookkeeping, generalized from that
//! module's per-CPU run queue to the specification's single shared one and
//! from round-robin to priority FIFOs.
//!
//! The specification models blocking as a cooperative switch into a
//! per-CPU "scheduler context"; this kernel's context-switch primitive is
//! instead the asynchronous full-GPR save/restore used for timer-driven
//! preemption (see `arch::x86_64_impl::context`), so a voluntary switch is
//! expressed as a second, software-triggered entry into that same
//! mechanism (`InterruptVector::Reschedule`) rather than a distinct
//! stack-switch routine. Its counterpart to the spec's "scheduler idles on
//! its own stack when nothing is ready" is a real, lowest-priority idle
//! task per core, always present in the ready set, so the ready queue is
//! never observed empty past boot and the interrupt trampolines never have
//! to special-case a null next-context.

use crate::arch::cpu_local::CpuLocalData;
use crate::arch::x86_64_impl::context::CpuContext;
use crate::arch::{self, IrqToken};
use crate::consts::{DEFAULT_TIME_SLICE, PRIORITY_LEVELS};
use crate::sync::spinlock::SpinLock;
use crate::sync::wait_queue::SleepMode;
use crate::task::{self, Task, TaskFlags, TaskId, TaskState, WaitOutcome};
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec;
use core::sync::atomic::Ordering;
use spin::Once;

const IDLE_PRIORITY: u8 = 0;

struct ReadyQueues {
    levels: alloc::vec::Vec<VecDeque<Arc<Task>>>,
}

impl ReadyQueues {
    fn push(&mut self, task: Arc<Task>) {
        let p = (task.priority as usize).min(PRIORITY_LEVELS - 1);
        self.levels[p].push_back(task);
    }

    /// Highest non-empty priority first (spec §4.3 "picks the highest
    /// non-empty priority and dequeues head").
    fn pop_highest(&mut self) -> Option<Arc<Task>> {
        self.levels.iter_mut().rev().find_map(|q| q.pop_front())
    }

    /// Used by cancellation: a task parked in the ready set directly (not
    /// via a wait queue) can still be pulled back out. Not currently
    /// reachable since READY tasks are never also `blocked_on`-tagged, kept
    /// for symmetry with `WaitQueue::remove`.
    #[allow(dead_code)]
    fn remove(&mut self, id: TaskId) -> bool {
        for q in &mut self.levels {
            if let Some(pos) = q.iter().position(|t| t.id == id) {
                q.remove(pos);
                return true;
            }
        }
        false
    }
}

static READY: Once<SpinLock<ReadyQueues>> = Once::new();

fn ready() -> &'static SpinLock<ReadyQueues> {
    READY.get().expect("sched::init not called")
}

/// A task tagged with the core that last ran it, pending release. A task
/// can only ever be freed by the core that switched off of it (see
/// `reap_zombies`), so entries from different cores never contend on the
/// same identity.
struct Zombie {
    cpu: u32,
    task: Arc<Task>,
}

static ZOMBIES: SpinLock<VecDeque<Zombie>> = SpinLock::new(VecDeque::new());

/// spec §6 `task_exit`: hand off an exiting task's `Arc` — and therefore the
/// stack this call is still executing on — instead of dropping it here.
/// Never returns: control passes into the same software-reschedule path
/// `yield_now` uses, landing on some other task's stack, at which point this
/// one is safe to free (see `reap_zombies`).
pub fn retire(task: Arc<Task>) -> ! {
    ZOMBIES.lock().push_back(Zombie {
        cpu: arch::cpu_id(),
        task,
    });
    trigger_reschedule();
    unreachable!("retired task resumed")
}

/// Free this core's own previously-retired tasks, skipping `in_flight` (the
/// task this very `pick_next` call is switching off of, if any). A core
/// never reaps another core's entries, and never reaps one it just added —
/// by the time this runs again on the same core, the earlier switch has
/// completed and nothing is executing on that stack anymore.
fn reap_zombies(this_cpu: u32, in_flight: Option<TaskId>) {
    let mut q = ZOMBIES.lock();
    let mut i = 0;
    while i < q.len() {
        let free_now = q[i].cpu == this_cpu && Some(q[i].task.id) != in_flight;
        if free_now {
            q.remove(i); // Arc dropped here: frees the Task and its stack.
        } else {
            i += 1;
        }
    }
}

extern "C" fn idle_loop() -> ! {
    loop {
        arch::idle();
    }
}

/// spec §6 `core_init`: allocate the ready queues and spawn one
/// lowest-priority idle task per core.
pub fn init() {
    READY.call_once(|| {
        SpinLock::new(ReadyQueues {
            levels: vec![VecDeque::new(); PRIORITY_LEVELS],
        })
    });
    for _ in 0..crate::arch::cpu_local::cpus_count() {
        let idle = task::task_create(idle_loop, IDLE_PRIORITY);
        ready().lock().push(idle);
    }
}

/// Backs `task::task_start` — the task is already READY (set by
/// `Task::new`), this just makes it visible to `pick_next`.
pub fn enqueue(task: Arc<Task>) {
    ready().lock().push(task);
}

/// spec §6 `core_init_percpu`: launch the first task on this core and never
/// return. Must run with interrupts still disabled; the restored context's
/// `rflags` re-enables them.
pub fn start(cpu: &'static CpuLocalData) -> ! {
    let task = ready()
        .lock()
        .pop_highest()
        .expect("no task ready to launch this core");
    task.state.store(TaskState::Running, Ordering::Release);
    let ctx = task.context_ptr();
    cpu.set_current(Some(task.id), ctx);
    unsafe { crate::arch::x86_64_impl::context::load_context_and_iretq(ctx) }
}

/// Requeue the outgoing task (if it is still runnable) and pick the next
/// one. Called only from the naked timer and reschedule trampolines, which
/// have already saved the outgoing context; never panics or blocks.
fn pick_next(cpu: &CpuLocalData) -> *mut CpuContext {
    let outgoing = cpu.current_task();
    reap_zombies(arch::cpu_id(), outgoing);
    let current = outgoing.and_then(task::lookup);

    let mut rq = ready().lock();
    if let Some(cur) = &current {
        cur.flags.lock().remove(TaskFlags::NEEDS_RESCHED);
        if matches!(
            cur.state.load(Ordering::Acquire),
            TaskState::Running | TaskState::Ready
        ) {
            cur.time_slice.store(DEFAULT_TIME_SLICE, Ordering::Relaxed);
            cur.state.store(TaskState::Ready, Ordering::Release);
            rq.push(cur.clone());
        }
    }

    if let Some(next) = rq.pop_highest() {
        drop(rq);
        next.state.store(TaskState::Running, Ordering::Release);
        let ctx = next.context_ptr();
        cpu.set_current(Some(next.id), ctx);
        return ctx;
    }
    drop(rq);

    // No task ready at all — only possible before the idle tasks exist
    // (early boot, still running on the boot stack). Resume wherever this
    // interrupt came from.
    core::ptr::null_mut()
}

/// Called from the naked timer-interrupt handler (spec §4.3/§4.9): only
/// actually reschedules when the tick subsystem (or a prior wake/yield)
/// flagged `NEEDS_RESCHED`, so a task keeps running uninterrupted across
/// ticks that don't exhaust its slice.
pub fn schedule_from_interrupt(cpu: &CpuLocalData) -> *mut CpuContext {
    let needs_resched = cpu
        .current_task()
        .and_then(task::lookup)
        .map_or(true, |t| t.flags.lock().contains(TaskFlags::NEEDS_RESCHED));

    if !needs_resched {
        return cpu.current_context();
    }
    pick_next(cpu)
}

/// Called from the naked software-reschedule handler. Always switches: the
/// caller (`yield_now`/`block_current`) only raises this vector when it
/// actually wants off the CPU.
pub extern "C" fn reschedule_entry() -> *mut CpuContext {
    pick_next(crate::arch::cpu_local::get_local())
}

fn trigger_reschedule() {
    use crate::arch::x86_64_impl::idt::InterruptVector;
    unsafe {
        core::arch::asm!(
            "int {vec}",
            vec = const u8::from(InterruptVector::Reschedule),
        );
    }
}

/// spec §6 `task_yield`: remain READY, give up the CPU immediately rather
/// than waiting for the next tick.
pub fn yield_now() {
    if let Some(task) = task::current() {
        task.flags.lock().insert(TaskFlags::NEEDS_RESCHED);
    }
    trigger_reschedule();
}

/// Drop off the CPU without re-entering the ready queue (the caller has
/// already linked its task into a wait queue and set it SLEEPING). `token`
/// is the one handed back by `SpinLockGuard::unlock_for_park`; restoring it
/// here — right before the software interrupt that actually takes this
/// task off the CPU — is what makes "release the lock atomically with
/// parking" hold (spec §4.3/§4.4): interrupts come back on only once this
/// task can no longer be a reschedule target.
pub fn block_current(token: IrqToken, _mode: SleepMode) {
    arch::irq_restore(token);
    trigger_reschedule();
}

/// Move a sleeping task back onto the ready queue with an outcome recorded
/// for it to observe once resumed (spec §4.4 `wake_one`, §6 `task_wakeup`).
/// A no-op if the task is not actually SLEEPING (already woken, or this is
/// a stale id). Sends an IPI to whichever core is running the
/// lowest-priority task, iff that priority is below the woken task's (spec
/// §4.4, §5's "IPIs are the only mechanism to force another core to
/// re-examine its ready queue").
pub fn wake(id: TaskId, outcome: WaitOutcome) {
    let Some(task) = task::lookup(id) else { return };
    if task.state.load(Ordering::Acquire) != TaskState::Sleeping {
        return;
    }
    *task.wait_result.lock() = outcome;
    task.state.store(TaskState::Ready, Ordering::Release);
    let priority = task.priority;
    ready().lock().push(task);

    maybe_ipi_wake(priority);
}

fn maybe_ipi_wake(woken_priority: u8) {
    let me = arch::cpu_id();
    let n = crate::arch::cpu_local::cpus_count() as u32;
    let mut target: Option<(u32, Arc<Task>)> = None;
    for cpu_id in 0..n {
        if cpu_id == me {
            continue;
        }
        let Some(remote) = crate::arch::cpu_local::get(cpu_id) else {
            continue;
        };
        let Some(remote_task) = remote.current_task().and_then(task::lookup) else {
            continue;
        };
        if remote_task.priority < woken_priority
            && target.as_ref().map_or(true, |(_, t)| remote_task.priority < t.priority)
        {
            target = Some((cpu_id, remote_task));
        }
    }
    if let Some((cpu_id, remote_task)) = target {
        // The timer tick on that core only reschedules if it observes
        // `NEEDS_RESCHED`; set it before the IPI lands so the tick that
        // fires the vector actually picks up the newly-woken task.
        remote_task.flags.lock().insert(TaskFlags::NEEDS_RESCHED);
        arch::ipi(cpu_id);
    }
}
