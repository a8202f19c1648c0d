//! Kernel-schedulable unit (spec §3 "Task"), grounded on the grounding
//! kernel's `task/task.rs` + `task/global_scheduler.rs`: tasks are arena-
//! addressed by a stable [`TaskId`] into a global [`TASK_TABLE`], never
//! referenced by raw pointer, exactly as spec §9's "raw pointer graphs"
//! redesign note requires.

use crate::arch::x86_64_impl::context::CpuContext;
use crate::memory::stack::{KernelStack, NORMAL_STACK_SIZE};
use crate::sync::spinlock::SpinLock;
use crate::sync::wait_queue::{Parkable, SleepMode};
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use atomic_enum::atomic_enum;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use spin::Once;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        TaskId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        TaskId(raw)
    }
}

/// spec §3 state machine. `NEW` is folded into construction (a task is
/// `READY` the instant `Task::new` returns) since nothing observes the
/// pre-enqueue instant.
#[atomic_enum]
#[derive(Debug, PartialEq)]
pub enum TaskState {
    Ready,
    Running,
    Sleeping,
    Suspended,
    Zombie,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default)]
    pub struct TaskFlags: u32 {
        const NEEDS_RESCHED = 1 << 0;
    }
}

pub type TaskFn = extern "C" fn() -> !;
pub type OnTaskDestroy = fn(TaskId);

pub struct Task {
    pub id: TaskId,
    pub state: AtomicTaskState,
    pub priority: u8,
    pub time_slice: AtomicU32,
    pub flags: SpinLock<TaskFlags>,

    /// Set while parked in a wait queue; cleared on wake/cancel. Backs
    /// `task_cancel` and the "at most one wait queue" invariant (spec §3).
    pub blocked_on: SpinLock<Option<(&'static dyn Parkable, SleepMode)>>,
    /// Outcome of the most recent park, read by the waiter once resumed.
    pub(crate) wait_result: SpinLock<WaitOutcome>,

    pub context: UnsafeCell<CpuContext>,
    stack: KernelStack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Woken,
    TimedOut,
    Canceled,
}

unsafe impl Send for Task {}
unsafe impl Sync for Task {}

impl Task {
    pub fn new(entry: TaskFn, priority: u8) -> Arc<Self> {
        let stack = KernelStack::new(NORMAL_STACK_SIZE);
        let context = CpuContext::new(entry, stack.top().as_u64());
        Arc::new(Task {
            id: TaskId::new(),
            state: AtomicTaskState::new(TaskState::Ready),
            priority,
            time_slice: AtomicU32::new(crate::consts::DEFAULT_TIME_SLICE),
            flags: SpinLock::new(TaskFlags::empty()),
            blocked_on: SpinLock::new(None),
            wait_result: SpinLock::new(WaitOutcome::Woken),
            context: UnsafeCell::new(context),
            stack,
        })
    }

    pub fn context_ptr(&self) -> *mut CpuContext {
        self.context.get()
    }
}

static TASK_TABLE: SpinLock<BTreeMap<TaskId, Arc<Task>>> = SpinLock::new(BTreeMap::new());
static ON_DESTROY: Once<OnTaskDestroy> = Once::new();

pub fn register_on_destroy(hook: OnTaskDestroy) {
    ON_DESTROY.call_once(|| hook);
}

/// Create and register a new task, in the READY state, not yet enqueued on
/// any run queue (spec §6 `task_create`).
pub fn task_create(entry: TaskFn, priority: u8) -> Arc<Task> {
    let task = Task::new(entry, priority);
    TASK_TABLE.lock().insert(task.id, task.clone());
    task
}

/// spec §6 `task_start`: hand a freshly created task to the scheduler so it
/// becomes a pick candidate. Split from `task_create` so a caller can
/// finish setting up a task (e.g. registering it somewhere it can be
/// looked up by id) before it can possibly run.
pub fn task_start(task: &Arc<Task>) {
    crate::sched::enqueue(task.clone());
}

pub fn lookup(id: TaskId) -> Option<Arc<Task>> {
    TASK_TABLE.lock().get(&id).cloned()
}

pub fn current_id() -> Option<TaskId> {
    crate::arch::cpu_local::get_local().current_task()
}

pub fn current() -> Option<Arc<Task>> {
    current_id().and_then(lookup)
}

/// Voluntarily give up the CPU, remaining READY (spec §6 `task_yield`).
pub fn task_yield() {
    crate::sched::yield_now();
}

/// spec §6 `task_exit`: mark ZOMBIE and never return to the caller. The
/// stack this call executes on belongs to the exiting task, so its `Arc`
/// cannot be dropped here — that would free the stack out from under the
/// very code running on it. Ownership instead passes to
/// `sched::retire`, which keeps it alive until a later reschedule has
/// switched this core off of it.
pub fn task_exit() -> ! {
    let id = current_id().expect("task_exit called with no current task");
    let task = TASK_TABLE.lock().remove(&id).expect("task_exit: task not in table");
    task.state.store(TaskState::Zombie, Ordering::Release);
    if let Some(hook) = ON_DESTROY.get() {
        hook(id);
    }
    crate::sched::retire(task)
}

/// Wake a SUSPENDED/explicitly-parked task directly (spec §6 `task_wakeup`);
/// distinct from `wait_queue::wake_one`, which wakes the head of a specific
/// queue. Has no effect on a task that isn't actually blocked. Like
/// `task_cancel`, this must physically remove the task from whatever
/// `WaitQueue` it is parked in before waking it (spec §3: every task on a
/// queue is SLEEPING with its blocked-on pointer equal to that queue) —
/// otherwise the stale entry is later handed ownership (mutex pass-the-baton)
/// or counted (`wake_one`) as if it were still there.
pub fn task_wakeup(id: TaskId) {
    let Some(task) = lookup(id) else { return };
    let owner = match task.blocked_on.lock().take() {
        Some((owner, _mode)) => owner,
        None => return,
    };
    if owner.cancel(id) {
        *task.wait_result.lock() = WaitOutcome::Woken;
        crate::sched::wake(id, WaitOutcome::Woken);
    }
}

/// spec §5 Cancellation / §6 `task_cancel`: remove a WAKEABLE sleeper from
/// whatever it is parked on and resume it with a canceled result.
/// UNWAKEABLE sleepers are left alone.
pub fn task_cancel(id: TaskId) {
    let Some(task) = lookup(id) else { return };
    let owner = {
        let mut slot = task.blocked_on.lock();
        match *slot {
            Some((_, SleepMode::Unwakeable)) => return,
            Some((owner, SleepMode::Wakeable)) => {
                *slot = None;
                owner
            }
            None => return,
        }
    };
    if owner.cancel(id) {
        *task.wait_result.lock() = WaitOutcome::Canceled;
        crate::sched::wake(id, WaitOutcome::Canceled);
    }
}
