//! Tick & timer wheel (spec §3 "Timer"/"Tick state", §4.9), grounded on the
//! grounding kernel's `time/lapic_timer.rs` + `time/pit.rs` for the
//! hardware side; the tick/timer bookkeeping itself has no direct
//! grounding kernel counterpart (that kernel only drives the scheduler off
//! the tick, with no software timer abstraction), so it is built fresh in
//! the same idiom — `SpinLock`-guarded state, `atomic_enum` state machines,
//! `log`-based diagnostics.

pub mod lapic_timer;
pub mod pit;

use crate::arch::cpu_local::get_local;
use crate::consts::DEFAULT_TIME_SLICE;
use crate::sync::semaphore::Semaphore;
use crate::sync::spinlock::SpinLock;
use crate::task::{self, TaskFlags, TaskId};
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use atomic_enum::atomic_enum;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Once;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// spec §6 `tick_get`: 64-bit monotonic tick counter.
pub fn tick_get() -> u64 {
    TICKS.load(Ordering::Acquire)
}

#[atomic_enum]
#[derive(PartialEq)]
pub enum TimerState {
    /// Never started, or stopped and not yet restarted.
    Inactive,
    /// Linked into the active list, counting down.
    Active,
    /// Callback has fired and is queued for (or executing on) the timer
    /// thread; a concurrent `stop` must observe this rather than `Active`.
    Running,
}

pub type TimerCallback = fn(usize);

struct TimerBody {
    period: u64,
    remaining: u64,
}

/// spec §3 "Timer": delay/period in ticks, a state machine, and a callback
/// with an opaque argument. `create` folds directly to INACTIVE (spec's
/// NONE is the pre-existence state, nothing observes it, same elision as
/// `TaskState::New` in `task::Task::new`).
pub struct Timer {
    state: AtomicTimerState,
    body: SpinLock<TimerBody>,
    callback: TimerCallback,
    arg: usize,
    /// Bumped by `stop` so a `Running` timer that gets restarted mid-flight
    /// is not confused with the just-stopped one by a caller still waiting
    /// on the old "was running" handshake.
    generation: AtomicU64,
}

impl Timer {
    pub fn create(callback: TimerCallback, arg: usize) -> Arc<Self> {
        Arc::new(Timer {
            state: AtomicTimerState::new(TimerState::Inactive),
            body: SpinLock::new(TimerBody {
                period: 0,
                remaining: 0,
            }),
            callback,
            arg,
            generation: AtomicU64::new(0),
        })
    }

    /// spec §4.9 timer state machine `start`: INACTIVE/stopped → ACTIVE,
    /// linked into the wheel. `period_ticks` of 0 means one-shot.
    pub fn start(self: &Arc<Self>, delay_ticks: u64, period_ticks: u64) {
        {
            let mut body = self.body.lock();
            body.remaining = delay_ticks;
            body.period = period_ticks;
        }
        self.state.store(TimerState::Active, Ordering::Release);
        active_list().lock().push(self.clone());
    }

    /// spec §4.9 `stop`: ACTIVE → INACTIVE. If a `stop` races with an
    /// expiring timer it observes RUNNING and waits for the callback to
    /// finish (spec §9 Open Question resolution) rather than racing with
    /// it; returns `true` iff the timer was live (ACTIVE or RUNNING) when
    /// called.
    pub fn stop(self: &Arc<Self>) -> bool {
        let generation_at_call = self.generation.load(Ordering::Acquire);
        loop {
            match self.state.load(Ordering::Acquire) {
                TimerState::Inactive => return false,
                TimerState::Active => {
                    self.state.store(TimerState::Inactive, Ordering::Release);
                    active_list().lock().remove(self);
                    return true;
                }
                TimerState::Running => {
                    if self.generation.load(Ordering::Acquire) != generation_at_call {
                        // Already restarted by its own periodic reschedule
                        // or by another caller since we last checked.
                        return true;
                    }
                    task::task_yield();
                }
            }
        }
    }
}

struct ActiveList {
    timers: Vec<Arc<Timer>>,
}

impl ActiveList {
    fn push(&mut self, timer: Arc<Timer>) {
        self.timers.push(timer);
    }

    fn remove(&mut self, timer: &Arc<Timer>) {
        self.timers.retain(|t| !Arc::ptr_eq(t, timer));
    }
}

static ACTIVE: Once<SpinLock<ActiveList>> = Once::new();

fn active_list() -> &'static SpinLock<ActiveList> {
    ACTIVE.get().expect("time::init not called")
}

/// Pending callbacks, drained by the dedicated timer thread (spec §4.9:
/// "timer callbacks run in a dedicated kernel thread... serialized").
static PENDING: SpinLock<VecDeque<Arc<Timer>>> = SpinLock::new(VecDeque::new());
static PENDING_SIGNAL: Semaphore = Semaphore::new(0);

/// spec §6 `core_init`: allocate tick/timer state and spawn the timer
/// thread. Must run once, on the bootstrap core, before any core's tick
/// ISR fires.
pub fn init() {
    ACTIVE.call_once(|| SpinLock::new(ActiveList { timers: Vec::new() }));
    let thread = task::task_create(timer_thread, crate::consts::DEFAULT_PRIORITY);
    task::task_start(&thread);
}

extern "C" fn timer_thread() -> ! {
    loop {
        PENDING_SIGNAL.get(None);
        let next = PENDING.lock().pop_front();
        if let Some(timer) = next {
            (timer.callback)(timer.arg);
            if timer.state.load(Ordering::Acquire) == TimerState::Running {
                // A periodic timer is still linked in the active list
                // (`advance_and_expire` only unlinks one-shots) — ACTIVE,
                // not INACTIVE, is the state that matches that (spec §3
                // "ACTIVE ⇔ linked in wheel"). Leaving it INACTIVE here
                // would let a racing `stop()` believe it had nothing to
                // unlink and walk away from a timer that keeps firing.
                let still_periodic = timer.body.lock().period > 0;
                let next_state = if still_periodic {
                    TimerState::Active
                } else {
                    TimerState::Inactive
                };
                timer.state.store(next_state, Ordering::Release);
            }
        }
    }
}

/// spec §4.9: called from the per-core tick ISR on every periodic timer
/// interrupt. Step 1 always runs (current task's time slice); step 2/3
/// (global tick + timer wheel) only run on the designated core (id 0).
pub fn on_timer_tick() {
    if let Some(task) = task::current() {
        let prev = task.time_slice.fetch_sub(1, Ordering::AcqRel);
        if prev <= 1 {
            task.time_slice.store(DEFAULT_TIME_SLICE, Ordering::Relaxed);
            task.flags.lock().insert(TaskFlags::NEEDS_RESCHED);
        }
    }

    if get_local().kernel_id == 0 {
        advance_and_expire();
    }
}

fn advance_and_expire() {
    TICKS.fetch_add(1, Ordering::AcqRel);

    let mut list = active_list().lock();
    let mut i = 0;
    while i < list.timers.len() {
        let timer = list.timers[i].clone();
        let expired = {
            let mut body = timer.body.lock();
            if body.remaining == 0 {
                false
            } else {
                body.remaining -= 1;
                body.remaining == 0
            }
        };
        if expired {
            timer.generation.fetch_add(1, Ordering::AcqRel);
            timer.state.store(TimerState::Running, Ordering::Release);
            let period = timer.body.lock().period;
            if period > 0 {
                timer.body.lock().remaining = period;
                i += 1;
            } else {
                list.timers.remove(i);
            }
            PENDING.lock().push_back(timer);
            PENDING_SIGNAL.put();
        } else {
            i += 1;
        }
    }
}

/// Back a wait-queue timeout with a one-shot timer (used by
/// `sync::wait_queue::sleep`'s `timeout_ticks` argument). Wakes `task` with
/// `TimedOut` if it is still sleeping when the timer fires.
pub fn arm_wait_timeout(task: TaskId, ticks: u64) -> Arc<Timer> {
    let timer = Timer::create(wait_timeout_callback, task.raw() as usize);
    timer.start(ticks, 0);
    timer
}

pub fn cancel_wait_timeout(timer: Arc<Timer>) {
    timer.stop();
}

fn wait_timeout_callback(task_raw: usize) {
    let id = TaskId::from_raw(task_raw as u64);
    if let Some(task) = task::lookup(id) {
        if task.state.load(Ordering::Acquire) == task::TaskState::Sleeping {
            *task.blocked_on.lock() = None;
            crate::sched::wake(id, task::WaitOutcome::TimedOut);
        }
    }
}
