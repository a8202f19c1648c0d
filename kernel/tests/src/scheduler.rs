//! Scheduler boundary scenarios (spec §4.3, §8).

use crate::{wait_until, TestResult};
use alloc::format;
use core::sync::atomic::{AtomicU32, Ordering};
use kernel::consts::DEFAULT_PRIORITY;
use kernel::task::{self, TaskState};

pub fn task_starts_ready() -> TestResult {
    let task = task::task_create(parked_forever, DEFAULT_PRIORITY);
    let state = task.state.load(Ordering::Acquire);
    // Created but not yet started: READY, not yet on any run queue (spec
    // §6 `task_create` vs `task_start`).
    if state == TaskState::Ready {
        TestResult::Ok
    } else {
        TestResult::Failed(format!("new task state is {state:?}, expected Ready"))
    }
}

extern "C" fn parked_forever() -> ! {
    loop {
        task::task_yield();
    }
}

static RUN_COUNT: AtomicU32 = AtomicU32::new(0);

extern "C" fn incrementer_a() -> ! {
    RUN_COUNT.fetch_add(1, Ordering::AcqRel);
    loop {
        task::task_yield();
    }
}

extern "C" fn incrementer_b() -> ! {
    RUN_COUNT.fetch_add(1, Ordering::AcqRel);
    loop {
        task::task_yield();
    }
}

/// Spawns two tasks at the default priority and confirms the scheduler
/// actually dispatches both (not just the one that happened to be created
/// first) within a generous tick budget.
pub fn spawned_tasks_run() -> TestResult {
    RUN_COUNT.store(0, Ordering::SeqCst);

    let a = task::task_create(incrementer_a, DEFAULT_PRIORITY);
    task::task_start(&a);
    let b = task::task_create(incrementer_b, DEFAULT_PRIORITY);
    task::task_start(&b);

    if wait_until(200, || RUN_COUNT.load(Ordering::Acquire) >= 2) {
        TestResult::Ok
    } else {
        TestResult::Failed(format!(
            "only {} of 2 spawned tasks ran within budget",
            RUN_COUNT.load(Ordering::Acquire)
        ))
    }
}
