//! Sleeping-primitive boundary scenarios (spec §4.5-§4.8, §8).

use crate::{wait_until, TestResult};
use alloc::format;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use kernel::consts::DEFAULT_PRIORITY;
use kernel::sync::condvar::Condvar;
use kernel::sync::mailbox::Mailbox;
use kernel::sync::mutex::Mutex;
use kernel::sync::semaphore::Semaphore;
use kernel::sync::spinlock::SpinLock;
use kernel::sync::wait_queue::{SleepMode, WaitResult};
use kernel::task::{self, TaskFn};
use spin::Once;

// --- FIFO mutex fairness (spec §8 scenario 2) -----------------------------

static FIFO_MUTEX: Mutex = Mutex::new("fifo_test");
static ORDER: SpinLock<Vec<usize>> = SpinLock::new(Vec::new());
static ENQUEUED_COUNT: AtomicUsize = AtomicUsize::new(0);

macro_rules! fifo_worker {
    ($name:ident, $idx:expr) => {
        extern "C" fn $name() -> ! {
            ENQUEUED_COUNT.fetch_add(1, Ordering::AcqRel);
            FIFO_MUTEX.lock();
            ORDER.lock().push($idx);
            FIFO_MUTEX.unlock();
            task::task_exit();
        }
    };
}

fifo_worker!(fifo_worker_0, 0);
fifo_worker!(fifo_worker_1, 1);
fifo_worker!(fifo_worker_2, 2);
fifo_worker!(fifo_worker_3, 3);
fifo_worker!(fifo_worker_4, 4);
fifo_worker!(fifo_worker_5, 5);
fifo_worker!(fifo_worker_6, 6);
fifo_worker!(fifo_worker_7, 7);
fifo_worker!(fifo_worker_8, 8);
fifo_worker!(fifo_worker_9, 9);

static FIFO_WORKERS: [TaskFn; 10] = [
    fifo_worker_0, fifo_worker_1, fifo_worker_2, fifo_worker_3, fifo_worker_4,
    fifo_worker_5, fifo_worker_6, fifo_worker_7, fifo_worker_8, fifo_worker_9,
];

/// 10 tasks call `lock` in order on an already-held mutex; the holder
/// unlocks, and the pass-the-baton handoff chains through the rest.
/// Acquisition order (recorded by each worker right before it hands the
/// mutex on) must equal enqueue order.
pub fn mutex_fifo_fairness() -> TestResult {
    ORDER.lock().clear();
    ENQUEUED_COUNT.store(0, Ordering::SeqCst);
    FIFO_MUTEX.lock();

    for (i, worker_fn) in FIFO_WORKERS.iter().enumerate() {
        let worker = task::task_create(*worker_fn, DEFAULT_PRIORITY);
        task::task_start(&worker);
        if !wait_until(100, || ENQUEUED_COUNT.load(Ordering::Acquire) > i) {
            FIFO_MUTEX.unlock();
            return TestResult::Failed(format!("worker {i} never reached lock()"));
        }
        // Give it one more turn to actually park on the mutex's queue
        // before the next worker is created.
        task::task_yield();
    }

    FIFO_MUTEX.unlock();

    if !wait_until(200, || ORDER.lock().len() == 10) {
        return TestResult::Failed(format!(
            "only {} of 10 workers acquired the mutex",
            ORDER.lock().len()
        ));
    }

    let order = ORDER.lock().clone();
    if order == (0..10).collect::<Vec<usize>>() {
        TestResult::Ok
    } else {
        TestResult::Failed(format!("acquisition order {order:?} != enqueue order"))
    }
}

// --- Condvar mesa semantics (spec §4.6, §8) -------------------------------

static CV_MUTEX: Mutex = Mutex::new("cv_test");
static CV: Condvar = Condvar::new();
static CV_READY: AtomicBool = AtomicBool::new(false);
static CV_WOKE: AtomicBool = AtomicBool::new(false);
static CV_PARKED: AtomicBool = AtomicBool::new(false);
static CV_REWAIT_COUNT: AtomicUsize = AtomicUsize::new(0);

extern "C" fn cv_waiter() -> ! {
    CV_MUTEX.lock();
    while !CV_READY.load(Ordering::Acquire) {
        CV_PARKED.store(true, Ordering::Release);
        CV.wait(&CV_MUTEX);
        CV_REWAIT_COUNT.fetch_add(1, Ordering::AcqRel);
    }
    CV_WOKE.store(true, Ordering::Release);
    CV_MUTEX.unlock();
    task::task_exit();
}

/// A `signal` with the predicate still false must send the waiter back to
/// sleep rather than letting it proceed — mesa semantics require the
/// caller to retest under the mutex after every wake.
pub fn condvar_mesa_rewait() -> TestResult {
    CV_READY.store(false, Ordering::SeqCst);
    CV_WOKE.store(false, Ordering::SeqCst);
    CV_PARKED.store(false, Ordering::SeqCst);
    CV_REWAIT_COUNT.store(0, Ordering::SeqCst);

    let waiter = task::task_create(cv_waiter, DEFAULT_PRIORITY);
    task::task_start(&waiter);

    if !wait_until(100, || CV_PARKED.load(Ordering::Acquire)) {
        return TestResult::Failed("waiter never reached cv.wait()".into());
    }
    task::task_yield();

    CV.signal();
    if !wait_until(100, || CV_REWAIT_COUNT.load(Ordering::Acquire) >= 1) {
        return TestResult::Failed("waiter never observed the spurious wake".into());
    }
    if CV_WOKE.load(Ordering::Acquire) {
        return TestResult::Failed("waiter proceeded past a spurious wake".into());
    }

    CV_READY.store(true, Ordering::Release);
    CV.signal();

    if wait_until(100, || CV_WOKE.load(Ordering::Acquire)) {
        TestResult::Ok
    } else {
        TestResult::Failed("waiter never woke once the predicate went true".into())
    }
}

// --- Semaphore --------------------------------------------------------

static SEM: Semaphore = Semaphore::new(0);
static SEM_WOKE: AtomicBool = AtomicBool::new(false);

extern "C" fn sem_waiter() -> ! {
    let result = SEM.get(None);
    SEM_WOKE.store(result == WaitResult::Woken, Ordering::Release);
    task::task_exit();
}

pub fn semaphore_get_put() -> TestResult {
    SEM_WOKE.store(false, Ordering::SeqCst);
    while SEM.try_get() {}

    let waiter = task::task_create(sem_waiter, DEFAULT_PRIORITY);
    task::task_start(&waiter);
    task::task_yield();

    SEM.put();

    if wait_until(100, || SEM_WOKE.load(Ordering::Acquire)) {
        TestResult::Ok
    } else {
        TestResult::Failed("semaphore waiter never woke after put".into())
    }
}

// --- Mailbox back-pressure (spec §4.8, §8) --------------------------------

static MAILBOX: Once<Mailbox<u32>> = Once::new();

fn mailbox() -> &'static Mailbox<u32> {
    MAILBOX.call_once(|| Mailbox::new(2))
}

static SENT_COUNT: AtomicUsize = AtomicUsize::new(0);
static RECEIVED: SpinLock<Vec<u32>> = SpinLock::new(Vec::new());

extern "C" fn mailbox_producer() -> ! {
    for i in 0..5u32 {
        mailbox().send(i, None, SleepMode::Wakeable);
        SENT_COUNT.fetch_add(1, Ordering::AcqRel);
    }
    task::task_exit();
}

extern "C" fn mailbox_consumer() -> ! {
    for _ in 0..5 {
        if let Ok(msg) = mailbox().receive(None, SleepMode::Wakeable) {
            RECEIVED.lock().push(msg);
        }
    }
    task::task_exit();
}

/// A 2-slot mailbox fed 5 messages must stall the sender at 2 in flight
/// until a receiver drains it, then deliver the rest in send order.
pub fn mailbox_backpressure() -> TestResult {
    SENT_COUNT.store(0, Ordering::SeqCst);
    RECEIVED.lock().clear();
    mailbox();

    let producer = task::task_create(mailbox_producer, DEFAULT_PRIORITY);
    task::task_start(&producer);

    if !wait_until(100, || SENT_COUNT.load(Ordering::Acquire) == 2) {
        return TestResult::Failed(format!(
            "producer only delivered {} before stalling, expected exactly 2",
            SENT_COUNT.load(Ordering::Acquire)
        ));
    }
    task::task_yield();
    if SENT_COUNT.load(Ordering::Acquire) > 2 {
        return TestResult::Failed(
            "producer exceeded mailbox capacity before any receiver drained it".into(),
        );
    }

    let consumer = task::task_create(mailbox_consumer, DEFAULT_PRIORITY);
    task::task_start(&consumer);

    if !wait_until(200, || RECEIVED.lock().len() == 5) {
        return TestResult::Failed(format!(
            "only {} of 5 messages delivered",
            RECEIVED.lock().len()
        ));
    }

    let received = RECEIVED.lock().clone();
    if received == [0u32, 1, 2, 3, 4] {
        TestResult::Ok
    } else {
        TestResult::Failed(format!("message order {received:?} != [0, 1, 2, 3, 4]"))
    }
}
