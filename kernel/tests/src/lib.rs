#![no_std]
#![no_main]
extern crate alloc;

use alloc::string::String;

pub mod scheduler;
pub mod sync_tests;
pub mod timer_tests;

/// Mirrors the grounding kernel's own test-harness shape (`Fn() -> TestResult`
/// as the object-safe test unit), generalized from a framebuffer-driven
/// kernel to this one's scheduler-driven boot.
pub trait KernelTest {
    fn name(&self) -> &'static str;
    fn run(&self) -> TestResult;
}

impl<F> KernelTest for F
where
    F: Fn() -> TestResult,
{
    fn name(&self) -> &'static str {
        core::any::type_name::<F>()
    }

    fn run(&self) -> TestResult {
        self()
    }
}

#[derive(Debug)]
pub enum TestResult {
    Ok,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestGroup {
    Scheduler,
    Sync,
    Timer,
}

pub struct TestEntry {
    pub group: TestGroup,
    pub test: &'static dyn KernelTest,
}

pub fn tests() -> &'static [TestEntry] {
    &[
        TestEntry { group: TestGroup::Scheduler, test: &scheduler::task_starts_ready },
        TestEntry { group: TestGroup::Scheduler, test: &scheduler::spawned_tasks_run },
        TestEntry { group: TestGroup::Sync, test: &sync_tests::mutex_fifo_fairness },
        TestEntry { group: TestGroup::Sync, test: &sync_tests::condvar_mesa_rewait },
        TestEntry { group: TestGroup::Sync, test: &sync_tests::semaphore_get_put },
        TestEntry { group: TestGroup::Sync, test: &sync_tests::mailbox_backpressure },
        TestEntry { group: TestGroup::Timer, test: &timer_tests::tick_is_monotonic },
        TestEntry { group: TestGroup::Timer, test: &timer_tests::periodic_timer_fires_expected_count },
    ]
}

/// Runs every registered test in sequence and exits QEMU with the
/// aggregate result. Called from a dedicated task spawned after the
/// scheduler and timer subsystem are up (see `basic_boot.rs`) — every test
/// here assumes a real current task and a ticking clock.
pub fn run_tests() -> ! {
    let all = tests();
    log::info!("running {} kernel tests", all.len());

    let mut failed = 0;
    for entry in all {
        let result = entry.test.run();
        match result {
            TestResult::Ok => log::info!("{} [ok]", entry.test.name()),
            TestResult::Failed(msg) => {
                log::error!("{} [failed] - {}", entry.test.name(), msg);
                failed += 1;
            }
        }
    }

    if failed == 0 {
        log::info!("all tests passed");
        exit_qemu(QemuExitCode::Success);
    } else {
        log::error!("{failed} test(s) failed");
        exit_qemu(QemuExitCode::Failed);
    }
    kernel::hlt_loop();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

pub fn exit_qemu(code: QemuExitCode) {
    use x86_64::instructions::port::Port;
    unsafe {
        let mut port = Port::new(0xf4);
        port.write(code as u32);
    }
}

/// Busy-wait (yielding the CPU each iteration) for `cond` to become true,
/// giving up after `timeout_ticks` have elapsed. Every multi-task test in
/// this crate is built on top of this instead of a fixed sleep, since the
/// exact number of scheduling rounds a test needs is not something this
/// harness can predict up front.
pub fn wait_until(timeout_ticks: u64, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = kernel::time::tick_get() + timeout_ticks;
    loop {
        if cond() {
            return true;
        }
        if kernel::time::tick_get() > deadline {
            return false;
        }
        kernel::task::task_yield();
    }
}
