#![no_std]
#![no_main]

extern crate alloc;
extern crate kernel;
extern crate tests;

use kernel::arch::cpu_local::get_local;
use kernel::arch::x86_64_impl::{apic, gdt, idt, ioapic};
use kernel::consts::DEFAULT_PRIORITY;
use kernel::limine_requests::{
    BASE_REVISION, HHDM_REQUEST, MEMORY_MAP_REQUEST, MP_REQUEST, RSDP_REQUEST,
};
use kernel::memory::stack::{KernelStack, NORMAL_STACK_SIZE};
use kernel::{acpi, panic_handling, sched, task, time};

/// Mirrors `kernel::main`'s bring-up exactly, then hands off to a single
/// test-runner task instead of an idle workload — every test needs a real
/// current task and a ticking clock, so it runs post-`sched::start` rather
/// than inline in this function.
#[unsafe(no_mangle)]
unsafe extern "C" fn kernel_main() -> ! {
    assert!(BASE_REVISION.is_supported());

    kernel::logger::init().expect("logger already initialized");
    log::info!("booting kernel test image");

    let _ = HHDM_REQUEST.get_response().expect("no HHDM response");
    let memory_map = MEMORY_MAP_REQUEST.get_response().expect("no memory map response");
    kernel::memory::heap::init(memory_map);

    kernel::arch::cpu_local::init_bsp();
    panic_handling::init();
    panic_handling::mark_ready(get_local().kernel_id);

    let stack = KernelStack::new(NORMAL_STACK_SIZE);
    let top = stack.top().as_u64();
    core::mem::forget(stack);
    unsafe {
        core::arch::asm!(
            "mov rsp, {top}",
            "call {entry}",
            top = in(reg) top,
            entry = sym init_bsp,
            options(noreturn),
        )
    }
}

extern "C" fn init_bsp() -> ! {
    gdt::init();
    idt::init();

    let rsdp = RSDP_REQUEST.get_response().expect("no RSDP response");
    let acpi_tables = acpi::parse(rsdp);
    apic::init_bsp(&acpi_tables);
    apic::init_local_apic();
    ioapic::init(&acpi_tables);

    time::lapic_timer::init(apic::LOCAL_APIC_ACCESS.get().expect("apic::init_bsp not called"));
    time::init();
    sched::init();

    let mp_response = MP_REQUEST.get_response().expect("no MP response");
    for cpu in mp_response.cpus() {
        if cpu.lapic_id != mp_response.bsp_lapic_id() {
            cpu.goto_address.write(ap_entry);
        }
    }

    let runner = task::task_create(run_tests_entry, DEFAULT_PRIORITY);
    task::task_start(&runner);

    sched::start(get_local())
}

extern "C" fn run_tests_entry() -> ! {
    tests::run_tests();
}

unsafe extern "C" fn ap_entry(cpu: &limine::mp::Cpu) -> ! {
    kernel::arch::cpu_local::init_ap(cpu.lapic_id);
    panic_handling::mark_ready(get_local().kernel_id);

    let stack = KernelStack::new(NORMAL_STACK_SIZE);
    let top = stack.top().as_u64();
    core::mem::forget(stack);
    unsafe {
        core::arch::asm!(
            "mov rsp, {top}",
            "call {entry}",
            top = in(reg) top,
            entry = sym init_ap,
            options(noreturn),
        )
    }
}

extern "C" fn init_ap() -> ! {
    gdt::init();
    idt::init();
    apic::init_local_apic();
    time::lapic_timer::init(apic::LOCAL_APIC_ACCESS.get().expect("apic::init_bsp not called"));
    sched::start(get_local())
}
