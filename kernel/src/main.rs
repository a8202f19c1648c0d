#![no_std]
#![no_main]

extern crate alloc;
extern crate kernel;

use kernel::arch::cpu_local::get_local;
use kernel::arch::x86_64_impl::{apic, gdt, idt, ioapic};
use kernel::limine_requests::{BASE_REVISION, HHDM_REQUEST, MEMORY_MAP_REQUEST, MP_REQUEST, RSDP_REQUEST};
use kernel::memory::stack::{KernelStack, NORMAL_STACK_SIZE};
use kernel::{acpi, irq, panic_handling, sched, time};

/// First keyboard ISA line, the one ISA-routed device this kernel wires up
/// as a worked example of the IRQ attach API (spec §6); the rest of the
/// driver surface is out of scope.
const KEYBOARD_ISA_IRQ: u8 = 1;

fn log_keypress(_irq: u32, _arg: usize) {
    let mut data = x86_64::instructions::port::Port::<u8>::new(0x60);
    let scancode = unsafe { data.read() };
    log::trace!("scancode {scancode:#x}");
}

#[unsafe(no_mangle)]
unsafe extern "C" fn kernel_main() -> ! {
    assert!(BASE_REVISION.is_supported());

    kernel::logger::init().expect("logger already initialized");
    log::info!("booting");

    let _ = HHDM_REQUEST.get_response().expect("no HHDM response");
    let memory_map = MEMORY_MAP_REQUEST.get_response().expect("no memory map response");
    kernel::memory::heap::init(memory_map);
    log::info!("heap initialized");

    kernel::arch::cpu_local::init_bsp();
    panic_handling::init();
    panic_handling::mark_ready(get_local().kernel_id);
    log::info!("bsp cpu-local data ready");

    // Re-enter on a freshly allocated kernel stack, mirroring the
    // grounding kernel's `GuardedStack::switch` — the Limine-provided boot
    // stack is not guaranteed to outlive the rest of boot.
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
    log::info!("bsp gdt/idt initialized");

    let rsdp = RSDP_REQUEST.get_response().expect("no RSDP response");
    let acpi_tables = acpi::parse(rsdp);
    apic::init_bsp(&acpi_tables);
    apic::init_local_apic();
    ioapic::init(&acpi_tables);
    log::info!("bsp apic/ioapic initialized");

    irq::irq_attach_thread(KEYBOARD_ISA_IRQ as u32, log_keypress, 0);
    kernel::arch::interrupt_enable(KEYBOARD_ISA_IRQ as u32, get_local().kernel_id);

    time::lapic_timer::init(
        apic::LOCAL_APIC_ACCESS
            .get()
            .expect("apic::init_bsp not called"),
    );
    time::init();
    sched::init();
    log::info!("scheduler and timer subsystem ready");

    let mp_response = MP_REQUEST.get_response().expect("no MP response");
    for cpu in mp_response.cpus() {
        if cpu.lapic_id != mp_response.bsp_lapic_id() {
            cpu.goto_address.write(ap_entry);
        }
    }

    // `sched::start` enters the first task via `iretq` with RFLAGS.IF
    // already set (`CpuContext::new`), so interrupts come on the instant
    // the scheduler's chosen task starts running — not before.
    sched::start(get_local())
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
    time::lapic_timer::init(
        apic::LOCAL_APIC_ACCESS
            .get()
            .expect("apic::init_bsp not called"),
    );
    log::info!("ap {} ready", get_local().kernel_id);

    sched::start(get_local())
}
