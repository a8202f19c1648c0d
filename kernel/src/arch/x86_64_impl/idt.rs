//! Exception and interrupt vector table, grounded on the grounding kernel's
//! `interrupt/idt.rs` + `interrupt/handlers.rs`. The page/general-protection/
//! double fault and breakpoint handlers are kept close to verbatim; the
//! timer vector now drives the tick subsystem and scheduler instead of the
//! syscall-aware dispatch the grounding kernel used.

use crate::arch::cpu_local::get_local;
use crate::arch::x86_64_impl::context::{
    reschedule_interrupt_handler, timer_interrupt_handler, CpuContext,
};
use crate::arch::x86_64_impl::gdt::IstStackIndexes;
use num_enum::IntoPrimitive;
use x86_64::registers::control::Cr2;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};

#[derive(Debug, Clone, Copy, IntoPrimitive)]
#[repr(u8)]
pub enum InterruptVector {
    LocalApicSpurious = 0x20,
    LocalApicTimer = 0x21,
    LocalApicError = 0x22,
    Keyboard = 0x23,
    /// Software-triggered by `sched::yield_now`/`block_current` (`int`) to
    /// force an immediate reschedule outside of the tick path.
    Reschedule = 0x24,
}

/// ISA IRQ line the legacy keyboard controller is routed to at boot (the
/// only device line this kernel routes — spec's broader driver surface is
/// out of scope, but the dispatch mechanism it would hang off of is not).
const KEYBOARD_ISA_IRQ: u32 = 1;

pub fn init() {
    let idt = get_local().idt.call_once(|| {
        let mut idt = InterruptDescriptorTable::new();
        unsafe {
            idt.page_fault
                .set_handler_fn(page_fault_handler)
                .set_stack_index(u8::from(IstStackIndexes::Exception).into());
            idt.double_fault
                .set_handler_fn(double_fault_handler)
                .set_stack_index(u8::from(IstStackIndexes::Exception).into());
        }
        idt.general_protection_fault
            .set_handler_fn(general_protection_fault_handler);
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.non_maskable_interrupt.set_handler_fn(nmi_handler);
        // The timer vector is a naked trampoline with its own calling
        // convention (it manages the iretq frame by hand), so it is wired
        // in through the raw address rather than `set_handler_fn`.
        unsafe {
            idt[u8::from(InterruptVector::LocalApicTimer)]
                .set_handler_addr(x86_64::VirtAddr::new(timer_interrupt_handler as u64));
        }
        idt[u8::from(InterruptVector::Keyboard)].set_handler_fn(keyboard_interrupt_handler);
        unsafe {
            idt[u8::from(InterruptVector::Reschedule)]
                .set_handler_addr(x86_64::VirtAddr::new(reschedule_interrupt_handler as u64));
        }
        idt
    });
    idt.load();
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    let accessed_address = Cr2::read_raw();
    log::error!(
        "page fault at {accessed_address:#x}, error: {error_code:#?}, ip: {:#x}",
        stack_frame.instruction_pointer.as_u64()
    );
    panic!("page fault: stack frame {stack_frame:#?}");
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    panic!("general protection fault ({error_code:#x}): {stack_frame:#?}");
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) -> ! {
    panic!("double fault ({error_code:#x}): {stack_frame:#?}");
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    log::info!("breakpoint: {stack_frame:#?}");
}

extern "x86-interrupt" fn nmi_handler(_stack_frame: InterruptStackFrame) {
    crate::panic_handling::handle_panic_from_other_cpu()
}

extern "x86-interrupt" fn keyboard_interrupt_handler(_stack_frame: InterruptStackFrame) {
    let cpu = get_local();
    cpu.current_irq.set(KEYBOARD_ISA_IRQ);

    crate::irq::dispatch(crate::arch::interrupt_id());

    unsafe {
        let local_apic = &mut *cpu.local_apic.get().unwrap().get();
        local_apic.end_of_interrupt();
    }
}

/// Called from the naked [`timer_interrupt_handler`] on every LAPIC timer
/// tick. Advances the tick subsystem (spec §6), lets the scheduler pick a
/// task to run next (spec §5), and returns the [`CpuContext`] to restore —
/// null if the scheduler has nothing yet (still booting).
extern "C" fn timer_tick() -> *mut CpuContext {
    let cpu = get_local();
    cpu.current_irq.set(u8::from(InterruptVector::LocalApicTimer) as u32);
    cpu.isr_depth.set(cpu.isr_depth.get() + 1);

    crate::time::on_timer_tick();

    unsafe {
        let local_apic = &mut *cpu.local_apic.get().unwrap().get();
        local_apic.end_of_interrupt();
    }

    let next = crate::sched::schedule_from_interrupt(cpu);
    cpu.isr_depth.set(cpu.isr_depth.get() - 1);
    next
}
