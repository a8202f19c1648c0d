//! The x86_64 backend: the only [`Hal`](super::Hal) implementor this kernel
//! ships. Cortex-A9 is named in the specification's purpose statement but
//! never given a concrete boot path or MMU/GIC driver to ground against, so
//! no second backend exists yet — tracked as an open question in
//! `DESIGN.md` rather than guessed at.

pub mod apic;
pub mod context;
pub mod gdt;
pub mod idt;
pub mod ioapic;

use super::Hal;
use crate::arch::cpu_local::get_local;
use idt::InterruptVector;
use x86_64::instructions::interrupts;

pub struct X86_64;

impl Hal for X86_64 {
    fn cpu_id() -> u32 {
        get_local().kernel_id
    }

    fn irq_enable() {
        interrupts::enable();
    }

    fn irq_disable() {
        interrupts::disable();
    }

    fn irq_is_enabled() -> bool {
        interrupts::are_enabled()
    }

    fn ipi(cpu: u32) {
        let target_apic_id = crate::arch::cpu_local::local_apic_id_of(cpu);
        apic::send_fixed_ipi(target_apic_id, u8::from(InterruptVector::LocalApicTimer));
    }

    fn idle() {
        interrupts::enable_and_hlt();
    }

    fn interrupt_mask(_irq: u32) {
        // Masking an individual ISA line after routing requires rewriting
        // its redirection entry; this kernel only ever routes the keyboard
        // line once at boot (spec's out-of-scope driver surface), so this
        // is a no-op placeholder for that future use.
    }

    fn interrupt_unmask(_irq: u32) {}

    fn interrupt_enable(irq: u32, cpu: u32) {
        let dest_apic_id = crate::arch::cpu_local::local_apic_id_of(cpu);
        ioapic::route_isa_irq(irq as u8, u8::from(InterruptVector::Keyboard), dest_apic_id);
    }

    fn interrupt_eoi(_irq: u32) {
        let local = get_local();
        unsafe {
            let local_apic = &mut *local.local_apic.get().expect("local APIC not initialized").get();
            local_apic.end_of_interrupt();
        }
    }

    fn interrupt_id() -> u32 {
        get_local().current_irq.get()
    }
}
