//! Hardware abstraction layer seam (spec §4.1, §6).
//!
//! The core never reads hardware registers directly; every crossing into
//! architecture-specific code goes through the free functions re-exported
//! here, which delegate to the single concrete backend, [`x86_64_impl`].
//! `Hal` documents the seam as a trait (per spec §9's design note that
//! context-switch/init-stack belong behind "a single arch trait/interface");
//! [`X86_64`] is its only implementor.

pub mod cpu_local;
pub mod x86_64_impl;

pub use x86_64_impl::context::CpuContext;

/// Opaque token returned by [`Hal::irq_save`] and consumed by
/// [`Hal::irq_restore`]. The HAL tracks nesting on the CPU record itself
/// (spec §4.1), so the token carries no per-call payload — its only job is
/// to make "restore without a matching save" a type error at the call site.
pub struct IrqToken(());

/// The hardware abstraction layer: per-core identity, interrupt
/// enable/disable/save/restore, IPIs, idling, and the legacy interrupt
/// controller operations (mask/unmask/enable/EOI/id).
pub trait Hal {
    fn cpu_id() -> u32;

    /// Raw primitive. Core code must not call this directly — use
    /// [`irq_save`]/[`irq_restore`] instead (spec §9 design note).
    fn irq_enable();
    /// Raw primitive, see [`Hal::irq_enable`].
    fn irq_disable();

    fn irq_is_enabled() -> bool;

    /// Send an inter-processor interrupt to `cpu`, the only mechanism to
    /// force another core to re-examine its ready queue (spec §5).
    fn ipi(cpu: u32);

    /// Idle the current core until the next interrupt.
    fn idle();

    fn interrupt_mask(irq: u32);
    fn interrupt_unmask(irq: u32);
    fn interrupt_enable(irq: u32, cpu: u32);
    fn interrupt_eoi(irq: u32);
    /// The IRQ number that is currently being serviced on this core.
    fn interrupt_id() -> u32;
}

pub use x86_64_impl::X86_64;

pub fn cpu_id() -> u32 {
    X86_64::cpu_id()
}

pub fn ipi(cpu: u32) {
    X86_64::ipi(cpu)
}

pub fn idle() {
    X86_64::idle()
}

pub fn interrupt_mask(irq: u32) {
    X86_64::interrupt_mask(irq)
}

pub fn interrupt_unmask(irq: u32) {
    X86_64::interrupt_unmask(irq)
}

pub fn interrupt_enable(irq: u32, cpu: u32) {
    X86_64::interrupt_enable(irq, cpu)
}

pub fn interrupt_eoi(irq: u32) {
    X86_64::interrupt_eoi(irq)
}

/// The IRQ number currently being serviced on this core (spec §4.10),
/// read back by an epilogue that needs its own line number without
/// threading it through as an argument.
pub fn interrupt_id() -> u32 {
    X86_64::interrupt_id()
}

/// Nesting-aware interrupt save (spec §4.1). The first call on a given core
/// captures the prior IF flag and disables interrupts; nested calls only
/// increment the per-core counter.
#[must_use]
pub fn irq_save() -> IrqToken {
    let local = cpu_local::get_local();
    let depth = local.irq_save_depth.get();
    if depth == 0 {
        local.irq_saved_enabled.set(X86_64::irq_is_enabled());
        X86_64::irq_disable();
    }
    local.irq_save_depth.set(depth + 1);
    IrqToken(())
}

/// Nesting-aware interrupt restore. Decrements the per-core counter and,
/// on reaching zero, re-enables interrupts iff the captured flag was set.
///
/// # Panics
/// Panics (programming error, spec §7.1) if the counter would underflow, or
/// if interrupts are observed enabled while a save is still outstanding —
/// both indicate a save/restore mismatch.
pub fn irq_restore(token: IrqToken) {
    let IrqToken(()) = token;
    let local = cpu_local::get_local();
    let depth = local.irq_save_depth.get();
    if depth == 0 {
        panic!("irq_restore: counter underflow (unmatched restore)");
    }
    if X86_64::irq_is_enabled() {
        panic!("irq_restore: interrupts enabled while a save is outstanding");
    }
    local.irq_save_depth.set(depth - 1);
    if depth - 1 == 0 && local.irq_saved_enabled.get() {
        X86_64::irq_enable();
    }
}

pub fn irq_is_enabled() -> bool {
    X86_64::irq_is_enabled()
}
