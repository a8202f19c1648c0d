//! Kernel panic handling, grounded on the grounding kernel's
//! `interrupt/nmi_handler_state.rs` plus the panic handler in
//! `core/src/main.rs` — the framebuffer crash dump is dropped (graphics is
//! out of scope) but the cross-core NMI propagation is kept: one core
//! panicking halts every core, not just its own.

use crate::arch::cpu_local::{cpus_count, local_apic_id_of};
use crate::hlt_loop;
use alloc::boxed::Box;
use atomic_enum::atomic_enum;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Once;

#[atomic_enum]
#[derive(PartialEq)]
pub enum NmiHandlerState {
    NotSet,
    Set,
    KernelPanicked,
}

static NMI_HANDLER_STATES: Once<Box<[AtomicNmiHandlerState]>> = Once::new();
static DID_PANIC: AtomicBool = AtomicBool::new(false);

pub fn init() {
    NMI_HANDLER_STATES.call_once(|| {
        (0..cpus_count())
            .map(|_| AtomicNmiHandlerState::new(NmiHandlerState::NotSet))
            .collect()
    });
}

/// Mark this core ready to receive a panic-propagation NMI. Must run after
/// [`init`] and before this core enables interrupts.
///
/// If another core already panicked between `init` and this call, halts
/// immediately instead of returning.
pub fn mark_ready(kernel_id: u32) {
    let states = NMI_HANDLER_STATES.get().expect("panic_handling::init not called");
    if states[kernel_id as usize]
        .compare_exchange(
            NmiHandlerState::NotSet,
            NmiHandlerState::Set,
            Ordering::Relaxed,
            Ordering::Relaxed,
        )
        .is_err()
    {
        handle_panic_from_other_cpu()
    }
}

/// NMI handler body: a peer already panicked and is telling us to stop.
pub fn handle_panic_from_other_cpu() -> ! {
    hlt_loop()
}

fn broadcast_panic_nmi(local: &crate::arch::cpu_local::CpuLocalData) {
    let Some(states) = NMI_HANDLER_STATES.get() else {
        return;
    };
    let local_apic = unsafe { &mut *local.local_apic.get().expect("local APIC not initialized").get() };
    for (cpu_id, state) in states
        .iter()
        .enumerate()
        .filter(|(cpu_id, _)| *cpu_id as u32 != local.kernel_id)
    {
        if state.swap(NmiHandlerState::KernelPanicked, Ordering::Release)
            == NmiHandlerState::Set
        {
            unsafe { local_apic.send_nmi(local_apic_id_of(cpu_id as u32)) };
        }
    }
}

#[panic_handler]
fn rust_panic(info: &core::panic::PanicInfo) -> ! {
    if !DID_PANIC.swap(true, Ordering::Relaxed) {
        log::error!("{info}");
        if let Some(local) = crate::arch::cpu_local::try_get_local() {
            broadcast_panic_nmi(local);
        }
    }
    hlt_loop()
}
