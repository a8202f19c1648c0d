//! LAPIC timer, periodic mode, calibrated against the PIT. The grounding
//! kernel's `time/lapic_timer.rs` drives the timer in TSC-deadline mode; a
//! software timer wheel only needs a steady periodic tick, so this is the
//! plainer LVT-timer mode, driven through the same register-based/MMIO
//! dual access `apic.rs` already established for the spurious/error/ICR
//! registers.

use crate::arch::x86_64_impl::apic::LocalApicAccess;
use crate::arch::x86_64_impl::idt::InterruptVector;
use crate::consts::{APIC_TIMER_DISABLE, APIC_TIMER_MODE_PERIODIC, TICK_PERIOD_US};
use x86_64::registers::model_specific::Msr;

const LVT_TIMER_MMIO: u64 = 0x320;
const INITIAL_COUNT_MMIO: u64 = 0x380;
const CURRENT_COUNT_MMIO: u64 = 0x390;
const DIVIDE_CONFIG_MMIO: u64 = 0x3e0;

const LVT_TIMER_MSR: u32 = 0x832;
const INITIAL_COUNT_MSR: u32 = 0x838;
const CURRENT_COUNT_MSR: u32 = 0x839;
const DIVIDE_CONFIG_MSR: u32 = 0x83e;

/// Divide-by-16, matching the grounding kernel's choice.
const DIVIDE_BY_16: u32 = 0b0011;

fn write_reg(access: &LocalApicAccess, mmio_offset: u64, msr: u32, value: u32) {
    match access {
        LocalApicAccess::RegisterBased => unsafe { Msr::new(msr).write(value as u64) },
        LocalApicAccess::Mmio(base) => unsafe {
            core::ptr::write_volatile((base.as_u64() + mmio_offset) as *mut u32, value)
        },
    }
}

fn read_reg(access: &LocalApicAccess, mmio_offset: u64, msr: u32) -> u32 {
    match access {
        LocalApicAccess::RegisterBased => unsafe { Msr::new(msr).read() as u32 },
        LocalApicAccess::Mmio(base) => unsafe {
            core::ptr::read_volatile((base.as_u64() + mmio_offset) as *const u32)
        },
    }
}

/// Count the LAPIC timer decrements over a fixed PIT-timed window to derive
/// ticks-per-microsecond for this core's bus frequency, then arm the timer
/// in periodic mode at [`TICK_PERIOD_US`]. Must run once per core, after
/// `apic::init_local_apic`.
pub fn init(access: &LocalApicAccess) {
    write_reg(access, DIVIDE_CONFIG_MMIO, DIVIDE_CONFIG_MSR, DIVIDE_BY_16);
    write_reg(access, LVT_TIMER_MMIO, LVT_TIMER_MSR, APIC_TIMER_DISABLE);

    const CALIBRATION_MS: u32 = 10;
    write_reg(access, INITIAL_COUNT_MMIO, INITIAL_COUNT_MSR, u32::MAX);
    super::pit::sleep_ms(CALIBRATION_MS);
    let remaining = read_reg(access, CURRENT_COUNT_MMIO, CURRENT_COUNT_MSR);
    let elapsed = u32::MAX - remaining;
    write_reg(access, INITIAL_COUNT_MMIO, INITIAL_COUNT_MSR, 0);

    let ticks_per_us = (elapsed as u64 / (CALIBRATION_MS as u64 * 1000)).max(1);
    let initial_count = (ticks_per_us * TICK_PERIOD_US) as u32;

    let vector = u8::from(InterruptVector::LocalApicTimer) as u32;
    write_reg(access, LVT_TIMER_MMIO, LVT_TIMER_MSR, vector | APIC_TIMER_MODE_PERIODIC);
    write_reg(access, INITIAL_COUNT_MMIO, INITIAL_COUNT_MSR, initial_count);
}
