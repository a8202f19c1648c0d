//! Kernel-wide tunables. No runtime config file exists; this mirrors a
//! `#![no_std]` kernel's usual configuration surface.

/// Number of scheduling priorities (0 = lowest, PRIORITY_LEVELS - 1 = highest).
pub const PRIORITY_LEVELS: usize = 8;

/// Default scheduling priority for newly created tasks.
pub const DEFAULT_PRIORITY: u8 = PRIORITY_LEVELS as u8 / 2;

/// Time-slice, in ticks, granted to a task when it starts running.
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// Tick period, in microseconds. Drives the per-core LAPIC timer deadline.
pub const TICK_PERIOD_US: u64 = 1_000; // 1 ms

/// Default mailbox capacity (number of elements) when unspecified.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 16;

pub const PIT_FREQ: u32 = 1_193_182;
pub const PIT_CH0: u16 = 0x40;
pub const PIT_CMD: u16 = 0x43;

// Apic timer LVT bits.
pub const APIC_TIMER_DISABLE: u32 = 1 << 16;
pub const APIC_TIMER_MODE_PERIODIC: u32 = 0b01 << 17;
