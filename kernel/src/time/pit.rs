//! PIT channel 0 busy-wait, used only to calibrate the LAPIC timer's tick
//! frequency. Lifted near-verbatim from the grounding kernel's `time/pit.rs`.

use crate::consts::{PIT_CH0, PIT_CMD, PIT_FREQ};
use x86_64::instructions::port::Port;

/// Busy-wait for `ms` milliseconds using the PIT in one-shot mode.
pub fn sleep_ms(ms: u32) {
    let ticks = (PIT_FREQ / 1000) * ms;
    assert!(ticks <= 0xFFFF, "PIT one-shot count overflow for {ms}ms");

    let mut cmd = Port::<u8>::new(PIT_CMD);
    let mut ch0 = Port::<u8>::new(PIT_CH0);

    unsafe {
        // Channel 0 | lobyte/hibyte | mode 0 (interrupt on terminal count) | binary
        cmd.write(0b0011_0000);
        ch0.write((ticks & 0xFF) as u8);
        ch0.write((ticks >> 8) as u8);
    }

    loop {
        let count: u16;
        unsafe {
            cmd.write(0b0000_0000); // latch channel 0 count
            let lo: u8 = ch0.read();
            let hi: u8 = ch0.read();
            count = u16::from_le_bytes([lo, hi]);
        }
        if count == 0 {
            break;
        }
        core::hint::spin_loop();
    }
}
