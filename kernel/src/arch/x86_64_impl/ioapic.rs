//! IOAPIC bring-up, grounded on the grounding kernel's `ioapic.rs`. Device
//! MMIO is normally mapped explicitly rather than through the HHDM — but
//! with paging out of scope here, the same HHDM-offset simplification used
//! for the local APIC (see `arch::x86_64_impl::apic`) is applied uniformly;
//! this holds for the sub-4GiB IOAPIC windows typical of the hardware this
//! kernel targets. See `DESIGN.md`.

use crate::limine_requests::hhdm_offset;
use acpi::platform::interrupt::{InterruptSourceOverride, Polarity, TriggerMode};
use acpi::platform::InterruptModel;
use acpi::AcpiTables;
use alloc::boxed::Box;
use spin::Once;

struct IoApicInfo {
    base: *mut u32,
    gsi_base: u32,
}

unsafe impl Send for IoApicInfo {}
unsafe impl Sync for IoApicInfo {}

struct IoApicState {
    info: IoApicInfo,
    interrupt_source_overrides: &'static [InterruptSourceOverride],
}

static IOAPIC: Once<IoApicState> = Once::new();

const IOREGSEL: usize = 0x00;
const IOWIN: usize = 0x10;
const IOREDTBL_BASE: u8 = 0x10;

fn read_register(base: *mut u32, index: u8) -> u32 {
    unsafe {
        core::ptr::write_volatile(base.byte_add(IOREGSEL), index as u32);
        core::ptr::read_volatile(base.byte_add(IOWIN))
    }
}

fn write_register(base: *mut u32, index: u8, value: u32) {
    unsafe {
        core::ptr::write_volatile(base.byte_add(IOREGSEL), index as u32);
        core::ptr::write_volatile(base.byte_add(IOWIN), value);
    }
}

fn max_redirection_entries(base: *mut u32) -> u8 {
    ((read_register(base, 0x01) >> 16) & 0xff) as u8
}

fn mask_all(base: *mut u32) {
    for i in 0..=max_redirection_entries(base) {
        let reg_low = IOREDTBL_BASE + i * 2;
        let low = read_register(base, reg_low);
        write_register(base, reg_low, low | (1 << 16));
    }
}

pub fn init(acpi_tables: &AcpiTables<impl acpi::Handler>) {
    let apic_model = match InterruptModel::new(acpi_tables).unwrap().0 {
        InterruptModel::Apic(apic) => apic,
        _ => panic!("no APIC interrupt model found"),
    };
    let io_apic = apic_model
        .io_apics
        .first()
        .expect("no IOAPIC found in ACPI tables");

    let virt_addr = (io_apic.address as u64 + hhdm_offset()) as *mut u32;

    let overrides: alloc::vec::Vec<InterruptSourceOverride> =
        apic_model.interrupt_source_overrides.into_iter().collect();
    let overrides_static: &'static [InterruptSourceOverride] =
        Box::leak(overrides.into_boxed_slice());

    IOAPIC.call_once(|| {
        mask_all(virt_addr);
        log::info!(
            "IOAPIC initialized at phys={:#x}, gsi_base={}",
            io_apic.address,
            io_apic.global_system_interrupt_base,
        );

        if apic_model.also_has_legacy_pics {
            disable_legacy_pic();
        }

        IoApicState {
            info: IoApicInfo {
                base: virt_addr,
                gsi_base: io_apic.global_system_interrupt_base,
            },
            interrupt_source_overrides: overrides_static,
        }
    });
}

fn disable_legacy_pic() {
    use x86::io::outb;
    unsafe {
        outb(0x21, 0xff);
        outb(0xa1, 0xff);
    }
    log::info!("legacy 8259 PIC disabled");
}

/// Route ISA IRQ `isa_irq` to `vector` on the core whose local APIC id is
/// `dest_apic_id`, honoring any ACPI interrupt source override.
pub fn route_isa_irq(isa_irq: u8, vector: u8, dest_apic_id: u32) {
    let state = IOAPIC.get().expect("ioapic::init not called");

    let (gsi, polarity, trigger_mode) = state
        .interrupt_source_overrides
        .iter()
        .find(|iso| iso.isa_source == isa_irq)
        .map(|iso| (iso.global_system_interrupt, iso.polarity, iso.trigger_mode))
        .unwrap_or((isa_irq as u32, Polarity::SameAsBus, TriggerMode::SameAsBus));

    let pin = (gsi - state.info.gsi_base) as u8;

    let mut entry_low: u32 = vector as u32;
    if polarity == Polarity::ActiveLow {
        entry_low |= 1 << 13;
    }
    if trigger_mode == TriggerMode::Level {
        entry_low |= 1 << 15;
    }
    let entry_high: u32 = (dest_apic_id & 0xff) << 24;

    let reg_low = IOREDTBL_BASE + pin * 2;
    write_register(state.info.base, reg_low + 1, entry_high);
    write_register(state.info.base, reg_low, entry_low);

    log::info!("ioapic: isa irq {isa_irq} -> gsi {gsi} -> pin {pin} -> vector {vector:#x}, dest apic {dest_apic_id}");
}
