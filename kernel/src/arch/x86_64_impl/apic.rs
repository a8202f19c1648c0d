//! Local APIC bring-up, grounded on the grounding kernel's `apic.rs`. That
//! module maps the xAPIC MMIO window through a real page table when x2APIC
//! isn't available; paging is out of scope here, so the mapping is just the
//! HHDM offset applied to the physical address (spec §1 Non-goals; see
//! `DESIGN.md`).

use crate::arch::cpu_local::get_local;
use crate::arch::x86_64_impl::idt::InterruptVector;
use crate::limine_requests::hhdm_offset;
use acpi::platform::InterruptModel;
use acpi::AcpiTables;
use core::cell::UnsafeCell;
use force_send_sync::SendSync;
use raw_cpuid::CpuId;
use spin::Once;
use x2apic::lapic::LocalApicBuilder;
use x86_64::registers::model_specific::Msr;
use x86_64::VirtAddr;

const IA32_X2APIC_SVR: u32 = 0x80f;

pub enum LocalApicAccess {
    RegisterBased,
    Mmio(VirtAddr),
}

pub static LOCAL_APIC_ACCESS: Once<LocalApicAccess> = Once::new();

/// Determine how this machine's local APIC is reached. Must run once, on
/// the bootstrap processor, before [`init_local_apic`] runs anywhere.
pub fn init_bsp(acpi_tables: &AcpiTables<impl acpi::Handler>) {
    let apic = match InterruptModel::new(acpi_tables).unwrap().0 {
        InterruptModel::Apic(apic) => apic,
        other => panic!("unsupported interrupt model: {other:#?}"),
    };
    LOCAL_APIC_ACCESS.call_once(|| {
        if cpu_has_x2apic() {
            log::info!("x2apic support enabled");
            LocalApicAccess::RegisterBased
        } else {
            log::info!("x2apic support disabled, using MMIO at HHDM offset");
            let virt = hhdm_offset() + apic.local_apic_address;
            LocalApicAccess::Mmio(VirtAddr::new(virt))
        }
    });
}

/// Must be called on every core after [`init_bsp`] has run once.
pub fn init_local_apic() {
    get_local().local_apic.call_once(|| {
        let local_apic = {
            let mut builder = LocalApicBuilder::new();
            if let LocalApicAccess::Mmio(address) = LOCAL_APIC_ACCESS.get().unwrap() {
                builder.set_xapic_base(address.as_u64());
            }
            builder.spurious_vector(u8::from(InterruptVector::LocalApicSpurious).into());
            builder.error_vector(u8::from(InterruptVector::LocalApicError).into());
            builder.timer_vector(u8::from(InterruptVector::LocalApicTimer).into());

            let mut local_apic = builder.build().expect("bad local apic configuration");
            unsafe { local_apic.enable() };
            local_apic
        };
        UnsafeCell::new(unsafe { SendSync::new(local_apic) })
    });
}

fn cpu_has_x2apic() -> bool {
    CpuId::new()
        .get_feature_info()
        .is_some_and(|info| info.has_x2apic())
}

pub fn is_enabled() -> bool {
    unsafe { Msr::new(IA32_X2APIC_SVR).read() & (1 << 8) != 0 }
}

/// Send a fixed-vector IPI to the core whose local APIC id is `target_apic_id`
/// (spec §4.4, §5 — the only way one core can force another to reschedule).
pub fn send_fixed_ipi(target_apic_id: u32, vector: u8) {
    match LOCAL_APIC_ACCESS.get().expect("apic::init_bsp not called") {
        LocalApicAccess::RegisterBased => {
            let icr = ((target_apic_id as u64) << 32) | vector as u64;
            unsafe { Msr::new(0x830).write(icr) };
        }
        LocalApicAccess::Mmio(base) => {
            let base = base.as_u64();
            unsafe {
                core::ptr::write_volatile((base + 0x310) as *mut u32, target_apic_id << 24);
                core::ptr::write_volatile((base + 0x300) as *mut u32, vector as u32);
            }
        }
    }
}
