//! GDT/TSS setup, grounded on the grounding kernel's `gdt.rs` almost
//! unchanged — the IST exception stack now comes from
//! [`memory::stack::KernelStack`](crate::memory::stack::KernelStack)
//! instead of a guard-paged mapping.

use crate::arch::cpu_local::get_local;
use crate::memory::stack::{KernelStack, EXCEPTION_HANDLER_STACK_SIZE};
use num_enum::IntoPrimitive;
use x86_64::instructions::segmentation::{Segment, CS, SS};
use x86_64::instructions::tables::load_tss;
use x86_64::registers::segmentation::SegmentSelector;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable};
use x86_64::structures::tss::TaskStateSegment;

#[derive(Debug, IntoPrimitive)]
#[repr(u8)]
pub enum IstStackIndexes {
    Exception,
}

pub struct Gdt {
    gdt: GlobalDescriptorTable,
    kernel_code_selector: SegmentSelector,
    kernel_data_selector: SegmentSelector,
    tss_selector: SegmentSelector,
}

/// Leaked once per core: the exception IST stack must live for the kernel's
/// entire run, same lifetime as the TSS that points at it.
fn leak_exception_stack() -> x86_64::VirtAddr {
    let stack = KernelStack::new(EXCEPTION_HANDLER_STACK_SIZE);
    let top = stack.top();
    core::mem::forget(stack);
    top
}

pub fn init() {
    let local = get_local();
    let tss = local.tss.call_once(|| {
        let mut tss = TaskStateSegment::new();
        tss.interrupt_stack_table[u8::from(IstStackIndexes::Exception) as usize] =
            leak_exception_stack();
        core::cell::UnsafeCell::new(tss)
    });
    let tss_ref = unsafe { &*tss.get() };

    let gdt = local.gdt.call_once(|| {
        let mut gdt = GlobalDescriptorTable::new();
        let kernel_code_selector = gdt.append(Descriptor::kernel_code_segment());
        let kernel_data_selector = gdt.append(Descriptor::kernel_data_segment());
        let tss_selector = gdt.append(Descriptor::tss_segment(tss_ref));
        Gdt {
            gdt,
            kernel_code_selector,
            kernel_data_selector,
            tss_selector,
        }
    });

    gdt.gdt.load();

    unsafe {
        CS::set_reg(gdt.kernel_code_selector);
        SS::set_reg(gdt.kernel_data_selector);
        load_tss(gdt.tss_selector);
    }
}
