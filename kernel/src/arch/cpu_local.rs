//! Per-core CPU record (spec §3 "CPU record"), reached through the `GS`
//! segment base exactly as the teacher kernel's `memory::cpu_local_data`
//! does. All fields except `current_task` are touched only by the owning
//! core; `current_task` is read by other cores to decide whether an IPI is
//! worth sending (spec §4.4).

use crate::arch::x86_64_impl::context::CpuContext;
use crate::task::TaskId;
use alloc::boxed::Box;
use core::cell::Cell;
use core::mem::offset_of;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};
use force_send_sync::SendSync;
use spin::{Lazy, Once};
use x2apic::lapic::LocalApic;
use x86_64::registers::model_specific::GsBase;
use x86_64::structures::idt::InterruptDescriptorTable;
use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;

use core::cell::UnsafeCell;

const NO_TASK: u64 = u64::MAX;

pub struct CpuLocalData {
    pub kernel_id: u32,
    pub local_apic_id: u32,

    pub gdt: Once<super::x86_64_impl::gdt::Gdt>,
    pub tss: Once<UnsafeCell<TaskStateSegment>>,
    pub idt: Once<InterruptDescriptorTable>,
    pub local_apic: Once<UnsafeCell<SendSync<LocalApic>>>,

    /// Stack pointer of this core's dedicated scheduler context (spec §4.3:
    /// "a per-CPU bootstrap stack"). Set once during scheduler init.
    pub scheduler_sp: Cell<u64>,

    /// Raw pointer to the currently-running task's embedded [`CpuContext`],
    /// read and written directly by `gs:[CURRENT_CONTEXT_PTR_OFFSET]` inside
    /// the naked timer-interrupt handler. Only ever touched by the owning
    /// core, always with interrupts disabled while it changes; the `Arc<Task>`
    /// it points into is kept alive by the run queue / `TASK_TABLE`.
    current_context: Cell<*mut CpuContext>,

    /// Currently running task on this core, `None` if none (idle path).
    /// Atomic: other cores read this for IPI-targeting decisions (spec
    /// §4.4). This is the arena-addressed counterpart of `current_context`;
    /// cross-core code must go through this, never through the raw pointer.
    current_task: AtomicU64,

    /// ISR nesting depth (spec §3 CPU record).
    pub isr_depth: Cell<u32>,
    /// IRQ number of the innermost interrupt currently being serviced on
    /// this core; meaningless when `isr_depth` is 0.
    pub current_irq: Cell<u32>,
    /// Interrupt-save nesting depth (spec §4.1).
    pub irq_save_depth: Cell<u32>,
    /// Interrupt-enabled flag captured by the first nested `irq_save`.
    pub irq_saved_enabled: Cell<bool>,
}

// Safety: every field is either per-CPU-only (accessed solely by the owning
// core through GS) or an atomic/Once that is internally synchronized.
unsafe impl Sync for CpuLocalData {}

/// Byte offset of `current_context` within [`CpuLocalData`], baked into the
/// naked timer-interrupt handler as `gs:[CURRENT_CONTEXT_PTR_OFFSET]` (`GS`
/// base points at this core's `CpuLocalData`, see [`write_gs_base`]).
pub const CURRENT_CONTEXT_PTR_OFFSET: usize = offset_of!(CpuLocalData, current_context);

impl CpuLocalData {
    pub fn current_task(&self) -> Option<TaskId> {
        let raw = self.current_task.load(Ordering::Acquire);
        if raw == NO_TASK {
            None
        } else {
            Some(TaskId::from_raw(raw))
        }
    }

    pub fn current_context(&self) -> *mut CpuContext {
        self.current_context.get()
    }

    /// Record `task` as the one now running on this core, along with a
    /// pointer to its embedded context. Must be called with interrupts
    /// disabled.
    pub fn set_current(&self, task: Option<TaskId>, context: *mut CpuContext) {
        let raw = task.map_or(NO_TASK, |t| t.raw());
        self.current_task.store(raw, Ordering::Release);
        self.current_context.set(context);
    }

    /// Safety: must only be called with interrupts disabled, to update the
    /// ring-0 stack used on the next interrupt from ring 3.
    pub unsafe fn set_tss_rsp0(&self, rsp0: u64) {
        let tss = unsafe { &mut *self.tss.get().unwrap().get() };
        tss.privilege_stack_table[0] = VirtAddr::new(rsp0);
    }
}

static CPU_LOCAL_DATA: Lazy<Box<[Once<CpuLocalData>]>> =
    Lazy::new(|| (0..cpu_count_from_mp()).map(|_| Once::new()).collect());

fn cpu_count_from_mp() -> usize {
    crate::limine_requests::MP_REQUEST
        .get_response()
        .expect("expected MP response")
        .cpus()
        .len()
}

pub fn cpus_count() -> usize {
    CPU_LOCAL_DATA.len()
}

fn write_gs_base(ptr: &'static CpuLocalData) {
    unsafe {
        GsBase::write(VirtAddr::from_ptr(ptr));
    }
}

fn init_cpu(kernel_id: u32, local_apic_id: u32) {
    write_gs_base(CPU_LOCAL_DATA[kernel_id as usize].call_once(|| CpuLocalData {
        kernel_id,
        local_apic_id,
        gdt: Once::new(),
        tss: Once::new(),
        idt: Once::new(),
        local_apic: Once::new(),
        scheduler_sp: Cell::new(0),
        current_context: Cell::new(core::ptr::null_mut()),
        current_task: AtomicU64::new(NO_TASK),
        isr_depth: Cell::new(0),
        current_irq: Cell::new(0),
        irq_save_depth: Cell::new(0),
        irq_saved_enabled: Cell::new(false),
    }))
}

pub fn local_apic_id_of(kernel_assigned_id: u32) -> u32 {
    CPU_LOCAL_DATA[kernel_assigned_id as usize]
        .get()
        .unwrap()
        .local_apic_id
}

/// Look up another core's record by its kernel-assigned id, used by the
/// scheduler to decide whether a cross-core wakeup IPI is worth sending
/// (spec §4.4, §5). `None` if that core hasn't booted this far yet.
pub fn get(kernel_id: u32) -> Option<&'static CpuLocalData> {
    CPU_LOCAL_DATA.get(kernel_id as usize).and_then(Once::get)
}

pub fn try_get_local() -> Option<&'static CpuLocalData> {
    let ptr = NonNull::new(GsBase::read().as_mut_ptr::<CpuLocalData>())?;
    // Safety: GsBase is only ever written by `write_gs_base` with a pointer
    // into a `'static` slot of `CPU_LOCAL_DATA`.
    unsafe { Some(ptr.as_ref()) }
}

pub fn get_local() -> &'static CpuLocalData {
    try_get_local().expect("GS base not initialized on this core")
}

/// Initialize CPU-local data for the bootstrap processor. Must run before
/// any other core boots.
pub fn init_bsp() {
    let mp = crate::limine_requests::MP_REQUEST.get_response().unwrap();
    init_cpu(0, mp.bsp_lapic_id());
}

/// Initialize CPU-local data for an application processor entering through
/// `ap_entry`.
pub fn init_ap(lapic_id: u32) {
    let mp = crate::limine_requests::MP_REQUEST.get_response().unwrap();
    let bsp = mp.bsp_lapic_id();
    let kernel_id = mp
        .cpus()
        .iter()
        .filter(|cpu| cpu.lapic_id != bsp)
        .position(|cpu| cpu.lapic_id == lapic_id)
        .expect("AP lapic id not present in MP response") as u32
        + 1;
    init_cpu(kernel_id, lapic_id);
}
