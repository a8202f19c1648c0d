//! Saved CPU state and the two ways it changes hands: a voluntary switch
//! between kernel stacks, and the full-GPR save/restore driven by the timer
//! interrupt. Grounded on the grounding kernel's `task/task.rs::CpuContext`
//! (field layout) and `interrupt/handlers.rs::timer_interrupt_handler` (the
//! save/restore asm and its `CTX_*` offset scheme) — simplified by dropping
//! the `swapgs`/ring-3-RPL-fixup/syscall-reentry steps, which exist there
//! only for user-mode tasks and a syscall ABI, both out of scope here.

use core::arch::naked_asm;
use core::mem::offset_of;

/// Full register file saved across an asynchronous (timer-driven) context
/// switch. Field order defines the `CTX_*` byte offsets used by the naked
/// handlers below.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuContext {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,

    // iretq frame, in the order the CPU expects to pop it.
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

const CTX_R15: usize = offset_of!(CpuContext, r15);
const CTX_R14: usize = offset_of!(CpuContext, r14);
const CTX_R13: usize = offset_of!(CpuContext, r13);
const CTX_R12: usize = offset_of!(CpuContext, r12);
const CTX_R11: usize = offset_of!(CpuContext, r11);
const CTX_R10: usize = offset_of!(CpuContext, r10);
const CTX_R9: usize = offset_of!(CpuContext, r9);
const CTX_R8: usize = offset_of!(CpuContext, r8);
const CTX_RBP: usize = offset_of!(CpuContext, rbp);
const CTX_RDI: usize = offset_of!(CpuContext, rdi);
const CTX_RSI: usize = offset_of!(CpuContext, rsi);
const CTX_RDX: usize = offset_of!(CpuContext, rdx);
const CTX_RCX: usize = offset_of!(CpuContext, rcx);
const CTX_RBX: usize = offset_of!(CpuContext, rbx);
const CTX_RAX: usize = offset_of!(CpuContext, rax);
const CTX_RIP: usize = offset_of!(CpuContext, rip);
const CTX_CS: usize = offset_of!(CpuContext, cs);
const CTX_RFLAGS: usize = offset_of!(CpuContext, rflags);
const CTX_RSP: usize = offset_of!(CpuContext, rsp);
const CTX_SS: usize = offset_of!(CpuContext, ss);

pub const KERNEL_CS: u64 = 0x08;
pub const KERNEL_SS: u64 = 0x10;

impl CpuContext {
    /// Initial state for a task whose first instruction is `entry`, running
    /// on `stack_top` with interrupts enabled and ring-0 selectors loaded.
    pub fn new(entry: extern "C" fn() -> !, stack_top: u64) -> Self {
        CpuContext {
            rip: entry as u64,
            rsp: stack_top,
            rflags: 0x202,
            cs: KERNEL_CS,
            ss: KERNEL_SS,
            ..Default::default()
        }
    }
}

/// Timer-interrupt entry point wired into the IDT at
/// [`InterruptVector::LocalApicTimer`](crate::arch::x86_64_impl::InterruptVector::LocalApicTimer).
///
/// On entry the CPU has already pushed the iretq frame. The handler saves
/// every GPR into the interrupted task's [`CpuContext`] (read from the
/// per-core `current_context` slot), calls into
/// [`timer_tick`](super::idt::timer_tick) to run the tick subsystem and pick
/// the next task, then restores whatever [`CpuContext`] it returns — which
/// may be the same task, a different one, or (during boot, before the first
/// task exists) nothing, in which case it just EOIs and returns.
#[unsafe(naked)]
pub extern "C" fn timer_interrupt_handler() {
    naked_asm!(
        "push r11",
        "mov r11, gs:[{ctx_ptr_offset}]",
        "test r11, r11",
        "jz 2f",

        "mov [r11 + {CTX_RAX}], rax",
        "mov [r11 + {CTX_R15}], r15",
        "mov [r11 + {CTX_R14}], r14",
        "mov [r11 + {CTX_R13}], r13",
        "mov [r11 + {CTX_R12}], r12",
        "mov rax, [rsp]",
        "mov [r11 + {CTX_R11}], rax",
        "mov [r11 + {CTX_R10}], r10",
        "mov [r11 + {CTX_R9}], r9",
        "mov [r11 + {CTX_R8}], r8",
        "mov [r11 + {CTX_RDI}], rdi",
        "mov [r11 + {CTX_RSI}], rsi",
        "mov [r11 + {CTX_RBP}], rbp",
        "mov [r11 + {CTX_RBX}], rbx",
        "mov [r11 + {CTX_RDX}], rdx",
        "mov [r11 + {CTX_RCX}], rcx",

        "mov rax, [rsp + 8]",
        "mov [r11 + {CTX_RIP}], rax",
        "mov rax, [rsp + 16]",
        "mov [r11 + {CTX_CS}], rax",
        "mov rax, [rsp + 24]",
        "mov [r11 + {CTX_RFLAGS}], rax",
        "mov rax, [rsp + 32]",
        "mov [r11 + {CTX_RSP}], rax",
        "mov rax, [rsp + 40]",
        "mov [r11 + {CTX_SS}], rax",

        "call {tick}",
        "jmp 5f",

        "2:",
        "call {tick}",
        "test rax, rax",
        "jz 4f",

        "5:",
        "mov gs:[{ctx_ptr_offset}], rax",
        "mov r11, rax",

        "mov rax, [r11 + {CTX_RIP}]",
        "mov [rsp + 8], rax",
        "mov rax, [r11 + {CTX_CS}]",
        "mov [rsp + 16], rax",
        "mov rax, [r11 + {CTX_RFLAGS}]",
        "mov [rsp + 24], rax",
        "mov rax, [r11 + {CTX_RSP}]",
        "mov [rsp + 32], rax",
        "mov rax, [r11 + {CTX_SS}]",
        "mov [rsp + 40], rax",

        "mov r15, [r11 + {CTX_R15}]",
        "mov r14, [r11 + {CTX_R14}]",
        "mov r13, [r11 + {CTX_R13}]",
        "mov r12, [r11 + {CTX_R12}]",
        "mov r10, [r11 + {CTX_R10}]",
        "mov r9, [r11 + {CTX_R9}]",
        "mov r8, [r11 + {CTX_R8}]",
        "mov rdi, [r11 + {CTX_RDI}]",
        "mov rsi, [r11 + {CTX_RSI}]",
        "mov rbp, [r11 + {CTX_RBP}]",
        "mov rbx, [r11 + {CTX_RBX}]",
        "mov rdx, [r11 + {CTX_RDX}]",
        "mov rcx, [r11 + {CTX_RCX}]",
        "mov rax, [r11 + {CTX_RAX}]",
        "mov r11, [r11 + {CTX_R11}]",

        "add rsp, 8",
        "iretq",

        "4:",
        "pop r11",
        "iretq",

        tick = sym super::idt::timer_tick,
        ctx_ptr_offset = const super::cpu_local::CURRENT_CONTEXT_PTR_OFFSET,
        CTX_R15 = const CTX_R15,
        CTX_R14 = const CTX_R14,
        CTX_R13 = const CTX_R13,
        CTX_R12 = const CTX_R12,
        CTX_R11 = const CTX_R11,
        CTX_R10 = const CTX_R10,
        CTX_R9 = const CTX_R9,
        CTX_R8 = const CTX_R8,
        CTX_RDI = const CTX_RDI,
        CTX_RSI = const CTX_RSI,
        CTX_RBP = const CTX_RBP,
        CTX_RBX = const CTX_RBX,
        CTX_RDX = const CTX_RDX,
        CTX_RCX = const CTX_RCX,
        CTX_RAX = const CTX_RAX,
        CTX_RIP = const CTX_RIP,
        CTX_CS = const CTX_CS,
        CTX_RFLAGS = const CTX_RFLAGS,
        CTX_RSP = const CTX_RSP,
        CTX_SS = const CTX_SS,
    );
}

/// Software-interrupt entry point wired into the IDT at
/// [`InterruptVector::Reschedule`](crate::arch::x86_64_impl::InterruptVector::Reschedule),
/// triggered with `int` by [`crate::sched::yield_now`] and
/// [`crate::sched::block_current`] to force an immediate, synchronous
/// reschedule without waiting for the next timer tick. Byte-for-byte the
/// same save/restore shape as [`timer_interrupt_handler`], just wired to
/// [`crate::sched::reschedule_entry`] instead of the tick path, so a
/// voluntary switch never charges the outgoing task's time slice or touches
/// the tick counter.
#[unsafe(naked)]
pub extern "C" fn reschedule_interrupt_handler() {
    naked_asm!(
        "push r11",
        "mov r11, gs:[{ctx_ptr_offset}]",
        "test r11, r11",
        "jz 2f",

        "mov [r11 + {CTX_RAX}], rax",
        "mov [r11 + {CTX_R15}], r15",
        "mov [r11 + {CTX_R14}], r14",
        "mov [r11 + {CTX_R13}], r13",
        "mov [r11 + {CTX_R12}], r12",
        "mov rax, [rsp]",
        "mov [r11 + {CTX_R11}], rax",
        "mov [r11 + {CTX_R10}], r10",
        "mov [r11 + {CTX_R9}], r9",
        "mov [r11 + {CTX_R8}], r8",
        "mov [r11 + {CTX_RDI}], rdi",
        "mov [r11 + {CTX_RSI}], rsi",
        "mov [r11 + {CTX_RBP}], rbp",
        "mov [r11 + {CTX_RBX}], rbx",
        "mov [r11 + {CTX_RDX}], rdx",
        "mov [r11 + {CTX_RCX}], rcx",

        "mov rax, [rsp + 8]",
        "mov [r11 + {CTX_RIP}], rax",
        "mov rax, [rsp + 16]",
        "mov [r11 + {CTX_CS}], rax",
        "mov rax, [rsp + 24]",
        "mov [r11 + {CTX_RFLAGS}], rax",
        "mov rax, [rsp + 32]",
        "mov [r11 + {CTX_RSP}], rax",
        "mov rax, [rsp + 40]",
        "mov [r11 + {CTX_SS}], rax",

        "call {resched}",
        "jmp 5f",

        "2:",
        "call {resched}",
        "test rax, rax",
        "jz 4f",

        "5:",
        "mov gs:[{ctx_ptr_offset}], rax",
        "mov r11, rax",

        "mov rax, [r11 + {CTX_RIP}]",
        "mov [rsp + 8], rax",
        "mov rax, [r11 + {CTX_CS}]",
        "mov [rsp + 16], rax",
        "mov rax, [r11 + {CTX_RFLAGS}]",
        "mov [rsp + 24], rax",
        "mov rax, [r11 + {CTX_RSP}]",
        "mov [rsp + 32], rax",
        "mov rax, [r11 + {CTX_SS}]",
        "mov [rsp + 40], rax",

        "mov r15, [r11 + {CTX_R15}]",
        "mov r14, [r11 + {CTX_R14}]",
        "mov r13, [r11 + {CTX_R13}]",
        "mov r12, [r11 + {CTX_R12}]",
        "mov r10, [r11 + {CTX_R10}]",
        "mov r9, [r11 + {CTX_R9}]",
        "mov r8, [r11 + {CTX_R8}]",
        "mov rdi, [r11 + {CTX_RDI}]",
        "mov rsi, [r11 + {CTX_RSI}]",
        "mov rbp, [r11 + {CTX_RBP}]",
        "mov rbx, [r11 + {CTX_RBX}]",
        "mov rdx, [r11 + {CTX_RDX}]",
        "mov rcx, [r11 + {CTX_RCX}]",
        "mov rax, [r11 + {CTX_RAX}]",
        "mov r11, [r11 + {CTX_R11}]",

        "add rsp, 8",
        "iretq",

        "4:",
        "pop r11",
        "iretq",

        resched = sym crate::sched::reschedule_entry,
        ctx_ptr_offset = const super::cpu_local::CURRENT_CONTEXT_PTR_OFFSET,
        CTX_R15 = const CTX_R15,
        CTX_R14 = const CTX_R14,
        CTX_R13 = const CTX_R13,
        CTX_R12 = const CTX_R12,
        CTX_R11 = const CTX_R11,
        CTX_R10 = const CTX_R10,
        CTX_R9 = const CTX_R9,
        CTX_R8 = const CTX_R8,
        CTX_RDI = const CTX_RDI,
        CTX_RSI = const CTX_RSI,
        CTX_RBP = const CTX_RBP,
        CTX_RBX = const CTX_RBX,
        CTX_RDX = const CTX_RDX,
        CTX_RCX = const CTX_RCX,
        CTX_RAX = const CTX_RAX,
        CTX_RIP = const CTX_RIP,
        CTX_CS = const CTX_CS,
        CTX_RFLAGS = const CTX_RFLAGS,
        CTX_RSP = const CTX_RSP,
        CTX_SS = const CTX_SS,
    );
}

/// Load `context` and enter it via `iretq`. Used once per core to launch its
/// first task (idle or otherwise) after the boot stack is done with.
///
/// # Safety
/// `context` must point at a valid, live [`CpuContext`]; this never returns.
#[unsafe(naked)]
pub unsafe extern "C" fn load_context_and_iretq(context: *const CpuContext) -> ! {
    naked_asm!(
        "mov r11, rdi",
        "sub rsp, 40",
        "mov rax, [r11 + {CTX_RIP}]",
        "mov [rsp], rax",
        "mov rax, [r11 + {CTX_CS}]",
        "mov [rsp + 8], rax",
        "mov rax, [r11 + {CTX_RFLAGS}]",
        "mov [rsp + 16], rax",
        "mov rax, [r11 + {CTX_RSP}]",
        "mov [rsp + 24], rax",
        "mov rax, [r11 + {CTX_SS}]",
        "mov [rsp + 32], rax",

        "mov r15, [r11 + {CTX_R15}]",
        "mov r14, [r11 + {CTX_R14}]",
        "mov r13, [r11 + {CTX_R13}]",
        "mov r12, [r11 + {CTX_R12}]",
        "mov r10, [r11 + {CTX_R10}]",
        "mov r9, [r11 + {CTX_R9}]",
        "mov r8, [r11 + {CTX_R8}]",
        "mov rdi, [r11 + {CTX_RDI}]",
        "mov rsi, [r11 + {CTX_RSI}]",
        "mov rbp, [r11 + {CTX_RBP}]",
        "mov rbx, [r11 + {CTX_RBX}]",
        "mov rdx, [r11 + {CTX_RDX}]",
        "mov rcx, [r11 + {CTX_RCX}]",
        "mov rax, [r11 + {CTX_RAX}]",
        "mov r11, [r11 + {CTX_R11}]",

        "iretq",

        CTX_R15 = const CTX_R15,
        CTX_R14 = const CTX_R14,
        CTX_R13 = const CTX_R13,
        CTX_R12 = const CTX_R12,
        CTX_R11 = const CTX_R11,
        CTX_R10 = const CTX_R10,
        CTX_R9 = const CTX_R9,
        CTX_R8 = const CTX_R8,
        CTX_RDI = const CTX_RDI,
        CTX_RSI = const CTX_RSI,
        CTX_RBP = const CTX_RBP,
        CTX_RBX = const CTX_RBX,
        CTX_RDX = const CTX_RDX,
        CTX_RCX = const CTX_RCX,
        CTX_RAX = const CTX_RAX,
        CTX_RIP = const CTX_RIP,
        CTX_CS = const CTX_CS,
        CTX_RFLAGS = const CTX_RFLAGS,
        CTX_RSP = const CTX_RSP,
        CTX_SS = const CTX_SS,
    )
}
