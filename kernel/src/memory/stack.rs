//! Kernel stacks, grounded on the grounding kernel's
//! `memory/guarded_stack.rs`. That module carves a guard page plus mapped
//! pages out of a real page-table-backed address space; paging is out of
//! scope here (spec §1 Non-goals), so a stack is just a heap allocation
//! sized and aligned like one — no guard page, so a true stack overflow is
//! undefined behavior here rather than a page fault. Accepted simplification,
//! see `DESIGN.md`.

use alloc::alloc::{alloc, Layout};
use x86_64::VirtAddr;

pub const NORMAL_STACK_SIZE: usize = 64 * 1024;
pub const EXCEPTION_HANDLER_STACK_SIZE: usize = 64 * 1024;

const STACK_ALIGN: usize = 16;

/// An owned, heap-backed kernel stack. Dropping it frees the backing memory;
/// a task's stack must outlive every context switch into it.
#[derive(Debug)]
pub struct KernelStack {
    base: *mut u8,
    size: usize,
}

// Safety: the raw pointer is an owned heap allocation; nothing aliases it.
unsafe impl Send for KernelStack {}
unsafe impl Sync for KernelStack {}

impl KernelStack {
    pub fn new(size: usize) -> Self {
        let layout = Layout::from_size_align(size, STACK_ALIGN).expect("bad stack layout");
        let base = unsafe { alloc(layout) };
        if base.is_null() {
            panic!("out of memory allocating a {size}-byte kernel stack");
        }
        KernelStack { base, size }
    }

    /// The address one past the last byte of the stack: `rsp` starts here.
    pub fn top(&self) -> VirtAddr {
        VirtAddr::new(unsafe { self.base.add(self.size) } as u64)
    }
}

impl Drop for KernelStack {
    fn drop(&mut self) {
        let layout = Layout::from_size_align(self.size, STACK_ALIGN).unwrap();
        unsafe { alloc::alloc::dealloc(self.base, layout) };
    }
}
