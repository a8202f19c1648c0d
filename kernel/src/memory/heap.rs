//! Global heap, grounded on the grounding kernel's
//! `memory/global_allocator.rs` almost unchanged: find a USABLE region in
//! the Limine memory map at least [`HEAP_SIZE`] bytes long and claim it
//! through `talc`, read/written through the HHDM offset since paging (and
//! therefore a dedicated heap mapping) is out of scope here.

use crate::limine_requests::hhdm_offset;
use core::mem::MaybeUninit;
use core::ptr::{slice_from_raw_parts_mut, NonNull};
use limine::memory_map::EntryType;
use limine::response::MemoryMapResponse;
use talc::{ErrOnOom, Talc, Talck};

pub const HEAP_SIZE: u64 = 4 * 0x400 * 0x400; // 4 MiB

#[global_allocator]
static GLOBAL_ALLOCATOR: Talck<spin::Mutex<()>, ErrOnOom> =
    Talck::new(Talc::new(ErrOnOom));

/// Claim a USABLE region from the Limine memory map for the global
/// allocator. Must run exactly once, on the bootstrap core, before any
/// allocation.
pub fn init(memory_map: &'static MemoryMapResponse) {
    let region = memory_map
        .entries()
        .iter()
        .find(|entry| entry.entry_type == EntryType::USABLE && entry.length >= HEAP_SIZE)
        .expect("no USABLE region large enough for the kernel heap");

    let virt = region.base + hhdm_offset();
    let slice = NonNull::new(slice_from_raw_parts_mut(
        virt as *mut MaybeUninit<u8>,
        HEAP_SIZE as usize,
    ))
    .unwrap();

    let mut talc = GLOBAL_ALLOCATOR.lock();
    // Safety: `slice` points at memory the Limine memory map reports USABLE
    // and which nothing else claims.
    unsafe { talc.claim(slice.into()) }.expect("failed to claim heap region");
}
