use limine::BaseRevision;
use limine::mp::RequestFlags;
use limine::request::{
    HhdmRequest, MemoryMapRequest, MpRequest, RequestsEndMarker, RequestsStartMarker, RsdpRequest,
};

#[used]
#[unsafe(link_section = ".requests")]
pub static BASE_REVISION: BaseRevision = BaseRevision::new();

#[used]
#[unsafe(link_section = ".requests")]
pub static MP_REQUEST: MpRequest = MpRequest::new().with_flags(RequestFlags::X2APIC);

#[used]
#[unsafe(link_section = ".requests")]
pub static MEMORY_MAP_REQUEST: MemoryMapRequest = MemoryMapRequest::new();

#[used]
#[unsafe(link_section = ".requests")]
pub static HHDM_REQUEST: HhdmRequest = HhdmRequest::new();

#[used]
#[unsafe(link_section = ".requests")]
pub static RSDP_REQUEST: RsdpRequest = RsdpRequest::new();

#[used]
#[unsafe(link_section = ".requests_start_marker")]
static _START_MARKER: RequestsStartMarker = RequestsStartMarker::new();
#[used]
#[unsafe(link_section = ".requests_end_marker")]
static _END_MARKER: RequestsEndMarker = RequestsEndMarker::new();

/// HHDM (higher-half direct map) offset: `phys + hhdm_offset()` is readable
/// and writable for any physical address Limine handed us, including the
/// local APIC / IOAPIC MMIO windows. Used instead of a full virtual-memory
/// subsystem (paging is out of scope — spec §1 Non-goals).
pub fn hhdm_offset() -> u64 {
    HHDM_REQUEST.get_response().unwrap().offset()
}
