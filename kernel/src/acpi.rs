//! ACPI table access, grounded on the grounding kernel's `acpi.rs`. That
//! handler maps physical regions through a real page table; since paging is
//! out of scope here, every physical address is just read through the HHDM
//! offset instead (spec §1 Non-goals; see `DESIGN.md`). AML evaluation is
//! stubbed exactly as it was in the grounding kernel — nothing in this
//! kernel needs it, MADT parsing alone drives APIC/IOAPIC bring-up.

use crate::limine_requests::hhdm_offset;
use acpi::aml::AmlError;
use acpi::{AcpiTables, Handle, PciAddress, PhysicalMapping};
use core::marker::PhantomData;
use core::ptr::NonNull;
use limine::response::RsdpResponse;

#[derive(Debug, Clone)]
struct KernelAcpiHandler {
    phantom: PhantomData<NonNull<()>>,
}

impl acpi::Handler for KernelAcpiHandler {
    unsafe fn map_physical_region<T>(
        &self,
        physical_address: usize,
        size: usize,
    ) -> PhysicalMapping<Self, T> {
        let virtual_start = physical_address as u64 + hhdm_offset();
        PhysicalMapping {
            physical_start: physical_address,
            virtual_start: NonNull::new(virtual_start as *mut T).unwrap(),
            region_length: size,
            mapped_length: size,
            handler: self.clone(),
        }
    }

    fn unmap_physical_region<T>(_region: &PhysicalMapping<Self, T>) {}

    fn read_u8(&self, _address: usize) -> u8 {
        todo!()
    }
    fn read_u16(&self, _address: usize) -> u16 {
        todo!()
    }
    fn read_u32(&self, _address: usize) -> u32 {
        todo!()
    }
    fn read_u64(&self, _address: usize) -> u64 {
        todo!()
    }
    fn write_u8(&self, _address: usize, _value: u8) {
        todo!()
    }
    fn write_u16(&self, _address: usize, _value: u16) {
        todo!()
    }
    fn write_u32(&self, _address: usize, _value: u32) {
        todo!()
    }
    fn write_u64(&self, _address: usize, _value: u64) {
        todo!()
    }
    fn read_io_u8(&self, _port: u16) -> u8 {
        todo!()
    }
    fn read_io_u16(&self, _port: u16) -> u16 {
        todo!()
    }
    fn read_io_u32(&self, _port: u16) -> u32 {
        todo!()
    }
    fn write_io_u8(&self, _port: u16, _value: u8) {
        todo!()
    }
    fn write_io_u16(&self, _port: u16, _value: u16) {
        todo!()
    }
    fn write_io_u32(&self, _port: u16, _value: u32) {
        todo!()
    }
    fn read_pci_u8(&self, _address: PciAddress, _offset: u16) -> u8 {
        todo!()
    }
    fn read_pci_u16(&self, _address: PciAddress, _offset: u16) -> u16 {
        todo!()
    }
    fn read_pci_u32(&self, _address: PciAddress, _offset: u16) -> u32 {
        todo!()
    }
    fn write_pci_u8(&self, _address: PciAddress, _offset: u16, _value: u8) {
        todo!()
    }
    fn write_pci_u16(&self, _address: PciAddress, _offset: u16, _value: u16) {
        todo!()
    }
    fn write_pci_u32(&self, _address: PciAddress, _offset: u16, _value: u32) {
        todo!()
    }
    fn nanos_since_boot(&self) -> u64 {
        todo!()
    }
    fn stall(&self, _microseconds: u64) {
        todo!()
    }
    fn sleep(&self, _milliseconds: u64) {
        todo!()
    }
    fn create_mutex(&self) -> Handle {
        todo!()
    }
    fn acquire(&self, _mutex: Handle, _timeout: u16) -> Result<(), AmlError> {
        todo!()
    }
    fn release(&self, _mutex: Handle) {
        todo!()
    }
}

pub fn parse(rsdp: &RsdpResponse) -> AcpiTables<impl acpi::Handler> {
    unsafe {
        AcpiTables::from_rsdp(
            KernelAcpiHandler {
                phantom: PhantomData,
            },
            rsdp.address(),
        )
    }
    .expect("failed to parse ACPI tables")
}
