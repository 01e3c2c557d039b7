//! # Virtual and Physical Address Types
//!
//! Strongly typed wrappers for the addresses, frame numbers and page
//! geometries exchanged by the hugepage allocator, the page table translator
//! and the physical memory mapper.
//!
//! ## Overview
//!
//! Userspace DMA code juggles three kinds of integers that are all `u64` at
//! the machine level and all catastrophic when confused: virtual addresses of
//! the calling process, physical addresses handed to devices, and physical
//! frame numbers read back from the kernel. This crate gives each one its own
//! zero-cost type:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`MemoryAddress`] | A raw 64-bit address, either physical or virtual. |
//! | [`VirtualAddress`] | An opaque address in the calling process. Never a pointer. |
//! | [`PhysicalAddress`] | A host RAM or MMIO address. |
//! | [`FrameNumber`] | A page frame number as stored in a page table entry. |
//! | [`HugepageSize`] | A validated `(size, log2(size))` huge page geometry. |
//!
//! ## Page Sizes
//!
//! Three x86-64 page sizes are available as marker types implementing
//! [`PageSize`]:
//!
//! - [`Size4K`] - 4 KiB base pages
//! - [`Size2M`] - 2 MiB huge pages
//! - [`Size1G`] - 1 GiB giant pages
//!
//! The base page size of the running kernel is a runtime value
//! (`sysconf(_SC_PAGESIZE)`), so the address types also offer `*_in(size)` /
//! `*_to(size)` helpers taking the size as an argument.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use physmem_addresses::*;
//! let va = VirtualAddress::new(0x7F00_0020_1234);
//! let page_size = Size4K::SIZE;
//!
//! // Where the page table record for `va` lives in /proc/self/pagemap.
//! let record = va.page_index(page_size) * 8;
//! assert_eq!(record, 0x7F00_0020_1 * 8);
//!
//! // Reassemble a physical address from a frame number read back.
//! let pa = PhysicalAddress::from_frame(FrameNumber::new(0xABCDE), page_size, va.offset_in(page_size));
//! assert_eq!(pa, Some(PhysicalAddress::new(0xABCD_E234)));
//! ```

#![deny(unsafe_code)]

mod frame_number;
mod hugepage_size;
mod memory_address;
mod page_size;
mod physical_address;
mod virtual_address;

pub use frame_number::FrameNumber;
pub use hugepage_size::HugepageSize;
pub use memory_address::MemoryAddress;
pub use page_size::{PageSize, Size1G, Size2M, Size4K};
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

/// Rejected huge page geometry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("huge page size {bytes:#X} is not 2^{power}")]
    SizePowerMismatch { bytes: u64, power: u32 },
    #[error("2^{0} is not a supported huge page size")]
    UnsupportedPower(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_alignment_matches_typed_alignment() {
        let a = MemoryAddress::new(0x0000_7FFF_1234_5678);
        assert_eq!(a.align_down::<Size4K>(), a.align_down_to(Size4K::SIZE));
        assert_eq!(a.align_down::<Size2M>(), a.align_down_to(Size2M::SIZE));
        assert_eq!(a.offset::<Size1G>(), a.offset_in(Size1G::SIZE));
        assert!(!a.is_aligned::<Size4K>());
        assert!(a.align_down::<Size4K>().is_aligned_to(4096));
    }

    #[test]
    fn page_index_and_offset_split_the_address() {
        let va = VirtualAddress::new(0x1234_5678);
        let index = va.page_index(4096);
        let offset = va.offset_in(4096);
        assert_eq!(index, 0x12345);
        assert_eq!(offset, 0x678);
        assert_eq!(index * 4096 + offset, va.as_u64());
    }

    #[test]
    fn frame_round_trips_through_physical_address() {
        let pa = PhysicalAddress::from_frame(FrameNumber::new(0x42), 4096, 0x10).unwrap();
        assert_eq!(pa.as_u64(), 0x42010);
        assert_eq!(pa.frame_number(4096), FrameNumber::new(0x42));
        assert_eq!(pa.offset_in(4096), 0x10);
    }

    #[test]
    fn frame_reassembly_rejects_overflow_and_foreign_offsets() {
        assert_eq!(PhysicalAddress::from_frame(FrameNumber::new(u64::MAX), 4096, 0), None);
        assert_eq!(PhysicalAddress::from_frame(FrameNumber::new(1), 4096, 4096), None);
    }

    #[test]
    fn hugepage_geometry_validation() {
        assert_eq!(HugepageSize::new(2_097_152, 21), Ok(HugepageSize::of::<Size2M>()));
        assert_eq!(HugepageSize::new(1 << 30, 30), Ok(HugepageSize::of::<Size1G>()));
        assert_eq!(
            HugepageSize::new(2_097_152, 22),
            Err(AddressError::SizePowerMismatch { bytes: 2_097_152, power: 22 })
        );
        assert_eq!(HugepageSize::new(4096, 12), Err(AddressError::UnsupportedPower(12)));
        assert_eq!(HugepageSize::from_power(64), Err(AddressError::UnsupportedPower(64)));
    }

    #[test]
    fn powers_past_the_signed_selector_are_rejected() {
        assert_eq!(HugepageSize::from_power(31).map(HugepageSize::bytes), Ok(1 << 31));
        for power in [32, 33, 40, 63] {
            assert_eq!(HugepageSize::from_power(power), Err(AddressError::UnsupportedPower(power)));
        }
        assert_eq!(
            HugepageSize::new(1 << 32, 32),
            Err(AddressError::UnsupportedPower(32))
        );
    }

    #[test]
    fn hugepage_geometry_accessors() {
        let page = HugepageSize::of::<Size2M>();
        assert_eq!(page.bytes(), Size2M::SIZE);
        assert_eq!(page.power(), 21);
        assert_eq!(page.pages_for(0), 1);
        assert_eq!(page.pages_for(Size2M::SIZE), 1);
        assert_eq!(page.pages_for(Size2M::SIZE + 1), 2);
        assert_eq!(page.to_string(), "2M");
        assert_eq!(HugepageSize::of::<Size1G>().to_string(), "1G");
    }

    #[test]
    fn frame_zero_is_the_hidden_frame() {
        assert!(FrameNumber::new(0).is_zero());
        assert!(!FrameNumber::new(1).is_zero());
    }
}
