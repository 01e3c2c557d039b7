use bitfield_struct::bitfield;
use physmem_addresses::FrameNumber;
use physmem_info::pagemap::{PAGEMAP_PFN_BITS, PAGEMAP_SWAP_TYPE_BITS};

/// One 64-bit `/proc/<pid>/pagemap` record in its raw bitfield form.
///
/// This is the only place the record layout is interpreted. The layout is a
/// kernel ABI (`Documentation/admin-guide/mm/pagemap.rst`) that has grown new
/// flag bits over time; if it changes again, this type is what changes.
///
/// ### Bit layout
///
/// | Bits   | Name                  | Meaning |
/// |--------|-----------------------|---------|
/// | 0–54   | PFN                   | Page frame number, if `present` |
/// | 0–4    | swap type             | If `swapped` |
/// | 5–54   | swap offset           | If `swapped` |
/// | 55     | soft-dirty            | Written since soft-dirty bits were cleared |
/// | 56     | exclusive             | Page mapped exclusively (since 4.2) |
/// | 57     | uffd-wp               | Write-protected by userfaultfd (since 5.13) |
/// | 58     | guard region          | `MADV_GUARD_INSTALL` marker (since 6.15) |
/// | 59–60  | zero                  | |
/// | 61     | file / shared-anon    | File-backed or shared anonymous page |
/// | 62     | swapped               | Page is in swap |
/// | 63     | present               | Page is in RAM |
///
/// ### Notes
/// - Since Linux 4.0 the PFN field reads as zero for callers without
///   `CAP_SYS_ADMIN`; the flag bits stay visible.
/// - A never-touched page of a valid mapping and an address outside any
///   mapping both read as an all-zero record.
///
/// ### Example
/// ```rust
/// # use physmem_pagemap::PagemapEntry;
/// let e = PagemapEntry::from_bits(0xA000_0000_0001_2345);
/// assert!(e.present());
/// assert!(e.file_or_shared_anon());
/// assert_eq!(e.frame_number().map(|f| f.as_u64()), Some(0x1_2345));
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq, Hash)]
pub struct PagemapEntry {
    /// PFN when present, swap type and offset when swapped (bits 0..=54).
    #[bits(55)]
    frame_or_swap_bits: u64,

    /// Soft-dirty (bit 55).
    pub soft_dirty: bool,

    /// Page exclusively mapped (bit 56).
    pub exclusive: bool,

    /// Write-protected through userfaultfd (bit 57).
    pub uffd_write_protected: bool,

    /// Guard region marker (bit 58).
    pub guard_region: bool,

    #[bits(2)]
    __: u8,

    /// File page or shared anonymous page (bit 61).
    pub file_or_shared_anon: bool,

    /// Page is swapped out (bit 62).
    pub swapped: bool,

    /// Page is present in RAM (bit 63).
    pub present: bool,
}

const _: () = assert!(PAGEMAP_PFN_BITS == 55);

impl PagemapEntry {
    /// The frame number, only for present pages.
    #[inline]
    #[must_use]
    pub const fn frame_number(&self) -> Option<FrameNumber> {
        if self.present() {
            Some(FrameNumber::new(self.frame_or_swap_bits()))
        } else {
            None
        }
    }

    /// Swap type, only for swapped pages.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn swap_type(&self) -> Option<u8> {
        if self.swapped() {
            Some((self.frame_or_swap_bits() & ((1 << PAGEMAP_SWAP_TYPE_BITS) - 1)) as u8)
        } else {
            None
        }
    }

    /// Swap offset, only for swapped pages.
    #[inline]
    #[must_use]
    pub const fn swap_offset(&self) -> Option<u64> {
        if self.swapped() {
            Some(self.frame_or_swap_bits() >> PAGEMAP_SWAP_TYPE_BITS)
        } else {
            None
        }
    }
}

/// Result of one page table lookup.
///
/// Recomputed on every translation and never cached: for pageable memory the
/// frame can change the moment after it was read. Only pinned memory (huge
/// pages from the allocator) keeps its frame for the life of the mapping.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct PhysicalFrameInfo {
    entry: PagemapEntry,
}

impl PhysicalFrameInfo {
    /// Decodes a raw pagemap record.
    #[inline]
    #[must_use]
    pub const fn decode(raw: u64) -> Self {
        Self {
            entry: PagemapEntry::from_bits(raw),
        }
    }

    /// The record exactly as read from the kernel.
    #[inline]
    #[must_use]
    pub const fn page_table_entry_raw(&self) -> u64 {
        self.entry.into_bits()
    }

    #[inline]
    #[must_use]
    pub const fn present(&self) -> bool {
        self.entry.present()
    }

    /// `Some` exactly when [`present`](Self::present) is set. A present page
    /// reporting frame zero means the frame was hidden from us.
    #[inline]
    #[must_use]
    pub const fn physical_frame_number(&self) -> Option<FrameNumber> {
        self.entry.frame_number()
    }

    /// All decoded flags.
    #[inline]
    #[must_use]
    pub const fn entry(&self) -> PagemapEntry {
        self.entry
    }
}

impl From<PagemapEntry> for PhysicalFrameInfo {
    fn from(entry: PagemapEntry) -> Self {
        Self { entry }
    }
}
