//! # Huge Page Geometry
//!
//! `mmap(2)` selects the huge page size of a `MAP_HUGETLB` mapping through a
//! six-bit field holding `log2(page size)`, placed at bit [`MAP_HUGE_SHIFT`]
//! of the flags argument. A zero field selects the system default size.

/// Bit offset of the huge page size selector in the `mmap(2)` flags.
pub const MAP_HUGE_SHIFT: u32 = 26;

/// Mask of the huge page size selector (applied before shifting).
pub const MAP_HUGE_MASK: u32 = 0x3f;

/// Largest huge page power whose selector leaves the sign bit of the
/// `c_int` flags argument clear.
pub const MAX_HUGEPAGE_SIZE_POWER: u32 = 31;

/// log2 of the base page size on every architecture we support.
pub const BASE_PAGE_SHIFT: u32 = 12;

/// log2 of the 2 MiB huge page.
pub const DEFAULT_HUGEPAGE_SIZE_POWER: u32 = 21;

/// The 2 MiB huge page, the size every x86-64 kernel provides.
pub const DEFAULT_HUGEPAGE_SIZE: u64 = 1 << DEFAULT_HUGEPAGE_SIZE_POWER;

/// log2 of the 1 GiB giant page.
pub const GIGANTIC_HUGEPAGE_SIZE_POWER: u32 = 30;

/// The 1 GiB giant page; usually only reservable at boot.
pub const GIGANTIC_HUGEPAGE_SIZE: u64 = 1 << GIGANTIC_HUGEPAGE_SIZE_POWER;

const _: () = {
    assert!(DEFAULT_HUGEPAGE_SIZE_POWER > BASE_PAGE_SHIFT);
    assert!(GIGANTIC_HUGEPAGE_SIZE_POWER > DEFAULT_HUGEPAGE_SIZE_POWER);
    assert!(GIGANTIC_HUGEPAGE_SIZE_POWER <= MAX_HUGEPAGE_SIZE_POWER);
    assert!(MAX_HUGEPAGE_SIZE_POWER <= MAP_HUGE_MASK);
    assert!((MAX_HUGEPAGE_SIZE_POWER << MAP_HUGE_SHIFT) <= i32::MAX as u32);
};
