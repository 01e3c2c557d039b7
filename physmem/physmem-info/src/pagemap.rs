//! # Pagemap Record Geometry
//!
//! See `Documentation/admin-guide/mm/pagemap.rst` in the kernel tree.

/// Size in bytes of one pagemap record.
pub const PAGEMAP_ENTRY_SIZE: usize = 8;

/// Number of low bits holding the page frame number of a present page.
pub const PAGEMAP_PFN_BITS: u32 = 55;

/// Number of low bits holding the swap type of a swapped page.
pub const PAGEMAP_SWAP_TYPE_BITS: u32 = 5;

const _: () = {
    assert!(PAGEMAP_ENTRY_SIZE == size_of::<u64>());
    assert!(PAGEMAP_SWAP_TYPE_BITS < PAGEMAP_PFN_BITS);
    assert!(PAGEMAP_PFN_BITS < u64::BITS);
};
