use crate::{MemoryAddress, PageSize};
use core::fmt;
use core::ops::Add;

/// Virtual memory address in the calling process.
///
/// This is the opaque form in which addresses cross the API: a plain 64-bit
/// integer, never a pointer. It can be compared, offset, and handed to the
/// translator or to NUMA queries, but not dereferenced. An address taken from
/// a mapped region is meaningful only while that region is alive; after the
/// region is released the value is stale and any translation of it reflects
/// whatever the kernel maps there next (usually nothing).
///
/// ### Examples
/// ```rust
/// # use physmem_addresses::*;
/// let va = VirtualAddress::new(0x7F12_3456_7ABC);
/// assert_eq!(va.page_index(4096), 0x7F12_3456_7);
/// assert_eq!(va.offset_in(4096), 0xABC);
/// assert_eq!(va.align_down::<Size2M>().as_u64(), 0x7F12_3440_0000);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(pub(crate) MemoryAddress);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(MemoryAddress::from_ptr(ptr))
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }

    /// Index of the runtime-sized page containing this address, i.e. the
    /// virtual page number when `page_size` is the base page size.
    #[inline]
    #[must_use]
    pub const fn page_index(self, page_size: u64) -> u64 {
        debug_assert!(page_size.is_power_of_two(), "page size must be a power of two");
        self.as_u64() >> page_size.trailing_zeros()
    }

    #[inline]
    #[must_use]
    pub const fn offset_in(self, page_size: u64) -> u64 {
        self.0.offset_in(page_size)
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned_to(self, page_size: u64) -> bool {
        self.0.is_aligned_to(page_size)
    }

    #[inline]
    #[must_use]
    pub const fn align_down<S: PageSize>(self) -> Self {
        Self(self.0.align_down::<S>())
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(a) => Some(Self(a)),
            None => None,
        }
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<VirtualAddress> for u64 {
    #[inline]
    fn from(va: VirtualAddress) -> Self {
        va.as_u64()
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}
