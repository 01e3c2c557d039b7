use crate::{FrameNumber, MemoryAddress};
use core::fmt;
use core::ops::Add;

/// Physical memory address (host RAM or MMIO).
///
/// A thin wrapper around [`MemoryAddress`] that keeps physical addresses from
/// being mixed up with [`VirtualAddress`](super::VirtualAddress) values. The
/// process can never dereference it directly; it is either handed to a device
/// (DMA descriptors) or mapped through `/dev/mem` first.
///
/// ### Examples
/// ```rust
/// # use physmem_addresses::*;
/// let pa = PhysicalAddress::from_frame(FrameNumber::new(0x1_2345), 4096, 0x42).unwrap();
/// assert_eq!(pa.as_u64(), 0x1234_5042);
/// assert_eq!(pa.frame_number(4096), FrameNumber::new(0x1_2345));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(pub(crate) MemoryAddress);

impl PhysicalAddress {
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

    /// Reassembles `frame * page_size + offset`, or `None` if the result does
    /// not fit 64 bits or `offset` lies outside the page.
    #[inline]
    #[must_use]
    pub const fn from_frame(frame: FrameNumber, page_size: u64, offset: u64) -> Option<Self> {
        if offset >= page_size {
            return None;
        }
        match frame.as_u64().checked_mul(page_size) {
            Some(base) => match base.checked_add(offset) {
                Some(v) => Some(Self::new(v)),
                None => None,
            },
            None => None,
        }
    }

    /// The frame containing this address for a runtime page size.
    #[inline]
    #[must_use]
    pub const fn frame_number(self, page_size: u64) -> FrameNumber {
        debug_assert!(page_size.is_power_of_two(), "page size must be a power of two");
        FrameNumber::new(self.as_u64() >> page_size.trailing_zeros())
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
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}
