use crate::{AddressError, PageSize};
use core::fmt;
use physmem_info::hugepages::{BASE_PAGE_SHIFT, MAX_HUGEPAGE_SIZE_POWER};

/// Runtime huge page geometry: a byte size together with its `log2`.
///
/// Callers of the allocator describe a huge page by its size *and* its power
/// because the kernel wants the power inside the `mmap(2)` flags. Keeping both
/// in one validated value means the two can never disagree once constructed.
///
/// ### Invariants
/// - `bytes() == 1 << power()`
/// - `BASE_PAGE_SHIFT < power() <= 31`, so the `MAP_HUGE_*` selector fits a
///   non-negative `c_int`.
///
/// ### Examples
/// ```rust
/// # use physmem_addresses::*;
/// let two_mib = HugepageSize::new(2_097_152, 21).unwrap();
/// assert_eq!(two_mib, HugepageSize::of::<Size2M>());
///
/// assert!(HugepageSize::new(2_097_152, 20).is_err());
/// ```
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct HugepageSize {
    power: u32,
}

impl HugepageSize {
    /// Validates a `(hugepage_size, hugepage_size_power)` pair.
    ///
    /// # Errors
    /// - [`AddressError::UnsupportedPower`] if `power` is not a huge page shift.
    /// - [`AddressError::SizePowerMismatch`] if `bytes != 1 << power`.
    pub const fn new(bytes: u64, power: u32) -> Result<Self, AddressError> {
        let Ok(page) = Self::from_power(power) else {
            return Err(AddressError::UnsupportedPower(power));
        };
        if page.bytes() != bytes {
            return Err(AddressError::SizePowerMismatch { bytes, power });
        }
        Ok(page)
    }

    /// Geometry from the power alone.
    ///
    /// # Errors
    /// [`AddressError::UnsupportedPower`] if `power` is not larger than the base
    /// page shift or exceeds [`MAX_HUGEPAGE_SIZE_POWER`].
    pub const fn from_power(power: u32) -> Result<Self, AddressError> {
        if power <= BASE_PAGE_SHIFT || power > MAX_HUGEPAGE_SIZE_POWER {
            return Err(AddressError::UnsupportedPower(power));
        }
        Ok(Self { power })
    }

    /// Geometry of a statically known huge page size.
    #[inline]
    #[must_use]
    pub const fn of<S: PageSize>() -> Self {
        const {
            assert!(S::SHIFT > BASE_PAGE_SHIFT, "not a huge page size");
            assert!(S::SHIFT <= MAX_HUGEPAGE_SIZE_POWER);
        };
        Self { power: S::SHIFT }
    }

    #[inline]
    #[must_use]
    pub const fn bytes(self) -> u64 {
        1_u64 << self.power
    }

    #[inline]
    #[must_use]
    pub const fn power(self) -> u32 {
        self.power
    }

    /// Number of huge pages needed to hold `len` bytes (at least one).
    #[inline]
    #[must_use]
    pub const fn pages_for(self, len: u64) -> u64 {
        let pages = len.div_ceil(self.bytes());
        if pages == 0 { 1 } else { pages }
    }
}

impl fmt::Debug for HugepageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HugepageSize(2^{} = {:#X})", self.power, self.bytes())
    }
}

impl fmt::Display for HugepageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.bytes();
        match self.power {
            30.. => write!(f, "{}G", bytes >> 30),
            20.. => write!(f, "{}M", bytes >> 20),
            _ => write!(f, "{}K", bytes >> 10),
        }
    }
}
