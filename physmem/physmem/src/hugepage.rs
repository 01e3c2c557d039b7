//! Pinned huge page allocation.

use crate::region::{AnonymousHugepage, MappedRegion, ReleaseError};
use core::ptr::NonNull;
use physmem_addresses::{AddressError, HugepageSize, PageSize, Size2M};
use physmem_info::hugepages::{MAP_HUGE_MASK, MAP_HUGE_SHIFT};
use physmem_sys::numa::{self, CpuLocation, NumaError};
use std::io;

/// Hands out regions of exactly one huge page each.
///
/// Huge pages come from the kernel's reserved pool
/// (`/proc/sys/vm/nr_hugepages` for the default size). They are physically
/// contiguous, zero-filled, pre-faulted and never swapped or migrated, which
/// keeps their physical address stable for DMA.
///
/// ```no_run
/// use physmem::HugepageAllocator;
///
/// let allocator = HugepageAllocator::new();
/// let mut region = allocator.allocate(4096)?;
/// region.as_mut_slice()[..4].copy_from_slice(b"ping");
/// HugepageAllocator::release(region)?;
/// # Ok::<(), physmem::Error>(())
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HugepageAllocator {
    size: HugepageSize,
}

impl HugepageAllocator {
    /// Allocator for the 2 MiB default huge page.
    #[must_use]
    pub const fn new() -> Self {
        Self::for_page_size::<Size2M>()
    }

    #[must_use]
    pub const fn for_page_size<S: PageSize>() -> Self {
        Self::with_geometry(HugepageSize::of::<S>())
    }

    #[must_use]
    pub const fn with_geometry(size: HugepageSize) -> Self {
        Self { size }
    }

    #[must_use]
    pub const fn hugepage_size(&self) -> HugepageSize {
        self.size
    }

    /// Maps one huge page able to hold `size` bytes.
    ///
    /// The region always spans the whole huge page, whatever `size` asks for.
    ///
    /// # Errors
    /// - [`AllocError::SizeExceedsHugepage`] if `size` does not fit one page.
    /// - [`AllocError::AllocationFailed`] if the kernel refuses the mapping,
    ///   typically `ENOMEM` for an empty pool or `EINVAL` for a page size the
    ///   platform does not support.
    pub fn allocate(&self, size: u64) -> Result<MappedRegion<AnonymousHugepage>, AllocError> {
        let hugepage = self.size;
        if size > hugepage.bytes() {
            return Err(AllocError::SizeExceedsHugepage {
                requested: size,
                hugepage,
            });
        }
        let Ok(len) = usize::try_from(hugepage.bytes()) else {
            return Err(AllocError::SizeExceedsHugepage {
                requested: size,
                hugepage,
            });
        };

        let flags = mmap_flags(hugepage);

        // SAFETY: anonymous mapping at a kernel-chosen address; no existing
        // memory is affected.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            let source = io::Error::last_os_error();
            log::debug!("mmap of one {hugepage} huge page failed: {source}");
            return Err(AllocError::AllocationFailed { hugepage, source });
        }
        let Some(base) = NonNull::new(ptr.cast::<u8>()) else {
            return Err(AllocError::AllocationFailed {
                hugepage,
                source: io::Error::from(io::ErrorKind::AddrNotAvailable),
            });
        };

        // SAFETY: `base .. base + len` was just mapped and is owned by nobody else.
        let region = unsafe { MappedRegion::from_raw(base, len, AnonymousHugepage { size: hugepage }) };
        log::info!("allocated one {hugepage} huge page at {}", region.base());
        Ok(region)
    }

    /// Like [`allocate`](Self::allocate), but only succeeds if the page sits
    /// on the NUMA node of the CPU the calling thread runs on.
    ///
    /// A remote page is released again before returning.
    ///
    /// # Errors
    /// Everything [`allocate`](Self::allocate) reports, plus
    /// [`AllocError::Numa`] if the locality queries fail and
    /// [`AllocError::NotLocalNode`] if the page is remote.
    pub fn allocate_local(&self, size: u64) -> Result<MappedRegion<AnonymousHugepage>, AllocError> {
        let region = self.allocate(size)?;

        let (page_node, cpu) = match locality(&region) {
            Ok(locality) => locality,
            Err(e) => {
                discard(region);
                return Err(AllocError::Numa(e));
            }
        };

        if page_node != cpu.node {
            log::warn!(
                "huge page at {} is on node {page_node}, CPU {} is on node {}",
                region.base(),
                cpu.cpu,
                cpu.node
            );
            discard(region);
            return Err(AllocError::NotLocalNode {
                page_node,
                cpu_node: cpu.node,
            });
        }
        Ok(region)
    }

    /// Unmaps the region and returns its page to the pool.
    ///
    /// # Errors
    /// [`ReleaseError::ReleaseFailed`] if `munmap(2)` fails.
    pub fn release(region: MappedRegion<AnonymousHugepage>) -> Result<(), ReleaseError> {
        let size = region.hugepage_size();
        region.unmap()?;
        log::info!("released one {size} huge page");
        Ok(())
    }
}

impl Default for HugepageAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps one huge page of `hugepage_size` bytes, `2^hugepage_size_power`.
///
/// # Errors
/// [`AllocError::Geometry`] if size and power disagree, otherwise see
/// [`HugepageAllocator::allocate`].
pub fn allocate(
    size: u64,
    hugepage_size: u64,
    hugepage_size_power: u32,
) -> Result<MappedRegion<AnonymousHugepage>, AllocError> {
    let geometry = HugepageSize::new(hugepage_size, hugepage_size_power)?;
    HugepageAllocator::with_geometry(geometry).allocate(size)
}

/// See [`HugepageAllocator::release`].
///
/// # Errors
/// [`ReleaseError::ReleaseFailed`] if `munmap(2)` fails.
pub fn release(region: MappedRegion<AnonymousHugepage>) -> Result<(), ReleaseError> {
    HugepageAllocator::release(region)
}

/// `mmap(2)` flags for one shared, anonymous, pre-faulted huge page of `size`.
///
/// `HugepageSize` caps the power at 31, so the selector never reaches the
/// sign bit.
const fn mmap_flags(size: HugepageSize) -> libc::c_int {
    let selector = ((size.power() & MAP_HUGE_MASK) << MAP_HUGE_SHIFT).cast_signed();
    libc::MAP_SHARED | libc::MAP_ANONYMOUS | libc::MAP_HUGETLB | libc::MAP_POPULATE | selector
}

fn locality(region: &MappedRegion<AnonymousHugepage>) -> Result<(u32, CpuLocation), NumaError> {
    Ok((numa::address_node(region.base())?, numa::current_cpu()?))
}

fn discard(region: MappedRegion<AnonymousHugepage>) {
    if let Err(e) = HugepageAllocator::release(region) {
        log::warn!("failed to release rejected huge page: {e}");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    #[error("{requested:#X} bytes do not fit one {hugepage} huge page")]
    SizeExceedsHugepage {
        requested: u64,
        hugepage: HugepageSize,
    },
    #[error(transparent)]
    Geometry(#[from] AddressError),
    #[error("failed to map one {hugepage} huge page")]
    AllocationFailed {
        hugepage: HugepageSize,
        #[source]
        source: io::Error,
    },
    #[error("huge page landed on node {page_node}, the calling CPU is on node {cpu_node}")]
    NotLocalNode { page_node: u32, cpu_node: u32 },
    #[error(transparent)]
    Numa(#[from] NumaError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use physmem_addresses::Size1G;
    use physmem_info::hugepages::{DEFAULT_HUGEPAGE_SIZE, GIGANTIC_HUGEPAGE_SIZE};

    #[test]
    fn default_geometry_is_two_mib() {
        assert_eq!(HugepageAllocator::new().hugepage_size().bytes(), DEFAULT_HUGEPAGE_SIZE);
        assert_eq!(HugepageAllocator::default(), HugepageAllocator::new());
        assert_eq!(
            HugepageAllocator::for_page_size::<Size1G>().hugepage_size().bytes(),
            GIGANTIC_HUGEPAGE_SIZE
        );
    }

    #[test]
    fn oversized_request_is_rejected_before_mapping() {
        let err = HugepageAllocator::new().allocate((2 << 20) + 1).unwrap_err();
        assert!(matches!(
            err,
            AllocError::SizeExceedsHugepage {
                requested: 0x20_0001,
                ..
            }
        ));
    }

    #[test]
    fn mismatched_geometry_is_rejected_before_mapping() {
        assert!(matches!(
            allocate(4096, 2 << 20, 20),
            Err(AllocError::Geometry(AddressError::SizePowerMismatch { .. }))
        ));
        assert!(matches!(
            allocate(4096, 4096, 12),
            Err(AllocError::Geometry(AddressError::UnsupportedPower(12)))
        ));
    }

    fn selector_of(flags: libc::c_int) -> u32 {
        (flags.cast_unsigned() >> MAP_HUGE_SHIFT) & MAP_HUGE_MASK
    }

    const BASE_FLAGS: libc::c_int =
        libc::MAP_SHARED | libc::MAP_ANONYMOUS | libc::MAP_HUGETLB | libc::MAP_POPULATE;

    #[test]
    fn two_mib_flags_select_power_21() {
        let flags = mmap_flags(HugepageSize::of::<Size2M>());
        assert_eq!(selector_of(flags), 21);
        assert_eq!(flags & BASE_FLAGS, BASE_FLAGS);
        assert_eq!(flags & !BASE_FLAGS, 0x5400_0000);
        assert!(flags > 0);
    }

    #[test]
    fn one_gib_flags_select_power_30() {
        let flags = mmap_flags(HugepageSize::of::<Size1G>());
        assert_eq!(selector_of(flags), 30);
        assert_eq!(flags & !BASE_FLAGS, 0x7800_0000);
        assert!(flags > 0);
    }

    #[test]
    fn largest_supported_power_keeps_flags_positive() {
        let flags = mmap_flags(HugepageSize::from_power(31).unwrap());
        assert_eq!(selector_of(flags), 31);
        assert!(flags > 0);
        assert!(matches!(
            allocate(4096, 1 << 32, 32),
            Err(AllocError::Geometry(AddressError::UnsupportedPower(32)))
        ));
    }
}
