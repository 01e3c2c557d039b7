//! Owned handles to mappings created by the allocator and the mapper.

use core::fmt;
use core::ptr::NonNull;
use physmem_addresses::{HugepageSize, PhysicalAddress, VirtualAddress};
use std::io;
use std::path::{Path, PathBuf};

mod sealed {
    pub trait Sealed {}
}

/// What a [`MappedRegion`] is backed by.
///
/// Sealed: the only backings are [`AnonymousHugepage`] and [`DeviceFile`],
/// and each is released only by the component that created it.
pub trait Backing: sealed::Sealed + fmt::Debug {
    fn kind(&self) -> BackingKind<'_>;
}

/// Borrowed, type-erased view of a region's backing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BackingKind<'a> {
    AnonymousHugepage,
    DeviceFile(&'a Path),
}

/// Anonymous, shared, pre-faulted huge page memory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AnonymousHugepage {
    pub(crate) size: HugepageSize,
}

/// A window of a memory device file such as `/dev/mem`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFile {
    pub(crate) path: PathBuf,
    pub(crate) physical_base: PhysicalAddress,
}

impl sealed::Sealed for AnonymousHugepage {}
impl sealed::Sealed for DeviceFile {}

impl Backing for AnonymousHugepage {
    fn kind(&self) -> BackingKind<'_> {
        BackingKind::AnonymousHugepage
    }
}

impl Backing for DeviceFile {
    fn kind(&self) -> BackingKind<'_> {
        BackingKind::DeviceFile(&self.path)
    }
}

/// A live mapping in the calling process.
///
/// The handle is the only way to reach the mapping. It is not `Clone`, and
/// giving it back to [`HugepageAllocator::release`] or
/// [`PhysicalMemoryMapper::unmap`] consumes it, so a region cannot be used or
/// released after it has been released. There is no `Drop`: a region that is
/// never released stays mapped for the life of the process.
///
/// ```compile_fail
/// use physmem::HugepageAllocator;
///
/// let region = HugepageAllocator::new().allocate(4096).unwrap();
/// HugepageAllocator::release(region).unwrap();
/// HugepageAllocator::release(region).unwrap(); // region was moved
/// ```
///
/// Releasing a region through the wrong component does not type-check either:
///
/// ```compile_fail
/// use physmem::{HugepageAllocator, PhysicalMemoryMapper};
///
/// let region = HugepageAllocator::new().allocate(4096).unwrap();
/// PhysicalMemoryMapper::unmap(region).unwrap();
/// ```
///
/// [`HugepageAllocator::release`]: crate::HugepageAllocator::release
/// [`PhysicalMemoryMapper::unmap`]: crate::PhysicalMemoryMapper::unmap
#[must_use = "a region that is never released leaks its mapping"]
pub struct MappedRegion<B: Backing> {
    base: NonNull<u8>,
    len: usize,
    backing: B,
}

// SAFETY: the region owns its mapping exclusively; nothing about it is tied
// to the creating thread.
unsafe impl<B: Backing + Send> Send for MappedRegion<B> {}

// SAFETY: shared references only allow reads; writes need `&mut self`.
unsafe impl<B: Backing + Sync> Sync for MappedRegion<B> {}

impl<B: Backing> MappedRegion<B> {
    /// # Safety
    /// `base .. base + len` must be a mapping created by `mmap(2)` that
    /// nothing else owns.
    pub(crate) const unsafe fn from_raw(base: NonNull<u8>, len: usize, backing: B) -> Self {
        Self { base, len, backing }
    }

    /// Start of the mapping, page aligned.
    #[must_use]
    pub fn base(&self) -> VirtualAddress {
        VirtualAddress::from_ptr(self.base.as_ptr())
    }

    /// Length of the mapping in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always `false`; empty mappings are never created.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn as_ptr(&self) -> *const u8 {
        self.base.as_ptr()
    }

    pub const fn as_mut_ptr(&mut self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[must_use]
    pub const fn backing(&self) -> &B {
        &self.backing
    }

    #[must_use]
    pub fn kind(&self) -> BackingKind<'_> {
        self.backing.kind()
    }

    /// Whether `address` falls inside the mapping.
    #[must_use]
    pub fn contains(&self, address: VirtualAddress) -> bool {
        let base = self.base().as_u64();
        address.as_u64() >= base && address.as_u64() - base < self.len as u64
    }

    /// Unmaps the region, handing back its backing description.
    pub(crate) fn unmap(self) -> Result<B, ReleaseError> {
        let base = self.base();
        // SAFETY: the handle owns the mapping and is consumed here, so no
        // reference into it can outlive the call.
        let rc = unsafe { libc::munmap(self.base.as_ptr().cast(), self.len) };
        if rc != 0 {
            let source = io::Error::last_os_error();
            log::debug!("munmap({base}, {:#X}) failed: {source}", self.len);
            return Err(ReleaseError::ReleaseFailed {
                base,
                len: self.len,
                source,
            });
        }
        log::debug!("unmapped {:#X} bytes at {base}", self.len);
        Ok(self.backing)
    }

    fn check_access(&self, offset: usize, width: usize) -> Result<(), RegionAccessError> {
        if offset.checked_add(width).is_none_or(|end| end > self.len) {
            return Err(RegionAccessError::OutOfBounds {
                offset,
                width,
                len: self.len,
            });
        }
        if !offset.is_multiple_of(width) {
            return Err(RegionAccessError::Misaligned { offset, width });
        }
        Ok(())
    }
}

impl MappedRegion<AnonymousHugepage> {
    /// Geometry of the huge page backing this region.
    #[must_use]
    pub const fn hugepage_size(&self) -> HugepageSize {
        self.backing.size
    }

    #[must_use]
    pub const fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping is readable, initialized (zero-filled by the
        // kernel) and exclusively owned by `self`.
        unsafe { core::slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    pub const fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` rules out any other borrow.
        unsafe { core::slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }
}

impl MappedRegion<DeviceFile> {
    /// Physical address the first byte of the region maps.
    #[must_use]
    pub const fn physical_base(&self) -> PhysicalAddress {
        self.backing.physical_base
    }

    /// Device file the region was mapped from.
    #[must_use]
    pub fn device(&self) -> &Path {
        &self.backing.path
    }

    /// Volatile read of a register at `offset` bytes into the region.
    ///
    /// # Errors
    /// [`RegionAccessError`] if the access leaves the region or is not
    /// naturally aligned.
    pub fn read<R: Register>(&self, offset: usize) -> Result<R, RegionAccessError> {
        self.check_access(offset, size_of::<R>())?;
        // SAFETY: bounds and alignment checked; the mapping is readable.
        Ok(unsafe { self.base.as_ptr().add(offset).cast::<R>().read_volatile() })
    }

    /// Volatile write of a register at `offset` bytes into the region.
    ///
    /// # Errors
    /// [`RegionAccessError`] if the access leaves the region or is not
    /// naturally aligned.
    pub fn write<R: Register>(&mut self, offset: usize, value: R) -> Result<(), RegionAccessError> {
        self.check_access(offset, size_of::<R>())?;
        // SAFETY: bounds and alignment checked; the mapping is writable.
        unsafe {
            self.base
                .as_ptr()
                .add(offset)
                .cast::<R>()
                .write_volatile(value);
        }
        Ok(())
    }
}

impl<B: Backing> fmt::Debug for MappedRegion<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedRegion")
            .field("base", &self.base())
            .field("len", &format_args!("{:#X}", self.len))
            .field("backing", &self.backing)
            .finish()
    }
}

/// Integer widths a device register can be accessed with.
pub trait Register: sealed_register::Sealed + Copy {}

mod sealed_register {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
    impl Sealed for u64 {}
}

impl Register for u8 {}
impl Register for u16 {}
impl Register for u32 {}
impl Register for u64 {}

#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error("failed to unmap {len:#X} bytes at {base}")]
    ReleaseFailed {
        base: VirtualAddress,
        len: usize,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegionAccessError {
    #[error("{width}-byte access at {offset:#X} leaves the {len:#X}-byte region")]
    OutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },
    #[error("{width}-byte access at {offset:#X} is not naturally aligned")]
    Misaligned { offset: usize, width: usize },
}
