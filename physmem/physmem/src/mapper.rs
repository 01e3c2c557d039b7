//! Physical address windows through `/dev/mem`.

use crate::region::{DeviceFile, MappedRegion, ReleaseError};
use core::ptr::NonNull;
use physmem_addresses::PhysicalAddress;
use physmem_info::paths::DEV_MEM_PATH;
use std::fs::OpenOptions;
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Maps physical address ranges, usually device registers, into the process.
///
/// The range is not checked against the machine's memory layout. Mapping
/// RAM the kernel uses, or registers with read side effects, is the caller's
/// responsibility. Reading `/dev/mem` needs `CAP_SYS_RAWIO`, and kernels
/// built with `CONFIG_STRICT_DEVMEM` only expose MMIO and the first MiB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalMemoryMapper {
    device: PathBuf,
}

impl PhysicalMemoryMapper {
    #[must_use]
    pub fn new() -> Self {
        Self::with_device(DEV_MEM_PATH)
    }

    /// Mapper for another memory device file, whose file offsets are taken
    /// as physical addresses.
    #[must_use]
    pub fn with_device(path: impl Into<PathBuf>) -> Self {
        Self {
            device: path.into(),
        }
    }

    #[must_use]
    pub fn device(&self) -> &Path {
        &self.device
    }

    /// Maps `length` bytes starting at `physical_address`, shared and
    /// read/write.
    ///
    /// # Errors
    /// [`MapError::MapFailed`] if the device cannot be opened, if
    /// `physical_address` is not page aligned or `length` is zero (`EINVAL`),
    /// or if `mmap(2)` fails.
    pub fn map(
        &self,
        physical_address: PhysicalAddress,
        length: usize,
    ) -> Result<MappedRegion<DeviceFile>, MapError> {
        let failed = |source: io::Error| {
            log::debug!(
                "mapping {length:#X} bytes at {physical_address} from {} failed: {source}",
                self.device.display()
            );
            MapError::MapFailed {
                path: self.device.clone(),
                physical_address,
                length,
                source,
            }
        };

        if length == 0 || !physical_address.is_aligned_to(physmem_sys::page_size()) {
            return Err(failed(io::Error::from_raw_os_error(libc::EINVAL)));
        }
        let offset = libc::off_t::try_from(physical_address.as_u64())
            .map_err(|_| failed(io::Error::from_raw_os_error(libc::EOVERFLOW)))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(&self.device)
            .map_err(failed)?;

        // SAFETY: fresh shared mapping at a kernel-chosen address; the
        // descriptor may be closed once the mapping exists.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                length,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(failed(io::Error::last_os_error()));
        }
        let base = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| failed(io::Error::from(io::ErrorKind::AddrNotAvailable)))?;

        let backing = DeviceFile {
            path: self.device.clone(),
            physical_base: physical_address,
        };
        // SAFETY: `base .. base + length` was just mapped and is owned by nobody else.
        let region = unsafe { MappedRegion::from_raw(base, length, backing) };
        log::info!(
            "mapped {length:#X} bytes of {} at {physical_address} to {}",
            self.device.display(),
            region.base()
        );
        Ok(region)
    }

    /// Unmaps a region created by [`map`](Self::map).
    ///
    /// # Errors
    /// [`ReleaseError::ReleaseFailed`] if `munmap(2)` fails.
    pub fn unmap(region: MappedRegion<DeviceFile>) -> Result<(), ReleaseError> {
        let backing = region.unmap()?;
        log::debug!(
            "released window at {} of {}",
            backing.physical_base,
            backing.path.display()
        );
        Ok(())
    }
}

impl Default for PhysicalMemoryMapper {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("failed to map {length:#X} bytes at {physical_address} from {}", .path.display())]
    MapFailed {
        path: PathBuf,
        physical_address: PhysicalAddress,
        length: usize,
        #[source]
        source: io::Error,
    },
}
