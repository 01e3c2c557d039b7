//! # Userspace Physical Memory Access
//!
//! Three independent entry points for userspace drivers that hand memory to
//! devices or poke device registers directly:
//!
//! * [`HugepageAllocator`] - pinned, zero-filled, physically contiguous
//!   memory, one huge page per region.
//! * [`AddressTranslator`] - the physical frame behind a virtual address,
//!   read from `/proc/self/pagemap`.
//! * [`PhysicalMemoryMapper`] - a window onto a physical address range
//!   through `/dev/mem`.
//!
//! They are not a pipeline, but the typical DMA setup uses the first two
//! together:
//!
//! ```no_run
//! use physmem::{AddressTranslator, HugepageAllocator};
//!
//! let mut region = HugepageAllocator::new().allocate(4096)?;
//! region.as_mut_slice()[..4096].fill(0xA5);
//!
//! let translator = AddressTranslator::new();
//! let dma_address = translator.virt_to_phys(region.base())?;
//! println!("descriptor ring at {dma_address}");
//!
//! physmem::HugepageAllocator::release(region)?;
//! # Ok::<(), physmem::Error>(())
//! ```
//!
//! ## Ownership
//!
//! Every mapping is a [`MappedRegion`] owned by whoever created it. Releasing
//! consumes the handle, so neither a double release nor a use after release
//! compiles, and a region can only go back to the component that produced
//! it. Regions are never released implicitly.
//!
//! ## Privileges
//!
//! | Operation | Needs |
//! |-----------|-------|
//! | huge page allocation | a reserved pool (`vm.nr_hugepages`) |
//! | frame numbers from the pagemap | `CAP_SYS_ADMIN` |
//! | `/dev/mem` mapping | `CAP_SYS_RAWIO`, permissive `STRICT_DEVMEM` |
//! | port I/O | `CAP_SYS_RAWIO` |
//!
//! ## Contracts
//!
//! NUMA queries, port I/O and the platform constant lookup live in
//! [`physmem_sys`] and are re-exported as [`numa`], [`ports`], [`pci`] and
//! [`constants`].

mod hugepage;
mod mapper;
mod region;

pub use hugepage::{AllocError, HugepageAllocator, allocate, release};
pub use mapper::{MapError, PhysicalMemoryMapper};
pub use region::{
    AnonymousHugepage, Backing, BackingKind, DeviceFile, MappedRegion, Register,
    RegionAccessError, ReleaseError,
};

pub use physmem_addresses::{
    AddressError, FrameNumber, HugepageSize, PageSize, PhysicalAddress, Size1G, Size2M, Size4K,
    VirtualAddress,
};
pub use physmem_pagemap::{AddressTranslator, PagemapEntry, PhysicalFrameInfo, TranslateError};
pub use physmem_sys::constants::{self, ConstantError, SystemConstant};
pub use physmem_sys::numa::{self, NumaError};
pub use physmem_sys::pci;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub use physmem_sys::ports::{self, PortError};

/// Any failure of this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Release(#[from] ReleaseError),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Translate(#[from] TranslateError),
    #[error(transparent)]
    Access(#[from] RegionAccessError),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Constant(#[from] ConstantError),
    #[error(transparent)]
    Numa(#[from] NumaError),
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    #[error(transparent)]
    Port(#[from] PortError),
}
