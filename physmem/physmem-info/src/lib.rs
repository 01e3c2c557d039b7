//! # Kernel Interface Configuration
//!
//! Compile-time configuration shared by every crate of the physical-memory
//! access layer: the locations of the kernel-exposed files we read or map, and
//! the numeric contracts of the Linux interfaces we talk to.
//!
//! ## Overview
//!
//! The layer never discovers these values at runtime. The kernel documents them
//! as stable ABI, so they are fixed here once and validated by `const`
//! assertions instead of being re-derived in every call path.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`paths`] | `/proc`, `/dev` and `/sys` locations of the kernel interfaces |
//! | [`hugepages`] | `mmap(2)` huge page size selector encoding and default geometry |
//! | [`pagemap`] | `/proc/<pid>/pagemap` record geometry |
//! | [`numa`] | Upper bounds used when asking the kernel for node masks |
//!
//! ## Runtime Overrides
//!
//! Paths are defaults only. The translator and the physical mapper accept an
//! alternative file (a chroot, a test fixture); the numeric contracts cannot be
//! overridden since they describe the kernel ABI itself.
//!
//! ```rust
//! use physmem_info::hugepages::{DEFAULT_HUGEPAGE_SIZE, DEFAULT_HUGEPAGE_SIZE_POWER};
//!
//! assert_eq!(DEFAULT_HUGEPAGE_SIZE, 1 << DEFAULT_HUGEPAGE_SIZE_POWER);
//! ```

#![deny(unsafe_code)]

pub mod hugepages;
pub mod numa;
pub mod pagemap;
pub mod paths;
