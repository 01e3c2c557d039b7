//! # Linux System Pass-Throughs
//!
//! The small, unopinionated system interfaces the physical-memory layer and
//! its callers need besides the memory mappings themselves:
//!
//! * [`constants`] - a closed table of platform constants (page size,
//!   `PROT_*`, `MAP_*`), resolved once per process and addressable by a
//!   stable numeric id.
//! * [`numa`] - `get_mempolicy(2)` and `getcpu(2)`.
//! * [`pci`] - sysfs NUMA affinity and configuration mechanism #1 of a PCI
//!   function.
//! * [`ports`] - `ioperm(2)` and the x86 `in`/`out` instructions (x86 only).
//!
//! None of these keep state between calls apart from the constant table, and
//! none retry: failures surface with the `errno` of the failing call.

pub mod constants;
pub mod numa;
pub mod pci;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod ports;

pub use constants::{ConstantError, SystemConstant, SystemConstants, lookup, page_size};
pub use numa::{CpuLocation, MemoryPolicy, NodeMask, NumaError, PolicyFlags, PolicyMode};
pub use pci::PciAddress;
