//! # Page Table Translation
//!
//! Resolves virtual addresses of the calling process to physical frames by
//! reading the kernel's per-process page table exposure,
//! `/proc/self/pagemap`.
//!
//! ## How does it work?
//!
//! The pagemap file holds one 64-bit record per virtual page. The record for
//! a virtual address `va` lives at byte offset `(va / page_size) * 8`. A
//! translation opens the file, seeks there and reads exactly eight bytes;
//! anything shorter is reported, never zero-filled.
//!
//! ```text
//!  va ──► page index ──► × 8 ──► lseek ──► read(8) ──► PagemapEntry
//!                                                        │
//!                             present? ──no──► NotPresent
//!                                │yes
//!                      PFN × page_size + offset ──► PhysicalAddress
//! ```
//!
//! ## Components
//!
//! * [`PagemapEntry`] - the single decoder of the record layout.
//! * [`PhysicalFrameInfo`] - raw record, present bit and frame number of one
//!   lookup.
//! * [`AddressTranslator`] - the file access: [`read_entry`], [`translate`]
//!   and [`virt_to_phys`].
//!
//! [`read_entry`]: AddressTranslator::read_entry
//! [`translate`]: AddressTranslator::translate
//! [`virt_to_phys`]: AddressTranslator::virt_to_phys
//!
//! ## Privileges
//!
//! Any process may read its own pagemap, but without `CAP_SYS_ADMIN` the
//! kernel reports every frame number as zero. [`AddressTranslator::virt_to_phys`]
//! turns that into [`TranslateError::FrameHidden`] instead of returning a
//! bogus physical address.
//!
//! ## Stability
//!
//! Only pinned memory keeps its frame. Huge pages obtained from the allocator
//! are pinned; ordinary heap or stack pages may be migrated, swapped or
//! merged between two translations.

mod entry;
mod translator;

pub use entry::{PagemapEntry, PhysicalFrameInfo};
pub use translator::{AddressTranslator, TranslateError};
