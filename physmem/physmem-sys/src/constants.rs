//! # Well-Known System Constants
//!
//! A closed table of platform values callers outside Rust cannot obtain on
//! their own: the page size reported by `sysconf(3)` and the `mmap(2)`
//! protection and mapping flags. Each constant has a small, stable numeric
//! identifier so that a foreign caller can ask for it by number.
//!
//! The table is resolved once per process, on first use, and never
//! recomputed.
//!
//! ```rust
//! use physmem_sys::constants::{lookup, SystemConstant, SystemConstants};
//!
//! let page_size = lookup(SystemConstant::PageSize as i32).unwrap();
//! assert_eq!(u64::try_from(page_size).unwrap(), SystemConstants::get().page_size());
//! assert!(lookup(0).is_err());
//! ```

use physmem_addresses::{PageSize, Size4K};
use std::sync::OnceLock;

/// Identifiers of the constants available through [`lookup`].
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SystemConstant {
    /// `sysconf(_SC_PAGESIZE)`
    PageSize = 1,
    /// `PROT_READ`
    ProtRead = 2,
    /// `PROT_WRITE`
    ProtWrite = 3,
    /// `MAP_HUGETLB`
    MapHugetlb = 4,
    /// `MAP_ANONYMOUS`
    MapAnonymous = 5,
    /// `MAP_SHARED`
    MapShared = 6,
    /// `MAP_POPULATE`
    MapPopulate = 7,
}

impl SystemConstant {
    pub const ALL: [Self; 7] = [
        Self::PageSize,
        Self::ProtRead,
        Self::ProtWrite,
        Self::MapHugetlb,
        Self::MapAnonymous,
        Self::MapShared,
        Self::MapPopulate,
    ];

    #[must_use]
    pub const fn id(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PageSize => "_SC_PAGESIZE",
            Self::ProtRead => "PROT_READ",
            Self::ProtWrite => "PROT_WRITE",
            Self::MapHugetlb => "MAP_HUGETLB",
            Self::MapAnonymous => "MAP_ANONYMOUS",
            Self::MapShared => "MAP_SHARED",
            Self::MapPopulate => "MAP_POPULATE",
        }
    }

    const fn index(self) -> usize {
        self as usize - 1
    }
}

impl TryFrom<i32> for SystemConstant {
    type Error = ConstantError;

    fn try_from(id: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|c| c.id() == id)
            .ok_or(ConstantError::UnknownConstant(id))
    }
}

/// The resolved constant table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemConstants {
    values: [i64; SystemConstant::ALL.len()],
}

impl SystemConstants {
    /// The process-wide table, resolved on first call.
    pub fn get() -> &'static Self {
        static TABLE: OnceLock<SystemConstants> = OnceLock::new();
        TABLE.get_or_init(Self::resolve)
    }

    fn resolve() -> Self {
        let mut values = [0; SystemConstant::ALL.len()];
        for constant in SystemConstant::ALL {
            values[constant.index()] = match constant {
                SystemConstant::PageSize => resolve_page_size(),
                SystemConstant::ProtRead => i64::from(libc::PROT_READ),
                SystemConstant::ProtWrite => i64::from(libc::PROT_WRITE),
                SystemConstant::MapHugetlb => i64::from(libc::MAP_HUGETLB),
                SystemConstant::MapAnonymous => i64::from(libc::MAP_ANONYMOUS),
                SystemConstant::MapShared => i64::from(libc::MAP_SHARED),
                SystemConstant::MapPopulate => i64::from(libc::MAP_POPULATE),
            };
        }
        log::debug!("resolved system constants: {values:?}");
        Self { values }
    }

    #[must_use]
    pub const fn value(&self, constant: SystemConstant) -> i64 {
        self.values[constant.index()]
    }

    /// The base page size in bytes; always a power of two.
    #[must_use]
    pub const fn page_size(&self) -> u64 {
        self.value(SystemConstant::PageSize).unsigned_abs()
    }
}

fn resolve_page_size() -> i64 {
    // SAFETY: sysconf has no memory safety preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 && size.unsigned_abs().is_power_of_two() {
        i64::from(size)
    } else {
        let err = std::io::Error::last_os_error();
        log::warn!("sysconf(_SC_PAGESIZE) returned {size} ({err}); assuming {}", Size4K::SIZE);
        Size4K::SIZE.cast_signed()
    }
}

/// Looks up a constant by its numeric identifier.
///
/// # Errors
/// [`ConstantError::UnknownConstant`] if `id` names no constant.
pub fn lookup(id: i32) -> Result<i64, ConstantError> {
    let constant = SystemConstant::try_from(id)?;
    Ok(SystemConstants::get().value(constant))
}

/// Shorthand for `SystemConstants::get().page_size()`.
#[must_use]
pub fn page_size() -> u64 {
    SystemConstants::get().page_size()
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstantError {
    #[error("unknown system constant identifier {0}")]
    UnknownConstant(i32),
}
