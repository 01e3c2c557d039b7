//! Virtual → physical translation through `/proc/self/pagemap`.

use crate::PhysicalFrameInfo;
use physmem_addresses::{FrameNumber, PhysicalAddress, VirtualAddress};
use physmem_info::pagemap::PAGEMAP_ENTRY_SIZE;
use physmem_info::paths::PAGEMAP_PATH;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Reads page table records of the calling process.
///
/// Every query opens its own file handle, so a translator can be shared
/// between threads freely and never observes state left by another query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTranslator {
    pagemap: PathBuf,
    page_size: u64,
}

impl AddressTranslator {
    /// Translator for the calling process using the system page size.
    #[must_use]
    pub fn new() -> Self {
        // the resolved system page size is always a power of two
        Self {
            pagemap: PathBuf::from(PAGEMAP_PATH),
            page_size: physmem_sys::page_size(),
        }
    }

    /// Translator reading records from an alternative pagemap file.
    ///
    /// # Errors
    /// [`TranslateError::InvalidPageSize`] if `page_size` is not a power of two.
    pub fn with_pagemap(path: impl Into<PathBuf>, page_size: u64) -> Result<Self, TranslateError> {
        if !page_size.is_power_of_two() {
            return Err(TranslateError::InvalidPageSize(page_size));
        }
        Ok(Self {
            pagemap: path.into(),
            page_size,
        })
    }

    #[must_use]
    pub fn pagemap(&self) -> &Path {
        &self.pagemap
    }

    #[must_use]
    pub const fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Byte offset of the record describing `address`.
    ///
    /// # Errors
    /// [`TranslateError::SeekFailed`] if the offset is not a valid file offset.
    pub fn entry_offset(&self, address: VirtualAddress) -> Result<u64, TranslateError> {
        address
            .page_index(self.page_size)
            .checked_mul(PAGEMAP_ENTRY_SIZE as u64)
            .filter(|offset| i64::try_from(*offset).is_ok())
            .ok_or_else(|| TranslateError::SeekFailed {
                address,
                offset: u64::MAX,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "pagemap offset is not representable",
                ),
            })
    }

    /// Reads the record for `address`, whether or not the page is present.
    ///
    /// # Errors
    /// - [`TranslateError::PermissionDenied`] if the pagemap cannot be opened.
    /// - [`TranslateError::SeekFailed`] if the record offset is invalid.
    /// - [`TranslateError::ReadFailed`] if the kernel rejects the read.
    /// - [`TranslateError::ShortRead`] if fewer than eight bytes come back.
    pub fn read_entry(&self, address: VirtualAddress) -> Result<PhysicalFrameInfo, TranslateError> {
        let offset = self.entry_offset(address)?;

        let mut file = File::open(&self.pagemap).map_err(|source| {
            log::debug!("cannot open {}: {source}", self.pagemap.display());
            TranslateError::PermissionDenied {
                path: self.pagemap.clone(),
                source,
            }
        })?;

        file.seek(SeekFrom::Start(offset)).map_err(|source| {
            log::debug!("cannot seek pagemap to {offset:#X} for {address}: {source}");
            TranslateError::SeekFailed {
                address,
                offset,
                source,
            }
        })?;

        let mut record = [0_u8; PAGEMAP_ENTRY_SIZE];
        let read = read_record(&mut file, &mut record).map_err(|source| {
            log::debug!("cannot read pagemap record of {address}: {source}");
            TranslateError::ReadFailed { address, source }
        })?;
        if read != PAGEMAP_ENTRY_SIZE {
            log::debug!("short pagemap read for {address}: {read} bytes");
            return Err(TranslateError::ShortRead { address, read });
        }

        let info = PhysicalFrameInfo::decode(u64::from_ne_bytes(record));
        log::trace!("{address}: pagemap record {:#018X}", info.page_table_entry_raw());
        Ok(info)
    }

    /// Looks up the frame backing `address`.
    ///
    /// # Errors
    /// Everything [`read_entry`](Self::read_entry) reports, plus
    /// [`TranslateError::NotPresent`] if the page is not in RAM, which is
    /// also what an address without any mapping yields.
    pub fn translate(&self, address: VirtualAddress) -> Result<PhysicalFrameInfo, TranslateError> {
        let info = self.read_entry(address)?;
        if !info.present() {
            return Err(TranslateError::NotPresent {
                address,
                raw: info.page_table_entry_raw(),
            });
        }
        Ok(info)
    }

    /// Resolves `address` to the physical address backing it.
    ///
    /// # Errors
    /// Everything [`translate`](Self::translate) reports, plus
    /// [`TranslateError::FrameHidden`] if the kernel withheld the frame number
    /// and [`TranslateError::FrameOutOfRange`] if it does not form a 64-bit
    /// address.
    pub fn virt_to_phys(&self, address: VirtualAddress) -> Result<PhysicalAddress, TranslateError> {
        let info = self.translate(address)?;
        let frame = info
            .physical_frame_number()
            .ok_or(TranslateError::NotPresent {
                address,
                raw: info.page_table_entry_raw(),
            })?;
        if frame.is_zero() {
            return Err(TranslateError::FrameHidden { address });
        }

        PhysicalAddress::from_frame(frame, self.page_size, address.offset_in(self.page_size))
            .ok_or(TranslateError::FrameOutOfRange { address, frame })
    }
}

impl Default for AddressTranslator {
    fn default() -> Self {
        Self::new()
    }
}

fn read_record(file: &mut File, record: &mut [u8]) -> io::Result<usize> {
    loop {
        match file.read(record) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            result => return result,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("page size {0:#X} is not a power of two")]
    InvalidPageSize(u64),
    #[error("cannot open {}", .path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot seek to the pagemap record of {address} (offset {offset:#X})")]
    SeekFailed {
        address: VirtualAddress,
        offset: u64,
        #[source]
        source: io::Error,
    },
    #[error("failed to read the pagemap record of {address}")]
    ReadFailed {
        address: VirtualAddress,
        #[source]
        source: io::Error,
    },
    #[error("short pagemap read for {address}: {read} of 8 bytes")]
    ShortRead { address: VirtualAddress, read: usize },
    #[error("page of {address} is not present (record {raw:#018X})")]
    NotPresent { address: VirtualAddress, raw: u64 },
    #[error("frame number of {address} is hidden, CAP_SYS_ADMIN is required")]
    FrameHidden { address: VirtualAddress },
    #[error("frame {frame} of {address} does not form a 64-bit physical address")]
    FrameOutOfRange {
        address: VirtualAddress,
        frame: FrameNumber,
    },
}
