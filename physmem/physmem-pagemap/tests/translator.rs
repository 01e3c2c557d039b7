use physmem_addresses::{FrameNumber, PhysicalAddress, VirtualAddress};
use physmem_pagemap::{AddressTranslator, TranslateError};
use std::io::Write;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::NamedTempFile;

const PAGE: u64 = 4096;

const PRESENT_FRAME: u64 = 0x8000_0000_0000_1234;
const NOT_PRESENT: u64 = 0;
const PRESENT_HIDDEN: u64 = 0x8000_0000_0000_0000;
const SWAPPED: u64 = 0x4000_0000_0000_0203;

/// Writes a fake pagemap holding one record per page, plus a torn trailing record.
fn fake_pagemap() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for record in [PRESENT_FRAME, NOT_PRESENT, PRESENT_HIDDEN, SWAPPED] {
        file.write_all(&record.to_ne_bytes()).unwrap();
    }
    file.write_all(&[0xFF; 4]).unwrap();
    file.flush().unwrap();
    file
}

fn page(index: u64) -> VirtualAddress {
    VirtualAddress::new(index * PAGE)
}

#[test]
fn record_offset_is_page_index_times_eight() {
    let t = AddressTranslator::with_pagemap("/nonexistent", PAGE).unwrap();
    assert_eq!(t.entry_offset(VirtualAddress::new(0)).unwrap(), 0);
    assert_eq!(t.entry_offset(VirtualAddress::new(3 * PAGE + 5)).unwrap(), 24);
    assert_eq!(
        t.entry_offset(VirtualAddress::new(0x7FFF_FFFF_F000)).unwrap(),
        (0x7FFF_FFFF_F000 / PAGE) * 8
    );
}

#[test]
fn present_page_reports_its_frame() {
    let map = fake_pagemap();
    let t = AddressTranslator::with_pagemap(map.path(), PAGE).unwrap();

    let info = t.translate(page(0) + 0x10).unwrap();
    assert!(info.present());
    assert_eq!(info.page_table_entry_raw(), PRESENT_FRAME);
    assert_eq!(info.physical_frame_number(), Some(FrameNumber::new(0x1234)));
}

#[test]
fn repeated_translation_is_stable() {
    let map = fake_pagemap();
    let t = AddressTranslator::with_pagemap(map.path(), PAGE).unwrap();

    let first = t.virt_to_phys(page(0)).unwrap();
    for _ in 0..16 {
        assert_eq!(t.virt_to_phys(page(0)).unwrap(), first);
    }
}

#[test]
fn physical_address_keeps_the_in_page_offset() {
    let map = fake_pagemap();
    let t = AddressTranslator::with_pagemap(map.path(), PAGE).unwrap();

    let pa = t.virt_to_phys(page(0) + 0x123).unwrap();
    assert_eq!(pa, PhysicalAddress::new(0x1234 * PAGE + 0x123));
}

#[test]
fn absent_page_never_yields_a_frame() {
    let map = fake_pagemap();
    let t = AddressTranslator::with_pagemap(map.path(), PAGE).unwrap();

    let entry = t.read_entry(page(1)).unwrap();
    assert!(!entry.present());
    assert_eq!(entry.physical_frame_number(), None);

    assert!(matches!(
        t.translate(page(1)),
        Err(TranslateError::NotPresent { raw: NOT_PRESENT, .. })
    ));
    assert!(matches!(
        t.virt_to_phys(page(1)),
        Err(TranslateError::NotPresent { .. })
    ));
}

#[test]
fn swapped_page_is_not_present_but_carries_swap_metadata() {
    let map = fake_pagemap();
    let t = AddressTranslator::with_pagemap(map.path(), PAGE).unwrap();

    let entry = t.read_entry(page(3)).unwrap().entry();
    assert!(entry.swapped());
    assert!(!entry.present());
    assert_eq!(entry.swap_type(), Some(3));
    assert_eq!(entry.swap_offset(), Some(0x10));
    assert!(t.translate(page(3)).is_err());
}

#[test]
fn zero_frame_is_reported_as_hidden() {
    let map = fake_pagemap();
    let t = AddressTranslator::with_pagemap(map.path(), PAGE).unwrap();

    // present, but the frame number was withheld
    assert!(t.translate(page(2)).unwrap().present());
    assert!(matches!(
        t.virt_to_phys(page(2)),
        Err(TranslateError::FrameHidden { .. })
    ));
}

#[test]
fn torn_record_is_a_short_read() {
    let map = fake_pagemap();
    let t = AddressTranslator::with_pagemap(map.path(), PAGE).unwrap();

    assert!(matches!(
        t.translate(page(4)),
        Err(TranslateError::ShortRead { read: 4, .. })
    ));
}

#[test]
fn record_past_the_end_is_a_short_read() {
    let map = fake_pagemap();
    let t = AddressTranslator::with_pagemap(map.path(), PAGE).unwrap();

    assert!(matches!(
        t.translate(page(1000)),
        Err(TranslateError::ShortRead { read: 0, .. })
    ));
}

#[test]
fn missing_pagemap_is_permission_denied() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pagemap");
    let t = AddressTranslator::with_pagemap(&path, PAGE).unwrap();

    match t.translate(page(0)) {
        Err(TranslateError::PermissionDenied { path: p, source }) => {
            assert_eq!(p, path);
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn unrepresentable_offset_fails_to_seek() {
    let map = fake_pagemap();
    // byte-sized pages push the record offset of high addresses past i64::MAX
    let t = AddressTranslator::with_pagemap(map.path(), 1).unwrap();

    let err = t.translate(VirtualAddress::new(u64::MAX)).unwrap_err();
    match err {
        TranslateError::SeekFailed { source, .. } => {
            assert_eq!(source.kind(), std::io::ErrorKind::InvalidInput);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn page_size_must_be_a_power_of_two() {
    for size in [0, 3000, 4097] {
        assert!(matches!(
            AddressTranslator::with_pagemap("/proc/self/pagemap", size),
            Err(TranslateError::InvalidPageSize(s)) if s == size
        ));
    }
    let t = AddressTranslator::with_pagemap("/proc/self/pagemap", 4096).unwrap();
    assert_eq!(t.page_size(), 4096);
}

#[test]
fn concurrent_translations_agree() {
    let map = fake_pagemap();
    let t = Arc::new(AddressTranslator::with_pagemap(map.path(), PAGE).unwrap());
    let threads = 8;
    let start = Arc::new(Barrier::new(threads));

    let mut handles = Vec::with_capacity(threads);
    for _ in 0..threads {
        let t = Arc::clone(&t);
        let start = Arc::clone(&start);
        handles.push(thread::spawn(move || {
            start.wait();
            for _ in 0..200 {
                assert_eq!(
                    t.virt_to_phys(page(0)).unwrap(),
                    PhysicalAddress::new(0x1234 * PAGE)
                );
                assert!(t.translate(page(1)).is_err());
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }
}

#[test]
#[ignore = "reads the host's /proc/self/pagemap"]
fn own_stack_page_is_present_in_the_real_pagemap() {
    let local = [0x5A_u8; 64];
    let t = AddressTranslator::new();

    // the calling process may always read its own records; only the frame may be hidden
    let info = t
        .translate(VirtualAddress::from_ptr(local.as_ptr()))
        .unwrap();
    assert!(info.present());
    assert_eq!(local[0], 0x5A);
}

#[test]
#[ignore = "requires CAP_SYS_ADMIN to see frame numbers"]
fn own_stack_page_resolves_to_a_physical_address() {
    let local = [0xA5_u8; 64];
    let t = AddressTranslator::new();

    let pa = t.virt_to_phys(VirtualAddress::from_ptr(local.as_ptr())).unwrap();
    assert_ne!(pa.as_u64(), 0);
    assert_eq!(local[63], 0xA5);
}
