use physmem::{BackingKind, MapError, PhysicalAddress, PhysicalMemoryMapper, RegionAccessError};
use std::io::{Read, Seek, SeekFrom, Write};
use tempfile::NamedTempFile;

const PAGE: u64 = 4096;

/// A two-page file standing in for `/dev/mem`; file offset = physical address.
fn fake_device() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&[0_u8; 2 * PAGE as usize]).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn window_maps_the_requested_offset() {
    let mut device = fake_device();
    device.seek(SeekFrom::Start(PAGE + 8)).unwrap();
    device.write_all(&0xDEAD_BEEF_u32.to_ne_bytes()).unwrap();
    device.flush().unwrap();

    let mapper = PhysicalMemoryMapper::with_device(device.path());
    let region = mapper.map(PhysicalAddress::new(PAGE), PAGE as usize).unwrap();

    assert_eq!(region.len(), PAGE as usize);
    assert_eq!(region.physical_base(), PhysicalAddress::new(PAGE));
    assert_eq!(region.kind(), BackingKind::DeviceFile(device.path()));
    assert!(region.base().is_aligned_to(PAGE));
    assert_eq!(region.read::<u32>(8).unwrap(), 0xDEAD_BEEF);

    PhysicalMemoryMapper::unmap(region).unwrap();
}

#[test]
fn writes_reach_the_device() {
    let mut device = fake_device();
    let mapper = PhysicalMemoryMapper::with_device(device.path());

    let mut region = mapper.map(PhysicalAddress::new(0), PAGE as usize).unwrap();
    region.write::<u64>(16, 0x0123_4567_89AB_CDEF).unwrap();
    region.write::<u8>(3, 0x7F).unwrap();
    assert_eq!(region.read::<u64>(16).unwrap(), 0x0123_4567_89AB_CDEF);
    PhysicalMemoryMapper::unmap(region).unwrap();

    let mut contents = Vec::new();
    device.as_file_mut().seek(SeekFrom::Start(0)).unwrap();
    device.as_file_mut().read_to_end(&mut contents).unwrap();
    assert_eq!(contents[3], 0x7F);
    assert_eq!(&contents[16..24], &0x0123_4567_89AB_CDEF_u64.to_ne_bytes());
}

#[test]
fn accesses_are_bounded_and_aligned() {
    let device = fake_device();
    let mapper = PhysicalMemoryMapper::with_device(device.path());
    let mut region = mapper.map(PhysicalAddress::new(0), PAGE as usize).unwrap();

    assert_eq!(
        region.read::<u32>(PAGE as usize - 2),
        Err(RegionAccessError::OutOfBounds {
            offset: PAGE as usize - 2,
            width: 4,
            len: PAGE as usize
        })
    );
    assert_eq!(
        region.write::<u16>(usize::MAX, 1),
        Err(RegionAccessError::OutOfBounds {
            offset: usize::MAX,
            width: 2,
            len: PAGE as usize
        })
    );
    assert_eq!(
        region.read::<u64>(4),
        Err(RegionAccessError::Misaligned {
            offset: 4,
            width: 8
        })
    );
    assert!(region.read::<u8>(PAGE as usize - 1).is_ok());

    PhysicalMemoryMapper::unmap(region).unwrap();
}

#[test]
fn unaligned_physical_address_fails() {
    let device = fake_device();
    let mapper = PhysicalMemoryMapper::with_device(device.path());

    match mapper.map(PhysicalAddress::new(0x10), 64) {
        Err(MapError::MapFailed { source, .. }) => {
            assert_eq!(source.raw_os_error(), Some(libc::EINVAL));
        }
        Ok(region) => {
            PhysicalMemoryMapper::unmap(region).unwrap();
            panic!("unaligned mapping succeeded");
        }
    }
}

#[test]
fn empty_window_fails() {
    let device = fake_device();
    let mapper = PhysicalMemoryMapper::with_device(device.path());
    assert!(mapper.map(PhysicalAddress::new(0), 0).is_err());
}

#[test]
fn missing_device_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mem");
    let mapper = PhysicalMemoryMapper::with_device(&path);

    match mapper.map(PhysicalAddress::new(0), PAGE as usize) {
        Err(MapError::MapFailed {
            path: p, source, ..
        }) => {
            assert_eq!(p, path);
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        Ok(region) => {
            PhysicalMemoryMapper::unmap(region).unwrap();
            panic!("mapping a missing device succeeded");
        }
    }
}

#[test]
fn default_mapper_uses_dev_mem() {
    assert_eq!(
        PhysicalMemoryMapper::default().device(),
        std::path::Path::new("/dev/mem")
    );
}

#[test]
#[ignore = "requires CAP_SYS_RAWIO and access to /dev/mem"]
fn legacy_bios_area_is_mappable() {
    let region = PhysicalMemoryMapper::new()
        .map(PhysicalAddress::new(0xF_0000), PAGE as usize)
        .unwrap();
    let _ = region.read::<u32>(0).unwrap();
    PhysicalMemoryMapper::unmap(region).unwrap();
}
