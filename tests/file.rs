mod common;

use mman::{AccessFlags, Error, MapOptions, MappingFlags, MemoryRegion, SyncFlags, page_size};
use rstest::rstest;
use std::{
    fs::{self, File},
    io::{self, Read, Write},
};

#[rstest]
fn map_non_existing_file_to_shared_mapping() {
    let dir = common::scratch();
    let path = dir.path().join("newfile.txt");
    {
        let region = MemoryRegion::map_file(&path, AccessFlags::READ | AccessFlags::WRITE).unwrap();
        assert_ne!(region.address(), 0, "Address cannot be 0");
        assert_eq!(region.size(), page_size());
        assert_eq!(region.mapping_flags(), MappingFlags::SHARED);
        assert!(region.is_file_backed());
    }
    assert!(path.exists());
    assert_eq!(fs::metadata(&path).unwrap().len(), page_size() as u64);
}

#[rstest]
fn map_existing_file_read_only() {
    common::init_logger();
    let path = common::fixture("testfile.txt");
    let len = fs::metadata(&path).unwrap().len();
    let region = MemoryRegion::map_file(&path, AccessFlags::READ).unwrap();
    assert_ne!(region.address(), 0);
    assert_eq!(region.size() as u64, len);
    assert_eq!(unsafe { region.as_slice() }, &fs::read(&path).unwrap()[..]);
}

#[rstest]
fn missing_file_without_create_fails() {
    let dir = common::scratch();
    let err = MapOptions::new()
        .create(false)
        .map_file(dir.path().join("missing.bin"))
        .unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}

#[rstest]
fn anonymous_flag_is_rejected_for_files() {
    let dir = common::scratch();
    let err = MapOptions::new()
        .mapping(MappingFlags::SHARED | MappingFlags::ANON)
        .map_file(dir.path().join("anon.bin"))
        .unwrap_err();
    assert!(matches!(err, Error::Mmap { .. }));
}

#[rstest]
fn change_protection_of_file_mapping() {
    let dir = common::scratch();
    let path = dir.path().join("testfile.txt");
    fs::copy(common::fixture("testfile.txt"), &path).unwrap();

    let mut region = MemoryRegion::map_file(&path, AccessFlags::READ | AccessFlags::WRITE).unwrap();
    assert_eq!(region.access_flags(), AccessFlags::READ | AccessFlags::WRITE);

    region.protect(AccessFlags::READ).unwrap();
    assert_ne!(region.address(), 0);
    assert_eq!(region.access_flags(), AccessFlags::READ);

    region.protect(AccessFlags::READ | AccessFlags::WRITE).unwrap();
    assert_eq!(region.access_flags(), AccessFlags::READ | AccessFlags::WRITE);
}

#[rstest]
fn resize_shared_file_mapping() {
    let page = page_size();
    let dir = common::scratch();
    let path = dir.path().join("newfile.txt");
    let data = common::pattern(page);

    let mut region = MapOptions::new().size(page << 2).map_file(&path).unwrap();
    assert_eq!(region.size(), page << 2);
    let bytes = unsafe { region.as_mut_slice() };
    bytes[..page].copy_from_slice(&data);

    region.resize(page << 4).unwrap();
    assert_ne!(region.address(), 0);
    assert_eq!(region.size(), page << 4);
    assert_eq!(fs::metadata(&path).unwrap().len(), (page << 4) as u64);
    assert_eq!(&unsafe { region.as_slice() }[..page], &data[..]);

    region.resize(page << 1).unwrap();
    assert_ne!(region.address(), 0);
    assert_eq!(region.size(), page << 1);
    assert_eq!(&unsafe { region.as_slice() }[..page], &data[..]);
    // Shrinking the view leaves the file alone.
    assert_eq!(fs::metadata(&path).unwrap().len(), (page << 4) as u64);
}

#[rstest]
fn resize_private_file_mapping() {
    let page = page_size();
    let dir = common::scratch();
    let path = dir.path().join("private.txt");
    fs::copy(common::fixture("testfile.txt"), &path).unwrap();
    let original = fs::read(&path).unwrap();

    let mut region = MapOptions::new()
        .mapping(MappingFlags::PRIVATE)
        .map_file(&path)
        .unwrap();
    let bytes = unsafe { region.as_mut_slice() };
    bytes[..5].copy_from_slice(b"XXXXX");

    region.resize(page * 2).unwrap();
    let bytes = unsafe { region.as_slice() };
    assert_eq!(&bytes[..5], b"XXXXX");
    assert_eq!(&bytes[5..original.len()], &original[5..]);
    region.sync(SyncFlags::SYNC).unwrap();
    drop(region);

    // Private writes never reach the file; only its length grew.
    let on_disk = fs::read(&path).unwrap();
    assert_eq!(on_disk.len(), page * 2);
    assert_eq!(&on_disk[..original.len()], &original[..]);
}

#[rstest]
fn read_only_private_mapping_cannot_outgrow_file() {
    let page = page_size();
    let path = common::fixture("testfile.txt");
    let len = fs::metadata(&path).unwrap().len() as usize;

    let mut region = MapOptions::new()
        .access(AccessFlags::READ)
        .mapping(MappingFlags::PRIVATE)
        .map_file(&path)
        .unwrap();
    let address = region.address();

    let err = region.resize(page * 2).unwrap_err();
    assert!(err.is_recoverable());
    assert!(matches!(err, Error::Resize { .. }));
    assert_eq!(region.address(), address);
    assert_eq!(region.size(), len);
    assert_eq!(fs::metadata(&path).unwrap().len() as usize, len);

    // Shrinking needs no file growth.
    region.resize(len / 2).unwrap();
    assert_eq!(region.size(), len / 2);
}

#[rstest]
fn copy_data_to_shared_file_mapping() {
    let dir = common::scratch();
    let path = dir.path().join("newfile.txt");
    let source_path = common::fixture("testfile.txt");
    let expected = fs::read(&source_path).unwrap();

    {
        let mut region = MapOptions::new()
            .size(expected.len())
            .map_file(&path)
            .unwrap();
        let mut sink = region.as_sink();
        let copied = io::copy(&mut File::open(&source_path).unwrap(), &mut sink).unwrap();
        assert_eq!(copied as usize, expected.len());
        sink.flush().unwrap();
    }

    assert_eq!(fs::read(&path).unwrap(), expected, "File contents do not match");
    let region = MemoryRegion::map_file(&path, AccessFlags::READ).unwrap();
    let mut round_trip = Vec::new();
    region.as_source().read_to_end(&mut round_trip).unwrap();
    assert_eq!(round_trip, expected);
}

#[rstest]
fn copy_data_from_shared_file_mapping() {
    let dir = common::scratch();
    let path = common::fixture("testfile.txt");
    let dest_path = dir.path().join("newfile.txt");

    {
        let region = MemoryRegion::map_file(&path, AccessFlags::READ).unwrap();
        assert_ne!(region.address(), 0);
        let mut sink = File::create(&dest_path).unwrap();
        io::copy(&mut region.as_source(), &mut sink).unwrap();
        sink.flush().unwrap();
    }

    assert_eq!(
        fs::read(&path).unwrap(),
        fs::read(&dest_path).unwrap(),
        "File contents do not match"
    );
}

#[rstest]
fn grow_before_streaming_into_file() {
    let dir = common::scratch();
    let path = dir.path().join("grown.bin");
    let data = common::pattern(page_size() * 3 + 100);

    let mut region = MemoryRegion::map_file(&path, AccessFlags::READ | AccessFlags::WRITE).unwrap();
    region.grow_if_needed(data.len()).unwrap();
    region.as_sink().write_all(&data).unwrap();
    region.sync(SyncFlags::SYNC).unwrap();
    region.close().unwrap();
    assert!(!region.is_file_backed());

    assert_eq!(fs::read(&path).unwrap(), data);
}
