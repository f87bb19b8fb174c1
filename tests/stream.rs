mod common;

use mman::{AccessFlags, Error, MemoryRegion, page_size};
use rstest::rstest;
use std::io::{BufRead, ErrorKind, Read, Write};

#[rstest]
fn sink_stops_at_end_of_region() {
    common::init_logger();
    let page = page_size();
    let mut region = MemoryRegion::map_anonymous(page, common::RW).unwrap();
    let data = common::pattern(page + 10);

    let mut sink = region.as_sink();
    assert_eq!(sink.write(&data).unwrap(), page);
    assert_eq!(sink.position(), page);
    assert_eq!(sink.remaining(), 0);
    let err = sink.write(&data[page..]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteZero);
    assert_eq!(sink.write(&[]).unwrap(), 0);

    assert_eq!(unsafe { region.as_slice() }, &data[..page]);
}

#[rstest]
fn write_all_past_end_fails() {
    let mut region = MemoryRegion::map_anonymous(page_size(), common::RW).unwrap();
    let data = common::pattern(page_size() * 2);
    let err = region.as_sink().write_all(&data).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteZero);
}

#[rstest]
fn sink_continues_after_growing_region() {
    let page = page_size();
    let mut region = MemoryRegion::map_anonymous(page, common::RW).unwrap();
    let data = common::pattern(page * 3 + 5);

    let mut sink = region.as_sink();
    sink.write_all(&data[..page]).unwrap();
    sink.region_mut().grow_if_needed(data.len()).unwrap();
    assert_eq!(sink.region().size(), data.len());
    sink.write_all(&data[page..]).unwrap();
    assert_eq!(sink.position(), data.len());

    assert_eq!(unsafe { region.as_slice() }, &data[..]);
}

#[rstest]
fn source_reads_until_end() {
    let page = page_size();
    let mut region = MemoryRegion::map_anonymous(page, common::RW).unwrap();
    let data = common::pattern(page);
    unsafe { region.as_mut_slice() }.copy_from_slice(&data);

    let mut source = region.as_source();
    let mut head = [0u8; 100];
    source.read_exact(&mut head).unwrap();
    assert_eq!(&head[..], &data[..100]);
    assert_eq!(source.position(), 100);
    assert_eq!(source.remaining(), page - 100);

    let mut rest = Vec::new();
    assert_eq!(source.read_to_end(&mut rest).unwrap(), page - 100);
    assert_eq!(&rest[..], &data[100..]);
    assert_eq!(source.read(&mut head).unwrap(), 0);
}

#[rstest]
fn fill_buf_borrows_mapped_memory() {
    let region = MemoryRegion::map_anonymous(page_size(), AccessFlags::READ).unwrap();
    let mut source = region.as_source();

    let buf = source.fill_buf().unwrap();
    assert_eq!(buf.as_ptr() as usize, region.address());
    assert_eq!(buf.len(), region.size());

    source.consume(16);
    assert_eq!(source.fill_buf().unwrap().as_ptr() as usize, region.address() + 16);
    source.consume(usize::MAX / 2);
    assert!(source.fill_buf().unwrap().is_empty());
}

#[rstest]
#[case(AccessFlags::READ)]
#[case(AccessFlags::empty())]
fn sink_requires_write_access(#[case] access: AccessFlags) {
    let mut region = MemoryRegion::map_anonymous(page_size(), access).unwrap();
    let err = region.as_sink().write(b"data").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[rstest]
fn source_requires_read_access() {
    let region = MemoryRegion::map_anonymous(page_size(), AccessFlags::WRITE).unwrap();
    let mut buf = [0u8; 8];
    let err = region.as_source().read(&mut buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[rstest]
fn closed_region_fails_streams() {
    let mut region = MemoryRegion::map_anonymous(page_size(), common::RW).unwrap();
    region.close().unwrap();

    let mut buf = [0u8; 8];
    let err = region.as_source().read(&mut buf).unwrap_err();
    let inner = err.into_inner().unwrap().downcast::<Error>().unwrap();
    assert!(matches!(*inner, Error::Closed));

    assert!(region.as_sink().write(b"data").is_err());
    assert!(region.as_sink().flush().is_err());
}
