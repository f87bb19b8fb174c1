#![allow(dead_code)]

use mman::AccessFlags;
use std::path::PathBuf;
use tempfile::TempDir;

pub const RW: AccessFlags = AccessFlags::READ.union(AccessFlags::WRITE);

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn scratch() -> TempDir {
    init_logger();
    tempfile::tempdir().unwrap()
}

/// Bytes `0, 1, .., 255, 0, 1, ..` of length `len`.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| i as u8).collect()
}
