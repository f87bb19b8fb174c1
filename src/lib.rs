//! # mman
//! A small, cross-platform layer for creating, resizing, protecting, locking and
//! synchronizing memory mappings.
//! ## Usage
//! A [`MemoryRegion`] owns one mapping. It is either anonymous memory or a view of
//! a file, and it is released when dropped. All OS interaction goes through the
//! [`Mmap`](mmap::Mmap) trait, whose implementation for the build target is
//! [`DefaultMmap`](mmap::DefaultMmap): libc on unix (or raw syscalls with the
//! `use-syscall` feature on Linux) and windows-sys on Windows.
//! ## Example
//! ```no_run
//! use mman::{AccessFlags, MemoryRegion, SyncFlags};
//! use std::io::Write;
//!
//! let mut region = MemoryRegion::map_file("data.bin", AccessFlags::READ | AccessFlags::WRITE)?;
//! region.grow_if_needed(64 * 1024)?;
//! region.as_sink().write_all(b"hello")?;
//! region.sync(SyncFlags::SYNC)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
extern crate alloc;

mod error;
pub mod mmap;
mod os;
mod region;
mod stream;

pub use error::{Error, last_error};
pub use mmap::{AccessFlags, MappingFlags, SyncFlags};
pub use region::{MapOptions, MemoryRegion};
pub use stream::{Sink, Source};

/// The page granularity of the platform, queried once per process.
#[inline]
pub fn page_size() -> usize {
    <mmap::DefaultMmap as mmap::Mmap>::page_size()
}

pub type Result<T> = core::result::Result<T, Error>;
