//! Memory mapping primitives
//!
//! This module provides the portable flag sets and the backend trait that every
//! platform implements. The flag values are platform independent; each backend
//! translates them into its native constants before issuing the system call.
//!
//! Key concepts:
//! - **Access Flags**: Control read, write, and execute permissions.
//! - **Mapping Flags**: Select an anonymous, private or shared mapping.
//! - **Sync Flags**: Choose how dirty pages are written back to the file.
//!
//! # Safety
//! Memory mapping involves direct manipulation of the process's address space.
//! Incorrect usage can cause crashes, data corruption, or security issues.

pub use crate::os::DefaultMmap;

use crate::Result;
use bitflags::bitflags;
use core::{ffi::c_void, ptr::NonNull};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    /// Memory protection flags for controlling access permissions.
    ///
    /// An empty set reserves the range without allowing any access.
    pub struct AccessFlags: u32 {
        /// Allow reading from the memory region.
        const READ = 1;

        /// Allow writing to the memory region.
        const WRITE = 1 << 1;

        /// Allow executing code in the memory region.
        const EXEC = 1 << 2;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    /// Memory mapping configuration flags.
    pub struct MappingFlags: u32 {
        /// The mapping is not backed by any file.
        const ANON = 1;

        /// Create a private copy-on-write mapping. Changes never reach the file.
        const PRIVATE = 1 << 1;

        /// Create a shared mapping. Changes are visible to other mappers and are
        /// written back to the file.
        const SHARED = 1 << 2;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    /// Write-back behaviour for [`Mmap::msync`].
    pub struct SyncFlags: u32 {
        /// Block until the dirty pages have been written.
        const SYNC = 1;

        /// Schedule the write and return immediately.
        const ASYNC = 1 << 1;

        /// Invalidate other mappings of the same file.
        const INVALIDATE = 1 << 2;
    }
}

impl MappingFlags {
    /// Whether the mapping writes back to its file.
    #[inline]
    pub fn is_shared(self) -> bool {
        self.contains(MappingFlags::SHARED)
    }

    /// Checks that exactly one of `PRIVATE` and `SHARED` is set and that `ANON`
    /// only appears when no file is involved.
    pub(crate) fn validate(self, file_backed: bool) -> core::result::Result<(), &'static str> {
        let private = self.contains(MappingFlags::PRIVATE);
        if private == self.contains(MappingFlags::SHARED) {
            return Err("exactly one of PRIVATE and SHARED must be set");
        }
        if file_backed && self.contains(MappingFlags::ANON) {
            return Err("ANON cannot be combined with a backing file");
        }
        Ok(())
    }
}

/// The native address of a live mapping, issued by [`Mmap::mmap`].
///
/// A handle is only meaningful between the `mmap` call that created it and the
/// `munmap` call that releases it. It is neither `Clone` nor `Copy`.
#[derive(Debug)]
pub struct RegionHandle {
    ptr: NonNull<c_void>,
    flags: MappingFlags,
    object: isize,
}

impl RegionHandle {
    /// # Safety
    /// `ptr` must be the base address of a live mapping created with `flags`.
    #[inline]
    pub unsafe fn new(ptr: NonNull<c_void>, flags: MappingFlags) -> Self {
        Self {
            ptr,
            flags,
            object: 0,
        }
    }

    /// Creates a handle that also owns a platform object, such as the file
    /// mapping object Windows keeps next to every view.
    ///
    /// # Safety
    /// Same as [`RegionHandle::new`]; `object` must stay valid until `munmap`.
    #[inline]
    pub unsafe fn with_object(ptr: NonNull<c_void>, flags: MappingFlags, object: isize) -> Self {
        Self { ptr, flags, object }
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn flags(&self) -> MappingFlags {
        self.flags
    }

    #[inline]
    pub fn object(&self) -> isize {
        self.object
    }
}

/// A trait for low-level memory mapping operations.
///
/// This trait provides a unified interface for anonymous memory allocation and
/// file-backed mappings. [`DefaultMmap`] implements it for the build target.
///
/// Every method reports failure through `Err`; the failing call's OS message is
/// also recorded for [`last_error`](crate::last_error).
///
/// # Safety
/// All methods are unsafe because they manipulate the process's virtual address space.
/// Callers must only pass handles obtained from `mmap` of the same implementation,
/// together with the length the mapping currently has.
pub trait Mmap {
    /// Maps a file or creates an anonymous mapping into memory.
    ///
    /// # Arguments
    /// * `fd` - Raw descriptor (a `HANDLE` on Windows) of the backing file, or `None` for
    ///   anonymous memory.
    /// * `len` - Size of the mapping in bytes (rounded up to page size by the OS).
    /// * `access` - Initial protection of the mapping.
    /// * `flags` - Mapping kind.
    ///
    /// # Safety
    /// `fd` must be a valid, open descriptor whose file is at least `len` bytes long
    /// when the mapping is shared.
    unsafe fn mmap(
        fd: Option<isize>,
        len: usize,
        access: AccessFlags,
        flags: MappingFlags,
    ) -> Result<RegionHandle>;

    /// Unmaps a memory region. The handle must not be used again after success.
    ///
    /// # Safety
    /// Do not access the region after unmapping.
    unsafe fn munmap(handle: &RegionHandle, len: usize) -> Result<()>;

    /// Changes the protection of the whole region. The address never changes.
    ///
    /// # Safety
    /// Removing permissions makes later accesses through live pointers fault.
    unsafe fn mprotect(handle: &RegionHandle, len: usize, access: AccessFlags) -> Result<()>;

    /// Pins the region's pages in physical memory.
    ///
    /// # Safety
    /// `handle` and `len` must describe a live mapping.
    unsafe fn mlock(handle: &RegionHandle, len: usize) -> Result<()>;

    /// Releases a previous [`Mmap::mlock`].
    ///
    /// # Safety
    /// `handle` and `len` must describe a live mapping.
    unsafe fn munlock(handle: &RegionHandle, len: usize) -> Result<()>;

    /// Flushes dirty pages of a file-backed mapping to the backing store.
    ///
    /// # Safety
    /// `handle` and `len` must describe a live mapping.
    unsafe fn msync(handle: &RegionHandle, len: usize, flags: SyncFlags) -> Result<()>;

    /// The platform's page granularity. Queried once per process.
    fn page_size() -> usize;
}
