use crate::{
    Result,
    error::{mmap_error, operation_error, os_failure},
    mmap::{AccessFlags, MappingFlags, Mmap, RegionHandle, SyncFlags},
};
use core::{
    ffi::{c_int, c_void},
    ptr::{NonNull, null_mut},
};
use libc::{mlock, mmap, mprotect, msync, munlock, munmap};
use std::{io, sync::LazyLock};

static PAGE_SIZE: LazyLock<usize> =
    LazyLock::new(|| unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize);

/// An implementation of Mmap trait
pub struct DefaultMmap;

pub(crate) fn prot_posix(access: AccessFlags) -> c_int {
    let mut prot = libc::PROT_NONE;
    if access.contains(AccessFlags::READ) {
        prot |= libc::PROT_READ;
    }
    if access.contains(AccessFlags::WRITE) {
        prot |= libc::PROT_WRITE;
    }
    if access.contains(AccessFlags::EXEC) {
        prot |= libc::PROT_EXEC;
    }
    prot
}

pub(crate) fn map_posix(flags: MappingFlags) -> c_int {
    let mut map = 0;
    if flags.contains(MappingFlags::ANON) {
        map |= libc::MAP_ANON;
    }
    if flags.contains(MappingFlags::PRIVATE) {
        map |= libc::MAP_PRIVATE;
    }
    if flags.contains(MappingFlags::SHARED) {
        map |= libc::MAP_SHARED;
    }
    map
}

pub(crate) fn sync_posix(flags: SyncFlags) -> c_int {
    let mut sync = 0;
    if flags.contains(SyncFlags::SYNC) {
        sync |= libc::MS_SYNC;
    }
    if flags.contains(SyncFlags::ASYNC) {
        sync |= libc::MS_ASYNC;
    }
    if flags.contains(SyncFlags::INVALIDATE) {
        sync |= libc::MS_INVALIDATE;
    }
    sync
}

impl Mmap for DefaultMmap {
    unsafe fn mmap(
        fd: Option<isize>,
        len: usize,
        access: AccessFlags,
        flags: MappingFlags,
    ) -> Result<RegionHandle> {
        let ptr = unsafe {
            mmap(
                null_mut(),
                len,
                prot_posix(access),
                map_posix(flags),
                fd.map_or(-1, |fd| fd as c_int),
                0,
            )
        };
        if core::ptr::eq(ptr, libc::MAP_FAILED) {
            return Err(mmap_error(os_failure("mmap", io::Error::last_os_error())));
        }
        Ok(unsafe { RegionHandle::new(NonNull::new_unchecked(ptr), flags) })
    }

    unsafe fn munmap(handle: &RegionHandle, len: usize) -> Result<()> {
        let res = unsafe { munmap(handle.as_ptr(), len) };
        check(res, "munmap")
    }

    unsafe fn mprotect(handle: &RegionHandle, len: usize, access: AccessFlags) -> Result<()> {
        let res = unsafe { mprotect(handle.as_ptr(), len, prot_posix(access)) };
        check(res, "mprotect")
    }

    unsafe fn mlock(handle: &RegionHandle, len: usize) -> Result<()> {
        let res = unsafe { mlock(handle.as_ptr() as *const c_void, len) };
        check(res, "mlock")
    }

    unsafe fn munlock(handle: &RegionHandle, len: usize) -> Result<()> {
        let res = unsafe { munlock(handle.as_ptr() as *const c_void, len) };
        check(res, "munlock")
    }

    unsafe fn msync(handle: &RegionHandle, len: usize, flags: SyncFlags) -> Result<()> {
        let res = unsafe { msync(handle.as_ptr(), len, sync_posix(flags)) };
        check(res, "msync")
    }

    #[inline]
    fn page_size() -> usize {
        *PAGE_SIZE
    }
}

#[inline]
fn check(res: c_int, call: &'static str) -> Result<()> {
    if res != 0 {
        return Err(operation_error(os_failure(call, io::Error::last_os_error())));
    }
    Ok(())
}
