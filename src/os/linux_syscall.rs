use crate::{
    Error, Result,
    error::{mmap_error, operation_error, os_failure},
    mmap::{AccessFlags, MappingFlags, Mmap, RegionHandle, SyncFlags},
};
use core::{
    ffi::{c_int, c_void},
    ptr::{NonNull, null_mut},
};
use std::{io, sync::LazyLock};
use syscalls::Sysno;

static PAGE_SIZE: LazyLock<usize> =
    LazyLock::new(|| unsafe { libc::getauxval(libc::AT_PAGESZ) } as usize);

/// An implementation of Mmap trait
pub struct DefaultMmap;

fn prot_linux(access: AccessFlags) -> c_int {
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

fn map_linux(flags: MappingFlags) -> c_int {
    let mut map = 0;
    if flags.contains(MappingFlags::ANON) {
        map |= libc::MAP_ANONYMOUS;
    }
    if flags.contains(MappingFlags::PRIVATE) {
        map |= libc::MAP_PRIVATE;
    }
    if flags.contains(MappingFlags::SHARED) {
        map |= libc::MAP_SHARED;
    }
    map
}

fn sync_linux(flags: SyncFlags) -> c_int {
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
        let fd = fd.map_or(usize::MAX, |fd| fd as usize);
        let ptr = unsafe {
            #[cfg(target_pointer_width = "32")]
            let syscall = Sysno::mmap2;
            #[cfg(not(target_pointer_width = "32"))]
            let syscall = Sysno::mmap;
            from_ret(
                syscalls::raw_syscall!(
                    syscall,
                    null_mut::<c_void>(),
                    len,
                    prot_linux(access),
                    map_linux(flags),
                    fd,
                    0
                ),
                "mmap",
                mmap_error,
            )?
        };
        Ok(unsafe { RegionHandle::new(NonNull::new_unchecked(ptr as *mut c_void), flags) })
    }

    unsafe fn munmap(handle: &RegionHandle, len: usize) -> Result<()> {
        unsafe {
            from_ret(
                syscalls::raw_syscall!(Sysno::munmap, handle.as_ptr(), len),
                "munmap",
                operation_error,
            )?;
        }
        Ok(())
    }

    unsafe fn mprotect(handle: &RegionHandle, len: usize, access: AccessFlags) -> Result<()> {
        unsafe {
            from_ret(
                syscalls::raw_syscall!(Sysno::mprotect, handle.as_ptr(), len, prot_linux(access)),
                "mprotect",
                operation_error,
            )?;
        }
        Ok(())
    }

    unsafe fn mlock(handle: &RegionHandle, len: usize) -> Result<()> {
        unsafe {
            from_ret(
                syscalls::raw_syscall!(Sysno::mlock, handle.as_ptr(), len),
                "mlock",
                operation_error,
            )?;
        }
        Ok(())
    }

    unsafe fn munlock(handle: &RegionHandle, len: usize) -> Result<()> {
        unsafe {
            from_ret(
                syscalls::raw_syscall!(Sysno::munlock, handle.as_ptr(), len),
                "munlock",
                operation_error,
            )?;
        }
        Ok(())
    }

    unsafe fn msync(handle: &RegionHandle, len: usize, flags: SyncFlags) -> Result<()> {
        unsafe {
            from_ret(
                syscalls::raw_syscall!(Sysno::msync, handle.as_ptr(), len, sync_linux(flags)),
                "msync",
                operation_error,
            )?;
        }
        Ok(())
    }

    #[inline]
    fn page_size() -> usize {
        *PAGE_SIZE
    }
}

/// Converts a raw syscall return value to a result.
#[inline(always)]
fn from_ret(
    value: usize,
    call: &'static str,
    kind: fn(alloc::borrow::Cow<'static, str>) -> Error,
) -> Result<usize> {
    if value > -4096isize as usize {
        // Truncation of the error value is guaranteed to never occur due to
        // the above check. This is the same check that musl uses:
        // https://git.musl-libc.org/cgit/musl/tree/src/internal/syscall_ret.c?h=v1.1.15
        let errno = -(value as isize) as i32;
        return Err(kind(os_failure(call, io::Error::from_raw_os_error(errno))));
    }
    Ok(value)
}
