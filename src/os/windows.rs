use crate::{
    Result,
    error::{mmap_error, operation_error, os_failure},
    mmap::{AccessFlags, MappingFlags, Mmap, RegionHandle, SyncFlags},
};
use core::{
    ffi::c_void,
    mem::MaybeUninit,
    ptr::{NonNull, null},
};
use std::{io, sync::LazyLock};
use windows_sys::Win32::{
    Foundation::{CloseHandle, HANDLE},
    System::{
        Memory::{
            self, CreateFileMappingW, FILE_MAP, FILE_MAP_COPY, FILE_MAP_EXECUTE, FILE_MAP_READ,
            FILE_MAP_WRITE, FlushViewOfFile, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE,
            MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile, PAGE_EXECUTE, PAGE_EXECUTE_READ,
            PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY, PAGE_NOACCESS, PAGE_PROTECTION_FLAGS,
            PAGE_READONLY, PAGE_READWRITE, PAGE_WRITECOPY, UnmapViewOfFile,
        },
        SystemInformation::GetSystemInfo,
    },
};

static PAGE_SIZE: LazyLock<usize> = LazyLock::new(|| {
    let mut sys_info = MaybeUninit::uninit();
    unsafe {
        GetSystemInfo(sys_info.as_mut_ptr());
        sys_info.assume_init().dwPageSize as usize
    }
});

pub struct DefaultMmap;

fn prot_win(access: AccessFlags, copy_on_write: bool) -> PAGE_PROTECTION_FLAGS {
    let read = access.contains(AccessFlags::READ);
    match (
        access.contains(AccessFlags::WRITE),
        access.contains(AccessFlags::EXEC),
    ) {
        (false, false) if read => PAGE_READONLY,
        (false, false) => PAGE_NOACCESS,
        (true, false) if copy_on_write => PAGE_WRITECOPY,
        (true, false) => PAGE_READWRITE,
        (false, true) if read => PAGE_EXECUTE_READ,
        (false, true) => PAGE_EXECUTE,
        (true, true) if copy_on_write => PAGE_EXECUTE_WRITECOPY,
        (true, true) => PAGE_EXECUTE_READWRITE,
    }
}

fn view_access(access: AccessFlags, copy_on_write: bool) -> FILE_MAP {
    let mut view = FILE_MAP_READ;
    if access.contains(AccessFlags::WRITE) {
        view |= if copy_on_write {
            FILE_MAP_COPY
        } else {
            FILE_MAP_WRITE
        };
    }
    if access.contains(AccessFlags::EXEC) {
        view |= FILE_MAP_EXECUTE;
    }
    view
}

unsafe fn map_file(
    fd: isize,
    len: usize,
    access: AccessFlags,
    flags: MappingFlags,
) -> Result<RegionHandle> {
    let copy_on_write = flags.contains(MappingFlags::PRIVATE);
    let size = len as u64;
    // A mapping object cannot be created without read access; views narrow it later.
    let object_prot = prot_win(access | AccessFlags::READ, copy_on_write);
    let mapping = unsafe {
        CreateFileMappingW(
            fd as HANDLE,
            null(),
            object_prot,
            (size >> 32) as u32,
            size as u32,
            null(),
        )
    };
    if mapping.is_null() {
        return Err(mmap_error(os_failure(
            "CreateFileMappingW",
            io::Error::last_os_error(),
        )));
    }

    let view = unsafe { MapViewOfFile(mapping, view_access(access, copy_on_write), 0, 0, len) };
    let Some(ptr) = NonNull::new(view.Value) else {
        let err = io::Error::last_os_error();
        unsafe { CloseHandle(mapping) };
        return Err(mmap_error(os_failure("MapViewOfFile", err)));
    };
    let handle = unsafe { RegionHandle::with_object(ptr, flags, mapping as isize) };

    if !access.contains(AccessFlags::READ) {
        // Views always carry read access; strip it to honour the requested protection.
        if let Err(err) = unsafe { DefaultMmap::mprotect(&handle, len, access) } {
            let _ = unsafe { DefaultMmap::munmap(&handle, len) };
            return Err(mmap_error(err.to_string()));
        }
    }

    #[cfg(feature = "log")]
    log::debug!(
        "Mapped file view at address: {:p}, length: {}, access: {:?}",
        ptr,
        len,
        access
    );
    Ok(handle)
}

impl Mmap for DefaultMmap {
    unsafe fn mmap(
        fd: Option<isize>,
        len: usize,
        access: AccessFlags,
        flags: MappingFlags,
    ) -> Result<RegionHandle> {
        if let Some(fd) = fd {
            return unsafe { map_file(fd, len, access, flags) };
        }
        let ptr = unsafe {
            Memory::VirtualAlloc(
                null(),
                len,
                MEM_RESERVE | MEM_COMMIT,
                prot_win(access, false),
            )
        };
        match NonNull::new(ptr) {
            Some(ptr) => Ok(unsafe { RegionHandle::new(ptr, flags) }),
            None => Err(mmap_error(os_failure(
                "VirtualAlloc",
                io::Error::last_os_error(),
            ))),
        }
    }

    unsafe fn munmap(handle: &RegionHandle, _len: usize) -> Result<()> {
        if handle.object() == 0 {
            if unsafe { Memory::VirtualFree(handle.as_ptr(), 0, MEM_RELEASE) } == 0 {
                return Err(last_failure("VirtualFree"));
            }
            return Ok(());
        }
        let view = MEMORY_MAPPED_VIEW_ADDRESS {
            Value: handle.as_ptr(),
        };
        if unsafe { UnmapViewOfFile(view) } == 0 {
            return Err(last_failure("UnmapViewOfFile"));
        }
        unsafe { CloseHandle(handle.object() as HANDLE) };
        Ok(())
    }

    unsafe fn mprotect(handle: &RegionHandle, len: usize, access: AccessFlags) -> Result<()> {
        let copy_on_write =
            handle.object() != 0 && handle.flags().contains(MappingFlags::PRIVATE);
        let mut old = MaybeUninit::uninit();
        if unsafe {
            Memory::VirtualProtect(
                handle.as_ptr(),
                len,
                prot_win(access, copy_on_write),
                old.as_mut_ptr(),
            )
        } == 0
        {
            return Err(last_failure("VirtualProtect"));
        }
        Ok(())
    }

    unsafe fn mlock(handle: &RegionHandle, len: usize) -> Result<()> {
        if unsafe { Memory::VirtualLock(handle.as_ptr(), len) } == 0 {
            return Err(last_failure("VirtualLock"));
        }
        Ok(())
    }

    unsafe fn munlock(handle: &RegionHandle, len: usize) -> Result<()> {
        if unsafe { Memory::VirtualUnlock(handle.as_ptr(), len) } == 0 {
            return Err(last_failure("VirtualUnlock"));
        }
        Ok(())
    }

    unsafe fn msync(handle: &RegionHandle, len: usize, flags: SyncFlags) -> Result<()> {
        // FlushViewOfFile already starts the write-back; INVALIDATE has no equivalent.
        let _ = flags;
        if unsafe { FlushViewOfFile(handle.as_ptr() as *const c_void, len) } == 0 {
            return Err(last_failure("FlushViewOfFile"));
        }
        Ok(())
    }

    #[inline]
    fn page_size() -> usize {
        *PAGE_SIZE
    }
}

#[cold]
#[inline(never)]
fn last_failure(call: &'static str) -> crate::Error {
    operation_error(os_failure(call, io::Error::last_os_error()))
}
