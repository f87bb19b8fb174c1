//! The owner of a single live mapping.
//!
//! A [`MemoryRegion`] tracks the address, size and protection of one mapping and
//! forwards every OS interaction to an [`Mmap`] backend. Each operation either
//! applies completely or leaves the region as it was, with one exception: a shared
//! file mapping that loses its old range during [`MemoryRegion::resize`] and cannot
//! be mapped again is closed and reported as [`Error::Unmapped`](crate::Error::Unmapped).

use crate::{
    Result,
    error::{closed_error, io_error, mmap_error, resize_error, unmapped_error},
    mmap::{AccessFlags, DefaultMmap, MappingFlags, Mmap, RegionHandle, SyncFlags},
    os::raw_descriptor,
    stream::{Sink, Source},
};
use core::{
    fmt::Debug,
    marker::PhantomData,
    ptr::{copy_nonoverlapping, null_mut},
};
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

/// Options and flags which can be used to configure how a region is mapped.
///
/// # Example
/// ```no_run
/// use mman::{AccessFlags, MapOptions, MappingFlags};
///
/// let region = MapOptions::new()
///     .access(AccessFlags::READ)
///     .mapping(MappingFlags::PRIVATE)
///     .map_file("data.bin")
///     .unwrap();
/// assert_ne!(region.address(), 0);
/// ```
pub struct MapOptions<M: Mmap = DefaultMmap> {
    access: AccessFlags,
    mapping: Option<MappingFlags>,
    size: Option<usize>,
    create: bool,
    _marker: PhantomData<fn() -> M>,
}

impl MapOptions {
    /// Read-write access, the default mapping kind, size taken from the file,
    /// missing files created.
    #[inline]
    pub fn new() -> Self {
        Self::with_backend()
    }
}

impl Default for MapOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Mmap> MapOptions<M> {
    /// Same defaults as [`MapOptions::new`], mapping through the backend `M`.
    #[inline]
    pub fn with_backend() -> Self {
        Self {
            access: AccessFlags::READ | AccessFlags::WRITE,
            mapping: None,
            size: None,
            create: true,
            _marker: PhantomData,
        }
    }

    /// Sets the initial protection of the mapping.
    #[inline]
    pub fn access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    /// Overrides the mapping kind. Anonymous regions default to `PRIVATE | ANON`,
    /// file regions to `SHARED`.
    #[inline]
    pub fn mapping(mut self, mapping: MappingFlags) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Maps exactly `size` bytes of the file, growing the file if it is shorter.
    #[inline]
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Whether a missing file is created. Defaults to `true`.
    #[inline]
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Maps `size` bytes of fresh, zeroed memory.
    pub fn map_anonymous(&self, size: usize) -> Result<MemoryRegion<M>> {
        let mapping = self
            .mapping
            .unwrap_or(MappingFlags::PRIVATE)
            .union(MappingFlags::ANON);
        mapping.validate(false).map_err(mmap_error)?;
        if size == 0 {
            return Err(mmap_error("cannot map an empty region"));
        }
        let handle = unsafe { M::mmap(None, size, self.access, mapping) }?;
        Ok(MemoryRegion::from_parts(handle, size, self.access, mapping, None))
    }

    /// Maps the file at `path`.
    ///
    /// The mapped size is the explicit [`size`](MapOptions::size) if one was set,
    /// otherwise the current file length, otherwise one page. The file is grown
    /// to that size before mapping when it is shorter.
    pub fn map_file(&self, path: impl AsRef<Path>) -> Result<MemoryRegion<M>> {
        let path = path.as_ref();
        let mapping = self.mapping.unwrap_or(MappingFlags::SHARED);
        mapping.validate(true).map_err(mmap_error)?;

        let existing = std::fs::metadata(path).ok().map(|meta| meta.len());
        let size = match (self.size, existing) {
            (Some(size), _) => size,
            (None, Some(len)) if len > 0 => usize::try_from(len)
                .map_err(|_| mmap_error(format!("{} is too large to map", path.display())))?,
            (None, _) => M::page_size(),
        };
        if size == 0 {
            return Err(mmap_error("cannot map an empty region"));
        }

        let grow = existing.is_none_or(|len| len < size as u64);
        let writable = self.access.contains(AccessFlags::WRITE);
        let file = match (grow || (mapping.is_shared() && writable), writable) {
            (true, _) => open(path, true, self.create),
            // Private views never write back, but a writable descriptor lets a
            // later resize grow the file.
            (false, true) => open(path, true, false).or_else(|err| match err.kind() {
                io::ErrorKind::PermissionDenied => open(path, false, false),
                _ => Err(err),
            }),
            (false, false) => open(path, false, false),
        }
        .map_err(|err| io_error(format!("failed to open {}: {err}", path.display())))?;
        if grow {
            ensure_len(&file, size).map_err(|err| {
                io_error(format!(
                    "failed to grow {} to {size} bytes: {err}",
                    path.display()
                ))
            })?;
        }

        let handle = unsafe { M::mmap(Some(raw_descriptor(&file)), size, self.access, mapping) }?;
        Ok(MemoryRegion::from_parts(
            handle,
            size,
            self.access,
            mapping,
            Some(file),
        ))
    }
}

fn open(path: &Path, write: bool, create: bool) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(write)
        .create(write && create)
        .open(path)
}

/// Grows `file` to at least `len` bytes. Never shrinks it.
fn ensure_len(file: &File, len: usize) -> io::Result<()> {
    if file.metadata()?.len() < len as u64 {
        file.set_len(len as u64)?;
    }
    Ok(())
}

/// A mapped range of memory, either anonymous or backed by a file.
///
/// The mapping is released when the region is dropped, so every exit path of
/// the owning scope unmaps it exactly once. [`MemoryRegion::close`] releases it
/// early; afterwards every operation fails with [`Error::Closed`](crate::Error::Closed).
///
/// A region is a single-owner object: it does no internal locking, and
/// callers coordinate access to the mapped bytes themselves.
pub struct MemoryRegion<M: Mmap = DefaultMmap> {
    handle: Option<RegionHandle>,
    size: usize,
    access: AccessFlags,
    mapping: MappingFlags,
    /// Backing file, kept open for resize and sync.
    file: Option<File>,
    _marker: PhantomData<fn() -> M>,
}

unsafe impl<M: Mmap> Send for MemoryRegion<M> {}

impl MemoryRegion {
    /// Maps `size` bytes of private anonymous memory.
    ///
    /// # Example
    /// ```
    /// use mman::{AccessFlags, MemoryRegion};
    ///
    /// let access = AccessFlags::READ | AccessFlags::WRITE;
    /// let region = MemoryRegion::map_anonymous(4096, access).unwrap();
    /// assert_ne!(region.address(), 0);
    /// assert_eq!(region.size(), 4096);
    /// ```
    #[inline]
    pub fn map_anonymous(size: usize, access: AccessFlags) -> Result<Self> {
        MapOptions::new().access(access).map_anonymous(size)
    }

    /// Maps the file at `path` as a shared mapping, creating the file if needed.
    #[inline]
    pub fn map_file(path: impl AsRef<Path>, access: AccessFlags) -> Result<Self> {
        MapOptions::new().access(access).map_file(path)
    }

    #[inline]
    pub fn options() -> MapOptions {
        MapOptions::new()
    }
}

impl<M: Mmap> MemoryRegion<M> {
    fn from_parts(
        handle: RegionHandle,
        size: usize,
        access: AccessFlags,
        mapping: MappingFlags,
        file: Option<File>,
    ) -> Self {
        #[cfg(feature = "log")]
        log::trace!(
            "[Mmap] address: {:p}, length: {}, access: {:?}, flags: {:?}, file: {}",
            handle.as_ptr(),
            size,
            access,
            mapping,
            file.is_some()
        );
        Self {
            handle: Some(handle),
            size,
            access,
            mapping,
            file,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn handle(&self) -> Result<&RegionHandle> {
        self.handle.as_ref().ok_or_else(closed_error)
    }

    /// The page granularity of the backend.
    #[inline]
    pub fn page_size() -> usize {
        M::page_size()
    }

    /// Base address of the mapping, or `0` once the region is closed.
    #[inline]
    pub fn address(&self) -> usize {
        self.as_ptr() as usize
    }

    /// Base pointer of the mapping, or null once the region is closed.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.handle
            .as_ref()
            .map_or(null_mut(), |handle| handle.as_ptr().cast())
    }

    /// Length in bytes last established by a map or resize.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn access_flags(&self) -> AccessFlags {
        self.access
    }

    #[inline]
    pub fn mapping_flags(&self) -> MappingFlags {
        self.mapping
    }

    #[inline]
    pub fn is_file_backed(&self) -> bool {
        self.file.is_some()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Views the mapped bytes. Empty once the region is closed.
    ///
    /// # Safety
    /// The region must be readable, and nothing else may write the bytes
    /// (another mapper of a shared file included) while the slice is alive.
    #[inline]
    pub unsafe fn as_slice(&self) -> &[u8] {
        match &self.handle {
            Some(handle) => unsafe {
                core::slice::from_raw_parts(handle.as_ptr().cast(), self.size)
            },
            None => &[],
        }
    }

    /// Views the mapped bytes mutably. Empty once the region is closed.
    ///
    /// # Safety
    /// The region must be readable and writable, and nothing else may access
    /// the bytes while the slice is alive.
    #[inline]
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        match &self.handle {
            Some(handle) => unsafe {
                core::slice::from_raw_parts_mut(handle.as_ptr().cast(), self.size)
            },
            None => &mut [],
        }
    }

    /// Changes the protection of the whole region.
    ///
    /// On failure the previous flags stay in effect.
    pub fn protect(&mut self, access: AccessFlags) -> Result<()> {
        let handle = self.handle()?;
        unsafe { M::mprotect(handle, self.size, access) }?;
        #[cfg(feature = "log")]
        log::trace!(
            "[Mprotect] address: {:p}, length: {}, access: {:?}",
            handle.as_ptr(),
            self.size,
            access
        );
        self.access = access;
        Ok(())
    }

    /// Pins the region's pages in physical memory.
    pub fn lock(&self) -> Result<()> {
        unsafe { M::mlock(self.handle()?, self.size) }
    }

    pub fn unlock(&self) -> Result<()> {
        unsafe { M::munlock(self.handle()?, self.size) }
    }

    /// Writes dirty pages back to the backing file.
    ///
    /// Anonymous regions have nothing to write back; the call succeeds without
    /// touching the OS.
    pub fn sync(&self, flags: SyncFlags) -> Result<()> {
        let handle = self.handle()?;
        if self.file.is_none() {
            return Ok(());
        }
        unsafe { M::msync(handle, self.size, flags) }
    }

    /// Resizes the region to exactly `new_size` bytes.
    ///
    /// The first `min(size, new_size)` bytes keep their contents, but the
    /// address may change. A file-backed region grows its file when the file is
    /// shorter than `new_size`; the file is never truncated. A private file
    /// region whose file could only be opened read-only cannot grow past the
    /// file's length: `resize` fails with [`Error::Resize`](crate::Error::Resize)
    /// and the region is left as it was.
    ///
    /// Shared file mappings are unmapped and mapped again at the new size. If the
    /// second step fails the region is closed and [`Error::Unmapped`](crate::Error::Unmapped)
    /// is returned. Every other failure is an [`Error::Resize`](crate::Error::Resize)
    /// and leaves the region untouched.
    pub fn resize(&mut self, new_size: usize) -> Result<()> {
        self.handle()?;
        if new_size == self.size {
            return Ok(());
        }
        if new_size == 0 {
            return Err(resize_error("cannot resize a region to zero bytes"));
        }
        if let Some(file) = &self.file {
            ensure_len(file, new_size).map_err(|err| {
                resize_error(format!(
                    "failed to grow backing file to {new_size} bytes: {err}"
                ))
            })?;
        }
        #[cfg(feature = "log")]
        let old_size = self.size;

        if self.file.is_some() && self.mapping.is_shared() {
            self.remap(new_size)?;
        } else {
            self.relocate(new_size)?;
        }

        #[cfg(feature = "log")]
        log::trace!(
            "[Resize] address: 0x{:x}, length: {} -> {}",
            self.address(),
            old_size,
            new_size
        );
        Ok(())
    }

    /// Resizes to `min_size` if the region is currently smaller.
    pub fn grow_if_needed(&mut self, min_size: usize) -> Result<()> {
        self.handle()?;
        if min_size > self.size {
            self.resize(min_size)?;
        }
        Ok(())
    }

    /// The file holds the contents of a shared mapping, so the old range can be
    /// released before the new one exists.
    fn remap(&mut self, new_size: usize) -> Result<()> {
        let Some(old) = self.handle.take() else {
            return Err(closed_error());
        };
        if let Err(err) = unsafe { M::munmap(&old, self.size) } {
            self.handle = Some(old);
            return Err(resize_error(err.into_message()));
        }

        let fd = self.file.as_ref().map(raw_descriptor);
        match unsafe { M::mmap(fd, new_size, self.access, self.mapping) } {
            Ok(handle) => {
                self.handle = Some(handle);
                self.size = new_size;
                Ok(())
            }
            Err(err) => {
                self.file = None;
                #[cfg(feature = "log")]
                log::warn!("[Resize] region closed after failed remap: {}", err);
                Err(unmapped_error(err.into_message()))
            }
        }
    }

    /// Anonymous and private mappings keep their contents only in memory, so
    /// the new range is mapped and filled before the old one is released.
    fn relocate(&mut self, new_size: usize) -> Result<()> {
        let Some(old) = self.handle.take() else {
            return Err(closed_error());
        };
        let fd = self.file.as_ref().map(raw_descriptor);
        match unsafe { transfer::<M>(&old, self.size, new_size, self.access, self.mapping, fd) } {
            Ok(handle) => {
                self.handle = Some(handle);
                self.size = new_size;
                Ok(())
            }
            Err(err) => {
                self.handle = Some(old);
                Err(resize_error(err.into_message()))
            }
        }
    }

    /// Creates a reader over the mapped bytes, starting at offset 0.
    #[inline]
    pub fn as_source(&self) -> Source<'_, M> {
        Source::new(self)
    }

    /// Creates a writer into the mapped bytes, starting at offset 0.
    #[inline]
    pub fn as_sink(&mut self) -> Sink<'_, M> {
        Sink::new(self)
    }

    /// Unmaps the region and closes its backing file.
    ///
    /// Closing an already closed region does nothing. If the unmap fails the
    /// region stays open and the error is returned.
    pub fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        if let Err(err) = unsafe { M::munmap(&handle, self.size) } {
            self.handle = Some(handle);
            return Err(err);
        }
        self.file = None;
        #[cfg(feature = "log")]
        log::trace!(
            "[Munmap] address: {:p}, length: {}",
            handle.as_ptr(),
            self.size
        );
        Ok(())
    }
}

/// Maps `new_size` bytes, copies the surviving prefix of `old` into them and
/// releases `old`. On error `old` is intact and the new range is gone.
unsafe fn transfer<M: Mmap>(
    old: &RegionHandle,
    old_size: usize,
    new_size: usize,
    access: AccessFlags,
    mapping: MappingFlags,
    fd: Option<isize>,
) -> Result<RegionHandle> {
    let staging = AccessFlags::READ | AccessFlags::WRITE;
    let new = unsafe { M::mmap(fd, new_size, staging, mapping) }?;
    let unreadable = !access.contains(AccessFlags::READ);

    let moved = (|| {
        if unreadable {
            unsafe { M::mprotect(old, old_size, access | AccessFlags::READ) }?;
        }
        unsafe {
            copy_nonoverlapping(
                old.as_ptr() as *const u8,
                new.as_ptr() as *mut u8,
                old_size.min(new_size),
            )
        };
        if access != staging {
            unsafe { M::mprotect(&new, new_size, access) }?;
        }
        unsafe { M::munmap(old, old_size) }
    })();

    if let Err(err) = moved {
        if unreadable {
            let _ = unsafe { M::mprotect(old, old_size, access) };
        }
        let _ = unsafe { M::munmap(&new, new_size) };
        return Err(err);
    }
    Ok(new)
}

impl<M: Mmap> Drop for MemoryRegion<M> {
    fn drop(&mut self) {
        if let Err(_err) = self.close() {
            #[cfg(feature = "log")]
            log::warn!(
                "[Munmap] failed to release region at 0x{:x}: {}",
                self.address(),
                _err
            );
        }
    }
}

impl<M: Mmap> Debug for MemoryRegion<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("address", &format_args!("0x{:x}", self.address()))
            .field("size", &self.size)
            .field("access", &self.access)
            .field("mapping", &self.mapping)
            .field("file_backed", &self.is_file_backed())
            .finish()
    }
}
