//! Sequential byte views over a [`MemoryRegion`].
//!
//! Both adapters read the region's address and size on every call, so growing
//! the region through [`Sink::region_mut`] is visible to the next write.

use crate::{
    Error,
    mmap::{AccessFlags, DefaultMmap, Mmap, SyncFlags},
    region::MemoryRegion,
};
use std::io::{self, BufRead, ErrorKind, Read, Write};

fn check_access<M: Mmap>(region: &MemoryRegion<M>, needed: AccessFlags) -> io::Result<()> {
    if region.is_closed() {
        return Err(Error::Closed.into());
    }
    if !region.access_flags().contains(needed) {
        return Err(io::Error::new(
            ErrorKind::PermissionDenied,
            format!("region is mapped without {needed:?} access"),
        ));
    }
    Ok(())
}

/// A reader over the mapped bytes, created by [`MemoryRegion::as_source`].
///
/// Reading stops at the end of the region. [`BufRead::fill_buf`] hands out the
/// mapped memory itself, so copying from a source into another writer never
/// goes through an intermediate buffer.
pub struct Source<'a, M: Mmap = DefaultMmap> {
    region: &'a MemoryRegion<M>,
    position: usize,
}

impl<'a, M: Mmap> Source<'a, M> {
    #[inline]
    pub(crate) fn new(region: &'a MemoryRegion<M>) -> Self {
        Self {
            region,
            position: 0,
        }
    }

    /// Offset of the next byte to be read.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.region.size().saturating_sub(self.position)
    }

    fn available(&self) -> io::Result<&'a [u8]> {
        check_access(self.region, AccessFlags::READ)?;
        let region: &'a MemoryRegion<M> = self.region;
        let bytes = unsafe { region.as_slice() };
        Ok(bytes.get(self.position..).unwrap_or(&[]))
    }
}

impl<M: Mmap> Read for Source<'_, M> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.available()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n;
        Ok(n)
    }
}

impl<M: Mmap> BufRead for Source<'_, M> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.available()
    }

    fn consume(&mut self, amt: usize) {
        self.position = (self.position + amt).min(self.region.size());
    }
}

/// A writer into the mapped bytes, created by [`MemoryRegion::as_sink`].
///
/// Writes are plain memory copies. For a file-backed region the data reaches
/// the file once [`Write::flush`] or [`MemoryRegion::sync`] has run.
pub struct Sink<'a, M: Mmap = DefaultMmap> {
    region: &'a mut MemoryRegion<M>,
    position: usize,
}

impl<'a, M: Mmap> Sink<'a, M> {
    #[inline]
    pub(crate) fn new(region: &'a mut MemoryRegion<M>) -> Self {
        Self {
            region,
            position: 0,
        }
    }

    /// Offset of the next byte to be written.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.region.size().saturating_sub(self.position)
    }

    #[inline]
    pub fn region(&self) -> &MemoryRegion<M> {
        &*self.region
    }

    /// Gives access to the region, e.g. to grow it before writing past its end.
    #[inline]
    pub fn region_mut(&mut self) -> &mut MemoryRegion<M> {
        &mut *self.region
    }
}

impl<M: Mmap> Write for Sink<'_, M> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        check_access(&*self.region, AccessFlags::WRITE)?;
        if buf.is_empty() {
            return Ok(0);
        }
        let size = self.region.size();
        if self.position >= size {
            return Err(io::Error::new(
                ErrorKind::WriteZero,
                "sink reached the end of the mapped region",
            ));
        }
        let n = buf.len().min(size - self.position);
        // Write through the raw pointer: the region may be write-only.
        unsafe {
            core::ptr::copy_nonoverlapping(
                buf.as_ptr(),
                self.region.as_ptr().add(self.position),
                n,
            )
        };
        self.position += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.region.sync(SyncFlags::SYNC)?;
        Ok(())
    }
}
