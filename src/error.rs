use alloc::borrow::Cow;
use core::{
    cell::RefCell,
    fmt::{Debug, Display},
};

/// Error types used throughout the `mman` library.
///
/// The variants follow the lifecycle of a [`MemoryRegion`](crate::MemoryRegion):
/// creating a mapping, operating on a live mapping, resizing it, and touching
/// it after it has been closed.
#[derive(Debug)]
pub enum Error {
    /// An error occurred while opening, creating or growing the backing file.
    Io {
        /// A descriptive message about the I/O error.
        msg: Cow<'static, str>,
    },

    /// The native mapping call returned no mapping.
    ///
    /// This error typically indicates issues such as:
    /// * An invalid (zero) size
    /// * Permission denied on the backing file
    /// * The process ran out of address space
    /// * An invalid combination of mapping flags
    Mmap {
        /// A descriptive message about the memory mapping error.
        msg: Cow<'static, str>,
    },

    /// A protect, lock, unlock, sync or unmap call failed on an open region.
    ///
    /// The region is left unchanged and remains usable.
    Operation {
        /// A descriptive message about the failed operation.
        msg: Cow<'static, str>,
    },

    /// A resize failed before the old mapping was released.
    ///
    /// The region keeps its previous address, size and contents.
    Resize {
        /// A descriptive message about the resize error.
        msg: Cow<'static, str>,
    },

    /// A resize released the old mapping but could not establish the new one.
    ///
    /// The region has been closed; every later operation fails with [`Error::Closed`].
    Unmapped {
        /// A descriptive message about the failed remap.
        msg: Cow<'static, str>,
    },

    /// The region has already been closed.
    Closed,
}

impl Error {
    /// Returns `false` when the failure left the region unusable.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Unmapped { .. })
    }

    /// Unwraps the message so it can be re-reported under another variant.
    pub(crate) fn into_message(self) -> Cow<'static, str> {
        match self {
            Error::Io { msg }
            | Error::Mmap { msg }
            | Error::Operation { msg }
            | Error::Resize { msg }
            | Error::Unmapped { msg } => msg,
            Error::Closed => "region is closed".into(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Io { msg } => write!(f, "I/O error: {msg}"),
            Error::Mmap { msg } => write!(f, "Memory mapping error: {msg}"),
            Error::Operation { msg } => write!(f, "Memory operation error: {msg}"),
            Error::Resize { msg } => write!(f, "Resize error: {msg}"),
            Error::Unmapped { msg } => write!(f, "Region lost during resize: {msg}"),
            Error::Closed => write!(f, "Memory region is closed"),
        }
    }
}

impl core::error::Error for Error {}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        std::io::Error::other(err)
    }
}

std::thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Returns the description of the most recent failing native call made by
/// this thread, or `None` if no native call has failed yet.
///
/// The value is overwritten by the next failure, so read it right after the
/// call you are interested in.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|last| last.borrow().clone())
}

/// Records `err` as the latest native failure and builds a message naming `call`.
#[cold]
#[inline(never)]
pub(crate) fn os_failure(call: &'static str, err: std::io::Error) -> Cow<'static, str> {
    let desc = err.to_string();
    let msg = format!("{call} failed: {desc}");
    LAST_ERROR.with(|last| *last.borrow_mut() = Some(desc));
    msg.into()
}

#[cold]
#[inline(never)]
pub(crate) fn io_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Io { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn mmap_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Mmap { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn operation_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Operation { msg: msg.into() }
}

/// Creates a recoverable resize error.
///
/// The message of a lower-level error is kept so callers still see the OS reason.
#[cold]
#[inline(never)]
pub(crate) fn resize_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Resize { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn unmapped_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Unmapped { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn closed_error() -> Error {
    Error::Closed
}
