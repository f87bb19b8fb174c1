cfg_if::cfg_if! {
    if #[cfg(windows)]{
        pub(crate) mod windows;
        pub use windows::*;
    }else if #[cfg(all(target_os = "linux", feature = "use-syscall"))]{
        pub(crate) mod linux_syscall;
        pub use linux_syscall::*;
    }else if #[cfg(unix)]{
        pub(crate) mod unix;
        pub use unix::*;
    }else {
        compile_error!("mman has no memory mapping backend for this target");
    }
}

/// Raw descriptor handed to [`Mmap::mmap`](crate::mmap::Mmap::mmap) for a backing file.
#[cfg(unix)]
#[inline]
pub(crate) fn raw_descriptor(file: &std::fs::File) -> isize {
    use std::os::fd::AsRawFd;
    file.as_raw_fd() as isize
}

#[cfg(windows)]
#[inline]
pub(crate) fn raw_descriptor(file: &std::fs::File) -> isize {
    use std::os::windows::io::AsRawHandle;
    file.as_raw_handle() as isize
}
