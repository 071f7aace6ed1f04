//! Raw inotify syscalls behind a capability trait
//!
//! The event source only talks to the kernel through [`InotifySys`], so
//! tests can drive it with scripted descriptors and buffers.

use nix::errno::Errno;
use nix::NixPath;
use std::os::fd::RawFd;
use std::path::Path;

/// The four kernel operations an event source needs
pub trait InotifySys: Send + Sync {
    /// Open a new event queue
    fn init(&self) -> nix::Result<RawFd>;

    /// Watch all event classes on `path`, returning the watch descriptor
    fn add_watch(&self, fd: RawFd, path: &Path) -> nix::Result<i32>;

    /// Blocking read of zero or more complete records
    fn read(&self, fd: RawFd, buf: &mut [u8]) -> nix::Result<usize>;

    fn close(&self, fd: RawFd) -> nix::Result<()>;
}

/// Linux inotify
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxInotify;

impl InotifySys for LinuxInotify {
    fn init(&self) -> nix::Result<RawFd> {
        // SAFETY: takes no pointers
        Errno::result(unsafe { libc::inotify_init1(libc::IN_CLOEXEC) })
    }

    fn add_watch(&self, fd: RawFd, path: &Path) -> nix::Result<i32> {
        let wd = path.with_nix_path(|cstr| {
            // SAFETY: cstr is NUL-terminated and outlives the call
            unsafe { libc::inotify_add_watch(fd, cstr.as_ptr(), libc::IN_ALL_EVENTS) }
        })?;
        Errno::result(wd)
    }

    fn read(&self, fd: RawFd, buf: &mut [u8]) -> nix::Result<usize> {
        nix::unistd::read(fd, buf)
    }

    fn close(&self, fd: RawFd) -> nix::Result<()> {
        nix::unistd::close(fd)
    }
}
