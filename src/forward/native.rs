/*!
 * Native Syscall Surface
 * The real OS calls a forwarder invokes on external descriptors
 */

use crate::core::types::OsFd;
use nix::fcntl::{self, FcntlArg, OFlag};
use nix::sys::socket::{self, AddressFamily, Backlog, SockFlag, SockType, SockaddrLike};
use nix::sys::stat::{self, Mode};
use nix::unistd;
use std::os::fd::{BorrowedFd, IntoRawFd};
use std::path::Path;

/// OS syscalls on external descriptors
///
/// Implementations pass arguments through unchanged and report the OS error
/// verbatim.
pub trait NativeSyscalls: Send + Sync {
    fn open(&self, path: &Path, flags: OFlag, mode: Mode) -> nix::Result<OsFd>;

    fn socket(&self, domain: AddressFamily, ty: SockType, flags: SockFlag) -> nix::Result<OsFd>;

    /// Returns (read end, write end)
    fn pipe(&self) -> nix::Result<(OsFd, OsFd)>;

    fn close(&self, fd: OsFd) -> nix::Result<()>;

    fn bind(&self, fd: OsFd, addr: &dyn SockaddrLike) -> nix::Result<()>;

    fn connect(&self, fd: OsFd, addr: &dyn SockaddrLike) -> nix::Result<()>;

    fn listen(&self, fd: OsFd, backlog: i32) -> nix::Result<()>;

    fn read(&self, fd: OsFd, buf: &mut [u8]) -> nix::Result<usize>;

    fn write(&self, fd: OsFd, buf: &[u8]) -> nix::Result<usize>;

    /// `st_mode` of the descriptor
    fn fstat_mode(&self, fd: OsFd) -> nix::Result<u32>;

    /// File status flags (`F_GETFL`)
    fn status_flags(&self, fd: OsFd) -> nix::Result<OFlag>;

    /// Replace file status flags (`F_SETFL`)
    fn set_status_flags(&self, fd: OsFd, flags: OFlag) -> nix::Result<()>;
}

/// OS calls through nix
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSyscalls;

/// Borrow a descriptor for nix calls that take `AsFd`
#[inline]
fn borrowed<'fd>(fd: OsFd) -> BorrowedFd<'fd> {
    // SAFETY: callers pass descriptors resolved from the table, which stay open
    // until their last record is closed
    unsafe { BorrowedFd::borrow_raw(fd) }
}

impl NativeSyscalls for OsSyscalls {
    fn open(&self, path: &Path, flags: OFlag, mode: Mode) -> nix::Result<OsFd> {
        fcntl::open(path, flags, mode)
    }

    fn socket(&self, domain: AddressFamily, ty: SockType, flags: SockFlag) -> nix::Result<OsFd> {
        socket::socket(domain, ty, flags, None).map(IntoRawFd::into_raw_fd)
    }

    fn pipe(&self) -> nix::Result<(OsFd, OsFd)> {
        let (read_end, write_end) = unistd::pipe()?;
        Ok((read_end.into_raw_fd(), write_end.into_raw_fd()))
    }

    fn close(&self, fd: OsFd) -> nix::Result<()> {
        unistd::close(fd)
    }

    fn bind(&self, fd: OsFd, addr: &dyn SockaddrLike) -> nix::Result<()> {
        socket::bind(fd, addr)
    }

    fn connect(&self, fd: OsFd, addr: &dyn SockaddrLike) -> nix::Result<()> {
        socket::connect(fd, addr)
    }

    fn listen(&self, fd: OsFd, backlog: i32) -> nix::Result<()> {
        socket::listen(&borrowed(fd), Backlog::new(backlog)?)
    }

    fn read(&self, fd: OsFd, buf: &mut [u8]) -> nix::Result<usize> {
        unistd::read(fd, buf)
    }

    fn write(&self, fd: OsFd, buf: &[u8]) -> nix::Result<usize> {
        unistd::write(borrowed(fd), buf)
    }

    fn fstat_mode(&self, fd: OsFd) -> nix::Result<u32> {
        stat::fstat(fd).map(|st| st.st_mode as u32)
    }

    fn status_flags(&self, fd: OsFd) -> nix::Result<OFlag> {
        fcntl::fcntl(fd, FcntlArg::F_GETFL).map(OFlag::from_bits_truncate)
    }

    fn set_status_flags(&self, fd: OsFd, flags: OFlag) -> nix::Result<()> {
        fcntl::fcntl(fd, FcntlArg::F_SETFL(flags)).map(drop)
    }
}
