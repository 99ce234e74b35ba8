/*!
 * Syscall Forwarder
 *
 * Descriptor-space translation for intercepted syscalls: resolve the virtual
 * descriptor, fail with EBADF without touching the OS if that fails, otherwise
 * call the native syscall on the external descriptor and return its result
 * verbatim.
 */

use super::native::{OsSyscalls, NativeSyscalls};
use crate::core::types::{OsFd, VirtualFd};
use crate::descriptors::{DescriptorFlags, DescriptorKind, DescriptorRecord, DescriptorTable, External};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::socket::{AddressFamily, SockFlag, SockType, SockaddrLike};
use nix::sys::stat::Mode;
use std::path::Path;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Forwards syscalls on virtual descriptors to the OS
pub struct Forwarder<N = OsSyscalls> {
    table: Arc<DescriptorTable>,
    native: N,
}

impl Forwarder<OsSyscalls> {
    /// Forwarder over the real OS surface
    pub fn new(table: Arc<DescriptorTable>) -> Self {
        Self::with_native(table, OsSyscalls)
    }
}

impl<N: NativeSyscalls> Forwarder<N> {
    pub fn with_native(table: Arc<DescriptorTable>, native: N) -> Self {
        Self { table, native }
    }

    #[inline]
    pub fn table(&self) -> &Arc<DescriptorTable> {
        &self.table
    }

    #[inline]
    pub fn native(&self) -> &N {
        &self.native
    }

    /// Resolve to a live record or EBADF
    #[inline]
    fn record(&self, fd: VirtualFd) -> nix::Result<DescriptorRecord> {
        Ok(self.table.resolve(fd).require()?)
    }

    /// Resolve to an OS descriptor; unbacked records are EBADF too
    #[inline]
    fn backed(&self, fd: VirtualFd) -> nix::Result<OsFd> {
        self.record(fd)?.external.os_fd().ok_or(Errno::EBADF)
    }

    /// Register a freshly created OS descriptor, closing it if the table is full
    fn adopt(&self, os_fd: OsFd, kind: DescriptorKind, flags: DescriptorFlags) -> nix::Result<VirtualFd> {
        match self.table.insert(External::Os(os_fd), kind, flags) {
            Ok(fd) => Ok(fd),
            Err(e) => {
                if let Err(close_err) = self.native.close(os_fd) {
                    warn!(os_fd, error = %close_err, "failed to close unregistered descriptor");
                }
                Err(e.errno())
            }
        }
    }

    #[instrument(level = "trace", skip(self))]
    pub fn open(&self, path: &Path, flags: OFlag, mode: Mode) -> nix::Result<VirtualFd> {
        let os_fd = self.native.open(path, flags, mode)?;
        let kind = self
            .native
            .fstat_mode(os_fd)
            .map(DescriptorKind::from_mode)
            .unwrap_or(DescriptorKind::Other);

        let dflags = DescriptorFlags::empty()
            .toggled(DescriptorFlags::CLOEXEC, flags.contains(OFlag::O_CLOEXEC))
            .toggled(DescriptorFlags::NONBLOCK, flags.contains(OFlag::O_NONBLOCK));
        self.adopt(os_fd, kind, dflags)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn socket(&self, domain: AddressFamily, ty: SockType, flags: SockFlag) -> nix::Result<VirtualFd> {
        let os_fd = self.native.socket(domain, ty, flags)?;
        let dflags = DescriptorFlags::empty()
            .toggled(DescriptorFlags::CLOEXEC, flags.contains(SockFlag::SOCK_CLOEXEC))
            .toggled(DescriptorFlags::NONBLOCK, flags.contains(SockFlag::SOCK_NONBLOCK));
        self.adopt(os_fd, DescriptorKind::Socket, dflags)
    }

    /// Returns (read end, write end) as virtual descriptors
    #[instrument(level = "trace", skip(self))]
    pub fn pipe(&self) -> nix::Result<(VirtualFd, VirtualFd)> {
        let (read_end, write_end) = self.native.pipe()?;

        let read_fd = match self.adopt(read_end, DescriptorKind::Pipe, DescriptorFlags::empty()) {
            Ok(fd) => fd,
            Err(e) => {
                if let Err(close_err) = self.native.close(write_end) {
                    warn!(os_fd = write_end, error = %close_err, "failed to close unregistered pipe end");
                }
                return Err(e);
            }
        };
        match self.adopt(write_end, DescriptorKind::Pipe, DescriptorFlags::empty()) {
            Ok(write_fd) => Ok((read_fd, write_fd)),
            Err(e) => {
                if let Err(close_err) = self.close(read_fd) {
                    warn!(fd = read_fd, error = %close_err, "failed to close pipe read end");
                }
                Err(e)
            }
        }
    }

    /// Duplicate onto the lowest free virtual id; the copy starts without CLOEXEC
    #[instrument(level = "trace", skip(self))]
    pub fn dup(&self, fd: VirtualFd) -> nix::Result<VirtualFd> {
        Ok(self.table.duplicate(fd, DescriptorFlags::empty())?)
    }

    /// Duplicate onto `newfd`, silently closing whatever it referred to
    ///
    /// The swap is one table step, so no other insert can take `newfd` between
    /// the close and the duplicate.
    #[instrument(level = "trace", skip(self))]
    pub fn dup2(&self, oldfd: VirtualFd, newfd: VirtualFd) -> nix::Result<VirtualFd> {
        if oldfd == newfd {
            self.record(oldfd)?;
            return Ok(newfd);
        }

        if let Some(ticket) = self.table.replace_at(oldfd, newfd, DescriptorFlags::empty())? {
            if let Some(os_fd) = ticket.release_target() {
                if let Err(e) = self.native.close(os_fd) {
                    warn!(newfd, os_fd, error = %e, "dup2 target close failed");
                }
            }
            self.table.finish_close(ticket);
        }
        Ok(newfd)
    }

    /// Close; the OS descriptor is released with its last virtual record
    #[instrument(level = "trace", skip(self))]
    pub fn close(&self, fd: VirtualFd) -> nix::Result<()> {
        self.table.close(fd, |os_fd| self.native.close(os_fd))
    }

    #[instrument(level = "trace", skip(self, addr))]
    pub fn bind(&self, fd: VirtualFd, addr: &dyn SockaddrLike) -> nix::Result<()> {
        let os_fd = self.backed(fd)?;
        self.native.bind(os_fd, addr)
    }

    #[instrument(level = "trace", skip(self, addr))]
    pub fn connect(&self, fd: VirtualFd, addr: &dyn SockaddrLike) -> nix::Result<()> {
        let os_fd = self.backed(fd)?;
        self.native.connect(os_fd, addr)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn listen(&self, fd: VirtualFd, backlog: i32) -> nix::Result<()> {
        let os_fd = self.backed(fd)?;
        self.native.listen(os_fd, backlog)
    }

    #[instrument(level = "trace", skip(self, buf), fields(len = buf.len()))]
    pub fn read(&self, fd: VirtualFd, buf: &mut [u8]) -> nix::Result<usize> {
        let os_fd = self.backed(fd)?;
        self.native.read(os_fd, buf)
    }

    #[instrument(level = "trace", skip(self, buf), fields(len = buf.len()))]
    pub fn write(&self, fd: VirtualFd, buf: &[u8]) -> nix::Result<usize> {
        let os_fd = self.backed(fd)?;
        self.native.write(os_fd, buf)
    }

    /// File type of the external descriptor as the OS reports it now
    #[instrument(level = "trace", skip(self))]
    pub fn fstat_kind(&self, fd: VirtualFd) -> nix::Result<DescriptorKind> {
        let os_fd = self.backed(fd)?;
        self.native.fstat_mode(os_fd).map(DescriptorKind::from_mode)
    }

    pub fn get_flags(&self, fd: VirtualFd) -> nix::Result<DescriptorFlags> {
        Ok(self.record(fd)?.flags)
    }

    /// Replace a record's flags
    ///
    /// NONBLOCK is mirrored onto the external descriptor's file status flags,
    /// which duplicates share: the OS side follows the latest `set_flags` on any
    /// record backed by it, checked against the live OS state. Record flags stay
    /// per record. CLOEXEC stays virtual and is honoured by
    /// [`close_on_exec`](Self::close_on_exec).
    #[instrument(level = "trace", skip(self))]
    pub fn set_flags(&self, fd: VirtualFd, flags: DescriptorFlags) -> nix::Result<()> {
        let record = self.record(fd)?;
        let want_nonblock = flags.contains(DescriptorFlags::NONBLOCK);

        if let External::Os(os_fd) = record.external {
            let mut status = self.native.status_flags(os_fd)?;
            if status.contains(OFlag::O_NONBLOCK) != want_nonblock {
                status.set(OFlag::O_NONBLOCK, want_nonblock);
                self.native.set_status_flags(os_fd, status)?;
            }
        }

        self.table.set_flags(fd, flags)?;
        Ok(())
    }

    /// Close every CLOEXEC descriptor ahead of exec
    pub fn close_on_exec(&self) -> Vec<DescriptorRecord> {
        self.table.close_on_exec(|os_fd| self.native.close(os_fd))
    }

    /// Close everything (process exit)
    pub fn shutdown(&self) -> Vec<DescriptorRecord> {
        self.table.drain(|os_fd| self.native.close(os_fd))
    }
}
