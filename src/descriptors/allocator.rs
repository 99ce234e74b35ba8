/*!
 * Virtual Descriptor Allocator
 * Lowest-available id allocation with recycling
 */

use crate::core::types::VirtualFd;
use std::collections::BTreeSet;

/// Hands out the lowest free virtual descriptor
///
/// Ids below `next` are either in use or in `free`; ids at or above `next` were
/// never handed out. Not synchronized: lives behind the table lock.
#[derive(Debug, Default)]
pub(super) struct FdAllocator {
    next: VirtualFd,
    free: BTreeSet<VirtualFd>,
}

impl FdAllocator {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Allocate the lowest free id
    pub(super) fn allocate(&mut self) -> VirtualFd {
        if let Some(fd) = self.free.pop_first() {
            return fd;
        }
        let fd = self.next;
        self.next += 1;
        fd
    }

    /// Claim a specific id; false if it is already taken
    pub(super) fn claim(&mut self, fd: VirtualFd) -> bool {
        if fd >= self.next {
            self.free.extend(self.next..fd);
            self.next = fd + 1;
            true
        } else {
            self.free.remove(&fd)
        }
    }

    /// Return an id for reuse
    pub(super) fn recycle(&mut self, fd: VirtualFd) {
        if fd + 1 == self.next {
            self.next = fd;
            // Shrink the watermark over trailing free ids
            while self.next > 0 && self.free.remove(&(self.next - 1)) {
                self.next -= 1;
            }
        } else {
            self.free.insert(fd);
        }
    }

    /// Lowest id that `allocate` would return
    pub(super) fn peek(&self) -> VirtualFd {
        self.free.first().copied().unwrap_or(self.next)
    }
}
