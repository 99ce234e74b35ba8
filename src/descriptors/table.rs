/*!
 * Descriptor Resolution Table
 *
 * Maps application-visible virtual descriptors to their external descriptors.
 * Every forwarded syscall resolves through here.
 */

use super::allocator::FdAllocator;
use super::record::{DescriptorFlags, DescriptorKind, DescriptorRecord, External};
use super::resolution::Resolution;
use crate::config::TableConfig;
use crate::core::errors::TableError;
use crate::core::limits::{HIGH_DESCRIPTOR_THRESHOLD, STD_STREAM_COUNT};
use crate::core::types::{OsFd, VirtualFd};
use ahash::RandomState;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, trace, warn};

/// Slot state for a reserved virtual id
#[derive(Debug, Clone, Copy)]
enum Slot {
    Live(DescriptorRecord),
    /// External side is being released; id stays reserved
    Closing,
}

struct Inner {
    slots: HashMap<VirtualFd, Slot, RandomState>,
    allocator: FdAllocator,
    /// Live records per OS descriptor
    external_refs: HashMap<OsFd, usize, RandomState>,
}

impl Inner {
    fn retain_external(&mut self, external: External) {
        if let External::Os(fd) = external {
            *self.external_refs.entry(fd).or_insert(0) += 1;
        }
    }

    /// Drop one reference; true if it was the last one
    fn release_external(&mut self, external: External) -> bool {
        let External::Os(fd) = external else {
            return false;
        };
        match self.external_refs.get_mut(&fd) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.external_refs.remove(&fd);
                true
            }
            None => false,
        }
    }

    fn live(&self, fd: VirtualFd) -> Result<DescriptorRecord, TableError> {
        match self.slots.get(&fd) {
            Some(Slot::Live(record)) => Ok(*record),
            _ => Err(TableError::BadDescriptor(fd)),
        }
    }
}

/// Record detached by [`DescriptorTable::begin_close`]
///
/// The virtual id stays reserved until the ticket is passed to
/// [`DescriptorTable::finish_close`].
#[derive(Debug)]
#[must_use = "the virtual id stays reserved until finish_close is called"]
pub struct CloseTicket {
    record: DescriptorRecord,
    last_reference: bool,
}

impl CloseTicket {
    #[inline]
    pub fn record(&self) -> &DescriptorRecord {
        &self.record
    }

    /// OS descriptor to release, if this was its last live record
    #[inline]
    pub fn release_target(&self) -> Option<OsFd> {
        if self.last_reference {
            self.record.external.os_fd()
        } else {
            None
        }
    }
}

/// Process-wide descriptor resolution table
///
/// # Concurrency
///
/// One `RwLock` guards slots, allocator and external reference counts, so
/// resolve, insert and close are linearizable. Resolve takes the read lock and
/// returns a copy of the record. No caller-supplied callback runs under the lock.
pub struct DescriptorTable {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl DescriptorTable {
    pub fn new(config: TableConfig) -> Self {
        let table = Self {
            inner: RwLock::new(Inner {
                slots: HashMap::with_hasher(RandomState::new()),
                allocator: FdAllocator::new(),
                external_refs: HashMap::with_hasher(RandomState::new()),
            }),
            capacity: config.max_descriptors(),
        };

        // TableConfig guarantees room for the standard streams when reserved
        if config.reserve_std_streams() {
            for fd in 0..STD_STREAM_COUNT {
                if let Err(e) =
                    table.insert_at(fd, External::Os(fd), DescriptorKind::Other, DescriptorFlags::empty())
                {
                    warn!(fd, error = %e, "standard stream not registered");
                }
            }
        }

        table
    }

    /// Resolve a virtual descriptor
    #[inline]
    pub fn resolve(&self, fd: VirtualFd) -> Resolution {
        let inner = self.inner.read();
        match inner.slots.get(&fd) {
            Some(Slot::Live(record)) => {
                trace!(fd, external = %record.external, "resolved");
                Resolution::Found(*record)
            }
            _ => {
                trace!(fd, "unresolved");
                Resolution::NotFound(fd)
            }
        }
    }

    /// Insert a record at the lowest free virtual id
    pub fn insert(
        &self,
        external: External,
        kind: DescriptorKind,
        flags: DescriptorFlags,
    ) -> Result<VirtualFd, TableError> {
        let mut inner = self.inner.write();
        self.check_capacity(&inner)?;

        let fd = inner.allocator.allocate();
        let record = DescriptorRecord::new(fd, external, kind, flags);
        inner.retain_external(external);
        inner.slots.insert(fd, Slot::Live(record));

        let len = inner.slots.len();
        drop(inner);

        debug!(fd, external = %external, ?kind, "descriptor inserted");
        if len == HIGH_DESCRIPTOR_THRESHOLD {
            warn!(len, capacity = self.capacity, "high virtual descriptor count");
        }
        Ok(fd)
    }

    /// Insert a record at a chosen virtual id
    pub fn insert_at(
        &self,
        fd: VirtualFd,
        external: External,
        kind: DescriptorKind,
        flags: DescriptorFlags,
    ) -> Result<(), TableError> {
        if fd < 0 || fd as usize >= self.capacity {
            return Err(TableError::BadDescriptor(fd));
        }

        let mut inner = self.inner.write();
        if inner.slots.contains_key(&fd) {
            return Err(TableError::InUse(fd));
        }
        self.check_capacity(&inner)?;
        if !inner.allocator.claim(fd) {
            return Err(TableError::InUse(fd));
        }

        inner.retain_external(external);
        inner
            .slots
            .insert(fd, Slot::Live(DescriptorRecord::new(fd, external, kind, flags)));
        drop(inner);

        debug!(fd, external = %external, ?kind, "descriptor inserted at fixed id");
        Ok(())
    }

    /// Duplicate onto the lowest free id; the copy shares the external side
    pub fn duplicate(&self, fd: VirtualFd, flags: DescriptorFlags) -> Result<VirtualFd, TableError> {
        let mut inner = self.inner.write();
        let source = inner.live(fd)?;
        self.check_capacity(&inner)?;

        let new_fd = inner.allocator.allocate();
        inner.retain_external(source.external);
        inner.slots.insert(
            new_fd,
            Slot::Live(DescriptorRecord::new(new_fd, source.external, source.kind, flags)),
        );
        drop(inner);

        debug!(fd, new_fd, external = %source.external, "descriptor duplicated");
        Ok(new_fd)
    }

    /// Duplicate onto a chosen free id
    pub fn duplicate_to(
        &self,
        fd: VirtualFd,
        target: VirtualFd,
        flags: DescriptorFlags,
    ) -> Result<(), TableError> {
        if target < 0 || target as usize >= self.capacity {
            return Err(TableError::BadDescriptor(target));
        }

        let mut inner = self.inner.write();
        let source = inner.live(fd)?;
        if inner.slots.contains_key(&target) {
            return Err(TableError::InUse(target));
        }
        self.check_capacity(&inner)?;
        if !inner.allocator.claim(target) {
            return Err(TableError::InUse(target));
        }

        inner.retain_external(source.external);
        inner.slots.insert(
            target,
            Slot::Live(DescriptorRecord::new(target, source.external, source.kind, flags)),
        );
        drop(inner);

        debug!(fd, target, external = %source.external, "descriptor duplicated to fixed id");
        Ok(())
    }

    /// Duplicate onto `target`, detaching whatever lived there in the same step
    ///
    /// Returns the detached record's ticket, if any. The target id is occupied
    /// by the copy, so `finish_close` on that ticket leaves the slot alone.
    /// A target still being closed elsewhere is `InUse`.
    pub fn replace_at(
        &self,
        fd: VirtualFd,
        target: VirtualFd,
        flags: DescriptorFlags,
    ) -> Result<Option<CloseTicket>, TableError> {
        if target < 0 || target as usize >= self.capacity {
            return Err(TableError::BadDescriptor(target));
        }

        let mut inner = self.inner.write();
        let source = inner.live(fd)?;
        let replaced = match inner.slots.get(&target) {
            Some(Slot::Live(record)) => Some(*record),
            Some(Slot::Closing) => return Err(TableError::InUse(target)),
            None => {
                self.check_capacity(&inner)?;
                if !inner.allocator.claim(target) {
                    return Err(TableError::InUse(target));
                }
                None
            }
        };

        inner.retain_external(source.external);
        inner.slots.insert(
            target,
            Slot::Live(DescriptorRecord::new(target, source.external, source.kind, flags)),
        );
        let ticket = replaced.map(|record| CloseTicket {
            record,
            last_reference: inner.release_external(record.external),
        });
        drop(inner);

        debug!(fd, target, replaced = ticket.is_some(), "descriptor duplicated over target");
        Ok(ticket)
    }

    /// Replace one record's flags
    pub fn set_flags(&self, fd: VirtualFd, flags: DescriptorFlags) -> Result<DescriptorRecord, TableError> {
        self.update_flags(fd, |_| flags)
    }

    /// Update one record's flags in place
    pub fn update_flags<F>(&self, fd: VirtualFd, f: F) -> Result<DescriptorRecord, TableError>
    where
        F: FnOnce(DescriptorFlags) -> DescriptorFlags,
    {
        let mut inner = self.inner.write();
        match inner.slots.get_mut(&fd) {
            Some(Slot::Live(record)) => {
                record.flags = f(record.flags);
                Ok(*record)
            }
            _ => Err(TableError::BadDescriptor(fd)),
        }
    }

    /// Detach a record; it stops resolving but its id is not reissued yet
    pub fn begin_close(&self, fd: VirtualFd) -> Result<CloseTicket, TableError> {
        let mut inner = self.inner.write();
        let record = inner.live(fd)?;
        inner.slots.insert(fd, Slot::Closing);
        let last_reference = inner.release_external(record.external);

        Ok(CloseTicket {
            record,
            last_reference,
        })
    }

    /// Free the id reserved by `begin_close`
    pub fn finish_close(&self, ticket: CloseTicket) {
        let fd = ticket.record.virtual_fd;
        let mut inner = self.inner.write();
        if let Some(Slot::Closing) = inner.slots.get(&fd) {
            inner.slots.remove(&fd);
            inner.allocator.recycle(fd);
        }
        drop(inner);

        debug!(fd, external = %ticket.record.external, "descriptor closed");
    }

    /// Close a virtual descriptor
    ///
    /// `release` runs only when this was the last record backed by its OS
    /// descriptor. The id is freed whatever `release` returns, and its result is
    /// handed back unchanged.
    pub fn close<F, E>(&self, fd: VirtualFd, release: F) -> Result<(), E>
    where
        F: FnOnce(OsFd) -> Result<(), E>,
        E: From<TableError>,
    {
        let ticket = self.begin_close(fd)?;
        let result = match ticket.release_target() {
            Some(os_fd) => release(os_fd),
            None => Ok(()),
        };
        self.finish_close(ticket);
        result
    }

    /// Remove a record whose external side needs no release
    pub fn remove(&self, fd: VirtualFd) -> Option<DescriptorRecord> {
        let mut inner = self.inner.write();
        let record = inner.live(fd).ok()?;
        inner.release_external(record.external);
        inner.slots.remove(&fd);
        inner.allocator.recycle(fd);
        drop(inner);

        debug!(fd, "descriptor removed");
        Some(record)
    }

    /// Live records marked close-on-exec
    pub fn cloexec_descriptors(&self) -> Vec<DescriptorRecord> {
        let mut records: Vec<_> = self
            .inner
            .read()
            .slots
            .values()
            .filter_map(|slot| match slot {
                Slot::Live(record) if record.is_cloexec() => Some(*record),
                _ => None,
            })
            .collect();
        records.sort_by_key(|record| record.virtual_fd);
        records
    }

    /// Close every close-on-exec record
    pub fn close_on_exec<F, E>(&self, release: F) -> Vec<DescriptorRecord>
    where
        F: FnMut(OsFd) -> Result<(), E>,
        E: fmt::Display,
    {
        self.close_where(|record| record.is_cloexec(), release)
    }

    /// Close every live record (process exit)
    pub fn drain<F, E>(&self, release: F) -> Vec<DescriptorRecord>
    where
        F: FnMut(OsFd) -> Result<(), E>,
        E: fmt::Display,
    {
        self.close_where(|_| true, release)
    }

    fn close_where<P, F, E>(&self, predicate: P, mut release: F) -> Vec<DescriptorRecord>
    where
        P: Fn(&DescriptorRecord) -> bool,
        F: FnMut(OsFd) -> Result<(), E>,
        E: fmt::Display,
    {
        let mut tickets = Vec::new();
        {
            let mut inner = self.inner.write();
            let mut targets: Vec<DescriptorRecord> = inner
                .slots
                .values()
                .filter_map(|slot| match slot {
                    Slot::Live(record) if predicate(record) => Some(*record),
                    _ => None,
                })
                .collect();
            targets.sort_by_key(|record| record.virtual_fd);

            for record in targets {
                inner.slots.insert(record.virtual_fd, Slot::Closing);
                let last_reference = inner.release_external(record.external);
                tickets.push(CloseTicket {
                    record,
                    last_reference,
                });
            }
        }

        let mut closed = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            if let Some(os_fd) = ticket.release_target() {
                if let Err(e) = release(os_fd) {
                    warn!(fd = ticket.record.virtual_fd, os_fd, error = %e, "release failed");
                }
            }
            closed.push(ticket.record);
            self.finish_close(ticket);
        }
        closed
    }

    /// Copy of every live record, ordered by virtual id
    pub fn snapshot(&self) -> Vec<DescriptorRecord> {
        let mut records: Vec<_> = self
            .inner
            .read()
            .slots
            .values()
            .filter_map(|slot| match slot {
                Slot::Live(record) => Some(*record),
                Slot::Closing => None,
            })
            .collect();
        records.sort_by_key(|record| record.virtual_fd);
        records
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Id the next `insert` would hand out
    pub fn next_descriptor(&self) -> VirtualFd {
        self.inner.read().allocator.peek()
    }

    /// Live records currently sharing an OS descriptor
    pub fn external_refs(&self, os_fd: OsFd) -> usize {
        self.inner.read().external_refs.get(&os_fd).copied().unwrap_or(0)
    }

    fn check_capacity(&self, inner: &Inner) -> Result<(), TableError> {
        if inner.slots.len() >= self.capacity {
            return Err(TableError::Exhausted {
                limit: self.capacity,
            });
        }
        Ok(())
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new(TableConfig::default())
    }
}

impl fmt::Debug for DescriptorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorTable")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("next", &self.next_descriptor())
            .finish()
    }
}
