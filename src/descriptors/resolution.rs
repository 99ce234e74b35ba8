/*!
 * Resolution Result
 * Tagged outcome of a virtual descriptor lookup
 */

use super::record::{DescriptorFlags, DescriptorKind, DescriptorRecord, External};
use crate::core::errors::TableError;
use crate::core::types::VirtualFd;

/// Outcome of [`DescriptorTable::resolve`](super::DescriptorTable::resolve)
///
/// Callers read only the projections they need; every projection comes from the
/// same record snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Resolution {
    Found(DescriptorRecord),
    NotFound(VirtualFd),
}

impl Resolution {
    #[inline]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    #[inline]
    pub const fn record(&self) -> Option<&DescriptorRecord> {
        match self {
            Self::Found(record) => Some(record),
            Self::NotFound(_) => None,
        }
    }

    #[inline]
    pub const fn external(&self) -> Option<External> {
        match self {
            Self::Found(record) => Some(record.external),
            Self::NotFound(_) => None,
        }
    }

    #[inline]
    pub const fn kind(&self) -> Option<DescriptorKind> {
        match self {
            Self::Found(record) => Some(record.kind),
            Self::NotFound(_) => None,
        }
    }

    #[inline]
    pub const fn flags(&self) -> Option<DescriptorFlags> {
        match self {
            Self::Found(record) => Some(record.flags),
            Self::NotFound(_) => None,
        }
    }

    /// Record, or `BadDescriptor` if nothing live matched
    #[inline]
    pub fn require(self) -> Result<DescriptorRecord, TableError> {
        match self {
            Self::Found(record) => Ok(record),
            Self::NotFound(fd) => Err(TableError::BadDescriptor(fd)),
        }
    }
}
