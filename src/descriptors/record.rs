/*!
 * Descriptor Records
 * What a virtual descriptor resolves to
 */

use crate::core::types::{OsFd, VirtualFd};
use nix::sys::stat::SFlag;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// External side of a virtual descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "backing", content = "fd")]
pub enum External {
    /// Backed by a real OS descriptor
    Os(OsFd),
    /// Purely virtual, no OS backing
    Unbacked,
}

impl External {
    /// OS descriptor, if any
    #[inline]
    #[must_use]
    pub const fn os_fd(&self) -> Option<OsFd> {
        match self {
            Self::Os(fd) => Some(*fd),
            Self::Unbacked => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_backed(&self) -> bool {
        matches!(self, Self::Os(_))
    }
}

impl fmt::Display for External {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Os(fd) => write!(f, "{}", fd),
            Self::Unbacked => write!(f, "unbacked"),
        }
    }
}

/// Kind of object a descriptor refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    RegularFile,
    Directory,
    Socket,
    Pipe,
    Other,
}

impl DescriptorKind {
    /// Classify from an `st_mode` value
    pub fn from_mode(mode: u32) -> Self {
        let file_type = SFlag::from_bits_truncate((mode & SFlag::S_IFMT.bits() as u32) as _);
        if file_type == SFlag::S_IFREG {
            Self::RegularFile
        } else if file_type == SFlag::S_IFDIR {
            Self::Directory
        } else if file_type == SFlag::S_IFSOCK {
            Self::Socket
        } else if file_type == SFlag::S_IFIFO {
            Self::Pipe
        } else {
            Self::Other
        }
    }
}

/// Per-descriptor disposition flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptorFlags(u32);

impl DescriptorFlags {
    /// Close the descriptor across exec
    pub const CLOEXEC: Self = Self(0x01);
    /// Non-blocking I/O
    pub const NONBLOCK: Self = Self(0x02);

    const ALL: u32 = Self::CLOEXEC.0 | Self::NONBLOCK.0;

    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from raw bits, dropping unknown ones
    #[inline]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL)
    }

    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Set or clear `other` depending on `on`
    #[inline]
    #[must_use]
    pub const fn toggled(self, other: Self, on: bool) -> Self {
        if on {
            self.with(other)
        } else {
            self.without(other)
        }
    }
}

impl BitOr for DescriptorFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl BitOrAssign for DescriptorFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.with(rhs);
    }
}

/// A live entry of the descriptor table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorRecord {
    pub virtual_fd: VirtualFd,
    pub external: External,
    pub kind: DescriptorKind,
    pub flags: DescriptorFlags,
}

impl DescriptorRecord {
    #[inline]
    pub const fn new(
        virtual_fd: VirtualFd,
        external: External,
        kind: DescriptorKind,
        flags: DescriptorFlags,
    ) -> Self {
        Self {
            virtual_fd,
            external,
            kind,
            flags,
        }
    }

    #[inline]
    pub const fn is_cloexec(&self) -> bool {
        self.flags.contains(DescriptorFlags::CLOEXEC)
    }
}
