/*!
 * Host VM Interface
 * Opaque handles and the operations the cache needs from the hosting VM
 */

use crate::core::errors::AttachError;
use crate::core::limits::DEFAULT_INTERFACE_VERSION;
use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroUsize;

/// Opaque, non-null handle to a thread's managed-environment binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvHandle(NonZeroUsize);

impl EnvHandle {
    /// Wrap a raw environment pointer; `None` for null
    #[inline]
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonZeroUsize::new(ptr as usize).map(Self)
    }

    #[inline]
    pub const fn from_addr(addr: NonZeroUsize) -> Self {
        Self(addr)
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut c_void {
        self.0.get() as *mut c_void
    }

    #[inline]
    pub const fn addr(&self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for EnvHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Interface version negotiated with the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceVersion(i32);

impl InterfaceVersion {
    pub const V1_4: Self = Self(DEFAULT_INTERFACE_VERSION);

    #[inline]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(&self) -> i32 {
        self.0
    }
}

impl Default for InterfaceVersion {
    fn default() -> Self {
        Self::V1_4
    }
}

/// Hosting virtual machine
///
/// `attach_current_thread` and `detach_current_thread` act on the calling OS
/// thread.
#[cfg_attr(test, mockall::automock)]
pub trait HostVm: Send + Sync {
    /// Environment of the calling thread, which must already be attached
    fn get_env(&self, version: InterfaceVersion) -> Result<EnvHandle, AttachError>;

    /// Attach the calling thread and return its environment
    fn attach_current_thread(&self) -> Result<EnvHandle, AttachError>;

    /// Detach the calling thread
    fn detach_current_thread(&self);
}
