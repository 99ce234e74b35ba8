/*!
 * Core Types
 * Common types used across the runtime
 */

use std::os::fd::RawFd;

/// Application-visible descriptor
pub type VirtualFd = i32;

/// Real OS descriptor
pub type OsFd = RawFd;

/// Common result type for runtime operations
pub type RuntimeResult<T> = Result<T, super::errors::RuntimeError>;
