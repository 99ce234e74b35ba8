/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::VirtualFd;
use miette::Diagnostic;
use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Descriptor table errors
#[derive(Error, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum TableError {
    #[error("Bad descriptor: {0}")]
    #[diagnostic(
        code(descriptors::bad_descriptor),
        help("The virtual descriptor is unknown, closed, or being closed.")
    )]
    BadDescriptor(VirtualFd),

    #[error("Descriptor {0} already in use")]
    #[diagnostic(
        code(descriptors::in_use),
        help("Close the target descriptor before placing a record at it.")
    )]
    InUse(VirtualFd),

    #[error("Descriptor table exhausted (limit {limit})")]
    #[diagnostic(
        code(descriptors::exhausted),
        help("Close unused descriptors or raise VFD_MAX_DESCRIPTORS.")
    )]
    Exhausted { limit: usize },
}

impl TableError {
    /// OS error an intercepted syscall reports for this failure
    #[inline]
    pub const fn errno(&self) -> Errno {
        match self {
            Self::BadDescriptor(_) => Errno::EBADF,
            Self::InUse(_) => Errno::EBUSY,
            Self::Exhausted { .. } => Errno::EMFILE,
        }
    }
}

impl From<TableError> for Errno {
    fn from(err: TableError) -> Self {
        err.errno()
    }
}

/// Managed runtime attachment errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum AttachError {
    #[error("No host VM registered")]
    #[diagnostic(
        code(attach::no_vm),
        help("The host bridge load entry point has not run, or the VM was unloaded.")
    )]
    NoVm,

    #[error("Host VM rejected the request: {0}")]
    #[diagnostic(code(attach::rejected))]
    Rejected(String),

    #[error("Per-thread attachment store unavailable")]
    #[diagnostic(
        code(attach::key_store),
        help("The calling thread is tearing down its thread-local storage.")
    )]
    KeyStore,

    #[error("Attachment key already deleted")]
    #[diagnostic(
        code(attach::key_deleted),
        help("The module was unloaded; reload it to attach threads again.")
    )]
    KeyDeleted,
}

/// Auxiliary subsystem initialization failure
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[error("{0}")]
pub struct SubsystemError(pub String);

impl SubsystemError {
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Module load failure
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum LoadError {
    #[error("{name} initialization failed: {message}")]
    #[diagnostic(
        code(lifecycle::subsystem_failed),
        help("Subsystems after the failing one were not initialized.")
    )]
    Subsystem { name: String, message: String },
}

/// Host bridge load failure
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum BridgeError {
    #[error("Can't get env from host VM: {0}")]
    #[diagnostic(code(bridge::env_unavailable))]
    EnvUnavailable(AttachError),

    #[error("Can't save env: {0}")]
    #[diagnostic(code(bridge::save_failed))]
    SaveFailed(AttachError),
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    #[diagnostic(code(config::invalid_value))]
    InvalidValue { key: String, value: String },

    #[error("Failed to parse configuration: {0}")]
    #[diagnostic(code(config::parse))]
    Parse(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Unified runtime error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum RuntimeError {
    #[error("Descriptor error: {0}")]
    #[diagnostic(transparent)]
    Table(#[from] TableError),

    #[error("Attachment error: {0}")]
    #[diagnostic(transparent)]
    Attach(#[from] AttachError),

    #[error("Load error: {0}")]
    #[diagnostic(transparent)]
    Load(#[from] LoadError),

    #[error("Bridge error: {0}")]
    #[diagnostic(transparent)]
    Bridge(#[from] BridgeError),

    #[error("Config error: {0}")]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("OS error: {0}")]
    #[diagnostic(code(runtime::os))]
    Os(#[from] Errno),
}
