/*!
 * Virtual Descriptor Runtime
 * Descriptor virtualization and host VM attachment exposed as a library
 */

pub mod attach;
pub mod config;
pub mod core;
pub mod descriptors;
pub mod forward;
pub mod monitoring;
pub mod runtime;

// Re-exports
pub use attach::{AttachmentCache, EnvHandle, HostVm, InterfaceVersion};
pub use config::{RuntimeConfig, TableConfig};
pub use crate::core::errors::*;
pub use crate::core::types::*;
pub use descriptors::{DescriptorFlags, DescriptorKind, DescriptorRecord, DescriptorTable, External, Resolution};
pub use forward::{Forwarder, OsSyscalls, NativeSyscalls};
pub use monitoring::{init_tracing, try_init_tracing};
pub use runtime::{FnSubsystem, HostBridge, RuntimeContext, RuntimeContextBuilder, Subsystem};
