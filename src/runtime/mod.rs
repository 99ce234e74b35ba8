/*!
 * Runtime
 *
 * Process-lifetime context plus the module and host entry points:
 * - Ordered subsystem bring-up at module load
 * - Attachment key teardown at module unload
 * - Host VM capture when the host loads the module
 */

mod bridge;
mod context;
mod lifecycle;

pub use bridge::HostBridge;
pub use context::{RuntimeContext, RuntimeContextBuilder};
pub use lifecycle::{FnSubsystem, Subsystem};
