/*!
 * Runtime Attachment
 *
 * Binds native threads to the hosting VM on demand:
 * - Once-only attachment key with a thread-exit detach hook
 * - Lazy attach on first environment fetch
 * - Explicit registration of the VM and a host-supplied environment
 */

mod cache;
mod key;
mod vm;

pub use cache::AttachmentCache;
pub use key::AttachmentKey;
pub use vm::{EnvHandle, HostVm, InterfaceVersion};

#[cfg(test)]
pub use vm::MockHostVm;
