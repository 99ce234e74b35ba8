/*!
 * Syscall Forwarding
 *
 * Thin wrappers that translate virtual descriptors to external ones and
 * forward to the OS. No buffering, retry, or result translation.
 */

mod forwarder;
mod native;

pub use forwarder::Forwarder;
pub use native::{OsSyscalls, NativeSyscalls};
