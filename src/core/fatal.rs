/*!
 * Fatal Faults
 *
 * Unrecoverable invariant violations. Continuing after one of these would leave
 * descriptor or attachment state undefined, so the process is aborted.
 */

use tracing::error;

/// Log the fault and abort the process
#[cold]
#[inline(never)]
pub fn abort_process(reason: &str) -> ! {
    error!(reason = reason, "fatal runtime fault, aborting");
    std::process::abort()
}
