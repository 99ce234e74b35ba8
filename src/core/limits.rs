/*!
 * Limits and Constants
 *
 * Centralized location for descriptor-table limits and host bridge constants.
 * Values marked [LINUX-COMPAT] mirror their Linux counterparts.
 */

// =============================================================================
// DESCRIPTOR TABLE LIMITS
// =============================================================================

/// Standard virtual descriptor limit
/// [LINUX-COMPAT] Matches the default RLIMIT_NOFILE soft limit
pub const STANDARD_MAX_DESCRIPTORS: usize = 1024;

/// Restricted virtual descriptor limit for sandboxed embedders
pub const RESTRICTED_MAX_DESCRIPTORS: usize = 256;

/// Hard ceiling accepted from configuration
pub const MAX_CONFIGURABLE_DESCRIPTORS: usize = 1 << 20;

/// Number of standard streams (stdin, stdout, stderr)
/// [LINUX-COMPAT] Descriptors 0, 1, 2
pub const STD_STREAM_COUNT: i32 = 3;

/// High descriptor count threshold, logged once crossed
pub const HIGH_DESCRIPTOR_THRESHOLD: usize = 900;

// =============================================================================
// HOST BRIDGE
// =============================================================================

/// Interface version negotiated with the host VM by default (1.4)
pub const DEFAULT_INTERFACE_VERSION: i32 = 0x0001_0004;

/// Raw value reported to the host when loading fails
pub const LOAD_FAILED_SENTINEL: i32 = -1;

// =============================================================================
// TRACING
// =============================================================================

/// Operations slower than this are logged as warnings
pub const SLOW_OPERATION_MILLIS: u128 = 100;
