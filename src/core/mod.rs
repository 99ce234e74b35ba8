/*!
 * Core Module
 * Fundamental runtime types and error handling
 */

pub mod errors;
pub mod fatal;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use errors::*;
pub use fatal::abort_process;
pub use types::*;
