/*!
 * Descriptor Resolution
 *
 * Virtual-to-external descriptor table consulted by every forwarded syscall:
 * - Records: external descriptor, kind, and disposition flags
 * - Lowest-available virtual id allocation with recycling
 * - Two-phase close so an id is never reissued while its external side is
 *   still being released
 * - Reference-counted external descriptors shared by duplicates
 */

mod allocator;
mod record;
mod resolution;
mod table;

pub use record::{DescriptorFlags, DescriptorKind, DescriptorRecord, External};
pub use resolution::Resolution;
pub use table::{CloseTicket, DescriptorTable};
