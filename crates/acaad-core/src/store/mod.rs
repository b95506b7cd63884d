// ── Metadata store ──
//
// Per-host component snapshots built by the sync engine and read by the
// dispatch loop and the outbound executor.

mod index;

pub use index::{HostSnapshot, MetadataIndex};
