// ── Domain model ──
//
// Canonical representation of what the engine learns from discovery
// documents and push events. Everything here is rebuilt on each sync
// pass and shared read-only behind `Arc`s.

pub mod component;
pub mod descriptor;
pub mod metadata;
pub mod update;

// ── Re-exports ──────────────────────────────────────────────────────

pub use component::{Component, ComponentType};
pub use descriptor::ComponentDescriptor;
pub use metadata::{Metadata, ServerMetadata};
pub use update::{ChangeType, InboundStateUpdate, ParsedValue};
