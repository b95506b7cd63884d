// acaad-core: Metadata sync and event routing between ACAAD servers and a connected service.

pub mod adapter;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod model;
pub mod outbound;
pub mod parser;
pub mod store;
pub mod sync;
pub mod trace;

// ── Primary re-exports ──────────────────────────────────────────────
pub use adapter::{
    AdapterError, AdapterResult, ResyncHooks, ServiceAdapter, ServiceFunction,
    StateChangeCallback, SyncInterval,
};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{CoreError, ErrorKind};
pub use parser::parse_outcome;
pub use store::{HostSnapshot, MetadataIndex};

pub use model::{
    ChangeType, Component, ComponentDescriptor, ComponentType, InboundStateUpdate, Metadata,
    ParsedValue, ServerMetadata,
};

// Transport types that appear in the public API.
pub use acaad_api::{AcaadEvent, ComponentRef, Host, HubState, Outcome, Scheme};
