// acaad-api: Async Rust client for ACAAD servers (discovery, commands, event hub)

pub mod client;
pub mod error;
pub mod events;
pub mod host;
pub mod hub;
pub mod openapi;
pub mod trace;
pub mod transport;

pub use client::AcaadClient;
pub use error::Error;
pub use events::{AcaadEvent, EventFactory, EventPayload, JsonEventFactory, Outcome};
pub use host::{Authentication, Host, Scheme};
pub use hub::{HubConfig, HubConnection, HubState};
pub use openapi::{
    AcaadExtension, Cardinality, ComponentRef, OpenApiDocument, OperationMethod, ResultType,
};
pub use trace::TraceParent;
pub use transport::{TlsMode, TransportConfig};
