//! Events flowing from ACAAD servers into the engine.
//!
//! Hub connections turn SignalR `receiveEvent` invocations into
//! [`AcaadEvent`]s with the help of an [`EventFactory`], and add the
//! signaling events (`ServerConnected` / `ServerDisconnected`) themselves.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::host::Host;
use crate::openapi::ComponentRef;

// ── Outcome ─────────────────────────────────────────────────────────

/// Result of a component command as pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub success: bool,
    /// Raw payload. Non-string JSON values are kept as their JSON text.
    #[serde(default, deserialize_with = "raw_payload")]
    pub outcome_raw: Option<String>,
}

fn raw_payload<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

// ── AcaadEvent ──────────────────────────────────────────────────────

/// An event queued for the dispatch loop. Every variant carries the
/// host it originated from.
#[derive(Debug, Clone, PartialEq)]
pub enum AcaadEvent {
    ServerConnected(Host),
    ServerDisconnected(Host),
    UnhandledEventReceived {
        host: Host,
        payload: Value,
    },
    ComponentCommandOutcome {
        host: Host,
        component: ComponentRef,
        outcome: Outcome,
    },
}

impl AcaadEvent {
    pub fn host(&self) -> &Host {
        match self {
            Self::ServerConnected(host)
            | Self::ServerDisconnected(host)
            | Self::UnhandledEventReceived { host, .. }
            | Self::ComponentCommandOutcome { host, .. } => host,
        }
    }

    /// Short event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ServerConnected(_) => "ServerConnected",
            Self::ServerDisconnected(_) => "ServerDisconnected",
            Self::UnhandledEventReceived { .. } => "UnhandledEventReceived",
            Self::ComponentCommandOutcome { .. } => "ComponentCommandOutcome",
        }
    }

    /// Attach a host to a decoded payload.
    pub fn from_payload(host: Host, payload: EventPayload) -> Self {
        match payload {
            EventPayload::ComponentCommandOutcome { component, outcome } => {
                Self::ComponentCommandOutcome {
                    host,
                    component,
                    outcome,
                }
            }
        }
    }
}

// ── Event factory ───────────────────────────────────────────────────

/// Host-less event recognised by an [`EventFactory`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    ComponentCommandOutcome {
        component: ComponentRef,
        outcome: Outcome,
    },
}

/// Decodes `receiveEvent` payloads. Returning `None` makes the hub wrap
/// the payload as [`AcaadEvent::UnhandledEventReceived`].
pub trait EventFactory: Send + Sync {
    fn create_event(&self, payload: &Value) -> Option<EventPayload>;
}

/// Recognises the outcome envelope
/// `{topic:"Events", type:"Outcome", name:"ComponentCommandOutcomeEvent", ...}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEventFactory;

#[derive(Deserialize)]
struct OutcomeEnvelope {
    topic: String,
    #[serde(rename = "type")]
    event_type: String,
    name: String,
    component: ComponentRef,
    outcome: Outcome,
}

impl EventFactory for JsonEventFactory {
    fn create_event(&self, payload: &Value) -> Option<EventPayload> {
        let envelope = match OutcomeEnvelope::deserialize(payload) {
            Ok(e) => e,
            Err(e) => {
                tracing::trace!(error = %e, "Payload is not an outcome event");
                return None;
            }
        };

        if envelope.topic != "Events"
            || envelope.event_type != "Outcome"
            || envelope.name != "ComponentCommandOutcomeEvent"
        {
            return None;
        }

        Some(EventPayload::ComponentCommandOutcome {
            component: envelope.component,
            outcome: envelope.outcome,
        })
    }
}
