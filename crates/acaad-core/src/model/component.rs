// ── Component aggregate ──
//
// A named unit on one host (a lamp, a thermometer, a doorbell button)
// bundling every operation the discovery document tags with its name.

use std::fmt;
use std::sync::Arc;

use acaad_api::Host;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::metadata::{Metadata, ServerMetadata};

/// Component kind. Kinds the engine has no special handling for are kept
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ComponentType {
    Sensor,
    Button,
    Switch,
    Other(String),
}

impl From<&str> for ComponentType {
    fn from(s: &str) -> Self {
        match s {
            "Sensor" => Self::Sensor,
            "Button" => Self::Button,
            "Switch" => Self::Switch,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for ComponentType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<ComponentType> for String {
    fn from(t: ComponentType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor => f.write_str("Sensor"),
            Self::Button => f.write_str("Button"),
            Self::Switch => f.write_str("Switch"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// All metadata of one component on one host, in document order.
#[derive(Debug, Clone)]
pub struct Component {
    pub server: Arc<ServerMetadata>,
    pub name: String,
    pub component_type: ComponentType,
    metadata: Vec<Metadata>,
}

impl Component {
    /// Build a component from its entries. Returns `None` for an empty
    /// list; the component type is taken from the first entry.
    pub fn from_metadata(server: Arc<ServerMetadata>, metadata: Vec<Metadata>) -> Option<Self> {
        let first = metadata.first()?;
        Some(Self {
            name: first.component.name.clone(),
            component_type: ComponentType::from(first.component.component_type.as_str()),
            server,
            metadata,
        })
    }

    /// Group a server's entries by component name, keeping the order in
    /// which names first appear.
    pub fn group(server: &Arc<ServerMetadata>, entries: Vec<Metadata>) -> Vec<Self> {
        let mut by_name: IndexMap<String, Vec<Metadata>> = IndexMap::new();
        for entry in entries {
            by_name
                .entry(entry.component.name.clone())
                .or_default()
                .push(entry);
        }

        by_name
            .into_values()
            .filter_map(|metadata| Self::from_metadata(Arc::clone(server), metadata))
            .collect()
    }

    pub fn host(&self) -> &Host {
        &self.server.host
    }

    /// Never empty.
    pub fn metadata(&self) -> &[Metadata] {
        &self.metadata
    }

    /// Entry describing inbound outcomes of this component.
    ///
    /// Switches use the first entry carrying `onIff`; everything else the
    /// first queryable entry. Falls back to the first entry.
    pub fn outcome_metadata(&self) -> &Metadata {
        let preferred = match self.component_type {
            ComponentType::Switch => self.metadata.iter().find(|m| m.on_iff.is_some()),
            _ => None,
        };

        preferred
            .or_else(|| self.metadata.iter().find(|m| m.queryable))
            .unwrap_or(&self.metadata[0])
    }
}
