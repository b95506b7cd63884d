// ── Component descriptor ──

use std::fmt;

use serde::{Deserialize, Serialize};

/// Adapter-chosen handle for a component. Unique by name within a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentDescriptor(String);

impl ComponentDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentDescriptor {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for ComponentDescriptor {
    fn from(name: String) -> Self {
        Self(name)
    }
}
