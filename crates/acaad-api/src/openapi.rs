// ── ACAAD discovery document ──
//
// Served by every ACAAD server at `GET /openapi/v1.json`. Only the parts
// the engine consumes are modelled: the `info` block with the `acaad`
// version marker, and per-operation `acaad` extensions. Every other
// OpenAPI field is ignored.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Relative path of the discovery document.
pub const DISCOVERY_PATH: &str = "openapi/v1.json";

// ── Document root ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenApiDocument {
    pub info: InfoObject,
    /// Keyed by path, preserving document order.
    #[serde(default)]
    pub paths: IndexMap<String, PathItem>,
}

impl OpenApiDocument {
    /// Iterate all ACAAD-tagged operations in document order.
    ///
    /// Within one path `get` precedes `post`.
    pub fn operations(&self) -> impl Iterator<Item = TaggedOperation<'_>> {
        self.paths.iter().flat_map(|(path, item)| {
            [
                (OperationMethod::Get, item.get.as_ref()),
                (OperationMethod::Post, item.post.as_ref()),
            ]
            .into_iter()
            .filter_map(move |(method, op)| {
                op.and_then(|op| op.acaad.as_ref())
                    .map(|acaad| TaggedOperation {
                        path: path.as_str(),
                        method,
                        acaad,
                    })
            })
        })
    }
}

/// One operation carrying an `acaad` extension.
#[derive(Debug, Clone, Copy)]
pub struct TaggedOperation<'a> {
    pub path: &'a str,
    pub method: OperationMethod,
    pub acaad: &'a AcaadExtension,
}

// ── Info block ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoObject {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub version: String,
    /// Version/commit marker identifying an ACAAD-compatible server.
    pub acaad: String,
    #[serde(rename = "acaad.metadata")]
    pub metadata: InfoMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoMetadata {
    pub name: String,
    pub os: String,
    pub otlp_enabled: bool,
}

// ── Paths / operations ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathItem {
    #[serde(default)]
    pub get: Option<Operation>,
    #[serde(default)]
    pub post: Option<Operation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub acaad: Option<AcaadExtension>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMethod {
    Get,
    Post,
}

impl OperationMethod {
    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
        }
    }
}

impl fmt::Display for OperationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
        })
    }
}

/// Owning component reference: `{ "type": "Switch", "name": "lamp" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentRef {
    #[serde(rename = "type")]
    pub component_type: String,
    pub name: String,
}

/// The `acaad` object attached to an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcaadExtension {
    pub component: ComponentRef,
    #[serde(default)]
    pub actionable: Option<bool>,
    #[serde(default)]
    pub queryable: Option<bool>,
    #[serde(default)]
    pub idempotent: Option<bool>,
    #[serde(default)]
    pub for_value: Option<Value>,
    #[serde(default)]
    pub on_iff: Option<Value>,
    #[serde(default, rename = "type")]
    pub result_type: ResultType,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub unit_of_measure: Option<String>,
}

// ── Result type / cardinality ───────────────────────────────────────

/// Value type of a component's outcome.
///
/// Unrecognised strings are kept so the outcome parser can report a
/// version mismatch instead of the whole document failing to load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResultType {
    #[default]
    String,
    Boolean,
    Long,
    Decimal,
    Unknown(String),
}

impl From<String> for ResultType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "String" => Self::String,
            "Boolean" => Self::Boolean,
            "Long" => Self::Long,
            "Decimal" => Self::Decimal,
            _ => Self::Unknown(s),
        }
    }
}

impl From<ResultType> for String {
    fn from(t: ResultType) -> Self {
        match t {
            ResultType::String => "String".into(),
            ResultType::Boolean => "Boolean".into(),
            ResultType::Long => "Long".into(),
            ResultType::Decimal => "Decimal".into(),
            ResultType::Unknown(s) => s,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Cardinality {
    #[default]
    Single,
    Multiple,
    Unknown(String),
}

impl From<String> for Cardinality {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Single" => Self::Single,
            "Multiple" => Self::Multiple,
            _ => Self::Unknown(s),
        }
    }
}

impl From<Cardinality> for String {
    fn from(c: Cardinality) -> Self {
        match c {
            Cardinality::Single => "Single".into(),
            Cardinality::Multiple => "Multiple".into(),
            Cardinality::Unknown(s) => s,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn document() -> Value {
        json!({
            "openapi": "3.0.1",
            "info": {
                "title": "ACAAD Server",
                "version": "1.0.0",
                "acaad": "1.0.0-beta+3b1c2",
                "acaad.metadata": { "name": "garage", "os": "linux", "otlpEnabled": false }
            },
            "paths": {
                "/api/lamp/on": {
                    "post": { "acaad": {
                        "component": { "type": "Switch", "name": "lamp" },
                        "actionable": true, "forValue": true, "onIff": true,
                        "type": "Boolean"
                    } }
                },
                "/api/lamp/off": {
                    "post": { "acaad": {
                        "component": { "type": "Switch", "name": "lamp" },
                        "actionable": true, "forValue": false
                    } }
                },
                "/health": { "get": { "summary": "not tagged" } },
                "/api/temp": {
                    "get": { "acaad": {
                        "component": { "type": "Sensor", "name": "temp" },
                        "queryable": true, "type": "Decimal", "unitOfMeasure": "°C"
                    } }
                }
            }
        })
    }

    #[test]
    fn untagged_operations_are_skipped() {
        let doc: OpenApiDocument = serde_json::from_value(document()).unwrap();
        let paths: Vec<_> = doc.operations().map(|op| op.path).collect();
        assert_eq!(paths, vec!["/api/lamp/on", "/api/lamp/off", "/api/temp"]);
        assert_eq!(doc.info.metadata.name, "garage");
    }

    #[test]
    fn extension_defaults_apply() {
        let doc: OpenApiDocument = serde_json::from_value(document()).unwrap();
        let off = doc.operations().nth(1).unwrap();
        assert_eq!(off.method, OperationMethod::Post);
        assert_eq!(off.acaad.result_type, ResultType::String);
        assert_eq!(off.acaad.cardinality, Cardinality::Single);
        assert_eq!(off.acaad.for_value, Some(json!(false)));
        assert_eq!(off.acaad.on_iff, None);
        assert_eq!(off.acaad.queryable, None);
    }

    #[test]
    fn missing_acaad_marker_is_rejected() {
        let mut raw = document();
        raw["info"].as_object_mut().unwrap().remove("acaad");
        assert!(serde_json::from_value::<OpenApiDocument>(raw).is_err());
    }

    #[test]
    fn unknown_type_is_retained() {
        let ext: AcaadExtension = serde_json::from_value(json!({
            "component": { "type": "Sensor", "name": "x" },
            "type": "Float128",
            "cardinality": "Many"
        }))
        .unwrap();
        assert_eq!(ext.result_type, ResultType::Unknown("Float128".into()));
        assert_eq!(ext.cardinality, Cardinality::Unknown("Many".into()));
    }
}
