// ── Server and operation metadata ──

use acaad_api::openapi::TaggedOperation;
use acaad_api::{Cardinality, ComponentRef, Host, OpenApiDocument, OperationMethod, ResultType};
use serde_json::Value;

/// A host together with the discovery document it served.
///
/// Created once per discovery cycle; a later sync supersedes it.
#[derive(Debug, Clone)]
pub struct ServerMetadata {
    pub host: Host,
    pub friendly_name: String,
    pub document: OpenApiDocument,
}

impl ServerMetadata {
    pub fn new(host: Host, document: OpenApiDocument) -> Self {
        Self {
            friendly_name: host.friendly_name.clone(),
            host,
            document,
        }
    }

    /// Flatten the document into one entry per ACAAD-tagged operation,
    /// in document order.
    pub fn metadata(&self) -> Vec<Metadata> {
        self.document
            .operations()
            .map(Metadata::from_operation)
            .collect()
    }
}

/// One REST operation annotated with ACAAD semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub path: String,
    pub method: OperationMethod,
    pub component: ComponentRef,
    pub actionable: bool,
    pub queryable: bool,
    pub idempotent: bool,
    pub result_type: ResultType,
    pub cardinality: Cardinality,
    pub for_value: Option<Value>,
    pub on_iff: Option<Value>,
    pub unit_of_measure: Option<String>,
}

impl Metadata {
    pub fn from_operation(op: TaggedOperation<'_>) -> Self {
        let ext = op.acaad;
        Self {
            path: op.path.to_owned(),
            method: op.method,
            component: ext.component.clone(),
            actionable: ext.actionable.unwrap_or(false),
            queryable: ext.queryable.unwrap_or(false),
            idempotent: ext.idempotent.unwrap_or(false),
            result_type: ext.result_type.clone(),
            cardinality: ext.cardinality.clone(),
            for_value: ext.for_value.clone(),
            on_iff: ext.on_iff.clone(),
            unit_of_measure: ext.unit_of_measure.clone(),
        }
    }
}
