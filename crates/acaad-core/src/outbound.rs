// ── Outbound command executor ──
//
// Adapter-triggered state changes. The descriptor is resolved against the
// index, exactly one metadata entry must match the requested change, and
// the entry's method and path are issued against the owning host.

use std::sync::Arc;

use acaad_api::{AcaadClient, Host, TraceParent};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{ServiceAdapter, ServiceFunction, report_failure};
use crate::error::CoreError;
use crate::model::{ChangeType, Component, ComponentDescriptor, Metadata};
use crate::store::MetadataIndex;
use crate::trace;

pub struct OutboundExecutor {
    client: AcaadClient,
    index: Arc<MetadataIndex>,
    adapter: Arc<dyn ServiceAdapter>,
    cancel: CancellationToken,
}

impl OutboundExecutor {
    pub fn new(
        client: AcaadClient,
        index: Arc<MetadataIndex>,
        adapter: Arc<dyn ServiceAdapter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            index,
            adapter,
            cancel,
        }
    }

    /// Execute a state change requested by the adapter.
    ///
    /// Returns `true` only when the server answered with a 2xx status.
    /// Requests still in flight at shutdown are abandoned without a report.
    pub async fn handle(
        &self,
        host: &Host,
        descriptor: &ComponentDescriptor,
        change: ChangeType,
        value: Option<Value>,
    ) -> bool {
        let Some(component) = self.index.lookup_by_descriptor(host, descriptor) else {
            warn!(
                host = %host.friendly_name,
                descriptor = %descriptor,
                "State change for unknown component"
            );
            return false;
        };

        match self.execute(&component, change, value.as_ref()).await {
            Ok(()) => true,
            Err(CoreError::Cancelled) => {
                debug!(component = %component.name, "Outbound state change cancelled");
                false
            }
            Err(e) => {
                warn!(component = %component.name, error = %e, "Outbound state change failed");
                report_failure(
                    self.adapter.as_ref(),
                    ServiceFunction::HandleOutboundStateChange,
                    Box::new(e),
                )
                .await;
                false
            }
        }
    }

    async fn execute(
        &self,
        component: &Component,
        change: ChangeType,
        value: Option<&Value>,
    ) -> Result<(), CoreError> {
        let metadata = resolve(component, change, value)?;

        let ctx = if let Some(current) = trace::current() {
            current.child()
        } else {
            warn!(component = %component.name, "No trace context for outbound call, minting one");
            TraceParent::mint()
        };

        debug!(
            component = %component.name,
            method = %metadata.method,
            path = %metadata.path,
            traceparent = %ctx,
            "Executing state change"
        );
        let request = self
            .client
            .execute(component.host(), metadata.method, &metadata.path, &ctx);
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(CoreError::Cancelled),
            result = request => result?,
        };

        info!(component = %component.name, change = ?change, "State change executed");
        Ok(())
    }
}

/// Pick the single metadata entry serving `change` with `value`.
pub fn resolve<'a>(
    component: &'a Component,
    change: ChangeType,
    value: Option<&Value>,
) -> Result<&'a Metadata, CoreError> {
    let candidates: Vec<&Metadata> = component
        .metadata()
        .iter()
        .filter(|m| match change {
            ChangeType::Query => m.queryable,
            ChangeType::Action => {
                m.actionable && m.for_value.as_ref().is_none_or(|fv| Some(fv) == value)
            }
        })
        .collect();

    match candidates.as_slice() {
        [single] => Ok(*single),
        [] => Err(CoreError::configuration(format!(
            "no {change:?} operation of '{}' matches value {value:?}",
            component.name
        ))),
        many => Err(CoreError::configuration(format!(
            "{} {change:?} operations of '{}' match value {value:?}",
            many.len(),
            component.name
        ))),
    }
}
