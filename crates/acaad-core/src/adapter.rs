//! Connected-service adapter SPI.
//!
//! The embedding platform implements [`ServiceAdapter`] to receive server
//! and component models, inbound state updates and signaling events, and
//! to trigger outbound commands through the registered
//! [`StateChangeCallback`].
//!
//! Every fallible call returns an [`AdapterError`]. The engine passes it
//! through [`ServiceAdapter::map_service_error`] before reporting it via
//! [`ServiceAdapter::on_error`].

use std::sync::Arc;
use std::time::Duration;

use acaad_api::{ComponentRef, Host};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::error;

use crate::error::CoreError;
use crate::model::{ChangeType, Component, ComponentDescriptor, InboundStateUpdate, ServerMetadata};

pub type AdapterError = Box<dyn std::error::Error + Send + Sync>;
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Callback handed to the adapter for outbound state changes.
/// Resolves to `true` when the command was executed successfully.
pub type StateChangeCallback = Arc<
    dyn Fn(Host, ComponentDescriptor, ChangeType, Option<Value>) -> BoxFuture<'static, bool>
        + Send
        + Sync,
>;

/// Adapter function a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ServiceFunction {
    ConnectedServers,
    CreateServerModel,
    CreateComponentModel,
    UpdateComponentState,
    OnServerConnected,
    OnServerDisconnected,
    OnUnhandledEvent,
    OnUnmappedComponentEvent,
    RegisterStateChangeCallback,
    HandleOutboundStateChange,
}

/// Resync hooks the adapter implements.
///
/// Declaring at least one is required when
/// [`ServiceAdapter::should_sync_on_connect`] returns `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncHooks {
    /// [`ServiceAdapter::sync_interval`] is implemented.
    pub interval: bool,
    /// [`ServiceAdapter::should_sync`] is implemented.
    pub per_host: bool,
}

/// Minimum age of a host's metadata before a reconnect triggers a resync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncInterval {
    Infinite,
    Every(Duration),
    /// Human-readable duration such as `"1 hour"` or `"30min"`.
    /// `inf`, `infinity` and `never` mean [`SyncInterval::Infinite`].
    Text(String),
}

#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    // ── Model provisioning ───────────────────────────────────────────

    /// Stable handle for a component. Called while building the index.
    fn component_descriptor(&self, component: &Component) -> ComponentDescriptor;

    async fn create_server_model(&self, server: &ServerMetadata) -> AdapterResult<()>;

    async fn create_component_model(&self, component: &Component) -> AdapterResult<()>;

    async fn update_component_state(
        &self,
        descriptor: &ComponentDescriptor,
        update: InboundStateUpdate,
    ) -> AdapterResult<()>;

    // ── Hosts and signaling ──────────────────────────────────────────

    async fn connected_servers(&self) -> AdapterResult<Vec<Host>>;

    /// Upper bound for concurrent discovery queries and adapter calls
    /// during a sync pass. Values below 1 are treated as 1.
    fn allowed_concurrency(&self) -> usize;

    async fn on_server_connected(&self, host: &Host) -> AdapterResult<()>;

    async fn on_server_disconnected(&self, host: &Host) -> AdapterResult<()>;

    async fn register_state_change_callback(
        &self,
        callback: StateChangeCallback,
    ) -> AdapterResult<()>;

    async fn on_unhandled_event(&self, _host: &Host, _payload: &Value) -> AdapterResult<()> {
        Ok(())
    }

    /// An outcome arrived for a component the index does not know.
    async fn on_unmapped_component_event(
        &self,
        _host: &Host,
        _component: &ComponentRef,
    ) -> AdapterResult<()> {
        Ok(())
    }

    // ── Resync policy ────────────────────────────────────────────────

    fn should_sync_on_connect(&self) -> bool {
        false
    }

    fn resync_hooks(&self) -> ResyncHooks {
        ResyncHooks::default()
    }

    fn sync_interval(&self) -> SyncInterval {
        SyncInterval::Infinite
    }

    async fn should_sync(&self, _host: &Host, _last_sync: Option<DateTime<Utc>>) -> bool {
        false
    }

    // ── Error handling ───────────────────────────────────────────────

    /// Classify a failure before it is reported. Errors that already are
    /// a [`CoreError`] keep their kind; anything else becomes a callout error.
    fn map_service_error(&self, function: ServiceFunction, error: AdapterError) -> CoreError {
        match error.downcast::<CoreError>() {
            Ok(core) => *core,
            Err(other) => CoreError::Callout {
                message: format!("{function} failed: {other}"),
            },
        }
    }

    async fn on_error(&self, _error: &CoreError) -> AdapterResult<()> {
        Ok(())
    }
}

// ── Reporting helpers ────────────────────────────────────────────────

/// Deliver an error to the adapter's error hook. A failing hook turns
/// into a fatal error that is logged and never reported again.
pub(crate) async fn report(adapter: &dyn ServiceAdapter, error: CoreError) {
    if let Err(e) = adapter.on_error(&error).await {
        let fatal = CoreError::Fatal {
            message: format!("error hook failed while reporting '{error}': {e}"),
        };
        error!(error = %fatal, "Adapter error hook failed");
    }
}

/// Map an adapter or engine failure through `map_service_error`, then report it.
pub(crate) async fn report_failure(
    adapter: &dyn ServiceAdapter,
    function: ServiceFunction,
    error: AdapterError,
) {
    let mapped = adapter.map_service_error(function, error);
    report(adapter, mapped).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::ErrorKind;

    #[derive(Default)]
    struct Minimal {
        reported: Mutex<Vec<ErrorKind>>,
        fail_hook: bool,
    }

    #[async_trait]
    impl ServiceAdapter for Minimal {
        fn component_descriptor(&self, component: &Component) -> ComponentDescriptor {
            ComponentDescriptor::new(component.name.clone())
        }
        async fn create_server_model(&self, _: &ServerMetadata) -> AdapterResult<()> {
            Ok(())
        }
        async fn create_component_model(&self, _: &Component) -> AdapterResult<()> {
            Ok(())
        }
        async fn update_component_state(
            &self,
            _: &ComponentDescriptor,
            _: InboundStateUpdate,
        ) -> AdapterResult<()> {
            Ok(())
        }
        async fn connected_servers(&self) -> AdapterResult<Vec<Host>> {
            Ok(Vec::new())
        }
        fn allowed_concurrency(&self) -> usize {
            1
        }
        async fn on_server_connected(&self, _: &Host) -> AdapterResult<()> {
            Ok(())
        }
        async fn on_server_disconnected(&self, _: &Host) -> AdapterResult<()> {
            Ok(())
        }
        async fn register_state_change_callback(&self, _: StateChangeCallback) -> AdapterResult<()> {
            Ok(())
        }
        async fn on_error(&self, error: &CoreError) -> AdapterResult<()> {
            self.reported
                .lock()
                .map_err(|e| e.to_string())?
                .push(error.kind());
            if self.fail_hook {
                return Err("hook exploded".into());
            }
            Ok(())
        }
    }

    #[test]
    fn default_mapping_keeps_core_errors() {
        let adapter = Minimal::default();
        let mapped = adapter.map_service_error(
            ServiceFunction::HandleOutboundStateChange,
            Box::new(CoreError::ResponseStatusCode {
                expected: 200,
                actual: 500,
            }),
        );
        assert_eq!(mapped.kind(), ErrorKind::ResponseStatusCode);

        let mapped = adapter.map_service_error(ServiceFunction::CreateServerModel, "disk full".into());
        assert_eq!(mapped.kind(), ErrorKind::Callout);
        assert!(mapped.to_string().contains("CreateServerModel"));
    }

    #[tokio::test]
    async fn failing_error_hook_is_not_retried() {
        let adapter = Minimal {
            fail_hook: true,
            ..Minimal::default()
        };
        report_failure(&adapter, ServiceFunction::OnServerConnected, "boom".into()).await;

        let reported = adapter.reported.lock().map(|r| r.clone()).unwrap_or_default();
        assert_eq!(reported, vec![ErrorKind::Callout]);
    }
}
