// ── Event dispatch loop ──
//
// Single consumer of the shared event queue. Events are handled strictly
// one at a time in arrival order; a failing or panicking handler is
// reported to the adapter and the loop moves on.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use acaad_api::{AcaadEvent, ComponentRef, Host, Outcome, TraceParent};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::adapter::{
    ResyncHooks, ServiceAdapter, ServiceFunction, SyncInterval, report, report_failure,
};
use crate::error::CoreError;
use crate::model::{Component, ComponentType, InboundStateUpdate, ParsedValue};
use crate::parser::parse_outcome;
use crate::store::MetadataIndex;
use crate::sync::MetadataSync;
use crate::trace;

// ── Resync policy ────────────────────────────────────────────────────

/// Decides whether a reconnecting host gets a fresh sync pass.
#[derive(Debug, Clone, Copy)]
pub struct ResyncPolicy {
    on_connect: bool,
    hooks: ResyncHooks,
}

impl ResyncPolicy {
    /// Validate the adapter's declaration. Syncing on connect without
    /// either resync hook is a configuration error.
    pub fn from_adapter(adapter: &dyn ServiceAdapter) -> Result<Self, CoreError> {
        let on_connect = adapter.should_sync_on_connect();
        let hooks = adapter.resync_hooks();

        if on_connect && !hooks.interval && !hooks.per_host {
            return Err(CoreError::configuration(
                "should_sync_on_connect is enabled but neither sync_interval nor should_sync \
                 is implemented",
            ));
        }

        Ok(Self { on_connect, hooks })
    }

    /// Both declared hooks are evaluated; either one can trigger.
    pub async fn should_resync(
        &self,
        adapter: &dyn ServiceAdapter,
        host: &Host,
        last_sync: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.on_connect {
            return false;
        }

        let mut due = false;

        if self.hooks.interval {
            if let Some(interval) = resolve_interval(&adapter.sync_interval()) {
                due |= match last_sync {
                    None => true,
                    Some(last) => chrono::Duration::from_std(interval)
                        .ok()
                        .and_then(|i| last.checked_add_signed(i))
                        .is_some_and(|next| now > next),
                };
            }
        }

        if self.hooks.per_host {
            due |= adapter.should_sync(host, last_sync).await;
        }

        due
    }
}

/// `None` means never resync on interval.
pub fn resolve_interval(interval: &SyncInterval) -> Option<Duration> {
    match interval {
        SyncInterval::Infinite => None,
        SyncInterval::Every(d) => Some(*d),
        SyncInterval::Text(text) => {
            let text = text.trim();
            if ["inf", "infinity", "never"]
                .iter()
                .any(|t| text.eq_ignore_ascii_case(t))
            {
                return None;
            }
            match humantime::parse_duration(text) {
                Ok(d) => Some(d),
                Err(e) => {
                    error!(interval = text, error = %e, "Unparseable sync interval, treating as infinite");
                    None
                }
            }
        }
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────

pub struct EventDispatcher {
    adapter: Arc<dyn ServiceAdapter>,
    index: Arc<MetadataIndex>,
    sync: Arc<MetadataSync>,
    policy: ResyncPolicy,
}

impl EventDispatcher {
    pub fn new(
        adapter: Arc<dyn ServiceAdapter>,
        index: Arc<MetadataIndex>,
        sync: Arc<MetadataSync>,
        policy: ResyncPolicy,
    ) -> Self {
        Self {
            adapter,
            index,
            sync,
            policy,
        }
    }

    /// Drain `queue` until it closes or `cancel` fires.
    pub async fn run(self, mut queue: mpsc::UnboundedReceiver<AcaadEvent>, cancel: CancellationToken) {
        debug!("Dispatch loop started");

        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = queue.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = self.dispatch(event) => {}
            }
        }

        queue.close();
        debug!("Dispatch loop stopped");
    }

    async fn dispatch(&self, event: AcaadEvent) {
        let name = event.name();
        trace!(event = name, host = %event.host().friendly_name, "Dispatching event");

        let handled = trace::scope(TraceParent::mint(), self.handle(event));
        if let Err(panic) = AssertUnwindSafe(handled).catch_unwind().await {
            let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                (*s).to_owned()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_owned()
            };
            error!(event = name, panic_msg = %panic_msg, "Event handler panicked");
            let failure = CoreError::Callout {
                message: format!("{name} handler panicked: {panic_msg}"),
            };
            report(self.adapter.as_ref(), failure).await;
        }
    }

    async fn handle(&self, event: AcaadEvent) {
        match event {
            AcaadEvent::ComponentCommandOutcome {
                host,
                component,
                outcome,
            } => self.on_outcome(&host, &component, outcome).await,
            AcaadEvent::ServerConnected(host) => self.on_connected(&host).await,
            AcaadEvent::ServerDisconnected(host) => {
                if let Err(e) = self.adapter.on_server_disconnected(&host).await {
                    report_failure(self.adapter.as_ref(), ServiceFunction::OnServerDisconnected, e)
                        .await;
                }
            }
            AcaadEvent::UnhandledEventReceived { host, payload } => {
                if let Err(e) = self.adapter.on_unhandled_event(&host, &payload).await {
                    report_failure(self.adapter.as_ref(), ServiceFunction::OnUnhandledEvent, e)
                        .await;
                }
            }
        }
    }

    async fn on_connected(&self, host: &Host) {
        let last_sync = self.index.last_sync(host);
        if self
            .policy
            .should_resync(self.adapter.as_ref(), host, last_sync, Utc::now())
            .await
        {
            debug!(host = %host.friendly_name, "Resyncing metadata on connect");
            self.sync.sync(Some(vec![host.clone()])).await;
        }

        if let Err(e) = self.adapter.on_server_connected(host).await {
            report_failure(self.adapter.as_ref(), ServiceFunction::OnServerConnected, e).await;
        }
    }

    async fn on_outcome(&self, host: &Host, reference: &ComponentRef, outcome: Outcome) {
        let component_type = ComponentType::from(reference.component_type.as_str());
        let Some(component) = self
            .index
            .lookup_by_type_name(host, &component_type, &reference.name)
        else {
            debug!(
                host = %host.friendly_name,
                component = %reference.name,
                "Outcome for unknown component"
            );
            if let Err(e) = self.adapter.on_unmapped_component_event(host, reference).await {
                report_failure(
                    self.adapter.as_ref(),
                    ServiceFunction::OnUnmappedComponentEvent,
                    e,
                )
                .await;
            }
            return;
        };

        let descriptor = self.adapter.component_descriptor(&component);

        let update = match self.build_update(&component, outcome).await {
            Ok(update) => update,
            Err(e) => {
                warn!(component = %component.name, error = %e, "Cannot build state update");
                report(self.adapter.as_ref(), e).await;
                return;
            }
        };

        if let Err(e) = self.adapter.update_component_state(&descriptor, update).await {
            report_failure(self.adapter.as_ref(), ServiceFunction::UpdateComponentState, e).await;
        }
    }

    /// Parse the outcome against the component's outcome metadata. A
    /// parse failure is reported and leaves the target state empty.
    async fn build_update(
        &self,
        component: &Component,
        outcome: Outcome,
    ) -> Result<InboundStateUpdate, CoreError> {
        let metadata = component.outcome_metadata();

        let on_iff = match component.component_type {
            ComponentType::Switch => Some(metadata.on_iff.as_ref().ok_or_else(|| {
                CoreError::configuration(format!(
                    "switch '{}' declares no onIff reference",
                    component.name
                ))
            })?),
            _ => None,
        };

        let parsed = match parse_outcome(metadata, &outcome) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(component = %component.name, error = %e, "Outcome not parseable");
                report(self.adapter.as_ref(), e).await;
                None
            }
        };

        let determined_target_state = match on_iff {
            Some(reference) => parsed.map(|v| ParsedValue::Boolean(v.matches(reference))),
            None => parsed,
        };

        Ok(InboundStateUpdate {
            original_outcome: outcome,
            determined_target_state,
            metadata: metadata.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use acaad_api::{AcaadClient, OpenApiDocument};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::adapter::{AdapterResult, StateChangeCallback};
    use crate::config::EngineConfig;
    use crate::error::ErrorKind;
    use crate::model::{ComponentDescriptor, ServerMetadata};

    struct PolicyAdapter {
        on_connect: bool,
        hooks: ResyncHooks,
        interval: SyncInterval,
        per_host: bool,
        per_host_calls: AtomicUsize,
        reported: Mutex<Vec<ErrorKind>>,
    }

    impl PolicyAdapter {
        fn new(hooks: ResyncHooks, interval: SyncInterval, per_host: bool) -> Self {
            Self {
                on_connect: true,
                hooks,
                interval,
                per_host,
                per_host_calls: AtomicUsize::new(0),
                reported: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ServiceAdapter for PolicyAdapter {
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
            panic!("disconnect hook exploded");
        }
        async fn register_state_change_callback(&self, _: StateChangeCallback) -> AdapterResult<()> {
            Ok(())
        }
        fn should_sync_on_connect(&self) -> bool {
            self.on_connect
        }
        fn resync_hooks(&self) -> ResyncHooks {
            self.hooks
        }
        fn sync_interval(&self) -> SyncInterval {
            self.interval.clone()
        }
        async fn should_sync(&self, _: &Host, _: Option<DateTime<Utc>>) -> bool {
            self.per_host_calls.fetch_add(1, Ordering::SeqCst);
            self.per_host
        }
        async fn on_error(&self, error: &CoreError) -> AdapterResult<()> {
            self.reported.lock().unwrap().push(error.kind());
            Ok(())
        }
    }

    const INTERVAL: ResyncHooks = ResyncHooks {
        interval: true,
        per_host: false,
    };
    const PER_HOST: ResyncHooks = ResyncHooks {
        interval: false,
        per_host: true,
    };
    const BOTH: ResyncHooks = ResyncHooks {
        interval: true,
        per_host: true,
    };

    fn host() -> Host {
        Host::new("h", "localhost", 5000)
    }

    async fn decide(adapter: &PolicyAdapter, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let policy = ResyncPolicy::from_adapter(adapter).ok();
        match policy {
            Some(p) => p.should_resync(adapter, &host(), last, now).await,
            None => panic!("policy rejected"),
        }
    }

    #[test]
    fn sync_on_connect_without_hooks_is_rejected() {
        let adapter = PolicyAdapter::new(ResyncHooks::default(), SyncInterval::Infinite, false);
        let err = ResyncPolicy::from_adapter(&adapter).err();
        assert!(matches!(err, Some(CoreError::Configuration { .. })));
    }

    #[test]
    fn no_sync_on_connect_needs_no_hooks() {
        let mut adapter = PolicyAdapter::new(ResyncHooks::default(), SyncInterval::Infinite, false);
        adapter.on_connect = false;
        assert!(ResyncPolicy::from_adapter(&adapter).is_ok());
    }

    #[tokio::test]
    async fn interval_triggers_when_never_synced() {
        let adapter = PolicyAdapter::new(INTERVAL, SyncInterval::Text("1 hour".into()), false);
        assert!(decide(&adapter, None, Utc::now()).await);
    }

    #[tokio::test]
    async fn interval_respects_last_sync() {
        let adapter = PolicyAdapter::new(INTERVAL, SyncInterval::Text("1 hour".into()), false);
        let now = Utc::now();
        assert!(!decide(&adapter, Some(now - chrono::Duration::minutes(10)), now).await);
        assert!(decide(&adapter, Some(now - chrono::Duration::minutes(61)), now).await);
    }

    #[tokio::test]
    async fn infinite_interval_never_triggers() {
        for interval in [
            SyncInterval::Infinite,
            SyncInterval::Text("infinity".into()),
            SyncInterval::Text("not a duration".into()),
        ] {
            let adapter = PolicyAdapter::new(INTERVAL, interval, false);
            assert!(!decide(&adapter, None, Utc::now()).await);
        }
    }

    #[tokio::test]
    async fn per_host_hook_decides_alone() {
        let adapter = PolicyAdapter::new(PER_HOST, SyncInterval::Every(Duration::ZERO), true);
        assert!(decide(&adapter, Some(Utc::now()), Utc::now()).await);

        let adapter = PolicyAdapter::new(PER_HOST, SyncInterval::Every(Duration::ZERO), false);
        assert!(!decide(&adapter, None, Utc::now()).await);
    }

    #[tokio::test]
    async fn both_hooks_are_evaluated() {
        let adapter = PolicyAdapter::new(BOTH, SyncInterval::Every(Duration::from_secs(1)), false);
        assert!(decide(&adapter, None, Utc::now()).await);
        assert_eq!(adapter.per_host_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn text_intervals_parse() {
        assert_eq!(
            resolve_interval(&SyncInterval::Text("1 hour".into())),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(
            resolve_interval(&SyncInterval::Text("250ms".into())),
            Some(Duration::from_millis(250))
        );
        assert_eq!(resolve_interval(&SyncInterval::Text("Never".into())), None);
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    fn dispatcher(adapter: &Arc<PolicyAdapter>) -> EventDispatcher {
        let adapter: Arc<dyn ServiceAdapter> = Arc::clone(adapter) as Arc<dyn ServiceAdapter>;
        let index = Arc::new(MetadataIndex::new());
        let client = AcaadClient::new(&EngineConfig::default().transport()).unwrap();
        let sync = Arc::new(MetadataSync::new(
            client,
            Arc::clone(&index),
            Arc::clone(&adapter),
            CancellationToken::new(),
        ));
        let policy = ResyncPolicy::from_adapter(adapter.as_ref()).unwrap();
        EventDispatcher::new(adapter, index, sync, policy)
    }

    /// Switch whose state entry keeps the default `String` result type.
    fn untyped_switch() -> Component {
        let document: OpenApiDocument = serde_json::from_value(json!({
            "info": {
                "title": "t", "version": "1", "acaad": "1",
                "acaad.metadata": { "name": "n", "os": "linux", "otlpEnabled": false }
            },
            "paths": {
                "/relay/state": { "get": { "acaad": {
                    "component": { "type": "Switch", "name": "relay" },
                    "queryable": true, "onIff": true
                } } }
            }
        }))
        .unwrap();
        let server = Arc::new(ServerMetadata::new(host(), document));
        Component::group(&server, server.metadata()).remove(0)
    }

    fn outcome(raw: &str) -> Outcome {
        Outcome {
            success: true,
            outcome_raw: Some(raw.to_owned()),
        }
    }

    #[tokio::test]
    async fn untyped_switch_resolves_on_and_off() {
        let adapter = Arc::new(PolicyAdapter::new(INTERVAL, SyncInterval::Infinite, false));
        let dispatcher = dispatcher(&adapter);
        let relay = untyped_switch();

        let on = dispatcher.build_update(&relay, outcome("true")).await.unwrap();
        assert_eq!(on.determined_target_state, Some(ParsedValue::Boolean(true)));

        let off = dispatcher.build_update(&relay, outcome("false")).await.unwrap();
        assert_eq!(off.determined_target_state, Some(ParsedValue::Boolean(false)));

        assert!(adapter.reported.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn handler_panic_is_reported_and_dispatch_continues() {
        let adapter = Arc::new(PolicyAdapter::new(INTERVAL, SyncInterval::Infinite, false));
        let dispatcher = dispatcher(&adapter);

        dispatcher.dispatch(AcaadEvent::ServerDisconnected(host())).await;
        dispatcher.dispatch(AcaadEvent::ServerDisconnected(host())).await;

        assert_eq!(
            *adapter.reported.lock().unwrap(),
            vec![ErrorKind::Callout, ErrorKind::Callout]
        );
    }
}
