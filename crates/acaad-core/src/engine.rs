// ── Engine facade ──
//
// Wires the sync engine, index, dispatch loop, outbound executor and hub
// connections together for one adapter. All collaborators are passed in
// by constructor; nothing connects until `start`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use acaad_api::{AcaadClient, AcaadEvent, EventFactory, Host, HubState, JsonEventFactory};
use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{ServiceAdapter, ServiceFunction, StateChangeCallback, report_failure};
use crate::config::EngineConfig;
use crate::connection::ConnectionManager;
use crate::dispatch::{EventDispatcher, ResyncPolicy};
use crate::error::CoreError;
use crate::model::{ChangeType, ComponentDescriptor};
use crate::outbound::OutboundExecutor;
use crate::store::MetadataIndex;
use crate::sync::MetadataSync;

/// Entry point for embedders.
///
/// Cheaply cloneable via `Arc<EngineInner>`. Owns the event queue, the
/// dispatch task and one hub connection per host.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    adapter: Arc<dyn ServiceAdapter>,
    index: Arc<MetadataIndex>,
    sync: Arc<MetadataSync>,
    outbound: OutboundExecutor,
    connections: ConnectionManager,
    policy: ResyncPolicy,
    event_tx: mpsc::UnboundedSender<AcaadEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<AcaadEvent>>>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    sync_cancel: CancellationToken,
    outbound_cancel: CancellationToken,
    dispatch_cancel: CancellationToken,
    callback_registered: AtomicBool,
    shut_down: AtomicBool,
}

impl Engine {
    /// Create an engine decoding push events with [`JsonEventFactory`].
    /// Does NOT connect; call [`start()`](Self::start).
    pub fn new(config: &EngineConfig, adapter: Arc<dyn ServiceAdapter>) -> Result<Self, CoreError> {
        Self::with_event_factory(config, adapter, Arc::new(JsonEventFactory))
    }

    /// Create an engine with a custom push event decoder.
    ///
    /// Fails when the adapter enables sync on connect without declaring a
    /// resync hook, or when the HTTP client cannot be built.
    pub fn with_event_factory(
        config: &EngineConfig,
        adapter: Arc<dyn ServiceAdapter>,
        factory: Arc<dyn EventFactory>,
    ) -> Result<Self, CoreError> {
        let policy = ResyncPolicy::from_adapter(adapter.as_ref())?;
        let client = AcaadClient::new(&config.transport())?;

        let cancel = CancellationToken::new();
        let sync_cancel = cancel.child_token();
        let outbound_cancel = cancel.child_token();
        let dispatch_cancel = cancel.child_token();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let index = Arc::new(MetadataIndex::new());
        let sync = Arc::new(MetadataSync::new(
            client.clone(),
            Arc::clone(&index),
            Arc::clone(&adapter),
            sync_cancel.clone(),
        ));
        let outbound = OutboundExecutor::new(
            client,
            Arc::clone(&index),
            Arc::clone(&adapter),
            outbound_cancel.clone(),
        );
        let connections =
            ConnectionManager::new(event_tx.clone(), factory, config.hub(), cancel.child_token());

        Ok(Self {
            inner: Arc::new(EngineInner {
                adapter,
                index,
                sync,
                outbound,
                connections,
                policy,
                event_tx,
                event_rx: Mutex::new(Some(event_rx)),
                dispatch_task: Mutex::new(None),
                cancel,
                sync_cancel,
                outbound_cancel,
                dispatch_cancel,
                callback_registered: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// Read access to the component index.
    pub fn index(&self) -> &Arc<MetadataIndex> {
        &self.inner.index
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the dispatch loop, open hub connections for every host the
    /// adapter reports and register the outbound callback.
    ///
    /// Calling again only opens hubs for hosts that have none yet, and
    /// retries the callback registration until the adapter accepts it.
    pub async fn start(&self) -> bool {
        if self.is_shut_down() {
            warn!("Engine already shut down, not starting");
            return false;
        }

        if self.spawn_dispatcher().await {
            debug!("Dispatch loop spawned");
        }

        let hosts = match self.inner.adapter.connected_servers().await {
            Ok(hosts) => hosts,
            Err(e) => {
                report_failure(
                    self.inner.adapter.as_ref(),
                    ServiceFunction::ConnectedServers,
                    e,
                )
                .await;
                return false;
            }
        };
        let started = self.inner.connections.start_missing(hosts).await;
        debug!(started, "Hub connections opened");

        if !self.inner.callback_registered.load(Ordering::SeqCst) {
            let callback = outbound_callback(Arc::downgrade(&self.inner));
            if let Err(e) = self
                .inner
                .adapter
                .register_state_change_callback(callback)
                .await
            {
                report_failure(
                    self.inner.adapter.as_ref(),
                    ServiceFunction::RegisterStateChangeCallback,
                    e,
                )
                .await;
                return false;
            }
            self.inner.callback_registered.store(true, Ordering::SeqCst);
            info!("Engine started");
        }
        true
    }

    /// Returns `false` if the dispatcher was already running.
    async fn spawn_dispatcher(&self) -> bool {
        let Some(rx) = self.inner.event_rx.lock().await.take() else {
            return false;
        };

        let dispatcher = EventDispatcher::new(
            Arc::clone(&self.inner.adapter),
            Arc::clone(&self.inner.index),
            Arc::clone(&self.inner.sync),
            self.inner.policy,
        );
        let cancel = self.inner.dispatch_cancel.clone();
        *self.inner.dispatch_task.lock().await = Some(tokio::spawn(dispatcher.run(rx, cancel)));
        true
    }

    /// Stop discovery and outbound calls, then the dispatch loop, then
    /// every hub.
    /// Safe to call repeatedly.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Shutting down engine");

        self.inner.sync_cancel.cancel();
        self.inner.outbound_cancel.cancel();

        self.inner.dispatch_cancel.cancel();
        let handle = self.inner.dispatch_task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Dispatch task ended abnormally");
            }
        }

        self.inner.connections.stop_all().await;

        // Never-started engines still hold the receiver.
        drop(self.inner.event_rx.lock().await.take());
        self.inner.cancel.cancel();

        info!("Engine shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Run one metadata sync pass over `hosts`, or over every host the
    /// adapter reports when `None`.
    pub async fn sync_metadata(&self, hosts: Option<Vec<Host>>) -> bool {
        self.inner.sync.sync(hosts).await
    }

    pub async fn handle_outbound_state_change(
        &self,
        host: &Host,
        descriptor: &ComponentDescriptor,
        change: ChangeType,
        value: Option<Value>,
    ) -> bool {
        self.inner
            .outbound
            .handle(host, descriptor, change, value)
            .await
    }

    /// Offer an event to the dispatch queue. Never blocks; `false` once
    /// the engine has shut down.
    pub fn enqueue(&self, event: AcaadEvent) -> bool {
        if self.is_shut_down() {
            return false;
        }
        self.inner.event_tx.send(event).is_ok()
    }

    /// State of every open hub connection.
    pub async fn hub_states(&self) -> Vec<(Host, HubState)> {
        self.inner.connections.states().await
    }
}

/// The adapter keeps the callback for as long as it likes; a weak handle
/// keeps it from holding the engine alive.
fn outbound_callback(engine: Weak<EngineInner>) -> StateChangeCallback {
    Arc::new(
        move |host: Host, descriptor: ComponentDescriptor, change: ChangeType, value: Option<Value>| {
            let engine = engine.clone();
            async move {
                let Some(inner) = engine.upgrade() else {
                    debug!("State change after engine was dropped");
                    return false;
                };
                if inner.shut_down.load(Ordering::SeqCst) {
                    return false;
                }
                inner.outbound.handle(&host, &descriptor, change, value).await
            }
            .boxed()
        },
    )
}
