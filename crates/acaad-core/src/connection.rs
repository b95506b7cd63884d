// ── Hub connection manager ──
//
// Owns one `HubConnection` per host. Connections are created lazily and
// persist until `stop_all`.

use std::collections::HashMap;
use std::sync::Arc;

use acaad_api::{AcaadEvent, EventFactory, Host, HubConfig, HubConnection, HubState};
use futures_util::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct ConnectionManager {
    hubs: Mutex<HashMap<Host, Arc<HubConnection>>>,
    queue: mpsc::UnboundedSender<AcaadEvent>,
    factory: Arc<dyn EventFactory>,
    config: HubConfig,
    cancel: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        queue: mpsc::UnboundedSender<AcaadEvent>,
        factory: Arc<dyn EventFactory>,
        config: HubConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            hubs: Mutex::new(HashMap::new()),
            queue,
            factory,
            config,
            cancel,
        }
    }

    /// Start a hub for every host that has none yet. Returns the number
    /// of connections created.
    pub async fn start_missing(&self, hosts: Vec<Host>) -> usize {
        if self.cancel.is_cancelled() {
            debug!("Connection manager stopped, not starting hubs");
            return 0;
        }

        let mut hubs = self.hubs.lock().await;
        let mut started = 0;
        for host in hosts {
            if hubs.contains_key(&host) {
                continue;
            }
            let hub = HubConnection::start(
                host.clone(),
                Arc::clone(&self.factory),
                self.queue.clone(),
                self.config.clone(),
                self.cancel.child_token(),
            );
            info!(host = %host.friendly_name, "Hub connection started");
            hubs.insert(host, Arc::new(hub));
            started += 1;
        }
        started
    }

    /// Stop every hub and forget it.
    pub async fn stop_all(&self) {
        self.cancel.cancel();

        let hubs: Vec<Arc<HubConnection>> = {
            let mut hubs = self.hubs.lock().await;
            hubs.drain().map(|(_, hub)| hub).collect()
        };
        if hubs.is_empty() {
            return;
        }

        debug!(count = hubs.len(), "Stopping hub connections");
        join_all(hubs.iter().map(|hub| hub.stop())).await;
    }

    /// Current state of every managed hub.
    pub async fn states(&self) -> Vec<(Host, HubState)> {
        self.hubs
            .lock()
            .await
            .iter()
            .map(|(host, hub)| (host.clone(), hub.state()))
            .collect()
    }
}
