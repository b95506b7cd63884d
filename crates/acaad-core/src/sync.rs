// ── Metadata sync engine ──
//
// One pass: query every host's discovery document with bounded
// concurrency, swap the resulting components into the index, then
// provision server and component models through the adapter. Hosts fail
// independently; unreachable hosts are expected and do not fail a pass.

use std::sync::Arc;

use acaad_api::{AcaadClient, Host, TraceParent};
use futures_util::future::join_all;
use futures_util::{StreamExt, stream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::adapter::{ServiceAdapter, ServiceFunction, report, report_failure};
use crate::error::{CoreError, ErrorKind};
use crate::model::{Component, ServerMetadata};
use crate::store::MetadataIndex;
use crate::trace;

pub struct MetadataSync {
    client: AcaadClient,
    index: Arc<MetadataIndex>,
    adapter: Arc<dyn ServiceAdapter>,
    cancel: CancellationToken,
}

impl MetadataSync {
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

    /// Run one sync pass over `hosts`, or over every host the adapter
    /// reports when `None`.
    ///
    /// Returns `false` if any failure other than an unreachable host
    /// occurred, or when the engine is shutting down.
    pub async fn sync(&self, hosts: Option<Vec<Host>>) -> bool {
        if self.cancel.is_cancelled() {
            debug!("Sync requested after shutdown, skipping");
            return false;
        }

        let ctx = TraceParent::mint();
        let span = info_span!("metadata_sync", trace_id = %ctx.trace_id());

        let pass = trace::scope(ctx, self.run(hosts)).instrument(span);
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                debug!("Sync pass cancelled");
                false
            }
            ok = pass => ok,
        }
    }

    async fn run(&self, hosts: Option<Vec<Host>>) -> bool {
        let hosts = match hosts {
            Some(hosts) => hosts,
            None => match self.adapter.connected_servers().await {
                Ok(hosts) => hosts,
                Err(e) => {
                    report_failure(self.adapter.as_ref(), ServiceFunction::ConnectedServers, e)
                        .await;
                    return false;
                }
            },
        };

        let limit = self.adapter.allowed_concurrency().max(1);
        info!(hosts = hosts.len(), concurrency = limit, "Syncing metadata");

        // ── Discovery ────────────────────────────────────────────────
        let results: Vec<(Host, Result<ServerMetadata, CoreError>)> = stream::iter(hosts)
            .map(|host| async move {
                let result = self.query(&host).await;
                (host, result)
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut synced = Vec::new();
        let mut failures = Vec::new();
        for (host, result) in results {
            match result {
                Ok(server) => synced.push(self.reload(server)),
                Err(e) => failures.push((host, e)),
            }
        }

        // ── Provisioning ─────────────────────────────────────────────
        let semaphore = Semaphore::new(limit);
        let provisioned = join_all(
            synced
                .iter()
                .map(|(server, components)| self.provision(server, components, &semaphore)),
        )
        .await;
        let mut ok = provisioned.into_iter().all(|p| p);

        // ── Failures ─────────────────────────────────────────────────
        let (unreachable, other): (Vec<_>, Vec<_>) = failures
            .into_iter()
            .partition(|(_, e)| e.kind() == ErrorKind::ServerUnreachable);

        if !unreachable.is_empty() {
            let names: Vec<&str> = unreachable
                .iter()
                .map(|(host, _)| host.friendly_name.as_str())
                .collect();
            warn!(hosts = ?names, "Servers unreachable, skipping");
            for (_, e) in unreachable {
                report(self.adapter.as_ref(), e).await;
            }
        }

        for (host, e) in other {
            warn!(host = %host.friendly_name, error = %e, "Metadata sync failed");
            report(self.adapter.as_ref(), e).await;
            ok = false;
        }

        info!(
            servers = synced.len(),
            components = synced.iter().map(|(_, c)| c.len()).sum::<usize>(),
            ok,
            "Metadata sync finished"
        );
        ok
    }

    async fn query(&self, host: &Host) -> Result<ServerMetadata, CoreError> {
        let ctx = trace::current().map_or_else(TraceParent::mint, |c| c.child());
        debug!(host = %host.friendly_name, "Querying discovery document");

        let document = self.client.fetch_document(host, &ctx).await?;
        Ok(ServerMetadata::new(host.clone(), document))
    }

    /// Build the host's components and swap them into the index.
    fn reload(&self, server: ServerMetadata) -> (Arc<ServerMetadata>, Vec<Arc<Component>>) {
        let server = Arc::new(server);
        let components = Component::group(&server, server.metadata());
        let snapshot = self
            .index
            .populate_host(Arc::clone(&server), components, |c| {
                self.adapter.component_descriptor(c)
            });

        debug!(
            host = %server.friendly_name,
            components = snapshot.components.len(),
            "Index updated"
        );
        (server, snapshot.components.clone())
    }

    /// Create the server model, then each component model in order. A
    /// permit is held only for the duration of each adapter call.
    async fn provision(
        &self,
        server: &Arc<ServerMetadata>,
        components: &[Arc<Component>],
        semaphore: &Semaphore,
    ) -> bool {
        let result = {
            let Ok(_permit) = semaphore.acquire().await else {
                return false;
            };
            self.adapter.create_server_model(server).await
        };
        if let Err(e) = result {
            warn!(host = %server.friendly_name, "Server model creation failed");
            report_failure(self.adapter.as_ref(), ServiceFunction::CreateServerModel, e).await;
            return false;
        }

        let mut ok = true;
        for component in components {
            let result = {
                let Ok(_permit) = semaphore.acquire().await else {
                    return false;
                };
                self.adapter.create_component_model(component).await
            };
            if let Err(e) = result {
                warn!(
                    host = %server.friendly_name,
                    component = %component.name,
                    "Component model creation failed"
                );
                report_failure(self.adapter.as_ref(), ServiceFunction::CreateComponentModel, e)
                    .await;
                ok = false;
            }
        }

        if ok {
            self.index.record_sync(&server.host);
        }
        ok
    }
}
