// ── Metadata index ──
//
// Concurrent storage of per-host component snapshots. Each host maps to
// one immutable `HostSnapshot`; a resync builds a new snapshot off to the
// side and swaps it in with a single insert, so readers always see the
// component list and both lookup maps from the same pass.

use std::collections::HashMap;
use std::sync::Arc;

use acaad_api::Host;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::warn;

use crate::model::{Component, ComponentDescriptor, ComponentType, ServerMetadata};

/// Everything known about one host after a sync pass.
#[derive(Debug)]
pub struct HostSnapshot {
    pub server: Arc<ServerMetadata>,
    /// Document order.
    pub components: Vec<Arc<Component>>,
    by_descriptor: HashMap<ComponentDescriptor, Arc<Component>>,
    by_type_name: HashMap<(ComponentType, String), Arc<Component>>,
}

impl HostSnapshot {
    fn build(
        server: Arc<ServerMetadata>,
        components: Vec<Component>,
        describe: impl Fn(&Component) -> ComponentDescriptor,
    ) -> Self {
        let components: Vec<Arc<Component>> = components.into_iter().map(Arc::new).collect();

        let mut by_descriptor = HashMap::with_capacity(components.len());
        let mut by_type_name = HashMap::with_capacity(components.len());
        for component in &components {
            let descriptor = describe(component);
            if let Some(previous) = by_descriptor.insert(descriptor.clone(), Arc::clone(component)) {
                warn!(
                    host = %server.friendly_name,
                    descriptor = %descriptor,
                    replaced = %previous.name,
                    component = %component.name,
                    "Adapter returned a duplicate component descriptor"
                );
            }
            by_type_name.insert(
                (component.component_type.clone(), component.name.clone()),
                Arc::clone(component),
            );
        }

        Self {
            server,
            components,
            by_descriptor,
            by_type_name,
        }
    }
}

/// Lock-free index of component metadata across all hosts.
///
/// Reads are wait-free `Arc` clones; writes lock a single `DashMap` shard.
#[derive(Debug, Default)]
pub struct MetadataIndex {
    hosts: DashMap<Host, Arc<HostSnapshot>>,
    last_sync: DashMap<Host, DateTime<Utc>>,
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Forget everything known about `host`. Sync timestamps are kept.
    pub fn clear_host(&self, host: &Host) {
        self.hosts.remove(host);
    }

    /// Replace the host's snapshot with `components`.
    ///
    /// `describe` asks the adapter for each component's descriptor; the
    /// snapshot is complete before it becomes visible.
    pub fn populate_host(
        &self,
        server: Arc<ServerMetadata>,
        components: Vec<Component>,
        describe: impl Fn(&Component) -> ComponentDescriptor,
    ) -> Arc<HostSnapshot> {
        let host = server.host.clone();
        let snapshot = Arc::new(HostSnapshot::build(server, components, describe));
        self.hosts.insert(host, Arc::clone(&snapshot));
        snapshot
    }

    pub fn record_sync(&self, host: &Host) {
        self.last_sync.insert(host.clone(), Utc::now());
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn last_sync(&self, host: &Host) -> Option<DateTime<Utc>> {
        self.last_sync.get(host).map(|r| *r.value())
    }

    pub fn snapshot(&self, host: &Host) -> Option<Arc<HostSnapshot>> {
        self.hosts.get(host).map(|r| Arc::clone(r.value()))
    }

    /// Every host's server metadata with its components in document order.
    pub fn components_by_server(&self) -> Vec<(Arc<ServerMetadata>, Vec<Arc<Component>>)> {
        self.hosts
            .iter()
            .map(|r| (Arc::clone(&r.server), r.components.clone()))
            .collect()
    }

    pub fn lookup_by_type_name(
        &self,
        host: &Host,
        component_type: &ComponentType,
        name: &str,
    ) -> Option<Arc<Component>> {
        let snapshot = self.snapshot(host)?;
        snapshot
            .by_type_name
            .get(&(component_type.clone(), name.to_owned()))
            .cloned()
    }

    pub fn lookup_by_descriptor(
        &self,
        host: &Host,
        descriptor: &ComponentDescriptor,
    ) -> Option<Arc<Component>> {
        self.snapshot(host)?.by_descriptor.get(descriptor).cloned()
    }

    /// Total number of components across all hosts.
    pub fn component_count(&self) -> usize {
        self.hosts.iter().map(|r| r.components.len()).sum()
    }
}
