//! In-memory configuration registry.
//!
//! Holds every deployable artifact the engine looks up at runtime. Reads are
//! lock-free per key (`DashMap`); the mandatory sequence slot is a single
//! `RwLock`. Suitable for embedding and tests; file-based loaders implement
//! [`ConfigurationRegistry`] themselves.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use relaybus_core::{
    ConfigurationRegistry, InboundEndpoint, ProxyService, Sequence, StartupTask, FAULT_SEQUENCE_KEY,
    MAIN_SEQUENCE_KEY,
};
use tracing::warn;

#[derive(Default)]
pub struct InMemoryConfiguration {
    properties: DashMap<String, String>,
    sequences: DashMap<String, Arc<Sequence>>,
    mandatory: RwLock<Option<Arc<Sequence>>>,
    proxies: DashMap<String, Arc<ProxyService>>,
    tasks: DashMap<String, Arc<StartupTask>>,
    inbound_endpoints: DashMap<String, Arc<InboundEndpoint>>,
}

impl InMemoryConfiguration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`InMemoryConfiguration::set_property`].
    #[must_use]
    pub fn with_property(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_property(key, value);
        self
    }

    pub fn set_property(&self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Register a named sequence, replacing any previous one with the same
    /// name. Anonymous sequences cannot be registered; returns `false` for them.
    pub fn add_sequence(&self, sequence: Arc<Sequence>) -> bool {
        let Some(name) = sequence.name().map(str::to_owned) else {
            warn!("ignoring registration of an anonymous sequence");
            return false;
        };
        self.sequences.insert(name, sequence);
        true
    }

    pub fn remove_sequence(&self, name: &str) -> Option<Arc<Sequence>> {
        self.sequences.remove(name).map(|(_, sequence)| sequence)
    }

    pub fn set_mandatory_sequence(&self, sequence: Option<Arc<Sequence>>) {
        *self.mandatory.write() = sequence;
    }

    pub fn add_proxy(&self, proxy: ProxyService) -> Arc<ProxyService> {
        let proxy = Arc::new(proxy);
        self.proxies.insert(proxy.name.clone(), Arc::clone(&proxy));
        proxy
    }

    pub fn add_startup_task(&self, task: StartupTask) {
        self.tasks.insert(task.name.clone(), Arc::new(task));
    }

    pub fn add_inbound_endpoint(&self, endpoint: InboundEndpoint) {
        self.inbound_endpoints.insert(endpoint.name.clone(), Arc::new(endpoint));
    }
}

impl ConfigurationRegistry for InMemoryConfiguration {
    fn property(&self, key: &str) -> Option<String> {
        self.properties.get(key).map(|value| value.clone())
    }

    fn sequence(&self, name: &str) -> Option<Arc<Sequence>> {
        self.sequences.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn main_sequence(&self) -> Option<Arc<Sequence>> {
        self.sequence(MAIN_SEQUENCE_KEY)
    }

    fn fault_sequence(&self) -> Option<Arc<Sequence>> {
        self.sequence(FAULT_SEQUENCE_KEY)
    }

    fn mandatory_sequence(&self) -> Option<Arc<Sequence>> {
        self.mandatory.read().clone()
    }

    fn proxy_service(&self, name: &str) -> Option<Arc<ProxyService>> {
        self.proxies.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn startup_task(&self, name: &str) -> Option<Arc<StartupTask>> {
        self.tasks.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn inbound_endpoint(&self, name: &str) -> Option<Arc<InboundEndpoint>> {
        self.inbound_endpoints
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
    }
}

impl std::fmt::Debug for InMemoryConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryConfiguration")
            .field("properties", &self.properties.len())
            .field("sequences", &self.sequences.len())
            .field("proxies", &self.proxies.len())
            .field("tasks", &self.tasks.len())
            .field("inbound_endpoints", &self.inbound_endpoints.len())
            .finish_non_exhaustive()
    }
}
