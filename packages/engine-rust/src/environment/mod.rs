//! The mediation environment: entry points, shared runtime state, and the
//! [`MediationHost`] view handed to every bound message context.
//!
//! Entry points live in `inject.rs`, continuation resume in `resume.rs`, and
//! the outbound send contract in `send.rs`.

mod inject;
mod resume;
mod send;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use relaybus_core::properties::{INBOUND_ENDPOINT_NAME, TASK_NAME};
use relaybus_core::{
    ConfigurationRegistry, InboundEndpoint, MediationError, MediationHost, MessageContext,
    SequenceFlowObserver,
};
use tracing::{debug, field, info, info_span, Span};

pub use send::is_transport_switching;

use crate::activity::{ActivitySnapshot, CallActivity};
use crate::config::EnvironmentConfig;
use crate::debug::DebugSession;
use crate::handlers::{HandlerChain, MessageHandler, ObserverChain};
use crate::pool::WorkerPool;
use crate::traits::{ComponentKind, DebugManager, RestRequestHandler, StatisticsCollector, TransportSender};
use crate::worker::StatisticsCloseListener;

// ---------------------------------------------------------------------------
// MediationEnvironment
// ---------------------------------------------------------------------------

/// Shared runtime for message mediation.
///
/// Always used behind an `Arc`: bound message contexts hold a weak reference
/// back to it, and pooled workers outlive the call that submitted them.
pub struct MediationEnvironment {
    configuration: ArcSwap<Arc<dyn ConfigurationRegistry>>,
    config: EnvironmentConfig,
    general_pool: WorkerPool,
    inbound_pool: WorkerPool,
    handlers: HandlerChain,
    observers: ObserverChain,
    activity: CallActivity,
    rest_handler: Option<Arc<dyn RestRequestHandler>>,
    sender: Option<Arc<dyn TransportSender>>,
    statistics: Option<Arc<dyn StatisticsCollector>>,
    debug: Option<Arc<DebugSession>>,
    initialized: AtomicBool,
}

impl MediationEnvironment {
    #[must_use]
    pub fn builder(configuration: Arc<dyn ConfigurationRegistry>) -> EnvironmentBuilder {
        EnvironmentBuilder::new(configuration)
    }

    /// Configuration active right now.
    #[must_use]
    pub fn configuration(&self) -> Arc<dyn ConfigurationRegistry> {
        Arc::clone(&**self.configuration.load())
    }

    /// Swap in a new configuration. Messages already in flight keep the
    /// registry they started with; continuation frames resolve against the
    /// registry active when they resume.
    pub fn update_configuration(&self, configuration: Arc<dyn ConfigurationRegistry>) {
        self.configuration.store(Arc::new(configuration));
        info!("mediation configuration updated");
    }

    /// Tuning values resolved at construction.
    #[must_use]
    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    #[must_use]
    pub fn general_pool(&self) -> &WorkerPool {
        &self.general_pool
    }

    #[must_use]
    pub fn inbound_pool(&self) -> &WorkerPool {
        &self.inbound_pool
    }

    pub fn register_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.handlers.register(handler);
    }

    #[must_use]
    pub fn handlers(&self) -> &HandlerChain {
        &self.handlers
    }

    pub fn register_sequence_observer(&self, observer: Arc<dyn SequenceFlowObserver>) {
        self.observers.register(observer);
    }

    #[must_use]
    pub fn is_debug_enabled(&self) -> bool {
        self.debug.is_some()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::Release);
    }

    /// A fresh message context already bound to this environment.
    #[must_use]
    pub fn create_message_context(self: &Arc<Self>) -> MessageContext {
        let mut ctx = MessageContext::new();
        self.bind(&mut ctx);
        debug!(message_id = %ctx.message_id(), "created message context");
        ctx
    }

    // -- call activity ------------------------------------------------------

    #[must_use]
    pub fn activity(&self) -> ActivitySnapshot {
        self.activity.snapshot()
    }

    pub fn add_unavailable_artifact(&self, key: impl Into<String>) {
        self.activity.add_unavailable_artifact(key);
    }

    pub fn remove_unavailable_artifact(&self, key: &str) -> bool {
        self.activity.remove_unavailable_artifact(key)
    }

    /// `key` became available again; drops every pending reference to it.
    pub fn clear_unavailability(&self, key: &str) -> usize {
        self.activity.clear_unavailability(key)
    }

    #[must_use]
    pub fn unavailable_artifacts(&self) -> Vec<String> {
        self.activity.unavailable_artifacts()
    }

    // -- helpers shared by the entry points ---------------------------------

    fn bind(self: &Arc<Self>, ctx: &mut MessageContext) {
        let host: Weak<Self> = Arc::downgrade(self);
        ctx.set_environment(host);
    }

    fn invoke_handlers(&self, ctx: &mut MessageContext) -> bool {
        let proceed = self.handlers.invoke(ctx);
        if !proceed {
            metrics::counter!("relaybus_handler_vetoes_total").increment(1);
        }
        proceed
    }

    /// The inbound endpoint the message arrived on, if it names a registered one.
    fn inbound_endpoint(&self, ctx: &MessageContext) -> Option<Arc<InboundEndpoint>> {
        let name = ctx.property_str(INBOUND_ENDPOINT_NAME)?;
        self.configuration().inbound_endpoint(name)
    }

    /// Open a statistics flow for `component` when a collector is installed
    /// and the component has statistics enabled.
    fn open_statistics(
        &self,
        ctx: &MessageContext,
        component: &str,
        kind: ComponentKind,
        enabled: bool,
    ) -> Option<StatisticsCloseListener> {
        let collector = self.statistics.as_ref().filter(|_| enabled)?;
        let index = collector.open_flow(ctx, component, kind);
        Some(StatisticsCloseListener::new(
            Arc::clone(collector),
            component,
            kind,
            index,
        ))
    }

    /// Span attributing a flow's log lines to its pool and originating
    /// artifact.
    fn flow_span(
        pool: &str,
        group: Option<&str>,
        ctx: &MessageContext,
        origin: Option<(&str, Option<&str>)>,
    ) -> Span {
        let span = info_span!(
            "mediation_flow",
            pool,
            group = field::Empty,
            message_id = %ctx.message_id(),
            origin = field::Empty,
            artifact = field::Empty,
        );
        if let Some(group) = group {
            span.record("group", group);
        }
        if let Some((name, container)) = origin {
            span.record("origin", name);
            if let Some(container) = container {
                span.record("artifact", container);
            }
        }
        span
    }

    fn task_name(ctx: &MessageContext) -> Option<String> {
        ctx.property_str(TASK_NAME).map(str::to_owned)
    }
}

impl MediationHost for MediationEnvironment {
    fn configuration(&self) -> Arc<dyn ConfigurationRegistry> {
        MediationEnvironment::configuration(self)
    }

    fn is_continuation_enabled(&self) -> bool {
        self.activity.is_continuation_enabled()
    }

    fn increment_activity(&self) {
        self.activity.increment();
    }

    fn decrement_activity(&self) {
        self.activity.decrement();
    }

    fn notify_sequence_start(&self, ctx: &MessageContext, sequence: &str) {
        self.observers.notify_start(ctx, sequence);
    }

    fn notify_sequence_complete(&self, ctx: &MessageContext, sequence: &str) {
        self.observers.notify_complete(ctx, sequence);
    }

    fn global_timeout(&self) -> Duration {
        self.config.global_timeout
    }
}

impl std::fmt::Debug for MediationEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediationEnvironment")
            .field("config", &self.config)
            .field("handlers", &self.handlers.len())
            .field("activity", &self.activity.snapshot())
            .field("debug", &self.debug.is_some())
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EnvironmentBuilder
// ---------------------------------------------------------------------------

/// Assembles a [`MediationEnvironment`]. Only the configuration registry is
/// required; every other collaborator is optional.
pub struct EnvironmentBuilder {
    configuration: Arc<dyn ConfigurationRegistry>,
    config: Option<EnvironmentConfig>,
    handlers: Vec<Arc<dyn MessageHandler>>,
    observers: Vec<Arc<dyn SequenceFlowObserver>>,
    rest_handler: Option<Arc<dyn RestRequestHandler>>,
    sender: Option<Arc<dyn TransportSender>>,
    statistics: Option<Arc<dyn StatisticsCollector>>,
    debug_manager: Option<Arc<dyn DebugManager>>,
}

impl EnvironmentBuilder {
    fn new(configuration: Arc<dyn ConfigurationRegistry>) -> Self {
        Self {
            configuration,
            config: None,
            handlers: Vec::new(),
            observers: Vec::new(),
            rest_handler: None,
            sender: None,
            statistics: None,
            debug_manager: None,
        }
    }

    /// Use these tuning values instead of reading them from the registry.
    #[must_use]
    pub fn config(mut self, config: EnvironmentConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    #[must_use]
    pub fn sequence_observer(mut self, observer: Arc<dyn SequenceFlowObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    #[must_use]
    pub fn rest_handler(mut self, handler: Arc<dyn RestRequestHandler>) -> Self {
        self.rest_handler = Some(handler);
        self
    }

    #[must_use]
    pub fn sender(mut self, sender: Arc<dyn TransportSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    #[must_use]
    pub fn statistics(mut self, collector: Arc<dyn StatisticsCollector>) -> Self {
        self.statistics = Some(collector);
        self
    }

    /// Run in debug mode: flows are serialized and reported to `manager`.
    #[must_use]
    pub fn debug_manager(mut self, manager: Arc<dyn DebugManager>) -> Self {
        self.debug_manager = Some(manager);
        self
    }

    /// Start both worker pools and assemble the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker pool cannot start its threads.
    pub fn build(self) -> Result<Arc<MediationEnvironment>, MediationError> {
        let config = self
            .config
            .unwrap_or_else(|| EnvironmentConfig::from_registry(self.configuration.as_ref()));

        let general_pool = WorkerPool::new(config.general_pool.clone())
            .map_err(|e| anyhow::anyhow!("failed to start general worker pool: {e}"))?;
        let inbound_pool = WorkerPool::new(config.inbound_pool.clone())
            .map_err(|e| anyhow::anyhow!("failed to start inbound worker pool: {e}"))?;

        let handlers = HandlerChain::new();
        for handler in self.handlers {
            handlers.register(handler);
        }
        let observers = ObserverChain::new();
        for observer in self.observers {
            observers.register(observer);
        }

        info!(
            general_max_threads = config.general_pool.max_threads,
            inbound_max_threads = config.inbound_pool.max_threads,
            handlers = handlers.len(),
            debug = self.debug_manager.is_some(),
            "mediation environment started"
        );

        Ok(Arc::new(MediationEnvironment {
            configuration: ArcSwap::from_pointee(self.configuration),
            config,
            general_pool,
            inbound_pool,
            handlers,
            observers,
            activity: CallActivity::new(),
            rest_handler: self.rest_handler,
            sender: self.sender,
            statistics: self.statistics,
            debug: self.debug_manager.map(|manager| Arc::new(DebugSession::new(manager))),
            initialized: AtomicBool::new(false),
        }))
    }
}
