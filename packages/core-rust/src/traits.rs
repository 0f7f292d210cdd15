use std::sync::Arc;
use std::time::Duration;

use crate::context::MessageContext;
use crate::sequence::Sequence;
use crate::types::{InboundEndpoint, ProxyService, StartupTask};

/// Read-only view of the deployed mediation configuration.
/// Implementations: in-memory (engine crate), file/registry loaders (external).
pub trait ConfigurationRegistry: Send + Sync {
    /// Raw string property, used for tuning knobs.
    fn property(&self, key: &str) -> Option<String>;

    /// Look up a sequence by name.
    fn sequence(&self, name: &str) -> Option<Arc<Sequence>>;

    /// The sequence used when nothing more specific matches.
    fn main_sequence(&self) -> Option<Arc<Sequence>>;

    /// The default fault sequence.
    fn fault_sequence(&self) -> Option<Arc<Sequence>>;

    /// Sequence run before any routing decision, if configured.
    fn mandatory_sequence(&self) -> Option<Arc<Sequence>>;

    fn proxy_service(&self, name: &str) -> Option<Arc<ProxyService>>;

    fn startup_task(&self, name: &str) -> Option<Arc<StartupTask>>;

    fn inbound_endpoint(&self, name: &str) -> Option<Arc<InboundEndpoint>>;
}

/// The environment as seen from inside mediation.
///
/// A message context holds a weak reference to its host; sequences and
/// mediators use it to look up configuration and to report call activity.
pub trait MediationHost: Send + Sync {
    /// Configuration active right now.
    fn configuration(&self) -> Arc<dyn ConfigurationRegistry>;

    /// Whether sequences should record continuation frames.
    fn is_continuation_enabled(&self) -> bool;

    /// An asynchronous call-and-resume was initiated.
    fn increment_activity(&self);

    /// An asynchronous call-and-resume completed or was removed.
    fn decrement_activity(&self);

    fn notify_sequence_start(&self, ctx: &MessageContext, sequence: &str);

    fn notify_sequence_complete(&self, ctx: &MessageContext, sequence: &str);

    /// Global mediation timeout for call mediators to apply.
    fn global_timeout(&self) -> Duration;
}

/// Observer notified as sequences start and complete.
pub trait SequenceFlowObserver: Send + Sync {
    fn start(&self, ctx: &MessageContext, sequence: &str);

    fn complete(&self, ctx: &MessageContext, sequence: &str);
}
