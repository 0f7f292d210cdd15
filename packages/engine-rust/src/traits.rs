use async_trait::async_trait;
use relaybus_core::{Endpoint, MediationError, MessageContext};

/// Outbound side of the transport layer.
/// Implementations: HTTP/JMS senders (external), recording sender (tests).
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send `ctx` towards `endpoint`, or to the context's `to` address when no
    /// endpoint is given.
    async fn send_on(&self, endpoint: Option<&Endpoint>, ctx: &mut MessageContext) -> Result<(), MediationError>;

    /// Send `ctx` back to the original caller as a response.
    async fn send_back(&self, ctx: &mut MessageContext) -> Result<(), MediationError>;

    /// Fully materialize a streamed payload so it can be re-serialized for a
    /// different transport.
    async fn build_message(&self, ctx: &mut MessageContext) -> Result<(), MediationError>;
}

/// Dispatches requests to REST APIs before main-sequence routing.
#[async_trait]
pub trait RestRequestHandler: Send + Sync {
    /// Returns `true` if an API claimed and mediated the request.
    async fn process(&self, ctx: &mut MessageContext) -> Result<bool, MediationError>;
}

/// Receives flow boundaries while the environment runs in debug mode.
pub trait DebugManager: Send + Sync {
    fn flow_started(&self, ctx: &MessageContext);

    fn flow_terminated(&self, ctx: &MessageContext);
}

/// Kind of component a statistics flow is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Task,
    InboundEndpoint,
}

/// Collector of per-flow runtime statistics.
pub trait StatisticsCollector: Send + Sync {
    /// Open a flow for `component`. Returns the reporting index to close it
    /// with, or `None` if the collector declined the flow.
    fn open_flow(&self, ctx: &MessageContext, component: &str, kind: ComponentKind) -> Option<u64>;

    fn close_flow(&self, ctx: &MessageContext, component: &str, kind: ComponentKind, index: Option<u64>);

    /// A call response is about to resume suspended sequences.
    fn open_continuation(&self, ctx: &MessageContext);

    /// A resumed sequence finished its step, whatever the outcome.
    fn close_sequence(&self, ctx: &MessageContext, sequence: &str);
}
