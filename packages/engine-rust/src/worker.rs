//! Pooled mediation work unit.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use metrics::counter;
use relaybus_core::{offer_to_fault_stack, MessageContext, Sequence};
use tracing::{debug, error, Instrument, Span};

use crate::debug::DebugSession;
use crate::pool::Runnable;
use crate::traits::{ComponentKind, StatisticsCollector};

// ---------------------------------------------------------------------------
// StatisticsCloseListener
// ---------------------------------------------------------------------------

/// Closes a statistics flow opened before the work unit was dispatched.
pub struct StatisticsCloseListener {
    collector: Arc<dyn StatisticsCollector>,
    component: String,
    kind: ComponentKind,
    index: Option<u64>,
}

impl StatisticsCloseListener {
    pub fn new(
        collector: Arc<dyn StatisticsCollector>,
        component: impl Into<String>,
        kind: ComponentKind,
        index: Option<u64>,
    ) -> Self {
        Self {
            collector,
            component: component.into(),
            kind,
            index,
        }
    }

    pub fn close(self, ctx: &MessageContext) {
        self.collector.close_flow(ctx, &self.component, self.kind, self.index);
    }
}

// ---------------------------------------------------------------------------
// MediatorWorker
// ---------------------------------------------------------------------------

/// Mediates one message through one sequence on a pool thread.
///
/// Owns the message context for the duration of the run. Errors are offered
/// to the context's fault stack; nothing is reported back to the submitter.
pub struct MediatorWorker {
    sequence: Arc<Sequence>,
    ctx: MessageContext,
    debug: Option<Arc<DebugSession>>,
    close_listener: Option<StatisticsCloseListener>,
    span: Span,
}

impl MediatorWorker {
    #[must_use]
    pub fn new(sequence: Arc<Sequence>, ctx: MessageContext) -> Self {
        Self {
            sequence,
            ctx,
            debug: None,
            close_listener: None,
            span: Span::none(),
        }
    }

    #[must_use]
    pub fn with_debug(mut self, debug: Option<Arc<DebugSession>>) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_close_listener(mut self, listener: Option<StatisticsCloseListener>) -> Self {
        self.close_listener = listener;
        self
    }

    /// Span the worker runs in, for logging attribution.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    #[must_use]
    pub fn context(&self) -> &MessageContext {
        &self.ctx
    }

    /// Take the worker apart again, e.g. after the pool rejected it.
    #[must_use]
    pub fn into_parts(self) -> (Arc<Sequence>, MessageContext, Option<StatisticsCloseListener>) {
        (self.sequence, self.ctx, self.close_listener)
    }
}

#[async_trait]
impl Runnable for MediatorWorker {
    async fn run(self) {
        let Self {
            sequence,
            mut ctx,
            debug,
            close_listener,
            span,
        } = self;

        async move {
            let flow = match &debug {
                Some(session) => Some(session.begin(&ctx).await),
                None => None,
            };

            debug!(message_id = %ctx.message_id(), sequence = sequence.display_name(), "worker mediating message");
            let outcome = AssertUnwindSafe(sequence.mediate(&mut ctx)).catch_unwind().await;
            match outcome {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    counter!("relaybus_worker_faults_total").increment(1);
                    offer_to_fault_stack(&mut ctx, &err).await;
                }
                Err(panic) => {
                    counter!("relaybus_worker_faults_total").increment(1);
                    error!(
                        message_id = %ctx.message_id(),
                        sequence = sequence.display_name(),
                        panic = %panic_message(&*panic),
                        "unexpected error executing task/async inject, message dropped"
                    );
                }
            }

            if let Some(listener) = close_listener {
                listener.close(&ctx);
            }
            if let Some(flow) = flow {
                flow.end(&ctx);
            }
        }
        .instrument(span)
        .await;
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use relaybus_core::{FaultHandler, MediationError, Mediator, MediatorFaultHandler};

    use super::*;

    struct Fail;

    #[async_trait]
    impl Mediator for Fail {
        async fn mediate(&self, _ctx: &mut MessageContext) -> Result<bool, MediationError> {
            Err(MediationError::fault(42, "backend down"))
        }
    }

    struct Panic;

    #[async_trait]
    impl Mediator for Panic {
        async fn mediate(&self, _ctx: &mut MessageContext) -> Result<bool, MediationError> {
            panic!("mediator bug");
        }
    }

    struct Count(Arc<AtomicUsize>);

    #[async_trait]
    impl Mediator for Count {
        async fn mediate(&self, _ctx: &mut MessageContext) -> Result<bool, MediationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    #[derive(Default)]
    struct Closed(AtomicUsize);

    impl StatisticsCollector for Closed {
        fn open_flow(&self, _ctx: &MessageContext, _component: &str, _kind: ComponentKind) -> Option<u64> {
            Some(1)
        }

        fn close_flow(&self, _ctx: &MessageContext, _component: &str, _kind: ComponentKind, index: Option<u64>) {
            assert_eq!(index, Some(7));
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn open_continuation(&self, _ctx: &MessageContext) {}

        fn close_sequence(&self, _ctx: &MessageContext, _sequence: &str) {}
    }

    #[tokio::test]
    async fn error_goes_to_fault_stack() {
        let handled = Arc::new(AtomicUsize::new(0));
        let fault_seq = Arc::new(Sequence::fault(vec![Arc::new(Count(handled.clone()))]));
        let handler: Arc<dyn FaultHandler> = Arc::new(MediatorFaultHandler::new(fault_seq));

        let mut ctx = MessageContext::new();
        ctx.push_fault_handler(handler);
        let worker = MediatorWorker::new(Arc::new(Sequence::named("orders", vec![Arc::new(Fail)])), ctx);

        worker.run().await;
        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn statistics_closed_even_after_panic() {
        let closed = Arc::new(Closed::default());
        let listener = StatisticsCloseListener::new(closed.clone(), "orders-jms", ComponentKind::InboundEndpoint, Some(7));
        let worker = MediatorWorker::new(
            Arc::new(Sequence::named("orders", vec![Arc::new(Panic)])),
            MessageContext::new(),
        )
        .with_close_listener(Some(listener));

        worker.run().await;
        assert_eq!(closed.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn into_parts_returns_context() {
        let worker = MediatorWorker::new(
            Arc::new(Sequence::named("orders", Vec::new())),
            MessageContext::with_id("urn:uuid:fixed"),
        );
        assert_eq!(worker.context().message_id(), "urn:uuid:fixed");
        let (sequence, ctx, listener) = worker.into_parts();
        assert_eq!(sequence.name(), Some("orders"));
        assert_eq!(ctx.message_id(), "urn:uuid:fixed");
        assert!(listener.is_none());
    }

    #[test]
    fn panic_payload_text() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&5_u8), "non-string panic payload");
    }
}
