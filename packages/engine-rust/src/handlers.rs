//! Synchronous message-handler chain and sequence-flow observer list.
//!
//! Both lists are append-only after startup and read on every injected
//! message, so they are stored behind `ArcSwap` and read without locking.

use std::sync::Arc;

use arc_swap::ArcSwap;
use relaybus_core::properties::CONTINUATION_CALL;
use relaybus_core::{MessageContext, SequenceFlowObserver};
use tracing::debug;

/// Pre-mediation hook. Returning `false` vetoes further processing of the
/// message; the environment then reports the injection as not handled.
pub trait MessageHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Invoked for request-direction messages.
    fn handle_request_in_flow(&self, ctx: &mut MessageContext) -> bool;

    /// Invoked for responses and for resumed call continuations.
    fn handle_response_in_flow(&self, ctx: &mut MessageContext) -> bool;
}

/// Ordered list of [`MessageHandler`]s.
pub struct HandlerChain {
    handlers: ArcSwap<Vec<Arc<dyn MessageHandler>>>,
}

impl HandlerChain {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Append a handler. Handlers run in registration order.
    pub fn register(&self, handler: Arc<dyn MessageHandler>) {
        self.handlers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&handler));
            next
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.load().is_empty()
    }

    /// Run every handler in order, stopping at the first veto.
    ///
    /// The response branch is used for responses and for messages carrying the
    /// continuation-call flag; everything else takes the request branch.
    pub fn invoke(&self, ctx: &mut MessageContext) -> bool {
        let handlers = self.handlers.load();
        let response_flow = ctx.is_response() || ctx.property_bool(CONTINUATION_CALL);
        for handler in handlers.iter() {
            let proceed = if response_flow {
                handler.handle_response_in_flow(ctx)
            } else {
                handler.handle_request_in_flow(ctx)
            };
            if !proceed {
                debug!(
                    message_id = %ctx.message_id(),
                    handler = handler.name(),
                    response_flow,
                    "message handler vetoed mediation"
                );
                return false;
            }
        }
        true
    }
}

impl Default for HandlerChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Observers notified as sequences start and complete.
pub struct ObserverChain {
    observers: ArcSwap<Vec<Arc<dyn SequenceFlowObserver>>>,
}

impl ObserverChain {
    #[must_use]
    pub fn new() -> Self {
        Self {
            observers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn register(&self, observer: Arc<dyn SequenceFlowObserver>) {
        self.observers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&observer));
            next
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.load().is_empty()
    }

    pub fn notify_start(&self, ctx: &MessageContext, sequence: &str) {
        for observer in self.observers.load().iter() {
            observer.start(ctx, sequence);
        }
    }

    pub fn notify_complete(&self, ctx: &MessageContext, sequence: &str) {
        for observer in self.observers.load().iter() {
            observer.complete(ctx, sequence);
        }
    }
}

impl Default for ObserverChain {
    fn default() -> Self {
        Self::new()
    }
}
