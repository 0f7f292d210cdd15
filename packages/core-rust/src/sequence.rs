use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::context::MessageContext;
use crate::continuation::{ContinuationState, SequenceType};
use crate::error::MediationError;
use crate::fault::MediatorFaultHandler;
use crate::traits::MediationHost;

/// Registry key of the main sequence.
pub const MAIN_SEQUENCE_KEY: &str = "main";
/// Registry key of the default fault sequence.
pub const FAULT_SEQUENCE_KEY: &str = "fault";

/// A single processing step.
///
/// `Ok(true)` means continue with the next step, `Ok(false)` means stop: the
/// message was dropped, or a non-blocking call suspended the flow and a
/// continuation frame now records where to pick it up again.
#[async_trait]
pub trait Mediator: Send + Sync {
    async fn mediate(&self, ctx: &mut MessageContext) -> Result<bool, MediationError>;
}

/// An ordered pipeline of mediators.
///
/// When continuation is enabled on the environment, a running sequence keeps a
/// frame on the context's continuation stack whose position tracks the mediator
/// being executed. The frame is popped when the sequence runs to completion
/// and left in place when a mediator stops the flow.
pub struct Sequence {
    name: Option<String>,
    seq_type: SequenceType,
    /// Name written into continuation frames; the owning proxy's name for
    /// inline proxy sequences.
    continuation_key: String,
    mediators: Vec<Arc<dyn Mediator>>,
    error_handler: Option<String>,
}

impl Sequence {
    /// A top-level sequence registered under `name`.
    pub fn named(name: impl Into<String>, mediators: Vec<Arc<dyn Mediator>>) -> Self {
        let name = name.into();
        Self {
            continuation_key: name.clone(),
            name: Some(name),
            seq_type: SequenceType::Named,
            mediators,
            error_handler: None,
        }
    }

    #[must_use]
    pub fn main(mediators: Vec<Arc<dyn Mediator>>) -> Self {
        Self {
            seq_type: SequenceType::Main,
            ..Self::named(MAIN_SEQUENCE_KEY, mediators)
        }
    }

    #[must_use]
    pub fn fault(mediators: Vec<Arc<dyn Mediator>>) -> Self {
        Self {
            seq_type: SequenceType::Fault,
            ..Self::named(FAULT_SEQUENCE_KEY, mediators)
        }
    }

    pub fn mandatory(name: impl Into<String>, mediators: Vec<Arc<dyn Mediator>>) -> Self {
        Self {
            seq_type: SequenceType::Mandatory,
            ..Self::named(name, mediators)
        }
    }

    /// An anonymous sequence defined inline by the proxy `owner`.
    pub fn inline(
        seq_type: SequenceType,
        owner: impl Into<String>,
        mediators: Vec<Arc<dyn Mediator>>,
    ) -> Self {
        Self {
            name: None,
            seq_type,
            continuation_key: owner.into(),
            mediators,
            error_handler: None,
        }
    }

    /// Name of a sequence to run as fault handler while this one executes.
    #[must_use]
    pub fn with_error_handler(mut self, sequence: impl Into<String>) -> Self {
        self.error_handler = Some(sequence.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name for logs: the sequence name or `"anonymous"`.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }

    #[must_use]
    pub fn seq_type(&self) -> SequenceType {
        self.seq_type
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mediators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mediators.is_empty()
    }

    /// A fresh continuation frame pointing at the start of this sequence.
    #[must_use]
    pub fn continuation_frame(&self) -> ContinuationState {
        ContinuationState::sequence(self.seq_type, self.continuation_key.clone())
    }

    /// Run the sequence from its first mediator.
    ///
    /// # Errors
    ///
    /// Propagates the first error raised by a mediator. The sequence's own
    /// error handler, if any, is left on the fault stack for the caller.
    pub async fn mediate(&self, ctx: &mut MessageContext) -> Result<bool, MediationError> {
        let host = ctx.environment();
        if let Some(host) = &host {
            host.notify_sequence_start(ctx, self.display_name());
        }

        let track = host
            .as_ref()
            .is_some_and(|host| host.is_continuation_enabled());
        if track {
            ctx.push_continuation_state(self.continuation_frame());
        }

        let depth = self.push_error_handler(ctx);
        let result = self.run(ctx, 0, track).await;
        self.finish(ctx, host.as_deref(), depth, &result);
        result
    }

    /// Resume after the mediator recorded in `state` suspended.
    ///
    /// `state` must be the frame on top of the context's continuation stack.
    /// It is popped if the sequence runs to completion.
    ///
    /// # Errors
    ///
    /// Propagates the first error raised by a mediator.
    pub async fn resume(
        &self,
        ctx: &mut MessageContext,
        state: &ContinuationState,
    ) -> Result<bool, MediationError> {
        debug!(
            message_id = %ctx.message_id(),
            sequence = self.display_name(),
            position = state.position(),
            "resuming sequence from continuation frame"
        );
        let host = ctx.environment();
        let depth = self.push_error_handler(ctx);
        let result = self.run(ctx, state.position() + 1, true).await;
        self.finish(ctx, host.as_deref(), depth, &result);
        result
    }

    async fn run(
        &self,
        ctx: &mut MessageContext,
        start: usize,
        track: bool,
    ) -> Result<bool, MediationError> {
        for (index, mediator) in self.mediators.iter().enumerate().skip(start) {
            if track {
                if let Some(frame) = ctx.peek_continuation_state_mut() {
                    frame.set_position(index);
                }
            }
            if !mediator.mediate(ctx).await? {
                return Ok(false);
            }
        }
        if track {
            ctx.pop_continuation_state();
        }
        Ok(true)
    }

    /// Push the error-handler sequence as a fault handler. Returns the fault
    /// stack depth before the push.
    fn push_error_handler(&self, ctx: &mut MessageContext) -> usize {
        let depth = ctx.fault_stack_len();
        if let Some(name) = &self.error_handler {
            match ctx.sequence(name) {
                Some(handler) => ctx.push_fault_handler(Arc::new(MediatorFaultHandler::new(handler))),
                None => warn!(
                    message_id = %ctx.message_id(),
                    sequence = self.display_name(),
                    error_handler = %name,
                    "error handler sequence not found"
                ),
            }
        }
        depth
    }

    fn finish(
        &self,
        ctx: &mut MessageContext,
        host: Option<&dyn MediationHost>,
        depth: usize,
        result: &Result<bool, MediationError>,
    ) {
        // On error the handler stays so the entry point can pop it.
        if let Ok(completed) = result {
            ctx.truncate_fault_stack(depth);
            if *completed {
                if let Some(host) = host {
                    host.notify_sequence_complete(ctx, self.display_name());
                }
            }
        }
    }
}

#[async_trait]
impl Mediator for Sequence {
    async fn mediate(&self, ctx: &mut MessageContext) -> Result<bool, MediationError> {
        Sequence::mediate(self, ctx).await
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("name", &self.name)
            .field("seq_type", &self.seq_type)
            .field("mediators", &self.mediators.len())
            .field("error_handler", &self.error_handler)
            .finish()
    }
}
