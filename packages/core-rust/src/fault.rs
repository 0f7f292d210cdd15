//! Fault handlers and the fault-stack recovery step shared by entry points.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::context::MessageContext;
use crate::error::MediationError;
use crate::properties::{ERROR_CODE, ERROR_DETAIL, ERROR_MESSAGE};
use crate::sequence::Sequence;

pub const EXECUTING_FAULT_HANDLER: &str = "Executing fault handler due to exception encountered";
pub const NO_FAULT_HANDLER: &str = "Exception encountered but no fault handler found - message dropped";

/// Error recovery routine stored on a message context's fault stack.
#[async_trait]
pub trait FaultHandler: Send + Sync {
    /// Recovery logic proper.
    async fn on_fault(&self, ctx: &mut MessageContext) -> Result<(), MediationError>;

    /// Record the error on the context and run [`FaultHandler::on_fault`]. If
    /// recovery itself fails, the next handler on the stack gets the new error.
    async fn handle_fault(&self, ctx: &mut MessageContext, error: &MediationError) {
        ctx.set_property(ERROR_CODE, error.code());
        ctx.set_property(ERROR_MESSAGE, error.to_string());
        ctx.set_property(ERROR_DETAIL, format!("{error:?}"));

        if let Err(next_error) = self.on_fault(ctx).await {
            match ctx.pop_fault_handler() {
                Some(next) => next.handle_fault(ctx, &next_error).await,
                None => warn!(
                    message_id = %ctx.message_id(),
                    error = %next_error,
                    "fault handler failed and no further fault handler is available"
                ),
            }
        }
    }
}

/// Fault handler that mediates the message through a fault sequence.
pub struct MediatorFaultHandler {
    sequence: Arc<Sequence>,
}

impl MediatorFaultHandler {
    #[must_use]
    pub fn new(sequence: Arc<Sequence>) -> Self {
        Self { sequence }
    }

    #[must_use]
    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.sequence
    }
}

#[async_trait]
impl FaultHandler for MediatorFaultHandler {
    async fn on_fault(&self, ctx: &mut MessageContext) -> Result<(), MediationError> {
        self.sequence.mediate(ctx).await.map(|_| ())
    }
}

/// Offer `error` to the context's fault stack: pop the most recently pushed
/// handler and let it handle the error. Returns `false` if the stack was empty.
pub async fn offer_to_fault_stack(ctx: &mut MessageContext, error: &MediationError) -> bool {
    match ctx.pop_fault_handler() {
        Some(handler) => {
            warn!(message_id = %ctx.message_id(), error = %error, "{EXECUTING_FAULT_HANDLER}");
            handler.handle_fault(ctx, error).await;
            true
        }
        None => {
            warn!(message_id = %ctx.message_id(), error = %error, "{NO_FAULT_HANDLER}");
            false
        }
    }
}
