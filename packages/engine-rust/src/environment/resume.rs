use std::sync::Arc;

use metrics::counter;
use relaybus_core::{
    reconcile_call_response, ContinuationState, MediationError, MessageContext, Sequence,
    SequenceType,
};
use tracing::{debug, warn};

use super::MediationEnvironment;

impl MediationEnvironment {
    /// Continue suspended sequences with a call response.
    ///
    /// Frames are resumed from the top of the stack down. Each resumed
    /// sequence pops its own frame when it completes; the loop ends when a
    /// sequence stops (or suspends again) or the stack is empty.
    pub(super) async fn resume_from_continuation(
        &self,
        ctx: &mut MessageContext,
    ) -> Result<bool, MediationError> {
        if ctx.continuation_stack().is_empty() {
            warn!(
                message_id = %ctx.message_id(),
                "continuation stack is empty, no continuation state to mediate the response"
            );
            return Ok(false);
        }
        for frame in ctx.continuation_stack() {
            debug!(
                message_id = %ctx.message_id(),
                seq_type = ?frame.seq_type(),
                sequence = frame.seq_name(),
                position = frame.position(),
                "continuation frame"
            );
        }
        counter!("relaybus_resumes_total").increment(1);

        if let Some(statistics) = &self.statistics {
            statistics.open_continuation(ctx);
        }
        if ctx.peek_continuation_state().is_none() {
            return Ok(false);
        }
        reconcile_call_response(ctx)?;

        let mut result = false;
        while let Some(state) = ctx.peek_continuation_state().cloned() {
            let sequence = self.resolve_continuation_sequence(&state)?;
            let outcome = sequence.resume(ctx, &state).await;
            if let Some(statistics) = &self.statistics {
                statistics.close_sequence(ctx, sequence.display_name());
            }
            result = outcome?;
            if !result {
                break;
            }
        }
        Ok(result)
    }

    /// Find the sequence a continuation frame refers to in the active
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns `ContinuationSequenceNotFound` if the configuration no longer
    /// has it; the resume fails rather than falling back to other routing.
    pub fn resolve_continuation_sequence(
        &self,
        state: &ContinuationState,
    ) -> Result<Arc<Sequence>, MediationError> {
        let config = self.configuration();
        let name = state.seq_name();
        let sequence = match state.seq_type() {
            SequenceType::Named => config.sequence(name),
            SequenceType::Main => config.main_sequence(),
            SequenceType::Fault => config.fault_sequence(),
            SequenceType::Mandatory => config.mandatory_sequence(),
            SequenceType::ProxyIn => config
                .proxy_service(name)
                .and_then(|proxy| proxy.inline_in_sequence.clone()),
            SequenceType::ProxyOut => config
                .proxy_service(name)
                .and_then(|proxy| proxy.inline_out_sequence.clone()),
            SequenceType::ProxyFault => config
                .proxy_service(name)
                .and_then(|proxy| proxy.inline_fault_sequence.clone()),
        };
        sequence.ok_or_else(|| MediationError::ContinuationSequenceNotFound {
            seq_type: state.seq_type(),
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use relaybus_core::ProxyService;

    use super::super::tests::tiny_config;
    use super::*;
    use crate::registry::InMemoryConfiguration;

    fn environment(config: InMemoryConfiguration) -> Arc<MediationEnvironment> {
        MediationEnvironment::builder(Arc::new(config))
            .config(tiny_config())
            .build()
            .unwrap()
    }

    #[test]
    fn resolves_each_frame_kind() {
        let config = InMemoryConfiguration::new();
        config.add_sequence(Arc::new(Sequence::main(Vec::new())));
        config.add_sequence(Arc::new(Sequence::named("billing", Vec::new())));
        let mut proxy = ProxyService::new("StockQuote");
        proxy.inline_out_sequence = Some(Arc::new(Sequence::inline(
            SequenceType::ProxyOut,
            "StockQuote",
            Vec::new(),
        )));
        config.add_proxy(proxy);
        let env = environment(config);

        let named = ContinuationState::sequence(SequenceType::Named, "billing");
        assert_eq!(env.resolve_continuation_sequence(&named).unwrap().name(), Some("billing"));

        let main = ContinuationState::sequence(SequenceType::Main, "main");
        assert!(env.resolve_continuation_sequence(&main).is_ok());

        let out = ContinuationState::sequence(SequenceType::ProxyOut, "StockQuote");
        assert_eq!(
            env.resolve_continuation_sequence(&out).unwrap().seq_type(),
            SequenceType::ProxyOut
        );
    }

    #[test]
    fn missing_frame_target_is_an_error() {
        let env = environment(InMemoryConfiguration::new());

        let fault = ContinuationState::sequence(SequenceType::Fault, "fault");
        assert!(matches!(
            env.resolve_continuation_sequence(&fault),
            Err(MediationError::ContinuationSequenceNotFound { seq_type: SequenceType::Fault, .. })
        ));

        let proxy_in = ContinuationState::sequence(SequenceType::ProxyIn, "Unknown");
        let err = env.resolve_continuation_sequence(&proxy_in).unwrap_err();
        assert_eq!(err.code(), 303_000);
    }

    #[tokio::test]
    async fn empty_stack_resumes_nothing() {
        let env = environment(InMemoryConfiguration::new());
        let mut ctx = env.create_message_context();
        assert!(!env.resume_from_continuation(&mut ctx).await.unwrap());
    }
}
