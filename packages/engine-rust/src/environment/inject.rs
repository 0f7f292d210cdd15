//! Message entry points.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use metrics::counter;
use relaybus_core::properties::{
    CONTINUATION_CALL, PROXY_SERVICE, RECEIVING_SEQUENCE, TRANSPORT_IN_NAME,
};
use relaybus_core::{
    offer_to_fault_stack, ConfigurationRegistry, MediationError, MediatorFaultHandler,
    MessageContext, Sequence, MAIN_SEQUENCE_KEY,
};
use tracing::{debug, error, warn, Instrument};

use super::MediationEnvironment;
use crate::pool::Rejected;
use crate::traits::ComponentKind;
use crate::worker::{panic_message, MediatorWorker};

impl MediationEnvironment {
    /// Mediate a message on the calling task: handler chain, mandatory
    /// sequence, then either continuation resume or normal routing.
    ///
    /// Returns `Ok(false)` when a handler vetoes the message, the mandatory
    /// sequence stops it, or the branch that ran stopped it.
    ///
    /// # Errors
    ///
    /// Returns `SequenceNotFound` when the receiving sequence requested for a
    /// non-proxy message (or the main sequence) is not registered, `ContinuationSequenceNotFound`
    /// when a continuation frame cannot be resolved, and any error a mediator
    /// raises.
    pub async fn inject_sync(self: &Arc<Self>, ctx: &mut MessageContext) -> Result<bool, MediationError> {
        counter!("relaybus_injections_total", "entry" => "sync").increment(1);
        debug!(message_id = %ctx.message_id(), "injecting message context");

        let flow = match &self.debug {
            Some(session) => Some(session.begin(ctx).await),
            None => None,
        };
        let result = self.mediate_injected(ctx).await;
        if let Some(flow) = flow {
            flow.end(ctx);
        }
        result
    }

    async fn mediate_injected(self: &Arc<Self>, ctx: &mut MessageContext) -> Result<bool, MediationError> {
        if let Some(transport) = ctx.transport_in().map(str::to_owned) {
            ctx.set_property(TRANSPORT_IN_NAME, transport);
        }
        self.bind(ctx);

        if !self.invoke_handlers(ctx) {
            return Ok(false);
        }

        let config = self.configuration();
        if let Some(mandatory) = config.mandatory_sequence() {
            debug!(message_id = %ctx.message_id(), "mediating through the mandatory sequence");
            if !mandatory.mediate(ctx).await? {
                debug!(
                    message_id = %ctx.message_id(),
                    response = ctx.is_response(),
                    proxy = ctx.property_str(PROXY_SERVICE).unwrap_or("-"),
                    "message dropped in pre-mediation by the mandatory sequence"
                );
                return Ok(false);
            }
        }

        let receiving = ctx.property_str(RECEIVING_SEQUENCE).map(str::to_owned);
        let continuation_call = ctx.property_bool(CONTINUATION_CALL);
        ctx.remove_property(RECEIVING_SEQUENCE);
        ctx.remove_property(CONTINUATION_CALL);

        if continuation_call && !ctx.continuation_stack().is_empty() {
            debug!(message_id = %ctx.message_id(), "response received for a continuation call");
            return self.resume_from_continuation(ctx).await;
        }

        let proxy = ctx
            .property_str(PROXY_SERVICE)
            .filter(|name| !name.is_empty())
            .map(str::to_owned);
        match proxy {
            Some(proxy) => {
                self.route_proxy_response(ctx, config.as_ref(), &proxy, receiving.as_deref())
                    .await
            }
            None => self.route_request(ctx, config.as_ref(), receiving.as_deref()).await,
        }
    }

    /// Non-proxy routing: receiving sequence, else REST APIs, else main.
    async fn route_request(
        &self,
        ctx: &mut MessageContext,
        config: &dyn ConfigurationRegistry,
        receiving: Option<&str>,
    ) -> Result<bool, MediationError> {
        match config.fault_sequence() {
            Some(fault) => ctx.push_fault_handler(Arc::new(MediatorFaultHandler::new(fault))),
            None => debug!(message_id = %ctx.message_id(), "no default fault sequence configured"),
        }

        if let Some(name) = receiving {
            let Some(sequence) = config.sequence(name) else {
                warn!(message_id = %ctx.message_id(), sequence = name, "cannot find the receiving sequence for the injected message");
                return Err(MediationError::SequenceNotFound { name: name.to_string() });
            };
            debug!(message_id = %ctx.message_id(), sequence = name, "using receiving sequence");
            return sequence.mediate(ctx).await;
        }

        if let Some(rest) = &self.rest_handler {
            if rest.process(ctx).await? {
                return Ok(true);
            }
        }

        let Some(main) = config.main_sequence() else {
            return Err(MediationError::SequenceNotFound {
                name: MAIN_SEQUENCE_KEY.to_string(),
            });
        };
        debug!(message_id = %ctx.message_id(), "using main sequence for injected message");
        main.mediate(ctx).await
    }

    /// Proxy response routing: receiving sequence, else out-sequence, else
    /// send the response back unchanged. Mediation results are not reported;
    /// the response counts as handled once routed. An unknown receiving
    /// sequence drops the response.
    async fn route_proxy_response(
        &self,
        ctx: &mut MessageContext,
        config: &dyn ConfigurationRegistry,
        proxy_name: &str,
        receiving: Option<&str>,
    ) -> Result<bool, MediationError> {
        let Some(proxy) = config.proxy_service(proxy_name) else {
            warn!(message_id = %ctx.message_id(), proxy = proxy_name, "proxy service not found, response ignored");
            return Ok(true);
        };
        proxy.register_fault_handler(ctx, config);
        let out_sequence = proxy.out_sequence(config)?;

        if let Some(name) = receiving {
            let Some(sequence) = config.sequence(name) else {
                warn!(message_id = %ctx.message_id(), proxy = proxy_name, sequence = name, "cannot find the receiving sequence for the injected message, response dropped");
                return Ok(false);
            };
            sequence.mediate(ctx).await?;
        } else if let Some(out) = out_sequence {
            out.mediate(ctx).await?;
        } else {
            debug!(message_id = %ctx.message_id(), proxy = proxy_name, "proxy has no out-sequence, sending the response back");
            match &self.sender {
                Some(sender) => sender.send_back(ctx).await?,
                None => warn!(message_id = %ctx.message_id(), proxy = proxy_name, "no transport sender installed, response not sent back"),
            }
        }
        Ok(true)
    }

    /// Hand `(sequence, ctx)` to the general pool and return at once.
    ///
    /// A scheduled task named by the context's task-name property supplies the
    /// logging attribution and, if enabled, a statistics flow. When the pool
    /// is saturated the message is dropped and logged; the caller is not told.
    pub fn inject_async(self: &Arc<Self>, mut ctx: MessageContext, sequence: Arc<Sequence>) {
        counter!("relaybus_injections_total", "entry" => "async").increment(1);
        debug!(
            message_id = %ctx.message_id(),
            sequence = sequence.display_name(),
            "injecting message context for asynchronous mediation"
        );
        self.bind(&mut ctx);

        let mut listener = None;
        let mut origin = None;
        if let Some(task_name) = Self::task_name(&ctx) {
            if let Some(task) = self.configuration().startup_task(&task_name) {
                listener = self.open_statistics(&ctx, &task_name, ComponentKind::Task, task.statistics_enabled);
                origin = Some((task_name, task.artifact_container.clone()));
            }
        }
        let span = Self::flow_span(
            self.general_pool.name(),
            Some(&self.general_pool.config().thread_group),
            &ctx,
            origin.as_ref().map(|(name, container)| (name.as_str(), container.as_deref())),
        );

        let worker = MediatorWorker::new(sequence, ctx)
            .with_debug(self.debug.clone())
            .with_close_listener(listener)
            .with_span(span);

        if let Err(Rejected(worker)) = self.general_pool.try_execute(worker) {
            let (sequence, ctx, listener) = worker.into_parts();
            counter!("relaybus_async_dropped_total").increment(1);
            error!(
                message_id = %ctx.message_id(),
                sequence = sequence.display_name(),
                pool = self.general_pool.name(),
                "worker pool has reached its maximum capacity, message dropped"
            );
            if let Some(listener) = listener {
                listener.close(&ctx);
            }
        }
    }

    /// Entry point for inbound endpoints.
    ///
    /// With `sequential == false` the message goes to the inbound pool and
    /// `Ok(true)` is returned immediately; if the pool is saturated the
    /// message is mediated on the calling task instead. Inline mediation
    /// offers errors to the fault stack and reports `Ok(true)` once a handler
    /// took it.
    ///
    /// # Errors
    ///
    /// With no fault handler available the mediation error is returned;
    /// unexpected errors are wrapped in `NoFaultHandler`, and a panic in a
    /// mediator yields `Dropped`.
    pub async fn inject_inbound(
        self: &Arc<Self>,
        mut ctx: MessageContext,
        mut sequence: Arc<Sequence>,
        sequential: bool,
    ) -> Result<bool, MediationError> {
        counter!("relaybus_injections_total", "entry" => "inbound").increment(1);
        debug!(
            message_id = %ctx.message_id(),
            sequence = sequence.display_name(),
            sequential,
            "injecting message context for inbound mediation"
        );

        let inbound = self.inbound_endpoint(&ctx);
        self.bind(&mut ctx);
        if !self.invoke_handlers(&mut ctx) {
            return Ok(false);
        }

        let (inbound_name, container, statistics_enabled) = match &inbound {
            Some(endpoint) => (
                Some(endpoint.name.clone()),
                endpoint.artifact_container.clone(),
                endpoint.statistics_enabled,
            ),
            None => (None, None, false),
        };
        let origin = inbound_name
            .as_deref()
            .map(|name| (name, container.as_deref()));
        let open_statistics = |ctx: &MessageContext| {
            inbound_name.as_deref().and_then(|name| {
                self.open_statistics(ctx, name, ComponentKind::InboundEndpoint, statistics_enabled)
            })
        };

        if !sequential {
            let listener = open_statistics(&ctx);
            let span = Self::flow_span(
                self.inbound_pool.name(),
                Some(&self.inbound_pool.config().thread_group),
                &ctx,
                origin,
            );
            let worker = MediatorWorker::new(sequence, ctx)
                .with_debug(self.debug.clone())
                .with_close_listener(listener)
                .with_span(span);
            match self.inbound_pool.try_execute(worker) {
                Ok(()) => return Ok(true),
                Err(Rejected(worker)) => {
                    counter!("relaybus_inbound_inline_fallbacks_total").increment(1);
                    let (rejected_sequence, rejected_ctx, listener) = worker.into_parts();
                    warn!(
                        message_id = %rejected_ctx.message_id(),
                        pool = self.inbound_pool.name(),
                        "inbound worker pool has reached the maximum capacity and will be processing current message sequentially"
                    );
                    if let Some(listener) = listener {
                        listener.close(&rejected_ctx);
                    }
                    sequence = rejected_sequence;
                    ctx = rejected_ctx;
                }
            }
        }

        let listener = open_statistics(&ctx);
        let span = Self::flow_span("inline", None, &ctx, origin);
        let result = async {
            let flow = match &self.debug {
                Some(session) => Some(session.begin(&ctx).await),
                None => None,
            };
            let outcome = AssertUnwindSafe(sequence.mediate(&mut ctx)).catch_unwind().await;
            let result = match outcome {
                Ok(Ok(_)) => Ok(true),
                Ok(Err(err)) => {
                    if err.is_unexpected() {
                        error!(message_id = %ctx.message_id(), error = %err, "unexpected error executing inbound inject");
                    }
                    if offer_to_fault_stack(&mut ctx, &err).await {
                        Ok(true)
                    } else if err.is_unexpected() {
                        Err(MediationError::NoFaultHandler { source: Box::new(err) })
                    } else {
                        Err(err)
                    }
                }
                Err(panic) => {
                    let reason = panic_message(&*panic);
                    error!(
                        message_id = %ctx.message_id(),
                        sequence = sequence.display_name(),
                        panic = %reason,
                        "unexpected error executing inbound inject, message dropped"
                    );
                    Err(MediationError::Dropped { reason })
                }
            };
            if let Some(flow) = flow {
                flow.end(&ctx);
            }
            result
        }
        .instrument(span)
        .await;

        if let Some(listener) = listener {
            listener.close(&ctx);
        }
        result
    }

    /// Mediate `ctx` through `sequence` on the calling task.
    ///
    /// Never returns an error: failures are offered to the fault stack and
    /// reported as `false`, whether or not a handler took them.
    pub async fn inject_message(self: &Arc<Self>, ctx: &mut MessageContext, sequence: &Arc<Sequence>) -> bool {
        counter!("relaybus_injections_total", "entry" => "message").increment(1);
        debug!(
            message_id = %ctx.message_id(),
            sequence = sequence.display_name(),
            "injecting message context into sequence"
        );

        let inbound = self.inbound_endpoint(ctx);
        self.bind(ctx);
        if !self.invoke_handlers(ctx) {
            return false;
        }

        let listener = inbound.as_ref().and_then(|endpoint| {
            self.open_statistics(
                ctx,
                &endpoint.name,
                ComponentKind::InboundEndpoint,
                endpoint.statistics_enabled,
            )
        });

        let outcome = AssertUnwindSafe(sequence.mediate(ctx)).catch_unwind().await;
        let handled = match outcome {
            Ok(Ok(_)) => true,
            Ok(Err(err)) => {
                if err.is_unexpected() {
                    error!(message_id = %ctx.message_id(), sequence = sequence.display_name(), error = %err, "unexpected error injecting message to sequence");
                }
                offer_to_fault_stack(ctx, &err).await;
                false
            }
            Err(panic) => {
                error!(
                    message_id = %ctx.message_id(),
                    sequence = sequence.display_name(),
                    panic = %panic_message(&*panic),
                    "unexpected error injecting message to sequence, message dropped"
                );
                false
            }
        };

        if let Some(listener) = listener {
            listener.close(ctx);
        }
        handled
    }
}
