use relaybus_core::properties::{INBOUND_JMS_PROTOCOL, PROXY_SERVICE, SENDING_REQUEST};
use relaybus_core::{Endpoint, MediationError, MessageContext};
use tracing::debug;

use super::MediationEnvironment;

impl MediationEnvironment {
    /// Send `ctx` out through the installed transport sender.
    ///
    /// Responses go to `endpoint` when one is given, otherwise back to the
    /// caller. Requests always go on, to `endpoint` or the context's `to`
    /// address. The payload is built first whenever the outbound side cannot
    /// stream it through unchanged.
    ///
    /// # Errors
    ///
    /// Returns `Transport` when no sender is installed, and any error the
    /// sender raises.
    pub async fn send(&self, endpoint: Option<&Endpoint>, ctx: &mut MessageContext) -> Result<(), MediationError> {
        let Some(sender) = &self.sender else {
            return Err(MediationError::Transport("no transport sender installed".to_string()));
        };

        if ctx.is_response() {
            if let Some(endpoint) = endpoint {
                if is_transport_switching(ctx, Some(endpoint)) {
                    sender.build_message(ctx).await?;
                }
                return sender.send_on(Some(endpoint), ctx).await;
            }

            let module_engaged = ctx
                .property_str(PROXY_SERVICE)
                .and_then(|name| self.configuration().proxy_service(name))
                .is_some_and(|proxy| proxy.module_engaged);
            if module_engaged
                || is_transport_switching(ctx, None)
                || ctx.property_bool(INBOUND_JMS_PROTOCOL)
            {
                debug!(message_id = %ctx.message_id(), module_engaged, "building response before send-back");
                sender.build_message(ctx).await?;
            }
            return sender.send_back(ctx).await;
        }

        ctx.set_property(SENDING_REQUEST, true);
        if endpoint.is_none() || is_transport_switching(ctx, endpoint) {
            sender.build_message(ctx).await?;
        }
        sender.send_on(endpoint, ctx).await
    }
}

/// Whether the message leaves on a non-HTTP transport.
///
/// With an endpoint: its explicit address, else the context's `to` address.
/// Without one (send-back): the outbound transport name. Unknown means no.
#[must_use]
pub fn is_transport_switching(ctx: &MessageContext, endpoint: Option<&Endpoint>) -> bool {
    let target = match endpoint {
        Some(endpoint) => endpoint.address.as_deref().or_else(|| ctx.to()),
        None => ctx.transport_out(),
    };
    target.is_some_and(|target| !target.starts_with("http"))
}
