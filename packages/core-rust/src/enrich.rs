//! Reconciliation of a call mediator's response with the original request.
//!
//! Before a non-blocking call, the call mediator may record where the response
//! payload should go (the *target*) and a copy of the original request body
//! (the *source*). When the response comes back, [`reconcile_call_response`]
//! merges the two so the resumed sequence sees the expected message.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::context::MessageContext;
use crate::error::MediationError;
use crate::properties::{
    INTERMEDIATE_ORIGINAL_BODY, IS_SOURCE_AVAILABLE, IS_TARGET_AVAILABLE, ORIGINAL_CONTENT_TYPE,
    ORIGINAL_MESSAGE_TYPE, ORIGINAL_TRANSPORT_HEADERS, SOURCE_MESSAGE_TYPE,
    TARGET_FOR_INBOUND_PAYLOAD,
};

/// Where an enriched payload is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnrichTarget {
    Body,
    Property { name: String },
}

impl EnrichTarget {
    /// Write `value` into this target on `ctx`.
    pub fn apply(&self, ctx: &mut MessageContext, value: Value) {
        match self {
            Self::Body => ctx.set_body(value),
            Self::Property { name } => ctx.set_property(name.clone(), value),
        }
    }
}

/// Merge a call response with the recorded original request.
///
/// - source and target recorded: the response body goes to the target, the
///   original body is restored as the message body, original transport
///   headers are restored, and when the response's message type differs from
///   the original one the original message type and content type are restored
///   too;
/// - only target recorded: the response body goes to the target;
/// - otherwise nothing is merged.
///
/// Both availability markers are `false` afterwards, whatever happens.
///
/// # Errors
///
/// Returns an error if a recorded marker cannot be decoded.
pub fn reconcile_call_response(ctx: &mut MessageContext) -> Result<(), MediationError> {
    let target_available = ctx.property_bool(IS_TARGET_AVAILABLE);
    let source_available = ctx.property_bool(IS_SOURCE_AVAILABLE);
    ctx.set_property(IS_SOURCE_AVAILABLE, false);
    ctx.set_property(IS_TARGET_AVAILABLE, false);

    if !target_available {
        return Ok(());
    }

    let target = inbound_payload_target(ctx)?;
    let response_body = ctx.body().clone();
    target.apply(ctx, response_body);

    if !source_available {
        return Ok(());
    }

    let source_type = ctx.property_str(SOURCE_MESSAGE_TYPE).map(str::to_owned);
    let original_type = ctx.property_str(ORIGINAL_MESSAGE_TYPE).map(str::to_owned);
    let original_body = ctx
        .property(INTERMEDIATE_ORIGINAL_BODY)
        .cloned()
        .unwrap_or(Value::Null);
    EnrichTarget::Body.apply(ctx, original_body);

    if let Some(headers) = ctx.property(ORIGINAL_TRANSPORT_HEADERS).cloned() {
        let headers: BTreeMap<String, String> = serde_json::from_value(headers)
            .map_err(|e| anyhow::anyhow!("invalid recorded transport headers: {e}"))?;
        ctx.set_transport_headers(headers);
    }

    let same_type = match (&source_type, &original_type) {
        (Some(source), Some(original)) => source.eq_ignore_ascii_case(original),
        (None, None) => true,
        _ => false,
    };
    if !same_type {
        debug!(
            message_id = %ctx.message_id(),
            source_type = ?source_type,
            original_type = ?original_type,
            "restoring original message type after call"
        );
        let original_content_type = ctx.property_str(ORIGINAL_CONTENT_TYPE).map(str::to_owned);
        ctx.set_message_type(original_type);
        ctx.set_content_type(original_content_type);
    }
    Ok(())
}

fn inbound_payload_target(ctx: &MessageContext) -> Result<EnrichTarget, MediationError> {
    match ctx.property(TARGET_FOR_INBOUND_PAYLOAD) {
        None | Some(Value::Null) => Ok(EnrichTarget::Body),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| anyhow::anyhow!("invalid inbound payload target: {e}").into()),
    }
}
