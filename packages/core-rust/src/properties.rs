//! Well-known message context property keys.
//!
//! Transports, schedulers and mediators communicate with the injection engine
//! through these keys. Keys prefixed with an underscore are internal markers
//! recorded by call mediators and consumed by the engine.

/// Name of the sequence that should receive an injected message. Single use:
/// cleared by the engine before any sequence runs.
pub const RECEIVING_SEQUENCE: &str = "RECEIVING_SEQUENCE";

/// Set by the transport on a reply to a non-blocking call. Single use.
pub const CONTINUATION_CALL: &str = "_CONTINUATION_CALL";

/// Proxy service the message belongs to.
pub const PROXY_SERVICE: &str = "proxy.name";

/// Scheduled task that produced the message.
pub const TASK_NAME: &str = "_TASK_NAME";

/// Inbound endpoint that produced the message.
pub const INBOUND_ENDPOINT_NAME: &str = "inbound.endpoint.name";

/// Name of the transport the message arrived on.
pub const TRANSPORT_IN_NAME: &str = "TRANSPORT_IN_NAME";

/// Marks a request that is on its way out to an endpoint.
pub const SENDING_REQUEST: &str = "SENDING_REQUEST";

/// Message arrived on an inbound JMS dual channel.
pub const INBOUND_JMS_PROTOCOL: &str = "INBOUND_JMS_PROTOCOL";

pub const ERROR_CODE: &str = "ERROR_CODE";
pub const ERROR_MESSAGE: &str = "ERROR_MESSAGE";
pub const ERROR_DETAIL: &str = "ERROR_DETAIL";

// Call mediator enrichment markers.

pub const INTERMEDIATE_ORIGINAL_BODY: &str = "_INTERMEDIATE_ORIGINAL_BODY";
pub const TARGET_FOR_INBOUND_PAYLOAD: &str = "_TARGET_FOR_INBOUND_PAYLOAD";
pub const ORIGINAL_MESSAGE_TYPE: &str = "_ORIGINAL_MESSAGE_TYPE";
pub const SOURCE_MESSAGE_TYPE: &str = "_SOURCE_MESSAGE_TYPE";
pub const IS_SOURCE_AVAILABLE: &str = "_IS_SOURCE_AVAILABLE";
pub const IS_TARGET_AVAILABLE: &str = "IS_TARGET_AVAILABLE";
pub const ORIGINAL_TRANSPORT_HEADERS: &str = "_ORIGINAL_TRANSPORT_HEADERS";
pub const ORIGINAL_CONTENT_TYPE: &str = "_ORIGINAL_CONTENT_TYPE";

pub const JSON_TYPE: &str = "application/json";
