use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::continuation::ContinuationState;
use crate::fault::FaultHandler;
use crate::sequence::Sequence;
use crate::traits::{ConfigurationRegistry, MediationHost};

/// An in-flight message: the unit of work of the mediation engine.
///
/// A context is owned by exactly one thread at a time. When a sequence
/// suspends on an outbound call the context is handed over, stacks and all,
/// to whichever thread later delivers the response; it is never shared.
pub struct MessageContext {
    message_id: String,
    properties: HashMap<String, Value>,
    fault_stack: Vec<Arc<dyn FaultHandler>>,
    continuation_stack: Vec<ContinuationState>,
    is_response: bool,
    /// Built payload. The transport layer serializes it according to
    /// `message_type`.
    body: Value,
    message_type: Option<String>,
    content_type: Option<String>,
    transport_headers: BTreeMap<String, String>,
    to: Option<String>,
    transport_in: Option<String>,
    transport_out: Option<String>,
    environment: Option<Weak<dyn MediationHost>>,
}

impl MessageContext {
    /// Create a context with a fresh, process-unique message ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(format!("urn:uuid:{}", uuid::Uuid::new_v4()))
    }

    #[must_use]
    pub fn with_id(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            properties: HashMap::new(),
            fault_stack: Vec::new(),
            continuation_stack: Vec::new(),
            is_response: false,
            body: Value::Null,
            message_type: None,
            content_type: None,
            transport_headers: BTreeMap::new(),
            to: None,
            transport_in: None,
            transport_out: None,
            environment: None,
        }
    }

    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    // -- properties ---------------------------------------------------------

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// String property; `None` when absent or not a string.
    #[must_use]
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Boolean property. Accepts JSON booleans and the strings `"true"`/`"false"`;
    /// anything else reads as `false`.
    #[must_use]
    pub fn property_bool(&self, key: &str) -> bool {
        self.properties.get(key).is_some_and(is_truthy)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.properties.remove(key)
    }

    pub fn property_keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    // -- payload ------------------------------------------------------------

    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn set_body(&mut self, body: Value) {
        self.body = body;
    }

    #[must_use]
    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    pub fn set_message_type(&mut self, message_type: Option<String>) {
        self.message_type = message_type;
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: Option<String>) {
        self.content_type = content_type;
    }

    #[must_use]
    pub fn transport_headers(&self) -> &BTreeMap<String, String> {
        &self.transport_headers
    }

    pub fn set_transport_headers(&mut self, headers: BTreeMap<String, String>) {
        self.transport_headers = headers;
    }

    // -- addressing ---------------------------------------------------------

    #[must_use]
    pub fn is_response(&self) -> bool {
        self.is_response
    }

    pub fn set_response(&mut self, is_response: bool) {
        self.is_response = is_response;
    }

    #[must_use]
    pub fn to(&self) -> Option<&str> {
        self.to.as_deref()
    }

    pub fn set_to(&mut self, to: Option<String>) {
        self.to = to;
    }

    #[must_use]
    pub fn transport_in(&self) -> Option<&str> {
        self.transport_in.as_deref()
    }

    pub fn set_transport_in(&mut self, name: Option<String>) {
        self.transport_in = name;
    }

    #[must_use]
    pub fn transport_out(&self) -> Option<&str> {
        self.transport_out.as_deref()
    }

    pub fn set_transport_out(&mut self, name: Option<String>) {
        self.transport_out = name;
    }

    // -- fault stack --------------------------------------------------------

    pub fn push_fault_handler(&mut self, handler: Arc<dyn FaultHandler>) {
        self.fault_stack.push(handler);
    }

    pub fn pop_fault_handler(&mut self) -> Option<Arc<dyn FaultHandler>> {
        self.fault_stack.pop()
    }

    #[must_use]
    pub fn fault_stack_len(&self) -> usize {
        self.fault_stack.len()
    }

    /// Drop handlers above `len`, restoring an earlier stack depth.
    pub fn truncate_fault_stack(&mut self, len: usize) {
        self.fault_stack.truncate(len);
    }

    // -- continuation stack -------------------------------------------------

    #[must_use]
    pub fn continuation_stack(&self) -> &[ContinuationState] {
        &self.continuation_stack
    }

    pub fn push_continuation_state(&mut self, state: ContinuationState) {
        self.continuation_stack.push(state);
    }

    pub fn pop_continuation_state(&mut self) -> Option<ContinuationState> {
        self.continuation_stack.pop()
    }

    #[must_use]
    pub fn peek_continuation_state(&self) -> Option<&ContinuationState> {
        self.continuation_stack.last()
    }

    pub fn peek_continuation_state_mut(&mut self) -> Option<&mut ContinuationState> {
        self.continuation_stack.last_mut()
    }

    // -- environment --------------------------------------------------------

    pub fn set_environment(&mut self, host: Weak<dyn MediationHost>) {
        self.environment = Some(host);
    }

    /// The owning environment, if bound and still alive.
    #[must_use]
    pub fn environment(&self) -> Option<Arc<dyn MediationHost>> {
        self.environment.as_ref().and_then(Weak::upgrade)
    }

    #[must_use]
    pub fn configuration(&self) -> Option<Arc<dyn ConfigurationRegistry>> {
        self.environment().map(|host| host.configuration())
    }

    /// Look up a sequence in the active configuration.
    #[must_use]
    pub fn sequence(&self, name: &str) -> Option<Arc<Sequence>> {
        self.configuration().and_then(|config| config.sequence(name))
    }

    #[must_use]
    pub fn is_continuation_enabled(&self) -> bool {
        self.environment()
            .is_some_and(|host| host.is_continuation_enabled())
    }
}

impl Default for MessageContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageContext")
            .field("message_id", &self.message_id)
            .field("is_response", &self.is_response)
            .field("properties", &self.properties.len())
            .field("fault_stack", &self.fault_stack.len())
            .field("continuation_stack", &self.continuation_stack)
            .finish_non_exhaustive()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}
