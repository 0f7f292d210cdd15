use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::MessageContext;
use crate::error::MediationError;
use crate::fault::MediatorFaultHandler;
use crate::sequence::Sequence;
use crate::traits::ConfigurationRegistry;

/// A configured entry point exposing sequences as a callable service.
#[derive(Debug, Default)]
pub struct ProxyService {
    pub name: String,
    /// Named out-sequence; takes precedence over the inline one.
    pub target_out_sequence: Option<String>,
    pub inline_out_sequence: Option<Arc<Sequence>>,
    pub target_fault_sequence: Option<String>,
    pub inline_fault_sequence: Option<Arc<Sequence>>,
    pub inline_in_sequence: Option<Arc<Sequence>>,
    /// Transport modules (e.g. security) are engaged on this service, which
    /// forces the payload to be built before send-back.
    pub module_engaged: bool,
}

impl ProxyService {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Resolve the sequence for outgoing (response) mediation: named, then
    /// inline, then none.
    ///
    /// # Errors
    ///
    /// Returns `OutSequenceNotFound` if a named out-sequence is configured but
    /// not registered.
    pub fn out_sequence(
        &self,
        config: &dyn ConfigurationRegistry,
    ) -> Result<Option<Arc<Sequence>>, MediationError> {
        match self.target_out_sequence.as_deref().filter(|name| !name.is_empty()) {
            Some(name) => config
                .sequence(name)
                .map(Some)
                .ok_or_else(|| MediationError::OutSequenceNotFound {
                    name: name.to_string(),
                }),
            None => Ok(self.inline_out_sequence.clone()),
        }
    }

    /// Push this proxy's fault handler: named fault sequence, then inline,
    /// then the configuration's default fault sequence.
    pub fn register_fault_handler(&self, ctx: &mut MessageContext, config: &dyn ConfigurationRegistry) {
        let fault = self
            .target_fault_sequence
            .as_deref()
            .and_then(|name| config.sequence(name))
            .or_else(|| self.inline_fault_sequence.clone())
            .or_else(|| config.fault_sequence());

        match fault {
            Some(sequence) => ctx.push_fault_handler(Arc::new(MediatorFaultHandler::new(sequence))),
            None => debug!(proxy = %self.name, "proxy has no fault sequence to register"),
        }
    }
}

/// Outbound endpoint definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: Option<String>,
    /// Explicit address; when absent the context's `to` address is used.
    pub address: Option<String>,
}

impl Endpoint {
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: Some(address.into()),
        }
    }
}

/// A scheduled task that injects messages asynchronously.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupTask {
    pub name: String,
    /// Deployable unit the task belongs to, used for log attribution.
    pub artifact_container: Option<String>,
    pub statistics_enabled: bool,
}

/// A polling or listening inbound channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEndpoint {
    pub name: String,
    pub artifact_container: Option<String>,
    pub statistics_enabled: bool,
}
