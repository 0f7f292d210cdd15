use crate::continuation::SequenceType;

/// Errors raised while routing or mediating a message.
///
/// A sequence returning `Ok(false)` ("stop") is a normal drop and never shows
/// up here; only routing failures, mediator faults, and resource problems do.
#[derive(Debug, thiserror::Error)]
pub enum MediationError {
    #[error("cannot find a sequence with name: {name}")]
    SequenceNotFound { name: String },
    #[error("unable to find the out-sequence specified by the name {name}")]
    OutSequenceNotFound { name: String },
    #[error("continuation sequence {seq_type:?} '{name}' is not available in the active configuration")]
    ContinuationSequenceNotFound { seq_type: SequenceType, name: String },
    #[error("mediation fault {code}: {message}")]
    Fault { code: i32, message: String },
    #[error("no fault handler found for the error: {source}")]
    NoFaultHandler {
        #[source]
        source: Box<MediationError>,
    },
    #[error("unexpected error executing inbound inject, message dropped: {reason}")]
    Dropped { reason: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl MediationError {
    /// Shorthand for a mediator-raised fault.
    pub fn fault(code: i32, message: impl Into<String>) -> Self {
        Self::Fault {
            code,
            message: message.into(),
        }
    }

    /// Numeric code exposed to fault sequences via the `ERROR_CODE` property.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Fault { code, .. } => *code,
            Self::SequenceNotFound { .. }
            | Self::OutSequenceNotFound { .. }
            | Self::ContinuationSequenceNotFound { .. } => 303_000,
            Self::Transport(_) => 101_500,
            Self::NoFaultHandler { source } => source.code(),
            Self::Dropped { .. } | Self::Internal(_) => 0,
        }
    }

    /// Whether this error came from outside the mediation model (an
    /// unexpected failure rather than a routing or mediator fault).
    #[must_use]
    pub fn is_unexpected(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_code_is_preserved() {
        let err = MediationError::fault(401_000, "backend rejected");
        assert_eq!(err.code(), 401_000);
        assert_eq!(err.to_string(), "mediation fault 401000: backend rejected");
    }

    #[test]
    fn no_fault_handler_reports_inner_code() {
        let inner = MediationError::fault(7, "boom");
        let err = MediationError::NoFaultHandler {
            source: Box::new(inner),
        };
        assert_eq!(err.code(), 7);
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn internal_errors_are_unexpected() {
        let err: MediationError = anyhow::anyhow!("socket closed").into();
        assert!(err.is_unexpected());
        assert!(!MediationError::fault(1, "x").is_unexpected());
    }
}
