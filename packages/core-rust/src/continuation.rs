use serde::{Deserialize, Serialize};

/// Which kind of sequence a continuation frame points at.
///
/// Together with the frame's name this is enough to look the sequence up
/// again in whatever configuration is active when the response arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SequenceType {
    /// A top-level sequence registered under its own name.
    Named,
    /// The configuration's main sequence.
    Main,
    /// The configuration's fault sequence.
    Fault,
    /// The configuration's mandatory (pre-mediation) sequence.
    Mandatory,
    /// Inline in-sequence of the proxy named by the frame.
    ProxyIn,
    /// Inline out-sequence of the proxy named by the frame.
    ProxyOut,
    /// Inline fault sequence of the proxy named by the frame.
    ProxyFault,
}

/// Checkpoint inside a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqContinuationState {
    pub seq_type: SequenceType,
    /// Sequence name, or the owning proxy's name for inline proxy sequences.
    pub seq_name: String,
    /// Index of the mediator that was running when the frame was last
    /// updated. Resumption restarts at `position + 1`.
    pub position: usize,
}

/// A resumable mediation checkpoint stored on a message context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContinuationState {
    Sequence(SeqContinuationState),
}

impl ContinuationState {
    /// Frame for the start of a sequence.
    pub fn sequence(seq_type: SequenceType, seq_name: impl Into<String>) -> Self {
        Self::Sequence(SeqContinuationState {
            seq_type,
            seq_name: seq_name.into(),
            position: 0,
        })
    }

    #[must_use]
    pub fn seq_type(&self) -> SequenceType {
        match self {
            Self::Sequence(state) => state.seq_type,
        }
    }

    #[must_use]
    pub fn seq_name(&self) -> &str {
        match self {
            Self::Sequence(state) => &state.seq_name,
        }
    }

    #[must_use]
    pub fn position(&self) -> usize {
        match self {
            Self::Sequence(state) => state.position,
        }
    }

    /// Record the mediator currently executing.
    pub fn set_position(&mut self, position: usize) {
        match self {
            Self::Sequence(state) => state.position = position,
        }
    }
}
