// Error types for the execution engine

use thiserror::Error;

use crate::events::ExecutionErrorKind;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur during engine execution
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transport or protocol failure talking to the reasoning backend
    #[error("backend error: {0}")]
    Backend(String),

    /// Turn loop exceeded the configured iteration bound
    #[error("iteration limit ({0}) exceeded")]
    IterationLimitExceeded(usize),

    /// Conversation has no user turn to act on
    #[error("conversation has no user turn")]
    NoUserTurn,

    /// Consumer stopped advancing the event stream
    #[error("run cancelled by consumer")]
    Cancelled,

    /// Tool registry error (duplicate registration)
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        EngineError::Backend(msg.into())
    }

    /// Map a fatal error to the terminal event kind it produces.
    ///
    /// Returns `None` for `Cancelled`, which terminates the run silently
    /// (the consumer is gone, there is nobody to notify).
    pub fn terminal_kind(&self) -> Option<ExecutionErrorKind> {
        match self {
            EngineError::Backend(_) => Some(ExecutionErrorKind::BackendError),
            EngineError::IterationLimitExceeded(_) => {
                Some(ExecutionErrorKind::IterationLimitExceeded)
            }
            EngineError::NoUserTurn => Some(ExecutionErrorKind::InvalidConversation),
            EngineError::Cancelled => None,
            EngineError::DuplicateTool(_) | EngineError::Internal(_) => {
                Some(ExecutionErrorKind::Internal)
            }
        }
    }
}
