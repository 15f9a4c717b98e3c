use crate::types::EventStatus;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, RollcallError>;

#[derive(Debug, thiserror::Error)]
pub enum RollcallError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Reference mirror diverged from the full record. Handled internally
    /// via read-repair; public operations never surface this.
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Invalid transition: {from} -> {to}")]
    Transition { from: EventStatus, to: EventStatus },

    /// Retryable infrastructure failure. The scheduler logs these and
    /// retries the affected event on the next tick.
    #[error("Transient store error: {0}")]
    TransientStore(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RollcallError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RollcallError::TransientStore(_))
    }
}
