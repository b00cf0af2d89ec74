use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Already connected: {0}")]
    AlreadyConnected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Event validation failed [{rule}]: {reason}")]
    ValidationFailed { rule: String, reason: String },

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Storage failed: {0}")]
    StorageFailed(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to {action} {failed} sources")]
    PartialFailure { action: String, failed: usize },
}

impl FeedError {
    pub fn validation(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        FeedError::ValidationFailed {
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    /// True for errors scoped to a single event (rejected or failed to process)
    pub fn is_event_scoped(&self) -> bool {
        matches!(
            self,
            FeedError::ValidationFailed { .. }
                | FeedError::ProcessingFailed(_)
                | FeedError::StorageFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
