//! Error types for warden operations

/// Main error type for warden operations
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    #[error("Lock error: {0}")]
    Lock(LockFailure),

    #[error("Stash parse error: {0}")]
    StashParse(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Fast store error: {0}")]
    FastStore(String),

    #[error("Durable store error: {0}")]
    DurableStore(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("User not found: {0}")]
    UserNotFound(String),
}

/// Why a lock operation failed. Every variant is fatal to the
/// transaction that hit it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockFailure {
    #[error("lock is already acquired by this instance")]
    AlreadyAcquired,

    #[error("lock acquisition timed out after {0}ms")]
    AcquireTimeout(u64),

    #[error("lock is not held")]
    NotHeld,

    #[error("lock expired or was taken by another holder")]
    NotOwner,

    #[error("lock validity window exceeded")]
    ValidityExpired,
}

// Implement From conversions for common error types

impl From<LockFailure> for WardenError {
    fn from(err: LockFailure) -> Self {
        Self::Lock(err)
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<mongodb::error::Error> for WardenError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::DurableStore(err.to_string())
    }
}

impl WardenError {
    /// True when the error is any lock failure
    pub fn is_lock_error(&self) -> bool {
        matches!(self, Self::Lock(_))
    }
}

/// Result type alias for warden operations
pub type Result<T> = std::result::Result<T, WardenError>;
