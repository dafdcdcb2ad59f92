//! Service error taxonomy.
//!
//! One enum carries the error categories that cross component boundaries.
//! The HTTP surface maps each category to a status code in a single place;
//! everything below it only decides which category a failure belongs to.

/// Result alias used throughout the runtime.
pub type SvcResult<T> = std::result::Result<T, SvcError>;

/// Error categories preserved across layers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SvcError {
    /// Client-supplied input invalid: missing field, unknown command,
    /// wrong value type.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Device, profile, resource or command not present in the cache.
    #[error("not found: {0}")]
    NotFound(String),

    /// Device is administratively locked.
    #[error("device locked: {0}")]
    Locked(String),

    /// Write attempted against an operating-disabled device.
    #[error("operating state conflict: {0}")]
    Conflict(String),

    /// Retryable driver failure (timeout, bus error).
    #[error("transient driver failure: {0}")]
    DriverTransient(String),

    /// Non-retryable driver failure (e.g. illegal data address).
    #[error("permanent driver failure: {0}")]
    DriverPermanent(String),

    /// Internal invariant violation or cache mutation failure.
    #[error("server error: {0}")]
    ServerError(String),
}

impl SvcError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn locked(msg: impl Into<String>) -> Self {
        Self::Locked(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn server(msg: impl Into<String>) -> Self {
        Self::ServerError(msg.into())
    }

    /// Whether the dispatcher may retry the failed driver call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DriverTransient(_))
    }
}
