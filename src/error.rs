use crate::types::OrgId;
use thiserror::Error;

/// Custom error type for index and query operations.
#[derive(Error, Debug)]
pub enum IdxError {
    /// A tag query failed validation: a malformed clause, an empty key, an
    /// uncompilable pattern, or no clause that positively asserts a
    /// non-empty value. Compared by kind; no partial compilation result
    /// accompanies it.
    #[error("invalid tag query")]
    InvalidQuery,

    #[error("lock acquisition failed: {0}")]
    LockError(String),

    /// Series cardinality limit exceeded for the given organization.
    #[error("series cardinality limit exceeded: current={current}, limit={limit}, org={org}")]
    CardinalityLimitExceeded {
        /// Current number of distinct series in the organization.
        current: u64,
        /// Configured hard limit.
        limit: u64,
        /// Organization the limit applies to.
        org: OrgId,
    },
}

// Implement conversion from lock poison errors for convenience
impl<T> From<std::sync::PoisonError<T>> for IdxError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        IdxError::LockError(format!("Mutex/RwLock poisoned: {}", err))
    }
}
