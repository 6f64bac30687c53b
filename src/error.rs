use thiserror::Error;

use crate::BoxError;

/// Error produced while cloning a request.
///
/// Errors raised by the body collaborator are returned exactly as it
/// produced them, so callers can match on the kind of failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No request was provided to clone.
    #[error("request is missing")]
    MissingRequest,

    /// The cancellation token fired while the body was being cloned.
    #[error("request clone cancelled")]
    Cancelled,

    /// The body has already been read and has nothing left to copy.
    #[error("body has already been consumed")]
    AlreadyConsumed,

    /// The body is larger than the configured buffer limit.
    #[error("body exceeds the buffer limit of {limit} bytes")]
    BufferLimitExceeded {
        /// Configured limit, in bytes.
        limit: usize,
    },

    /// Reading the underlying body failed.
    #[error("body: {0}")]
    Body(#[source] BoxError),
}

impl Error {
    /// Returns true if this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
