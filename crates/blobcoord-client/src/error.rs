//! Coordinator error taxonomy.

/// Errors an `Operation::execute` may surface to its caller. Transport
/// faults and protocol-level decode errors are recovered locally by
/// retrying another replica and never appear here directly; they only
/// surface, indirectly, as `AmbryUnavailable` once every replica has been
/// exhausted.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// Quorum-negative result: every replica reported not-found and none
    /// reported success, deleted, or expired.
    #[error("blob does not exist")]
    BlobDoesNotExist,

    /// A tombstone was observed; terminal regardless of concurrent
    /// not-found responses from other replicas.
    #[error("blob was deleted")]
    BlobDeleted,

    /// The blob's TTL has passed, confirmed by the expiry quorum.
    #[error("blob has expired")]
    BlobExpired,

    /// All replicas were exhausted with only transient failures; the
    /// operation could not reach a quorum decision either way.
    #[error("no replica in the partition was reachable")]
    AmbryUnavailable,

    /// The operation's deadline elapsed before a terminal decision.
    #[error("operation timed out")]
    OperationTimedOut,

    /// A protocol violation or an unrecognized server error code.
    #[error("unexpected internal error: {0}")]
    UnexpectedInternalError(String),
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
