//! The generic `Operation` dispatch skeleton and its `GetOperation`
//! specialization.
//!
//! The skeleton is parameterized by a **decision capability** — on each
//! server-reported error code, decide to continue, succeed, or fail the
//! whole operation — rather than by subclassing. This is the
//! `Operation` + subclass design collapsed into one driver plus a small
//! trait, per the re-architected source pattern: an abstract base class
//! with template-method overrides becomes a driver parameterized by a
//! capability value.

use crate::error::CoordinatorError;
use crate::policy::{Decision, GetOperationPolicy, OperationPolicy};
use crate::request::{GetResult, OperationRequest, ResponseOutcome};
use crate::transport::ReplicaTransport;
use blobcoord_pool::ConnectionPool;
use blobcoord_types::{ClientId, GetFlags, PartitionId, ReplicaId, ServerErrorCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{instrument, trace};

/// What a subclass's `process_response_error` hands back to the
/// skeleton for one server-reported error code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDecision {
    /// Not terminal; try another replica.
    Continue,
    /// Terminal success (used only when a subclass treats an "error"
    /// code as success-adjacent; Get never does, kept for fidelity to
    /// the generic skeleton's contract).
    Succeed,
    /// Terminal failure with the given error.
    Fail(CoordinatorError),
}

/// `GetOperation`'s per-error counters. Monotonically non-decreasing for
/// the operation's lifetime.
#[derive(Debug, Clone)]
pub struct GetOperation {
    flags: GetFlags,
    replica_count: usize,
    not_found_count: usize,
    deleted_count: usize,
    expired_count: usize,
}

impl GetOperation {
    pub fn new(flags: GetFlags, replica_count: usize) -> Self {
        Self {
            flags,
            replica_count,
            not_found_count: 0,
            deleted_count: 0,
            expired_count: 0,
        }
    }

    /// Applies one server-reported error code to the threshold counters.
    /// `Ok(None)` means continue (retry another replica); `Ok(Some(err))`
    /// means the operation is terminally done with `err`.
    #[instrument(skip(self), fields(replica = %replica))]
    fn process_response_error(&mut self, replica: ReplicaId, code: ServerErrorCode) -> ErrorDecision {
        match code {
            ServerErrorCode::NoError => ErrorDecision::Succeed,
            ServerErrorCode::IoError | ServerErrorCode::DataCorrupt => ErrorDecision::Continue,
            ServerErrorCode::BlobNotFound => {
                self.not_found_count += 1;
                trace!(count = self.not_found_count, replica_count = self.replica_count, "not-found threshold");
                if self.not_found_count == self.replica_count {
                    ErrorDecision::Fail(CoordinatorError::BlobDoesNotExist)
                } else {
                    ErrorDecision::Continue
                }
            }
            ServerErrorCode::BlobDeleted => {
                self.deleted_count += 1;
                trace!(count = self.deleted_count, replica_count = self.replica_count, "deleted threshold");
                if self.deleted_count >= self.deleted_threshold() {
                    ErrorDecision::Fail(CoordinatorError::BlobDeleted)
                } else {
                    ErrorDecision::Continue
                }
            }
            ServerErrorCode::BlobExpired => {
                self.expired_count += 1;
                trace!(count = self.expired_count, replica_count = self.replica_count, "expired threshold");
                if self.expired_count >= self.expired_threshold() {
                    ErrorDecision::Fail(CoordinatorError::BlobExpired)
                } else {
                    ErrorDecision::Continue
                }
            }
            ServerErrorCode::Unknown(raw) => {
                tracing::error!(code = raw, %replica, "unexpected server error code");
                ErrorDecision::Fail(CoordinatorError::UnexpectedInternalError(format!(
                    "unknown server error code {raw}"
                )))
            }
        }
    }

    fn deleted_threshold(&self) -> usize {
        self.replica_count.min(1)
    }

    fn expired_threshold(&self) -> usize {
        self.replica_count.min(2)
    }
}

/// Inputs for one `Operation::execute` call against a single blob id.
pub struct OperationParams {
    pub client_id: ClientId,
    pub partition_id: PartitionId,
    pub blob_id: blobcoord_types::BlobId,
    pub flags: GetFlags,
    pub replicas_local: Vec<ReplicaId>,
    pub replicas_remote: Vec<ReplicaId>,
    pub operation_timeout: Duration,
    /// Max concurrent `OperationRequest`s (spec.md §6 `get_parallelism`,
    /// default 2).
    pub parallelism: usize,
    /// Successes needed before the operation is `Succeeded` (spec.md §6
    /// `get_success_target`, default 1).
    pub success_target: usize,
}

impl OperationParams {
    /// Builds params with the spec's Get defaults (`parallelism: 2`,
    /// `success_target: 1`), used by tests and by callers that don't
    /// need to override them.
    pub fn with_defaults(
        client_id: ClientId,
        partition_id: PartitionId,
        blob_id: blobcoord_types::BlobId,
        flags: GetFlags,
        replicas_local: Vec<ReplicaId>,
        replicas_remote: Vec<ReplicaId>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            client_id,
            partition_id,
            blob_id,
            flags,
            replicas_local,
            replicas_remote,
            operation_timeout,
            parallelism: 2,
            success_target: 1,
        }
    }
}

/// Drives a single Get to completion: dispatches up to `parallelism`
/// concurrent `OperationRequest`s, aggregates on one channel, and
/// applies `GetOperation`'s threshold decisions to each response.
pub struct Operation<P> {
    pool: Arc<P>,
}

impl<P> Operation<P>
where
    P: ConnectionPool + 'static,
    P::Connection: ReplicaTransport,
{
    pub fn new(pool: Arc<P>) -> Self {
        Self { pool }
    }

    #[instrument(skip(self), fields(blob_id = %params.blob_id))]
    pub async fn execute(&self, params: OperationParams) -> Result<GetResult, CoordinatorError> {
        let replica_count = params.replicas_local.len() + params.replicas_remote.len();
        let mut policy = GetOperationPolicy::new(params.replicas_local, params.replicas_remote)
            .with_parallelism(params.parallelism)
            .with_success_target(params.success_target);
        let mut decision = GetOperation::new(params.flags, replica_count);

        let deadline = Instant::now() + params.operation_timeout;
        let (tx, mut rx) = mpsc::channel(replica_count.max(1));

        loop {
            while policy.may_dispatch() {
                let replica = policy.next_replica().expect("may_dispatch guarantees a replica exists");
                let remaining = deadline.saturating_duration_since(Instant::now());
                let request = OperationRequest {
                    replica,
                    client_id: params.client_id,
                    partition_id: params.partition_id,
                    blob_id: params.blob_id,
                    flags: params.flags,
                    checkout_timeout: remaining,
                };
                let pool = Arc::clone(&self.pool);
                let tx = tx.clone();
                tokio::spawn(async move { request.dispatch(pool.as_ref(), tx).await });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CoordinatorError::OperationTimedOut);
            }

            let response = match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some(response)) => response,
                // The channel only closes once every sender (one per
                // dispatched attempt) has dropped, which cannot happen
                // while this function still holds the original `tx`.
                Ok(None) => return Err(CoordinatorError::AmbryUnavailable),
                Err(_elapsed) => return Err(CoordinatorError::OperationTimedOut),
            };

            match response.outcome {
                ResponseOutcome::Success(result) => {
                    policy.on_success();
                    let _ = decision.process_response_error(response.replica, ServerErrorCode::NoError);
                    return Ok(result);
                }
                ResponseOutcome::TransportError => {
                    policy.on_failure();
                }
                ResponseOutcome::ServerError(code) => {
                    match decision.process_response_error(response.replica, code) {
                        ErrorDecision::Continue => policy.on_failure(),
                        ErrorDecision::Succeed => {
                            policy.on_success();
                        }
                        ErrorDecision::Fail(err) => return Err(err),
                    }
                }
            }

            if let Decision::Failed = policy.is_complete() {
                return Err(CoordinatorError::AmbryUnavailable);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeConnectionPool, ScriptedResponse};
    use blobcoord_types::{BlobId, DatacenterId};
    use bytes::Bytes;
    use test_case::test_case;

    fn replica(node: u32) -> ReplicaId {
        ReplicaId::new(node, DatacenterId(1))
    }

    fn base_params(replicas: Vec<ReplicaId>) -> OperationParams {
        OperationParams::with_defaults(
            ClientId(1),
            PartitionId(1),
            BlobId::from_partition_and_local(PartitionId(1), 1),
            GetFlags::Blob,
            replicas,
            vec![],
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn s1_happy_path_succeeds_on_first_reply() {
        let pool = Arc::new(FakeConnectionPool::new());
        let r1 = replica(1);
        pool.script(r1, ScriptedResponse::Blob(Bytes::from_static(b"hello")));

        let op = Operation::new(pool);
        let result = op.execute(base_params(vec![r1])).await.unwrap();
        assert_eq!(result, GetResult::Blob(Bytes::from_static(b"hello")));
    }

    #[tokio::test]
    async fn s2_single_tombstone_wins_over_concurrent_not_found() {
        let pool = Arc::new(FakeConnectionPool::new());
        let (r1, r2, r3) = (replica(1), replica(2), replica(3));
        pool.script(r1, ScriptedResponse::ServerError(ServerErrorCode::BlobDeleted));
        pool.script(r2, ScriptedResponse::ServerError(ServerErrorCode::BlobNotFound));
        pool.script(r3, ScriptedResponse::CheckoutFailure);

        let op = Operation::new(pool);
        let err = op.execute(base_params(vec![r1, r2, r3])).await.unwrap_err();
        assert_eq!(err, CoordinatorError::BlobDeleted);
    }

    #[tokio::test]
    async fn s3_unanimous_not_found() {
        let pool = Arc::new(FakeConnectionPool::new());
        let (r1, r2, r3) = (replica(1), replica(2), replica(3));
        for r in [r1, r2, r3] {
            pool.script(r, ScriptedResponse::ServerError(ServerErrorCode::BlobNotFound));
        }

        let op = Operation::new(pool);
        let err = op.execute(base_params(vec![r1, r2, r3])).await.unwrap_err();
        assert_eq!(err, CoordinatorError::BlobDoesNotExist);
    }

    #[tokio::test]
    async fn s4_non_unanimous_not_found_plus_transport_fails_as_unavailable() {
        let pool = Arc::new(FakeConnectionPool::new());
        let (r1, r2, r3) = (replica(1), replica(2), replica(3));
        pool.script(r1, ScriptedResponse::ServerError(ServerErrorCode::BlobNotFound));
        pool.script(r2, ScriptedResponse::TransportFailure);
        pool.script(r3, ScriptedResponse::ServerError(ServerErrorCode::BlobNotFound));

        let op = Operation::new(pool);
        let err = op.execute(base_params(vec![r1, r2, r3])).await.unwrap_err();
        assert_eq!(err, CoordinatorError::AmbryUnavailable);
    }

    #[tokio::test]
    async fn s5_expired_quorum_of_two() {
        let pool = Arc::new(FakeConnectionPool::new());
        let (r1, r2, r3) = (replica(1), replica(2), replica(3));
        pool.script(r1, ScriptedResponse::ServerError(ServerErrorCode::BlobExpired));
        pool.script(r2, ScriptedResponse::ServerError(ServerErrorCode::BlobExpired));
        pool.script(r3, ScriptedResponse::TransportFailure);

        let op = Operation::new(pool);
        let err = op.execute(base_params(vec![r1, r2, r3])).await.unwrap_err();
        assert_eq!(err, CoordinatorError::BlobExpired);
    }

    #[tokio::test]
    async fn s6_deadline_elapses_when_all_replicas_are_silent() {
        let pool = Arc::new(FakeConnectionPool::new());
        let r1 = replica(1);
        pool.script(r1, ScriptedResponse::Delay(Duration::from_millis(200)));

        let mut params = base_params(vec![r1]);
        params.operation_timeout = Duration::from_millis(20);

        let op = Operation::new(pool);
        let err = op.execute(params).await.unwrap_err();
        assert_eq!(err, CoordinatorError::OperationTimedOut);
    }

    #[tokio::test]
    async fn malformed_message_count_is_treated_as_retryable_and_a_healthy_replica_still_wins() {
        let pool = Arc::new(FakeConnectionPool::new());
        let (r1, r2) = (replica(1), replica(2));
        pool.script(r1, ScriptedResponse::MalformedMessageCount(0));
        pool.script(r2, ScriptedResponse::Blob(Bytes::from_static(b"hello")));

        let op = Operation::new(pool);
        let result = op.execute(base_params(vec![r1, r2])).await.unwrap();
        assert_eq!(result, GetResult::Blob(Bytes::from_static(b"hello")));
    }

    #[tokio::test]
    async fn malformed_message_count_with_extra_entries_is_also_retryable() {
        let pool = Arc::new(FakeConnectionPool::new());
        let (r1, r2) = (replica(1), replica(2));
        pool.script(r1, ScriptedResponse::MalformedMessageCount(2));
        pool.script(r2, ScriptedResponse::Blob(Bytes::from_static(b"hello")));

        let op = Operation::new(pool);
        let result = op.execute(base_params(vec![r1, r2])).await.unwrap();
        assert_eq!(result, GetResult::Blob(Bytes::from_static(b"hello")));
    }

    #[test_case(1, 1, true; "single replica not found satisfies unanimity")]
    #[test_case(2, 1, false; "two replica partition with one not-found is not unanimous")]
    fn not_found_threshold_behaves_per_open_question(replica_count: usize, not_found_reports: usize, expect_terminal: bool) {
        let mut op = GetOperation::new(GetFlags::Blob, replica_count);
        let mut terminal = false;
        for _ in 0..not_found_reports {
            if let ErrorDecision::Fail(CoordinatorError::BlobDoesNotExist) =
                op.process_response_error(replica(1), ServerErrorCode::BlobNotFound)
            {
                terminal = true;
            }
        }
        assert_eq!(terminal, expect_terminal);
    }
}
