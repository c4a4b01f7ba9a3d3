//! One attempt against one replica: checkout a connection, write the
//! request, read the response, decode it, and deliver exactly one
//! `OperationResponse` onto the operation's aggregation channel.

use crate::transport::{ReplicaTransport, TransportError};
use blobcoord_pool::ConnectionPool;
use blobcoord_types::{BlobId, ClientId, CorrelationId, GetFlags, MessageInfo, PartitionId, ReplicaId, ServerErrorCode};
use blobcoord_wire::{GetRequest, GetResponse};
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc;

/// The materialized result of a successful Get, split by what the
/// caller's `GetFlags` asked for. `GetBlob`, `GetBlobProperties`, and
/// `GetUserMetadata` each only ever look at the variant they requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResult {
    Blob(Bytes),
    BlobProperties(MessageInfo),
    BlobUserMetadata(Bytes),
    All {
        properties: MessageInfo,
        blob: Bytes,
        user_metadata: Bytes,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Success(GetResult),
    ServerError(ServerErrorCode),
    TransportError,
}

/// One replica's answer, delivered onto the operation's single
/// aggregation channel.
#[derive(Debug, Clone)]
pub struct OperationResponse {
    pub replica: ReplicaId,
    pub correlation_id: CorrelationId,
    pub outcome: ResponseOutcome,
}

/// Parameters for one `OperationRequest` dispatch.
pub struct OperationRequest {
    pub replica: ReplicaId,
    pub client_id: ClientId,
    pub partition_id: PartitionId,
    pub blob_id: BlobId,
    pub flags: GetFlags,
    pub checkout_timeout: Duration,
}

impl OperationRequest {
    /// Runs the full attempt and sends exactly one `OperationResponse`
    /// on `tx`. Never panics on a send failure — if the receiver (the
    /// `Operation` loop) has already moved on after its deadline, the
    /// response is simply dropped, per spec's cancellation policy.
    pub async fn dispatch<P>(self, pool: &P, tx: mpsc::Sender<OperationResponse>)
    where
        P: ConnectionPool,
        P::Connection: ReplicaTransport,
    {
        let correlation_id = CorrelationId::generate();
        let request = GetRequest::single(
            correlation_id,
            self.client_id,
            self.flags,
            self.partition_id,
            self.blob_id,
        );

        let mut connection = match pool.checkout(self.replica, self.checkout_timeout).await {
            Ok(connection) => connection,
            Err(_) => {
                self.deliver(&tx, ResponseOutcome::TransportError, correlation_id).await;
                return;
            }
        };

        let exchange = async {
            connection.send_get_request(&request).await?;
            connection.recv_get_response().await
        };

        match exchange.await {
            Ok(response) => self.handle_response(pool, connection, response, correlation_id, &tx).await,
            Err(_transport_err) => {
                pool.destroy(self.replica, connection);
                self.deliver(&tx, ResponseOutcome::TransportError, correlation_id).await;
            }
        }
    }

    async fn handle_response<P>(
        &self,
        pool: &P,
        connection: P::Connection,
        response: GetResponse,
        correlation_id: CorrelationId,
        tx: &mpsc::Sender<OperationResponse>,
    ) where
        P: ConnectionPool,
    {
        match response.server_error_code {
            ServerErrorCode::NoError => match materialize(&response, self.flags) {
                Ok(result) => {
                    pool.checkin(self.replica, connection);
                    self.deliver(tx, ResponseOutcome::Success(result), correlation_id).await;
                }
                Err(_decode_err) => {
                    // message_info_list.size != 1: Data_Corrupt, retryable.
                    pool.destroy(self.replica, connection);
                    self.deliver(tx, ResponseOutcome::TransportError, correlation_id).await;
                }
            },
            ServerErrorCode::IoError | ServerErrorCode::DataCorrupt => {
                pool.destroy(self.replica, connection);
                self.deliver(tx, ResponseOutcome::TransportError, correlation_id).await;
            }
            other => {
                pool.checkin(self.replica, connection);
                self.deliver(tx, ResponseOutcome::ServerError(other), correlation_id).await;
            }
        }
    }

    async fn deliver(&self, tx: &mpsc::Sender<OperationResponse>, outcome: ResponseOutcome, correlation_id: CorrelationId) {
        let _ = tx
            .send(OperationResponse {
                replica: self.replica,
                correlation_id,
                outcome,
            })
            .await;
    }
}

fn materialize(response: &GetResponse, flags: GetFlags) -> Result<GetResult, blobcoord_wire::WireError> {
    let info = response.single_message()?.clone();
    Ok(match flags {
        GetFlags::Blob => GetResult::Blob(response.payload.clone().unwrap_or_default()),
        GetFlags::BlobProperties => GetResult::BlobProperties(info),
        GetFlags::BlobUserMetadata => GetResult::BlobUserMetadata(response.user_metadata.clone().unwrap_or_default()),
        GetFlags::All => GetResult::All {
            properties: info,
            blob: response.payload.clone().unwrap_or_default(),
            user_metadata: response.user_metadata.clone().unwrap_or_default(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeConnectionPool, ScriptedResponse};
    use blobcoord_types::DatacenterId;

    fn replica() -> ReplicaId {
        ReplicaId::new(1, DatacenterId(1))
    }

    #[tokio::test]
    async fn success_delivers_blob_payload() {
        let pool = FakeConnectionPool::new();
        pool.script(replica(), ScriptedResponse::Blob(Bytes::from_static(b"hello")));

        let (tx, mut rx) = mpsc::channel(4);
        let request = OperationRequest {
            replica: replica(),
            client_id: ClientId(1),
            partition_id: PartitionId(1),
            blob_id: BlobId::from_partition_and_local(PartitionId(1), 1),
            flags: GetFlags::Blob,
            checkout_timeout: Duration::from_secs(1),
        };
        request.dispatch(&pool, tx).await;

        let response = rx.recv().await.unwrap();
        assert_eq!(
            response.outcome,
            ResponseOutcome::Success(GetResult::Blob(Bytes::from_static(b"hello")))
        );
    }

    #[tokio::test]
    async fn transport_failure_reports_transport_error() {
        let pool = FakeConnectionPool::new();
        pool.script(replica(), ScriptedResponse::TransportFailure);

        let (tx, mut rx) = mpsc::channel(4);
        let request = OperationRequest {
            replica: replica(),
            client_id: ClientId(1),
            partition_id: PartitionId(1),
            blob_id: BlobId::from_partition_and_local(PartitionId(1), 1),
            flags: GetFlags::Blob,
            checkout_timeout: Duration::from_secs(1),
        };
        request.dispatch(&pool, tx).await;

        let response = rx.recv().await.unwrap();
        assert_eq!(response.outcome, ResponseOutcome::TransportError);
    }

    #[tokio::test]
    async fn server_error_code_passes_through() {
        let pool = FakeConnectionPool::new();
        pool.script(replica(), ScriptedResponse::ServerError(ServerErrorCode::BlobNotFound));

        let (tx, mut rx) = mpsc::channel(4);
        let request = OperationRequest {
            replica: replica(),
            client_id: ClientId(1),
            partition_id: PartitionId(1),
            blob_id: BlobId::from_partition_and_local(PartitionId(1), 1),
            flags: GetFlags::Blob,
            checkout_timeout: Duration::from_secs(1),
        };
        request.dispatch(&pool, tx).await;

        let response = rx.recv().await.unwrap();
        assert_eq!(
            response.outcome,
            ResponseOutcome::ServerError(ServerErrorCode::BlobNotFound)
        );
    }
}
