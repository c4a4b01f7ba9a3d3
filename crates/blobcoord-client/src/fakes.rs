//! In-crate test doubles: a scripted `ConnectionPool` that never opens a
//! real socket. Mirrors the teacher's convention of exercising protocol
//! logic against fakes rather than a real listener.

use crate::transport::{ReplicaTransport, TransportError};
use blobcoord_pool::{ConnectionPool, PoolError, PoolResult};
use blobcoord_types::{MessageInfo, ReplicaId, ServerErrorCode};
use blobcoord_wire::{GetRequest, GetResponse};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted outcome for a single `OperationRequest` attempt against a
/// given replica.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Blob(Bytes),
    BlobProperties(MessageInfo),
    ServerError(ServerErrorCode),
    /// Connection checks out, but the exchange itself fails (a dropped
    /// socket, a read error).
    TransportFailure,
    /// `checkout` itself fails — the replica is unreachable.
    CheckoutFailure,
    /// The response decodes but violates the single-message invariant.
    MalformedMessageCount(usize),
    /// The replica never answers within the scripted duration; used to
    /// deterministically exercise the operation deadline rather than
    /// relying on a real socket going silent.
    Delay(Duration),
}

/// A `ConnectionPool` whose replicas answer exactly as scripted, in
/// order, one script entry consumed per dispatch.
#[derive(Default)]
pub struct FakeConnectionPool {
    scripts: Mutex<HashMap<ReplicaId, VecDeque<ScriptedResponse>>>,
}

impl FakeConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one scripted response for the next dispatch against
    /// `replica`. Multiple calls queue multiple responses in order.
    pub fn script(&self, replica: ReplicaId, response: ScriptedResponse) {
        self.scripts
            .lock()
            .expect("fake pool mutex poisoned")
            .entry(replica)
            .or_default()
            .push_back(response);
    }
}

pub struct FakeConnection {
    response: ScriptedResponse,
}

impl ConnectionPool for FakeConnectionPool {
    type Connection = FakeConnection;

    async fn checkout(&self, replica: ReplicaId, timeout: Duration) -> PoolResult<FakeConnection> {
        let scripted = self
            .scripts
            .lock()
            .expect("fake pool mutex poisoned")
            .get_mut(&replica)
            .and_then(VecDeque::pop_front);

        match scripted {
            Some(ScriptedResponse::CheckoutFailure) => Err(PoolError::Timeout(timeout)),
            Some(response) => Ok(FakeConnection { response }),
            None => Err(PoolError::UnknownReplica(replica)),
        }
    }

    fn checkin(&self, _replica: ReplicaId, _connection: FakeConnection) {}

    fn destroy(&self, _replica: ReplicaId, _connection: FakeConnection) {}
}

impl ReplicaTransport for FakeConnection {
    async fn send_get_request(&mut self, _request: &GetRequest) -> Result<(), TransportError> {
        Ok(())
    }

    async fn recv_get_response(&mut self) -> Result<GetResponse, TransportError> {
        match &self.response {
            ScriptedResponse::TransportFailure => {
                Err(TransportError::Io(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "fake reset")))
            }
            ScriptedResponse::CheckoutFailure => unreachable!("checkout already failed for this script entry"),
            ScriptedResponse::Blob(bytes) => Ok(GetResponse {
                correlation_id: blobcoord_types::CorrelationId(0),
                server_error_code: ServerErrorCode::NoError,
                message_info_list: vec![MessageInfo {
                    blob_id: blobcoord_types::BlobId::from_partition_and_local(blobcoord_types::PartitionId(0), 0),
                    size: bytes.len() as u64,
                    expiration_time_ms: None,
                }],
                payload: Some(bytes.clone()),
                user_metadata: None,
            }),
            ScriptedResponse::BlobProperties(info) => Ok(GetResponse {
                correlation_id: blobcoord_types::CorrelationId(0),
                server_error_code: ServerErrorCode::NoError,
                message_info_list: vec![info.clone()],
                payload: None,
                user_metadata: None,
            }),
            ScriptedResponse::ServerError(code) => Ok(GetResponse {
                correlation_id: blobcoord_types::CorrelationId(0),
                server_error_code: *code,
                message_info_list: vec![],
                payload: None,
                user_metadata: None,
            }),
            ScriptedResponse::MalformedMessageCount(n) => Ok(GetResponse {
                correlation_id: blobcoord_types::CorrelationId(0),
                server_error_code: ServerErrorCode::NoError,
                message_info_list: (0..*n)
                    .map(|i| MessageInfo {
                        blob_id: blobcoord_types::BlobId::from_partition_and_local(blobcoord_types::PartitionId(0), i as u128),
                        size: 0,
                        expiration_time_ms: None,
                    })
                    .collect(),
                payload: None,
                user_metadata: None,
            }),
            ScriptedResponse::Delay(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(GetResponse {
                    correlation_id: blobcoord_types::CorrelationId(0),
                    server_error_code: ServerErrorCode::NoError,
                    message_info_list: vec![MessageInfo {
                        blob_id: blobcoord_types::BlobId::from_partition_and_local(blobcoord_types::PartitionId(0), 0),
                        size: 0,
                        expiration_time_ms: None,
                    }],
                    payload: Some(Bytes::new()),
                    user_metadata: None,
                })
            }
        }
    }
}
