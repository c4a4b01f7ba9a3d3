//! Routes a parsed request to the coordinator and maps the outcome to an
//! HTTP response, following `kimberlite-server`'s `handler.rs` convention
//! of an `error_to_wire`-style exhaustive match kept in one place.

use crate::health::HealthState;
use crate::http::{self, RequestLine};
use blobcoord_client::{Coordinator, CoordinatorError, ReplicaTransport};
use blobcoord_cluster::ClusterMap;
use blobcoord_pool::ConnectionPool;
use blobcoord_types::{BlobId, ClientId, MessageInfo};
use std::io;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// One HTTP route this ingress understands, with its blob id already
/// parsed out of the path.
enum Route {
    GetBlob(BlobId),
    GetBlobProperties(BlobId),
    GetUserMetadata(BlobId),
    Health,
    Ready,
    Metrics,
}

fn parse_route(request: &RequestLine) -> Result<Route, String> {
    if request.method != "GET" {
        return Err(format!("unsupported method {}", request.method));
    }

    match request.path.as_str() {
        "/health" => return Ok(Route::Health),
        "/ready" => return Ok(Route::Ready),
        "/metrics" => return Ok(Route::Metrics),
        _ => {}
    }

    let mut segments = request.path.trim_start_matches('/').split('/');
    match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some("blobs"), Some(hex), None, None) => Ok(Route::GetBlob(parse_blob_id(hex)?)),
        (Some("blobs"), Some(hex), Some("properties"), None) => Ok(Route::GetBlobProperties(parse_blob_id(hex)?)),
        (Some("blobs"), Some(hex), Some("metadata"), None) => Ok(Route::GetUserMetadata(parse_blob_id(hex)?)),
        _ => Err(format!("no route for {}", request.path)),
    }
}

fn parse_blob_id(hex: &str) -> Result<BlobId, String> {
    if hex.len() != blobcoord_types::BLOB_ID_LEN * 2 {
        return Err(format!("blob id must be {} hex chars, got {}", blobcoord_types::BLOB_ID_LEN * 2, hex.len()));
    }
    let mut bytes = [0u8; blobcoord_types::BLOB_ID_LEN];
    for (i, byte) in bytes.iter_mut().enumerate() {
        let pair = &hex[i * 2..i * 2 + 2];
        *byte = u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex byte {pair:?} in blob id"))?;
    }
    Ok(BlobId::from_bytes(bytes))
}

/// Maps a terminal `CoordinatorError` to the HTTP status SPEC_FULL.md §7
/// assigns it.
fn status_for(err: &CoordinatorError) -> u16 {
    match err {
        CoordinatorError::BlobDoesNotExist => 404,
        CoordinatorError::BlobDeleted | CoordinatorError::BlobExpired => 410,
        CoordinatorError::AmbryUnavailable => 503,
        CoordinatorError::OperationTimedOut => 504,
        CoordinatorError::UnexpectedInternalError(_) => 500,
    }
}

fn properties_json(info: &MessageInfo) -> String {
    format!(
        "{{\"blob_id\":\"{}\",\"size\":{},\"expiration_time_ms\":{}}}",
        info.blob_id,
        info.size,
        info.expiration_time_ms.map_or("null".to_string(), |ms| ms.to_string()),
    )
}

/// Handles one request against the coordinator and writes the response
/// to `stream`. Never propagates a coordinator error to the caller — it
/// is always translated into an HTTP status, per spec.md's "streams the
/// result" ingress contract.
pub async fn handle<C, P>(
    stream: &mut TcpStream,
    request: &RequestLine,
    coordinator: &Arc<Coordinator<C, P>>,
    operation_timeout: Duration,
    health: &HealthState,
) -> io::Result<()>
where
    C: ClusterMap,
    P: ConnectionPool + 'static,
    P::Connection: ReplicaTransport,
{
    let route = match parse_route(request) {
        Ok(route) => route,
        Err(reason) => {
            warn!(%reason, path = %request.path, "bad request");
            crate::metrics::Metrics::global().record_request("/bad-request", 400);
            return http::write_response(stream, 400, "text/plain", reason.as_bytes());
        }
    };

    match route {
        Route::Health => {
            crate::metrics::Metrics::global().record_request("/health", 200);
            http::write_response(stream, 200, "application/json", b"{\"status\":\"ok\"}")
        }
        Route::Ready => {
            let (status, body): (u16, &[u8]) = if health.is_ready() {
                (200, b"{\"status\":\"ready\"}")
            } else {
                (503, b"{\"status\":\"starting\"}")
            };
            crate::metrics::Metrics::global().record_request("/ready", status);
            http::write_response(stream, status, "application/json", body)
        }
        Route::Metrics => {
            crate::metrics::Metrics::global().record_request("/metrics", 200);
            http::write_response(stream, 200, "text/plain; version=0.0.4", crate::metrics::Metrics::global().render().as_bytes())
        }
        Route::GetBlob(blob_id) => match coordinator.get_blob(blob_id, operation_timeout).await {
            Ok(bytes) => {
                crate::metrics::Metrics::global().record_request("/blobs/:id", 200);
                http::write_chunked_response(stream, "application/octet-stream", bytes.as_ref())
            }
            Err(err) => {
                log_coordinator_error(&err, blob_id);
                let status = status_for(&err);
                crate::metrics::Metrics::global().record_request("/blobs/:id", status);
                http::write_response(stream, status, "text/plain", err.to_string().as_bytes())
            }
        },
        Route::GetBlobProperties(blob_id) => match coordinator.get_blob_properties(blob_id, operation_timeout).await {
            Ok(info) => {
                crate::metrics::Metrics::global().record_request("/blobs/:id/properties", 200);
                http::write_response(stream, 200, "application/json", properties_json(&info).as_bytes())
            }
            Err(err) => {
                log_coordinator_error(&err, blob_id);
                let status = status_for(&err);
                crate::metrics::Metrics::global().record_request("/blobs/:id/properties", status);
                http::write_response(stream, status, "text/plain", err.to_string().as_bytes())
            }
        },
        Route::GetUserMetadata(blob_id) => match coordinator.get_user_metadata(blob_id, operation_timeout).await {
            Ok(bytes) => {
                crate::metrics::Metrics::global().record_request("/blobs/:id/metadata", 200);
                http::write_response(stream, 200, "application/octet-stream", &bytes)
            }
            Err(err) => {
                log_coordinator_error(&err, blob_id);
                let status = status_for(&err);
                crate::metrics::Metrics::global().record_request("/blobs/:id/metadata", status);
                http::write_response(stream, status, "text/plain", err.to_string().as_bytes())
            }
        },
    }
}

fn log_coordinator_error(err: &CoordinatorError, blob_id: BlobId) {
    match err {
        CoordinatorError::UnexpectedInternalError(_) => error!(%blob_id, %err, "unexpected coordinator error"),
        _ => tracing::trace!(%blob_id, %err, "coordinator returned a terminal error"),
    }
}

/// The client id this ingress identifies itself with to the coordinator.
/// A real deployment would mint one per incoming TCP connection or per
/// authenticated caller; this ingress has neither sessions nor auth
/// (spec.md's stated non-goal), so every request shares one id.
pub const INGRESS_CLIENT_ID: ClientId = ClientId(0);
