use std::io::{self, Read};

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use cask_store::BlobStorage;
use cask_types::{ContentAddress, HashAlgorithm, Partition, SizedContentAddress};

use crate::error::{ServerError, ServerResult};
use crate::router::AppState;

/// A stored blob as reported over HTTP.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobResponse {
    pub address: ContentAddress,
    pub size: u64,
}

impl From<SizedContentAddress> for BlobResponse {
    fn from(blob: SizedContentAddress) -> Self {
        Self {
            address: blob.address,
            size: blob.size,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub blobs: Vec<BlobResponse>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PutParams {
    /// Comma separated mirror partitions.
    pub mirror: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub algorithm: Option<String>,
}

/// Health check handler.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "name": "cask-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Parse the `mirror` query parameter.
fn requested_mirrors(raw: Option<&str>) -> ServerResult<Vec<Partition>> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| Partition::new(name).map_err(ServerError::from))
        .collect()
}

/// `PUT /v1/blobs/:address`
pub async fn put_blob(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<PutParams>,
    body: Bytes,
) -> ServerResult<(StatusCode, Json<BlobResponse>)> {
    let address: ContentAddress = address.parse()?;
    let mut mirrors = state.default_mirrors.as_ref().clone();
    mirrors.extend(requested_mirrors(params.mirror.as_deref())?);

    let storage = state.storage.clone();
    let claimed = address.clone();
    let blob = tokio::task::spawn_blocking(move || storage.receive(&claimed, &body[..], &mirrors))
        .await??;
    info!(address = %blob.address, size = blob.size, "upload stored");

    let path = state.storage.layout().file_for(&address);
    for hook in state.hooks.iter() {
        if let Err(e) = hook.post_receive(&blob, &path).await {
            warn!(address = %address, error = %e, "receive hook failed");
        }
    }
    Ok((StatusCode::CREATED, Json(blob.into())))
}

/// Bytes read from disk per download chunk.
const DOWNLOAD_CHUNK: usize = 64 * 1024;

/// `GET /v1/blobs/:address`
///
/// The blob is opened before the response starts, so a missing blob is a 404.
/// Its bytes are then streamed from the blocking pool in fixed-size chunks.
pub async fn get_blob(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ServerResult<Response> {
    let address: ContentAddress = address.parse()?;
    let storage = state.storage.clone();
    let fetched = tokio::task::spawn_blocking(move || storage.fetch(&address)).await??;

    let size = fetched.blob.size;
    let (tx, rx) = mpsc::channel(4);
    let blob = fetched.blob.address.clone();
    tokio::task::spawn_blocking(move || send_chunks(fetched.reader, &tx, &blob));

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (header::CONTENT_LENGTH, HeaderValue::from(size)),
        ],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response())
}

/// Read `reader` to the end, sending each chunk down `tx`.
///
/// Stops early when the client goes away. A read error is sent as the last
/// item, which aborts the response body.
fn send_chunks(
    mut reader: Box<dyn Read + Send>,
    tx: &mpsc::Sender<io::Result<Bytes>>,
    address: &ContentAddress,
) {
    let mut buf = vec![0; DOWNLOAD_CHUNK];
    loop {
        let chunk = match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(address = %address, error = %e, "download read failed");
                Err(e)
            }
        };
        let failed = chunk.is_err();
        if tx.blocking_send(chunk).is_err() {
            debug!(address = %address, "download abandoned by client");
            return;
        }
        if failed {
            return;
        }
    }
}

/// `GET /v1/blobs?algorithm=sha1`
pub async fn list_blobs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ServerResult<Json<ListResponse>> {
    let algorithms = match params.algorithm.as_deref() {
        Some(tag) => vec![tag.parse::<HashAlgorithm>()?],
        None => HashAlgorithm::ALL.to_vec(),
    };
    let storage = state.storage.clone();
    let blobs = tokio::task::spawn_blocking(move || -> ServerResult<Vec<BlobResponse>> {
        let mut blobs = Vec::new();
        for algorithm in algorithms {
            blobs.extend(storage.enumerate(algorithm)?.into_iter().map(BlobResponse::from));
        }
        Ok(blobs)
    })
    .await??;
    Ok(Json(ListResponse { blobs }))
}
