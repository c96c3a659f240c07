use crate::core::bridge::BridgeService;
use crate::domain::model::{DeliveryRequest, FileSpool, MessageResponse, SyncRequest};
use crate::domain::ports::{ObjectStore, ProcessRunner, RemoteConnector};
use crate::utils::error::{BridgeError, Result};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use std::sync::Arc;

type Bridge<S, C, P> = State<Arc<BridgeService<S, C, P>>>;

fn bucket_header(headers: &HeaderMap) -> Result<String> {
    let value = headers
        .get("bucket")
        .ok_or_else(|| BridgeError::validation("bucket", "header is required"))?;
    let bucket = value
        .to_str()
        .map_err(|_| BridgeError::validation("bucket", "header must be visible ASCII"))?
        .trim();
    if bucket.is_empty() {
        return Err(BridgeError::validation("bucket", "header cannot be empty"));
    }
    Ok(bucket.to_string())
}

/// Browsers may send a client-side path as the part's filename; only the last
/// component is kept.
fn client_file_name(raw: &str) -> Option<String> {
    raw.rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
}

pub async fn health() -> Json<MessageResponse> {
    Json(MessageResponse::new("ok"))
}

/// `PUT /upload_minio`: multipart `files` parts plus a `keys_prefix` text part.
pub async fn upload_minio<S, C, P>(
    State(bridge): Bridge<S, C, P>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<StatusCode>
where
    S: ObjectStore + 'static,
    C: RemoteConnector + 'static,
    P: ProcessRunner + 'static,
{
    let bucket = bucket_header(&headers)?;
    let mut multipart = multipart.map_err(|e| BridgeError::validation("files", e.body_text()))?;

    let mut keys_prefix = None;
    let mut files = Vec::new();
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| BridgeError::validation("files", e.body_text()))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("keys_prefix") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| BridgeError::validation("keys_prefix", e.body_text()))?;
                keys_prefix = Some(text);
            }
            Some("files") => {
                let name = field
                    .file_name()
                    .and_then(client_file_name)
                    .ok_or_else(|| BridgeError::validation("files", "every file part needs a filename"))?;
                let mut spool = FileSpool::new()?;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| BridgeError::validation("files", e.body_text()))?
                {
                    spool.write(&chunk).await?;
                }
                files.push(spool.finish(name).await?);
            }
            other => tracing::debug!("ignoring multipart field {:?}", other),
        }
    }

    let keys_prefix =
        keys_prefix.ok_or_else(|| BridgeError::validation("keys_prefix", "form field is required"))?;
    if files.is_empty() {
        return Err(BridgeError::validation("files", "at least one file is required"));
    }

    tracing::info!(
        "upload_minio: {} file(s) to bucket {} under {}",
        files.len(),
        bucket,
        keys_prefix
    );
    bridge.upload_to_storage(&bucket, &keys_prefix, files).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /upload_colab`
pub async fn upload_colab<S, C, P>(
    State(bridge): Bridge<S, C, P>,
    headers: HeaderMap,
    payload: std::result::Result<Json<DeliveryRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>>
where
    S: ObjectStore + 'static,
    C: RemoteConnector + 'static,
    P: ProcessRunner + 'static,
{
    let bucket = bucket_header(&headers)?;
    let Json(request) = payload.map_err(|e| BridgeError::validation("body", e.body_text()))?;

    tracing::info!(
        "upload_colab: {}/{} -> {}:{}",
        bucket,
        request.keys_prefix,
        request.credentials.host,
        request.credentials.port
    );
    let report = bridge.deliver_to_remote(&bucket, &request).await?;
    Ok(Json(MessageResponse::new(report.message())))
}

/// `POST /download_colab`
pub async fn download_colab<S, C, P>(
    State(bridge): Bridge<S, C, P>,
    headers: HeaderMap,
    payload: std::result::Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>>
where
    S: ObjectStore + 'static,
    C: RemoteConnector + 'static,
    P: ProcessRunner + 'static,
{
    let bucket = bucket_header(&headers)?;
    let Json(request) = payload.map_err(|e| BridgeError::validation("body", e.body_text()))?;

    tracing::info!(
        "download_colab: {}:{} -> {}/{}",
        request.credentials.host,
        request.credentials.port,
        bucket,
        request.keys_prefix
    );
    let message = bridge.sync_from_remote(&bucket, &request).await?;
    Ok(Json(MessageResponse::new(message)))
}
