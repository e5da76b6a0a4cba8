use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use futures_util::StreamExt;
use satchel_blob::{event_channel, into_byte_stream, UploadEvent};
use satchel_engine::{PublishTarget, QueryRequest, Resolved, SaveEntry};
use satchel_types::{Fault, FaultKind, ObjectId};
use serde_json::json;

use crate::context::AppContext;
use crate::error::{ApiError, ApiResult};

/// Pins the blob name on upload; names the blob on download.
pub const FILENAME_HEADER: &str = "x-satchel-filename";
/// Reports the stored name back to the uploader.
pub const ASSIGNED_FILENAME_HEADER: HeaderName =
    HeaderName::from_static("x-satchel-assigned-filename");

fn require_str<'a>(body: &'a serde_json::Value, key: &str) -> ApiResult<&'a str> {
    body.get(key)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ApiError(Fault::invalid_parameters()))
}

fn require_oid(body: &serde_json::Value) -> ApiResult<ObjectId> {
    Ok(ObjectId::from_hex(require_str(body, "oid")?)?)
}

pub async fn info() -> Json<serde_json::Value> {
    Json(json!({
        "name": "satchel",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /public/:key`: resolve a published key to a blob stream, a bare
/// field value, or a projected document.
pub async fn public(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> ApiResult<Response> {
    match ctx.registry.resolve(&key).await? {
        Resolved::Blob { name } => stream_blob(&ctx, &name).await,
        Resolved::Scalar(value) => Ok(Json(value).into_response()),
        Resolved::Document(value) => Ok(Json(value).into_response()),
    }
}

pub async fn publish(
    State(ctx): State<AppContext>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    let target = PublishTarget::from_json(&body)?;
    let key = ctx.registry.publish(&target).await?;
    Ok(Json(json!({ "key": key })))
}

/// `POST /save`: a batch of mutation entries. A bare object is treated as a
/// batch of one.
pub async fn save(
    State(ctx): State<AppContext>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    let items: Vec<&serde_json::Value> = match &body {
        serde_json::Value::Array(items) => items.iter().collect(),
        serde_json::Value::Object(_) => vec![&body],
        _ => return Err(ApiError(Fault::invalid_parameters())),
    };
    let entries = items
        .into_iter()
        .map(SaveEntry::from_json)
        .collect::<Result<Vec<_>, _>>()?;
    let results = ctx.mutations.save(entries).await?;
    Ok(Json(serde_json::Value::Array(results)))
}

pub async fn delete(
    State(ctx): State<AppContext>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<StatusCode> {
    let entity = require_str(&body, "entity")?;
    let oid = require_oid(&body)?;
    ctx.mutations.delete(entity, &oid).await?;
    Ok(StatusCode::OK)
}

pub async fn refresh(
    State(ctx): State<AppContext>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    let entity = require_str(&body, "entity")?;
    let oid = require_oid(&body)?;
    Ok(Json(ctx.queries.refresh(entity, &oid).await?))
}

pub async fn query(
    State(ctx): State<AppContext>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    let request = QueryRequest::from_json(&body)?;
    let outcome = ctx.queries.run(request).await?;
    Ok(Json(outcome.into_json()))
}

pub async fn index(
    State(ctx): State<AppContext>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<StatusCode> {
    let entity = require_str(&body, "entity")?;
    let key = require_str(&body, "key")?;
    let unique = body.get("unique").and_then(serde_json::Value::as_bool).unwrap_or(false);
    let drop_dups = body.get("drop").and_then(serde_json::Value::as_bool).unwrap_or(false);
    ctx.queries.ensure_index(entity, key, unique, drop_dups).await?;
    Ok(StatusCode::OK)
}

/// `POST /destroy`: drop one collection. Refused unless enabled in config.
pub async fn destroy(
    State(ctx): State<AppContext>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<StatusCode> {
    if !ctx.config.allow_destroy {
        return Err(ApiError(Fault::new(FaultKind::OperationNotAllowed)));
    }
    let entity = require_str(&body, "entity")?;
    ctx.docs
        .drop_collection(entity)
        .await
        .map_err(Fault::from)?;
    tracing::info!(entity = %entity, "collection dropped");
    Ok(StatusCode::OK)
}

/// `POST /drop`: drop the whole database. Refused unless enabled in config.
pub async fn drop_database(State(ctx): State<AppContext>) -> ApiResult<StatusCode> {
    if !ctx.config.allow_drop {
        return Err(ApiError(Fault::new(FaultKind::OperationNotAllowed)));
    }
    ctx.docs.drop_database().await.map_err(Fault::from)?;
    tracing::info!("database dropped");
    Ok(StatusCode::OK)
}

/// `POST /store`: chunked upload. The request body feeds the ingestion
/// pipeline through a capacity-1 channel, so a slow store write holds back
/// the transport instead of buffering. The stored name comes back in a
/// response header.
pub async fn store(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<Response> {
    let pinned = headers
        .get(FILENAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_owned();

    let (tx, rx) = event_channel();
    let ingest = ctx.blobs.ingest(pinned, &content_type, rx);
    let feed = async move {
        let mut frames = body.into_data_stream();
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(chunk) => {
                    if tx.send(UploadEvent::Data(chunk)).await.is_err() {
                        return;
                    }
                }
                // A broken request body is a premature close.
                Err(_) => {
                    let _ = tx.send(UploadEvent::Close).await;
                    return;
                }
            }
        }
        let _ = tx.send(UploadEvent::End).await;
    };
    let (outcome, ()) = tokio::join!(ingest, feed);
    let outcome = outcome?;

    let assigned = HeaderValue::from_str(&outcome.name)
        .map_err(|_| ApiError(Fault::operation_failed("unrepresentable blob name")))?;
    let mut response = StatusCode::OK.into_response();
    response.headers_mut().insert(ASSIGNED_FILENAME_HEADER, assigned);
    Ok(response)
}

/// `POST /unlink`: delete the named blobs, attempting all of them.
pub async fn unlink(
    State(ctx): State<AppContext>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<StatusCode> {
    let files: Vec<String> = body
        .get("files")
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default();
    ctx.blobs.unlink(&files).await?;
    Ok(StatusCode::OK)
}

/// `GET /stream`: download the blob named by the filename header.
pub async fn stream(State(ctx): State<AppContext>, headers: HeaderMap) -> ApiResult<Response> {
    let name = headers
        .get(FILENAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError(Fault::invalid_parameters()))?;
    stream_blob(&ctx, name).await
}

pub async fn exists(
    State(ctx): State<AppContext>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    let name = require_str(&body, "fileName")?;
    let exists = ctx.blobs.exists(name).await?;
    Ok(Json(json!({ "exists": exists })))
}

async fn stream_blob(ctx: &AppContext, name: &str) -> ApiResult<Response> {
    let handle = ctx.blobs.open(name).await?;
    let content_type = HeaderValue::from_str(&handle.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let length = handle.length;
    let mut response = Body::from_stream(into_byte_stream(handle)).into_response();
    response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    Ok(response)
}
