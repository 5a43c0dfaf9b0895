//! Directory handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;

use super::{entry_headers, evaluate_conditions, store_record, written};
use crate::builder::{build_metadata, Target};
use crate::errors::GatewayError;
use crate::guards::{self, Guard};
use crate::listing::{list, ListingQuery};
use crate::metadata::record::DIRECTORY_CONTENT_TYPE;
use crate::resolve::ResolvedRequest;
use crate::AppState;

/// `PUT` with the directory content type.
pub async fn put_directory(
    state: Arc<AppState>,
    req: &ResolvedRequest,
) -> Result<Response, GatewayError> {
    guards::run(req, &[Guard::NotRoot, Guard::ParentIsDirectory])?;
    evaluate_conditions(req)?;

    let md = build_metadata(req, Target::Directory, state.identity.as_ref()).await?;
    let mtime = md.mtime;
    let etag = store_record(&state, req, md).await?;
    Ok(written(&etag, mtime))
}

pub fn head_directory(req: &ResolvedRequest) -> Response {
    let mut headers = entry_headers(req);
    headers.insert(
        "content-type",
        HeaderValue::from_static(DIRECTORY_CONTENT_TYPE),
    );
    (StatusCode::OK, headers).into_response()
}

/// `GET` on a directory: newline-delimited JSON entries, streamed as the
/// store produces them.
pub async fn list_directory(
    state: Arc<AppState>,
    req: &ResolvedRequest,
) -> Result<Response, GatewayError> {
    let ctx = req.ctx();
    let query = ListingQuery::from_params(&ctx.key, &ctx.owner.uuid, &ctx.query)?;
    let entries = list(state.metadata.as_ref(), &query, &ctx.key, &ctx.request_id).await?;

    let lines = entries.map(|entry| {
        let mut line = serde_json::to_vec(&entry?).map_err(anyhow::Error::from)?;
        line.push(b'\n');
        Ok::<_, GatewayError>(Bytes::from(line))
    });

    let mut headers = entry_headers(req);
    headers.insert(
        "content-type",
        HeaderValue::from_static(DIRECTORY_CONTENT_TYPE),
    );
    Ok((StatusCode::OK, headers, Body::from_stream(lines)).into_response())
}

/// Fail with `DirectoryNotEmpty` if the directory has any children.
pub async fn ensure_empty(state: &AppState, req: &ResolvedRequest) -> Result<(), GatewayError> {
    let ctx = req.ctx();
    let params = HashMap::from([("limit".to_string(), "2".to_string())]);
    let query = ListingQuery::from_params(&ctx.key, &ctx.owner.uuid, &params)?;
    let mut children = list(state.metadata.as_ref(), &query, &ctx.key, &ctx.request_id).await?;

    match children.next().await {
        None => Ok(()),
        Some(Ok(_)) => Err(GatewayError::DirectoryNotEmpty {
            path: ctx.path.clone(),
        }),
        Some(Err(err)) => Err(err),
    }
}
