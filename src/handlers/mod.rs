//! Namespace operation handlers.
//!
//! Every handler receives a [`ResolvedRequest`]: the entry (and, for
//! writes, its parent) has already been fetched.  Handlers select their
//! guards, then read or write the metadata store.

pub mod directory;
pub mod object;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::errors::GatewayError;
use crate::guards::{self, Guard};
use crate::headers::apply_custom_headers;
use crate::metadata::record::{Metadata, DIRECTORY_CONTENT_TYPE, LINK_CONTENT_TYPE};
use crate::resolve::ResolvedRequest;
use crate::AppState;

/// `GET` -- list a directory.  Object content is not served here.
pub async fn get_entry(
    state: Arc<AppState>,
    req: ResolvedRequest,
) -> Result<Response, GatewayError> {
    guards::run(&req, &[Guard::EntryExists])?;
    if req.entry().is_directory() {
        directory::list_directory(state, &req).await
    } else {
        Err(GatewayError::NotImplemented {
            message: format!("content of {} is not served by this gateway", req.ctx().path),
        })
    }
}

/// `HEAD` -- entry metadata as response headers.
pub async fn head_entry(req: ResolvedRequest) -> Result<Response, GatewayError> {
    guards::run(&req, &[Guard::EntryExists])?;
    if req.entry().is_directory() {
        Ok(directory::head_directory(&req))
    } else {
        Ok(object::head_object(&req))
    }
}

/// `PUT` -- dispatch on `?metadata=true` and the request content type.
pub async fn put_entry(
    state: Arc<AppState>,
    req: ResolvedRequest,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let ctx = req.ctx();
    if ctx.classification.is_restricted_write && !ctx.caller.is_operator() {
        return Err(GatewayError::AccessDenied {
            message: format!("{} may only be written by operators", ctx.path),
        });
    }

    if ctx.is_metadata_update() {
        return object::update_metadata(state, &req).await;
    }
    match ctx.header("content-type") {
        Some(DIRECTORY_CONTENT_TYPE) => directory::put_directory(state, &req).await,
        Some(LINK_CONTENT_TYPE) => object::put_link(state, &req).await,
        _ => object::put_object(state, &req, body).await,
    }
}

/// `DELETE` -- remove an object, link or empty directory.
pub async fn delete_entry(
    state: Arc<AppState>,
    req: ResolvedRequest,
) -> Result<Response, GatewayError> {
    guards::run(&req, &[Guard::EntryExists, Guard::NotRoot])?;
    evaluate_conditions(&req)?;

    let ctx = req.ctx();
    if req.entry().is_directory() {
        directory::ensure_empty(&state, &req).await?;
    }

    // Implicit root directories have no stored record.
    if req.shard().is_none() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let expected = if ctx.is_conditional() {
        req.entry().etag.as_deref()
    } else {
        None
    };
    state
        .metadata
        .delete_record(&ctx.key, expected)
        .await
        .map_err(|e| GatewayError::from_store(&ctx.path, e))?;

    debug!(key = %ctx.key, req_id = %ctx.request_id, "entry deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

// -- Shared helpers -----------------------------------------------------------

/// Resolution headers plus the entry's stored custom headers.
pub(crate) fn entry_headers(req: &ResolvedRequest) -> HeaderMap {
    let ctx = req.ctx();
    let mut headers = req.response_headers().clone();
    apply_custom_headers(
        &req.entry().headers,
        ctx.header("origin"),
        &ctx.method,
        &mut headers,
    );
    headers
}

/// Persist `md` and return the token the store issued for it.
pub(crate) async fn store_record(
    state: &AppState,
    req: &ResolvedRequest,
    md: Metadata,
) -> Result<String, GatewayError> {
    let ctx = req.ctx();
    let conditional = md.etag.is_some();
    let etag = state
        .metadata
        .put_record(md)
        .await
        .map_err(|e| GatewayError::from_store(&ctx.path, e))?;
    debug!(key = %ctx.key, conditional, req_id = %ctx.request_id, "record stored");
    Ok(etag)
}

/// `204 No Content` carrying the new `etag` and `last-modified`.
pub(crate) fn written(etag: &str, mtime: i64) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(etag) {
        headers.insert("etag", value);
    }
    if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(mtime_to_system_time(mtime))) {
        headers.insert("last-modified", value);
    }
    response
}

fn mtime_to_system_time(mtime: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(mtime.max(0) as u64)
}

// -- Conditional request evaluation -------------------------------------------

/// Strip surrounding double quotes from an etag for comparison.
fn strip_etag_quotes(etag: &str) -> &str {
    let etag = etag.trim();
    if etag.len() >= 2 && etag.starts_with('"') && etag.ends_with('"') {
        &etag[1..etag.len() - 1]
    } else {
        etag
    }
}

/// Check `If-Match` / `If-Unmodified-Since` / `If-None-Match` against the
/// entry a write or delete targets.
///
/// `If-Unmodified-Since` is only consulted when `If-Match` is absent.
/// Any failure is a `PreconditionFailed`.
pub(crate) fn evaluate_conditions(req: &ResolvedRequest) -> Result<(), GatewayError> {
    let ctx = req.ctx();
    let entry = req.entry();
    let current = entry.etag.as_deref();
    let failed = || GatewayError::PreconditionFailed {
        path: ctx.path.clone(),
    };

    if let Some(if_match) = ctx.header("if-match") {
        let wanted = strip_etag_quotes(if_match);
        let holds = if wanted == "*" {
            entry.exists()
        } else {
            current == Some(wanted)
        };
        if !holds {
            return Err(failed());
        }
    } else if let Some(since) = ctx.header("if-unmodified-since") {
        if let Ok(threshold) = httpdate::parse_http_date(since) {
            let modified = mtime_to_system_time(entry.mtime - entry.mtime.rem_euclid(1000));
            if entry.exists() && modified > threshold {
                return Err(failed());
            }
        }
    }

    if let Some(if_none_match) = ctx.header("if-none-match") {
        let wanted = strip_etag_quotes(if_none_match);
        if entry.exists() && (wanted == "*" || current == Some(wanted)) {
            return Err(failed());
        }
    }

    Ok(())
}
