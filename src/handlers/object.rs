//! Object and link handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use super::{entry_headers, evaluate_conditions, store_record, written};
use crate::builder::{build_metadata, Target, UploadInfo};
use crate::config::PlacementConfig;
use crate::context::normalize_key;
use crate::errors::GatewayError;
use crate::guards::{self, Guard};
use crate::metadata::record::{EntryKind, ObjectInfo};
use crate::metadata::store::StoreError;
use crate::resolve::ResolvedRequest;
use crate::AppState;

/// Base64 MD5 digest of `body`, as carried in `content-md5`.
fn content_md5(body: &[u8]) -> String {
    use md5::{Digest, Md5};
    let digest = Md5::digest(body);
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, digest)
}

/// Number of copies requested through `durability-level`.
fn durability_level(value: Option<&str>, config: &PlacementConfig) -> Result<u32, GatewayError> {
    let Some(value) = value else {
        return Ok(config.default_copies);
    };
    match value.trim().parse::<u32>() {
        Ok(n) if (1..=config.max_copies).contains(&n) => Ok(n),
        _ => Err(GatewayError::InvalidDurabilityLevel {
            max: config.max_copies,
        }),
    }
}

/// Object fields of an object record, or of the object a link points at.
fn object_fields(req: &ResolvedRequest) -> Option<&ObjectInfo> {
    match &req.entry().kind {
        EntryKind::Object(info) => Some(info),
        EntryKind::Link { link } => link.object(),
        _ => None,
    }
}

/// `HEAD` on an object or link.
pub fn head_object(req: &ResolvedRequest) -> Response {
    let mut headers = entry_headers(req);
    if let Some(info) = object_fields(req) {
        if let Ok(value) = HeaderValue::from_str(&info.content_type) {
            headers.insert("content-type", value);
        }
        headers.insert("content-length", HeaderValue::from(info.content_length));
        if let Some(value) = info
            .content_md5
            .as_deref()
            .and_then(|md5| HeaderValue::from_str(md5).ok())
        {
            headers.insert("content-md5", value);
        }
        headers.insert("durability-level", HeaderValue::from(info.sharks.len()));
    }
    (StatusCode::OK, headers).into_response()
}

/// `PUT` of object content.
///
/// The body is hashed and sized here; replicas are placed for non-empty
/// bodies only.
pub async fn put_object(
    state: Arc<AppState>,
    req: &ResolvedRequest,
    body: Bytes,
) -> Result<Response, GatewayError> {
    guards::run(req, &[Guard::NotRoot, Guard::NotDirectory, Guard::ParentIsDirectory])?;
    evaluate_conditions(req)?;

    let ctx = req.ctx();
    let copies = durability_level(
        ctx.header("durability-level")
            .or_else(|| ctx.header("x-durability-level")),
        &state.config.placement,
    )?;

    let computed = content_md5(&body);
    if let Some(expected) = ctx.header("content-md5") {
        if expected.trim() != computed {
            return Err(GatewayError::ContentMd5Mismatch {
                expected: expected.to_string(),
                computed,
            });
        }
    }

    let size = body.len() as u64;
    let sharks = if size == 0 {
        Vec::new()
    } else {
        state
            .placement
            .choose(size, copies)
            .await
            .map_err(GatewayError::Upstream)?
    };
    debug!(key = %ctx.key, size, copies, "put_object: content placed");

    let upload = UploadInfo {
        content_length: Some(size),
        content_md5: Some(computed.clone()),
        object_id: Some(uuid::Uuid::new_v4().to_string()),
        sharks,
    };
    let md = build_metadata(req, Target::Object(upload), state.identity.as_ref()).await?;
    let mtime = md.mtime;
    let etag = store_record(&state, req, md).await?;

    let mut response = written(&etag, mtime);
    if let Ok(value) = HeaderValue::from_str(&computed) {
        response.headers_mut().insert("computed-md5", value);
    }
    Ok(response)
}

/// `PUT ?metadata=true` -- rewrite headers and roles, keeping content.
pub async fn update_metadata(
    state: Arc<AppState>,
    req: &ResolvedRequest,
) -> Result<Response, GatewayError> {
    guards::run(req, &Guard::ORDER)?;
    evaluate_conditions(req)?;

    let target = match &req.entry().kind {
        EntryKind::Link { link } => Target::Link((**link).clone()),
        _ => Target::Object(UploadInfo::default()),
    };
    let md = build_metadata(req, target, state.identity.as_ref()).await?;
    let mtime = md.mtime;
    let etag = store_record(&state, req, md).await?;
    Ok(written(&etag, mtime))
}

/// `PUT` of a link to the object named by the `location` header.
pub async fn put_link(
    state: Arc<AppState>,
    req: &ResolvedRequest,
) -> Result<Response, GatewayError> {
    guards::run(req, &[Guard::NotRoot, Guard::NotDirectory, Guard::ParentIsDirectory])?;
    evaluate_conditions(req)?;

    let ctx = req.ctx();
    let location = ctx.header("location").unwrap_or_default().to_string();
    let source_key = normalize_key(&ctx.owner, &location).ok_or_else(|| {
        GatewayError::InvalidPath {
            path: location.clone(),
        }
    })?;

    let source = match state.metadata.get_record(&source_key).await {
        Ok(stored) => stored.metadata,
        Err(StoreError::NotFound { .. }) => {
            return Err(GatewayError::SourceObjectNotFound { path: location })
        }
        Err(err) => return Err(GatewayError::from_store(&location, err)),
    };
    if source.object().is_none() {
        return Err(GatewayError::LinkNotObject { path: location });
    }

    let md = build_metadata(req, Target::Link(source), state.identity.as_ref()).await?;
    let mtime = md.mtime;
    let etag = store_record(&state, req, md).await?;
    Ok(written(&etag, mtime))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_md5() {
        assert_eq!(content_md5(b"hello"), "XUFAKrxLKna5cZ2REBfFkg==");
        assert_eq!(content_md5(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn test_durability_level() {
        let config = PlacementConfig::default();
        assert_eq!(durability_level(None, &config).unwrap(), config.default_copies);
        assert_eq!(durability_level(Some("3"), &config).unwrap(), 3);
        for bad in ["0", "10", "two", "-1"] {
            assert!(
                matches!(
                    durability_level(Some(bad), &config),
                    Err(GatewayError::InvalidDurabilityLevel { max: 9 })
                ),
                "{bad}"
            );
        }
    }
}
