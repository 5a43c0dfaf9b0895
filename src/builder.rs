//! Construction of the metadata record persisted by a write.
//!
//! The record is built from the resolved request: the previous entry (if
//! any) supplies defaults for attribute-only updates, the request
//! supplies headers, content attributes and role tags.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use axum::http::HeaderMap;
use regex::Regex;

use crate::errors::GatewayError;
use crate::headers::CORS_RESPONSE_HEADERS;
use crate::identity::IdentityService;
use crate::metadata::record::{
    dirname, EntryKind, Metadata, ObjectInfo, StorageNode, DEFAULT_OBJECT_CONTENT_TYPE,
};
use crate::resolve::ResolvedRequest;
use crate::roles::{resolve_role_names, split_role_tags};

/// Byte budget for the values of user (`m-*`) headers stored on a record.
pub const USER_HEADER_BUDGET: usize = 4 * 1024;

static USER_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^m-\w+").expect("valid regex"));

/// Content attributes established by the data path of an upload.
#[derive(Debug, Clone, Default)]
pub struct UploadInfo {
    pub content_length: Option<u64>,
    pub content_md5: Option<String>,
    pub object_id: Option<String>,
    /// Storage nodes the content was written to.
    pub sharks: Vec<StorageNode>,
}

/// What the write creates.
#[derive(Debug, Clone)]
pub enum Target {
    Directory,
    Object(UploadInfo),
    /// A link to the given (object) record.
    Link(Metadata),
}

/// Build the record a write will persist.
///
/// Role-tag resolution against the identity service is the only
/// asynchronous step.
pub async fn build_metadata(
    req: &ResolvedRequest,
    target: Target,
    identity: &dyn IdentityService,
) -> Result<Metadata, GatewayError> {
    let ctx = req.ctx();
    let prev = req.entry();

    // Attribute updates on directories come through the object path.
    let target = if prev.is_directory() {
        Target::Directory
    } else {
        target
    };

    let kind = match target {
        Target::Directory => EntryKind::Directory,
        Target::Link(source) => EntryKind::Link {
            link: Box::new(source),
        },
        Target::Object(upload) => EntryKind::Object(object_info(
            upload,
            prev.object(),
            ctx.header("content-type"),
        )),
    };

    let etag = if ctx.is_conditional() {
        prev.etag.clone()
    } else {
        None
    };

    let roles = requested_roles(req, identity).await?;

    Ok(Metadata {
        key: ctx.key.clone(),
        dirname: dirname(&ctx.key),
        owner: ctx.owner.uuid.clone(),
        mtime: chrono::Utc::now().timestamp_millis(),
        request_id: Some(ctx.request_id.clone()),
        headers: stored_headers(&ctx.headers),
        roles,
        etag,
        kind,
    })
}

fn object_info(
    upload: UploadInfo,
    prev: Option<&ObjectInfo>,
    content_type: Option<&str>,
) -> ObjectInfo {
    let content_length = upload
        .content_length
        .or(prev.map(|p| p.content_length))
        .unwrap_or(0);

    let sharks = if content_length == 0 {
        Vec::new()
    } else if !upload.sharks.is_empty() {
        upload.sharks
    } else {
        prev.map(|p| p.sharks.clone()).unwrap_or_default()
    };

    ObjectInfo {
        content_length,
        content_md5: upload
            .content_md5
            .or_else(|| prev.and_then(|p| p.content_md5.clone())),
        content_type: content_type
            .map(str::to_string)
            .or_else(|| prev.map(|p| p.content_type.clone()))
            .unwrap_or_else(|| DEFAULT_OBJECT_CONTENT_TYPE.to_string()),
        object_id: upload
            .object_id
            .or_else(|| prev.map(|p| p.object_id.clone()))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        sharks,
    }
}

/// Headers from the request that are stored on the record.
pub fn stored_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut stored = BTreeMap::new();

    for name in CORS_RESPONSE_HEADERS {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            stored.insert(name.to_string(), value.to_string());
        }
    }
    if let Some(value) = headers.get("cache-control").and_then(|v| v.to_str().ok()) {
        stored.insert("Cache-Control".to_string(), value.to_string());
    }
    if let Some(value) = headers.get("surrogate-key").and_then(|v| v.to_str().ok()) {
        stored.insert("Surrogate-Key".to_string(), value.to_string());
    }

    let mut used = 0usize;
    for (name, value) in headers {
        if !USER_HEADER.is_match(name.as_str()) {
            continue;
        }
        used += value.as_bytes().len();
        if used < USER_HEADER_BUDGET {
            if let Ok(value) = value.to_str() {
                stored.insert(name.as_str().to_string(), value.to_string());
            }
        }
    }

    stored
}

async fn requested_roles(
    req: &ResolvedRequest,
    identity: &dyn IdentityService,
) -> Result<Vec<String>, GatewayError> {
    let ctx = req.ctx();
    let requested = ctx
        .param("role-tag")
        .or_else(|| ctx.header("role-tag"))
        .map(split_role_tags)
        .unwrap_or_default();

    if !requested.is_empty() {
        resolve_role_names(identity, &ctx.owner.uuid, &requested).await
    } else if ctx.caller.user.is_some() {
        Ok(ctx.caller.active_roles.clone())
    } else {
        Ok(Vec::new())
    }
}
