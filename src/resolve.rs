//! Metadata resolution for a request.
//!
//! The entry record is always fetched.  The parent record is fetched only
//! for mutations that can create a child (anything but GET, HEAD and
//! DELETE) on a non-root target; when it is, both fetches run
//! concurrently and resolution waits for both.  Nothing is fetched
//! speculatively.

use std::time::{Duration, UNIX_EPOCH};

use axum::http::{HeaderMap, HeaderValue, Method};
use metrics::counter;
use tracing::debug;

use crate::context::RequestContext;
use crate::errors::GatewayError;
use crate::identity::IdentityService;
use crate::metadata::record::{EntryKind, Metadata};
use crate::metadata::store::{MetadataStore, StoreError};
use crate::metrics::METADATA_FETCHES_TOTAL;
use crate::path::{is_root_directory, Classification};
use crate::roles::display_role_tags;

/// Header carrying the display names of an entry's roles.
pub const ROLE_TAG_HEADER: &str = "role-tag";

/// A request whose entry (and, when needed, parent) metadata is known.
///
/// Immutable once built: handlers only get shared references.
#[derive(Debug)]
pub struct ResolvedRequest {
    ctx: RequestContext,
    entry: Metadata,
    parent: Option<Metadata>,
    shard: Option<String>,
    response_headers: HeaderMap,
}

impl ResolvedRequest {
    pub fn ctx(&self) -> &RequestContext {
        &self.ctx
    }

    /// The entry record; `Absent` when nothing is stored at the key.
    pub fn entry(&self) -> &Metadata {
        &self.entry
    }

    /// The parent record, when resolution fetched it.
    pub fn parent(&self) -> Option<&Metadata> {
        self.parent.as_ref()
    }

    /// Shard that served the entry read.
    pub fn shard(&self) -> Option<&str> {
        self.shard.as_deref()
    }

    /// `etag` / `last-modified` headers derived from the entry.
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }
}

/// Whether resolving a request needs the parent record.
pub fn needs_parent(method: &Method, classification: &Classification) -> bool {
    let read_or_delete = *method == Method::GET || *method == Method::HEAD || *method == Method::DELETE;
    !read_or_delete && !classification.is_root_directory
}

struct Loaded {
    metadata: Metadata,
    shard: Option<String>,
}

/// Resolve entry and parent metadata for `ctx`.
pub async fn resolve(
    ctx: RequestContext,
    store: &dyn MetadataStore,
    identity: &dyn IdentityService,
) -> Result<ResolvedRequest, GatewayError> {
    let parent_key = if needs_parent(&ctx.method, &ctx.classification) {
        ctx.parent_key.as_deref()
    } else {
        None
    };
    debug!(
        key = %ctx.key,
        parent_key = ?parent_key,
        req_id = %ctx.request_id,
        "resolve: entered"
    );

    let entry_fetch = load_metadata(store, identity, &ctx.key, "entry");
    let parent_fetch = async {
        match parent_key {
            Some(key) => load_metadata(store, identity, key, "parent").await.map(Some),
            None => Ok(None),
        }
    };
    let (entry, parent) = tokio::try_join!(entry_fetch, parent_fetch)?;

    let parent = parent.map(|loaded| {
        let mut md = loaded.metadata;
        if is_root_directory(&md.key) && !md.is_directory() {
            md.kind = EntryKind::Directory;
        }
        md
    });

    let response_headers = entry_headers(&entry.metadata);

    debug!(
        key = %ctx.key,
        entry_type = %entry.metadata.entry_type(),
        parent_type = ?parent.as_ref().map(|p| p.entry_type()),
        shard = ?entry.shard,
        "resolve: done"
    );

    Ok(ResolvedRequest {
        ctx,
        entry: entry.metadata,
        parent,
        shard: entry.shard,
        response_headers,
    })
}

/// Fetch one record, defaulting not-found and decorating roles.
async fn load_metadata(
    store: &dyn MetadataStore,
    identity: &dyn IdentityService,
    key: &str,
    role: &'static str,
) -> Result<Loaded, GatewayError> {
    counter!(METADATA_FETCHES_TOTAL, "role" => role).increment(1);

    let (mut metadata, shard) = match store.get_record(key).await {
        Ok(stored) => (stored.metadata, Some(stored.shard)),
        Err(StoreError::NotFound { .. }) => {
            let md = if is_root_directory(key) {
                Metadata::implicit_directory(key)
            } else {
                Metadata::absent(key)
            };
            (md, None)
        }
        Err(err) => {
            tracing::warn!(key, error = %err, "metadata fetch failed");
            return Err(GatewayError::from_store(key, err));
        }
    };

    if let Some(tags) = display_role_tags(identity, &metadata.roles).await? {
        metadata.headers.insert(ROLE_TAG_HEADER.to_string(), tags);
    }

    Ok(Loaded { metadata, shard })
}

fn entry_headers(entry: &Metadata) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if !entry.exists() {
        return headers;
    }
    if let Some(value) = entry.etag.as_deref().and_then(|e| HeaderValue::from_str(e).ok()) {
        headers.insert("etag", value);
    }
    if entry.mtime > 0 {
        let modified = UNIX_EPOCH + Duration::from_millis(entry.mtime as u64);
        if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(modified)) {
            headers.insert("last-modified", value);
        }
    }
    headers
}
