//! Per-request context.
//!
//! A [`RequestContext`] is built once when a request enters the
//! pipeline.  Key normalization and path classification happen here and
//! are cached on the value; nothing downstream recomputes them.

use std::collections::HashMap;

use axum::http::{HeaderMap, Method};

use crate::errors::GatewayError;
use crate::identity::{Account, User};
use crate::metadata::record::dirname;
use crate::path::{self, Classification};

/// The principal making the request.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    /// Authenticated account, `None` for anonymous callers.
    pub account: Option<Account>,
    /// Authenticated sub-user of `account`, if the caller is one.
    pub user: Option<User>,
    /// Role identifiers active for this request.
    pub active_roles: Vec<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_operator(&self) -> bool {
        self.account.as_ref().is_some_and(|a| a.is_operator)
    }
}

/// Collapse repeated and trailing separators.
///
/// `None` when a segment is `.` or `..`.
pub fn clean_path(raw_path: &str) -> Option<String> {
    let mut cleaned = String::with_capacity(raw_path.len());
    for segment in raw_path.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return None;
        }
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    if cleaned.is_empty() {
        cleaned.push('/');
    }
    Some(cleaned)
}

/// Map a path in `owner`'s namespace to its store key.
///
/// `None` when the path has no login segment, names another account, or
/// contains a `.` or `..` segment.
pub fn normalize_key(owner: &Account, raw_path: &str) -> Option<String> {
    let cleaned = clean_path(raw_path)?;
    let login = path::login_from_path(&cleaned)?;
    if login != owner.login {
        return None;
    }
    Some(format!("/{}{}", owner.uuid, &cleaned[1 + login.len()..]))
}

/// Everything known about a request before metadata is resolved.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    /// Request path with repeated and trailing separators removed.
    pub path: String,
    /// Normalized key: the login segment replaced by the owner's uuid.
    pub key: String,
    /// Key of the parent directory; `None` for root directories.
    pub parent_key: Option<String>,
    pub owner: Account,
    pub caller: Caller,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub classification: Classification,
}

impl RequestContext {
    /// Build the context for a request on `raw_path` owned by `owner`.
    pub fn new(
        request_id: String,
        method: Method,
        raw_path: &str,
        headers: HeaderMap,
        query: HashMap<String, String>,
        owner: Account,
        caller: Caller,
    ) -> Result<Self, GatewayError> {
        let invalid = || GatewayError::InvalidPath {
            path: raw_path.to_string(),
        };
        let path = clean_path(raw_path).ok_or_else(invalid)?;
        let classification = path::classify(&method, &path, &headers);
        let key = normalize_key(&owner, &path).ok_or_else(invalid)?;
        let parent_key = if classification.is_root_directory {
            None
        } else {
            Some(dirname(&key))
        };

        Ok(Self {
            request_id,
            method,
            path,
            key,
            parent_key,
            owner,
            caller,
            headers,
            query,
            classification,
        })
    }

    /// Header value as a string, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Query parameter value, if present.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Whether the request only updates metadata (`?metadata=true`).
    pub fn is_metadata_update(&self) -> bool {
        self.param("metadata")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn is_root_directory(&self) -> bool {
        self.classification.is_root_directory
    }

    pub fn is_conditional(&self) -> bool {
        self.classification.is_conditional
    }
}
