//! Gateway error types.
//!
//! Every variant maps to a stable client-facing error code and HTTP
//! status.  The enum implements [`axum::response::IntoResponse`] so
//! handlers can simply return `Err(GatewayError::NotFound { .. })`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::metadata::store::StoreError;

/// Generate a request correlation id.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Gateway error codes expressed as a Rust enum.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The entry does not exist.
    #[error("{path} was not found")]
    NotFound { path: String },

    /// An object-style operation targeted a directory.
    #[error("{path} is a directory")]
    DirectoryConflict { path: String },

    /// A mutation targeted a root directory.
    #[error("{method} is not allowed on root directory {path}")]
    RootProtected { method: String, path: String },

    /// The parent directory of the target does not exist.
    #[error("{path} does not exist")]
    ParentMissing { path: String },

    /// The parent of the target exists but is not a directory.
    #[error("{path} is not a directory")]
    ParentNotDirectory { path: String },

    /// A role-tag name did not resolve to a role.
    #[error("Role \"{name}\" is invalid")]
    UnknownRole { name: String },

    /// Listing `limit` was outside [1, 1024] or not an integer.
    #[error("limit={limit} is invalid: must be between [1, 1024]")]
    InvalidPageSize { limit: String },

    /// A time-sorted listing marker could not be parsed.
    #[error("{name}={value} is invalid")]
    InvalidMarker { name: String, value: String },

    /// The request path is not a valid namespace path.
    #[error("{path} is not a valid path")]
    InvalidPath { path: String },

    /// The account named in the path does not exist.
    #[error("{login} does not exist")]
    AccountNotFound { login: String },

    /// A directory delete was attempted on a non-empty directory.
    #[error("{path} is not empty")]
    DirectoryNotEmpty { path: String },

    /// A conditional request did not hold, or the store saw a stale token.
    #[error("if-match/if-none-match precondition did not hold for {path}")]
    PreconditionFailed { path: String },

    /// The caller may not perform this operation.
    #[error("{message}")]
    AccessDenied { message: String },

    /// A link source exists but is not an object.
    #[error("{path} is not an object")]
    LinkNotObject { path: String },

    /// A link source does not exist.
    #[error("{path} was not found")]
    SourceObjectNotFound { path: String },

    /// The requested number of copies is out of range.
    #[error("durability-level must be between 1 and {max}")]
    InvalidDurabilityLevel { max: u32 },

    /// The `content-md5` sent with an upload does not match the body.
    #[error("content-md5 expected to be {expected}, but was {computed}")]
    ContentMd5Mismatch { expected: String, computed: String },

    /// The operation is served elsewhere.
    #[error("{message}")]
    NotImplemented { message: String },

    /// The metadata store or identity service failed.
    #[error("the service is temporarily unavailable")]
    Upstream(#[source] anyhow::Error),

    /// Catch-all for unexpected internal errors.
    #[error("an internal error occurred")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Return the stable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::NotFound { .. } => "ResourceNotFound",
            GatewayError::DirectoryConflict { .. } => "DirectoryOperation",
            GatewayError::RootProtected { .. } => "OperationNotAllowedOnRootDirectory",
            GatewayError::ParentMissing { .. } => "DirectoryDoesNotExist",
            GatewayError::ParentNotDirectory { .. } => "ParentNotDirectory",
            GatewayError::UnknownRole { .. } => "InvalidRoleTag",
            GatewayError::InvalidPageSize { .. } => "InvalidLimit",
            GatewayError::InvalidMarker { .. } => "InvalidParameter",
            GatewayError::InvalidPath { .. } => "InvalidResource",
            GatewayError::AccountNotFound { .. } => "AccountDoesNotExist",
            GatewayError::DirectoryNotEmpty { .. } => "DirectoryNotEmpty",
            GatewayError::PreconditionFailed { .. } => "PreconditionFailed",
            GatewayError::AccessDenied { .. } => "AuthorizationFailed",
            GatewayError::LinkNotObject { .. } => "LinkNotObject",
            GatewayError::SourceObjectNotFound { .. } => "SourceObjectNotFound",
            GatewayError::InvalidDurabilityLevel { .. } => "InvalidDurabilityLevel",
            GatewayError::ContentMd5Mismatch { .. } => "ContentMD5Mismatch",
            GatewayError::NotImplemented { .. } => "NotImplemented",
            GatewayError::Upstream(_) => "ServiceUnavailable",
            GatewayError::Internal(_) => "InternalError",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::DirectoryConflict { .. } => StatusCode::BAD_REQUEST,
            GatewayError::RootProtected { .. } => StatusCode::BAD_REQUEST,
            GatewayError::ParentMissing { .. } => StatusCode::NOT_FOUND,
            GatewayError::ParentNotDirectory { .. } => StatusCode::BAD_REQUEST,
            GatewayError::UnknownRole { .. } => StatusCode::CONFLICT,
            GatewayError::InvalidPageSize { .. } => StatusCode::BAD_REQUEST,
            GatewayError::InvalidMarker { .. } => StatusCode::BAD_REQUEST,
            GatewayError::InvalidPath { .. } => StatusCode::BAD_REQUEST,
            GatewayError::AccountNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::DirectoryNotEmpty { .. } => StatusCode::BAD_REQUEST,
            GatewayError::PreconditionFailed { .. } => StatusCode::PRECONDITION_FAILED,
            GatewayError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            GatewayError::LinkNotObject { .. } => StatusCode::BAD_REQUEST,
            GatewayError::SourceObjectNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::InvalidDurabilityLevel { .. } => StatusCode::BAD_REQUEST,
            GatewayError::ContentMd5Mismatch { .. } => StatusCode::BAD_REQUEST,
            GatewayError::NotImplemented { .. } => StatusCode::NOT_IMPLEMENTED,
            GatewayError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Translate a store failure on `path` into a gateway error.
    ///
    /// Callers handle `StoreError::NotFound` themselves where absence is
    /// meaningful; here it is reported as a plain not-found.
    pub fn from_store(path: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => GatewayError::NotFound {
                path: path.to_string(),
            },
            StoreError::Conflict { .. } => GatewayError::PreconditionFailed {
                path: path.to_string(),
            },
            StoreError::Unavailable(e) => GatewayError::Upstream(e),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(code = self.code(), error = ?self, "request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "request rejected");
        }

        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        let body = serde_json::to_string(&body).unwrap_or_default();

        (status, [("content-type", "application/json")], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_errors_have_distinct_codes() {
        let errors = [
            GatewayError::NotFound { path: "/a".into() },
            GatewayError::DirectoryConflict { path: "/a".into() },
            GatewayError::RootProtected {
                method: "PUT".into(),
                path: "/a".into(),
            },
            GatewayError::ParentMissing { path: "/a".into() },
            GatewayError::ParentNotDirectory { path: "/a".into() },
            GatewayError::UnknownRole { name: "r".into() },
            GatewayError::InvalidPageSize { limit: "0".into() },
            GatewayError::InvalidMarker {
                name: "marker".into(),
                value: "x".into(),
            },
            GatewayError::Upstream(anyhow::anyhow!("down")),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_store_conflict_maps_to_precondition_failed() {
        let err = GatewayError::from_store(
            "/a/stor/x",
            StoreError::Conflict {
                key: "/a/stor/x".into(),
            },
        );
        assert_eq!(err.status_code(), StatusCode::PRECONDITION_FAILED);
    }

    #[test]
    fn test_store_unavailable_maps_to_upstream() {
        let err = GatewayError::from_store(
            "/a/stor/x",
            StoreError::Unavailable(anyhow::anyhow!("connection reset")),
        );
        assert_eq!(err.code(), "ServiceUnavailable");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_unknown_role_message_names_role() {
        let err = GatewayError::UnknownRole {
            name: "operators".into(),
        };
        assert!(err.to_string().contains("operators"));
    }
}
