//! Precondition checks run after metadata resolution.
//!
//! Operations pick the checks they need; [`run`] always evaluates them in
//! the canonical order of [`Guard::ORDER`] and reports the first failure
//! only.

use axum::http::Method;
use tracing::debug;

use crate::errors::GatewayError;
use crate::metadata::record::{dirname, DIRECTORY_CONTENT_TYPE};
use crate::path::{is_job_path, is_root_directory};
use crate::resolve::ResolvedRequest;

/// A single precondition over a resolved request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// The entry must exist.
    EntryExists,
    /// The entry must not be a directory (metadata-only updates excepted).
    NotDirectory,
    /// Root directories only accept directory PUTs and, inside jobs,
    /// DELETEs.
    NotRoot,
    /// The parent must exist and be a directory.
    ParentIsDirectory,
}

impl Guard {
    /// Canonical evaluation order.
    pub const ORDER: [Guard; 4] = [
        Guard::EntryExists,
        Guard::NotDirectory,
        Guard::NotRoot,
        Guard::ParentIsDirectory,
    ];

    fn check(&self, req: &ResolvedRequest) -> Result<(), GatewayError> {
        match self {
            Guard::EntryExists => ensure_entry_exists(req),
            Guard::NotDirectory => ensure_not_directory(req),
            Guard::NotRoot => ensure_not_root(req),
            Guard::ParentIsDirectory => ensure_parent(req),
        }
    }
}

/// Run the selected guards in canonical order, stopping at the first
/// failure.
pub fn run(req: &ResolvedRequest, selected: &[Guard]) -> Result<(), GatewayError> {
    for guard in Guard::ORDER.iter().filter(|g| selected.contains(g)) {
        if let Err(err) = guard.check(req) {
            debug!(guard = ?guard, key = %req.ctx().key, code = err.code(), "guard failed");
            return Err(err);
        }
    }
    Ok(())
}

fn ensure_entry_exists(req: &ResolvedRequest) -> Result<(), GatewayError> {
    if req.entry().exists() {
        Ok(())
    } else {
        Err(GatewayError::NotFound {
            path: req.ctx().path.clone(),
        })
    }
}

fn ensure_not_directory(req: &ResolvedRequest) -> Result<(), GatewayError> {
    if req.entry().is_directory() && !req.ctx().is_metadata_update() {
        Err(GatewayError::DirectoryConflict {
            path: req.ctx().path.clone(),
        })
    } else {
        Ok(())
    }
}

fn ensure_not_root(req: &ResolvedRequest) -> Result<(), GatewayError> {
    let ctx = req.ctx();
    if !ctx.is_root_directory() {
        return Ok(());
    }

    let rejected = if ctx.method == Method::PUT {
        ctx.header("content-type")
            .is_some_and(|ct| ct != DIRECTORY_CONTENT_TYPE)
    } else if ctx.method == Method::DELETE {
        !is_job_path(&ctx.path)
    } else {
        false
    };

    if rejected {
        Err(GatewayError::RootProtected {
            method: ctx.method.to_string(),
            path: ctx.path.clone(),
        })
    } else {
        Ok(())
    }
}

fn ensure_parent(req: &ResolvedRequest) -> Result<(), GatewayError> {
    let ctx = req.ctx();
    let parent_key = match ctx.parent_key.as_deref() {
        Some(key) if !ctx.is_root_directory() && !is_root_directory(key) => key,
        _ => return Ok(()),
    };

    let parent_path = dirname(&ctx.path);
    match req.parent() {
        Some(parent) if parent.is_directory() => Ok(()),
        Some(parent) if parent.exists() => Err(GatewayError::ParentNotDirectory {
            path: parent_path,
        }),
        _ => {
            debug!(parent_key, "parent does not exist");
            Err(GatewayError::ParentMissing { path: parent_path })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::http::HeaderMap;

    use super::*;
    use crate::context::{Caller, RequestContext};
    use crate::identity::memory::MemoryIdentityService;
    use crate::identity::Account;
    use crate::metadata::memory::MemoryMetadataStore;
    use crate::metadata::record::{EntryKind, Metadata, ObjectInfo};
    use crate::metadata::store::MetadataStore;
    use crate::resolve::resolve;

    const OWNER: &str = "930896af-bf8c-48d4-885c-6573a94b1853";
    const JOB: &str = "0b4a3c8e-1f2d-4e5f-8a9b-0c1d2e3f4a5b";

    fn dir(key: &str) -> Metadata {
        Metadata {
            owner: OWNER.to_string(),
            mtime: 1,
            ..Metadata::implicit_directory(key)
        }
    }

    fn object(key: &str) -> Metadata {
        Metadata {
            owner: OWNER.to_string(),
            mtime: 1,
            kind: EntryKind::Object(ObjectInfo {
                content_length: 0,
                content_md5: None,
                content_type: "text/plain".to_string(),
                object_id: "oid".to_string(),
                sharks: Vec::new(),
            }),
            ..Metadata::absent(key)
        }
    }

    async fn resolved(
        store: &MemoryMetadataStore,
        method: Method,
        path: &str,
        headers: &[(&'static str, &str)],
        query: &[(&str, &str)],
    ) -> ResolvedRequest {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.insert(*k, v.parse().unwrap());
        }
        let query = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        let ctx = RequestContext::new(
            "req-1".to_string(),
            method,
            path,
            map,
            query,
            Account {
                uuid: OWNER.to_string(),
                login: "alice".to_string(),
                is_operator: false,
            },
            Caller::anonymous(),
        )
        .unwrap();
        resolve(ctx, store, &MemoryIdentityService::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_entry_and_parent_reports_not_found() {
        let store = MemoryMetadataStore::new("1");
        let req = resolved(&store, Method::PUT, "/alice/stor/a/b", &[], &[]).await;
        let err = run(&req, &Guard::ORDER).unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_order_is_canonical_regardless_of_selection_order() {
        let store = MemoryMetadataStore::new("1");
        let req = resolved(&store, Method::PUT, "/alice/stor/a/b", &[], &[]).await;
        let err = run(&req, &[Guard::ParentIsDirectory, Guard::EntryExists]).unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_parent_missing() {
        let store = MemoryMetadataStore::new("1");
        let req = resolved(&store, Method::PUT, "/alice/stor/dir/file", &[], &[]).await;
        let err = run(&req, &[Guard::NotRoot, Guard::ParentIsDirectory]).unwrap_err();
        match err {
            GatewayError::ParentMissing { path } => assert_eq!(path, "/alice/stor/dir"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_parent_not_directory() {
        let store = MemoryMetadataStore::new("1");
        store
            .put_record(object(&format!("/{OWNER}/stor/dir")))
            .await
            .unwrap();
        let req = resolved(&store, Method::PUT, "/alice/stor/dir/file", &[], &[]).await;
        let err = run(&req, &[Guard::ParentIsDirectory]).unwrap_err();
        assert!(matches!(err, GatewayError::ParentNotDirectory { .. }));
    }

    #[tokio::test]
    async fn test_parent_directory_passes() {
        let store = MemoryMetadataStore::new("1");
        store.put_record(dir(&format!("/{OWNER}/stor/dir"))).await.unwrap();
        let req = resolved(&store, Method::PUT, "/alice/stor/dir/file", &[], &[]).await;
        assert!(run(&req, &[Guard::NotRoot, Guard::NotDirectory, Guard::ParentIsDirectory]).is_ok());
    }

    #[tokio::test]
    async fn test_parent_check_skipped_under_root() {
        let store = MemoryMetadataStore::new("1");
        let req = resolved(&store, Method::PUT, "/alice/stor/file", &[], &[]).await;
        assert!(run(&req, &[Guard::ParentIsDirectory]).is_ok());
    }

    #[tokio::test]
    async fn test_directory_conflict_and_metadata_override() {
        let store = MemoryMetadataStore::new("1");
        store.put_record(dir(&format!("/{OWNER}/stor/d"))).await.unwrap();

        let req = resolved(&store, Method::PUT, "/alice/stor/d", &[], &[]).await;
        assert!(matches!(
            run(&req, &[Guard::NotDirectory]),
            Err(GatewayError::DirectoryConflict { .. })
        ));

        let req = resolved(&store, Method::PUT, "/alice/stor/d", &[], &[("metadata", "true")]).await;
        assert!(run(&req, &[Guard::NotDirectory]).is_ok());
    }

    #[tokio::test]
    async fn test_root_put_requires_directory_content_type() {
        let store = MemoryMetadataStore::new("1");
        let req = resolved(
            &store,
            Method::PUT,
            "/alice/stor",
            &[("content-type", "text/plain")],
            &[],
        )
        .await;
        assert!(matches!(
            run(&req, &[Guard::NotRoot]),
            Err(GatewayError::RootProtected { .. })
        ));

        let req = resolved(
            &store,
            Method::PUT,
            "/alice/stor",
            &[("content-type", DIRECTORY_CONTENT_TYPE)],
            &[],
        )
        .await;
        assert!(run(&req, &[Guard::NotRoot]).is_ok());
    }

    #[tokio::test]
    async fn test_root_delete_only_inside_jobs() {
        let store = MemoryMetadataStore::new("1");
        let req = resolved(&store, Method::DELETE, "/alice/stor", &[], &[]).await;
        assert!(matches!(
            run(&req, &[Guard::EntryExists, Guard::NotRoot]),
            Err(GatewayError::RootProtected { .. })
        ));

        let job_stor = format!("/alice/jobs/{JOB}/stor");
        let req = resolved(&store, Method::DELETE, &job_stor, &[], &[]).await;
        assert!(run(&req, &[Guard::EntryExists, Guard::NotRoot]).is_ok());
    }

    #[tokio::test]
    async fn test_root_get_passes_not_root() {
        let store = MemoryMetadataStore::new("1");
        let req = resolved(&store, Method::GET, "/alice/reports/", &[], &[]).await;
        assert!(run(&req, &[Guard::EntryExists, Guard::NotRoot]).is_ok());
    }
}
