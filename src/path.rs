//! Namespace path classification.
//!
//! Paths take one of the forms
//!
//! - `/<login>/public(/...)?`
//! - `/<login>/stor(/...)?`
//! - `/<login>/jobs(/<job-id>/stor(/...)?)?`
//! - `/<login>/reports(/...)?`
//! - `/<login>/medusa/...`
//!
//! Every pattern is anchored on segment boundaries, so `/<login>/storage`
//! is not part of the `stor` region.

use std::sync::LazyLock;

use axum::http::{HeaderMap, Method};
use regex::Regex;

const UUID: &str = "[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}";

static LOGIN_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([a-zA-Z][a-zA-Z0-9_\-.@%]+)(?:/|$)").expect("valid regex"));

static PUBLIC_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/[a-zA-Z][a-zA-Z0-9_\-.@%]+/public(?:/.*)?$").expect("valid regex")
});

static STOR_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/[a-zA-Z][a-zA-Z0-9_\-.@%]+/stor(?:/.*)?$").expect("valid regex")
});

static REPORTS_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/[a-zA-Z][a-zA-Z0-9_\-.@%]+/reports(?:/.*)?$").expect("valid regex")
});

static JOBS_ROOT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/[a-zA-Z][a-zA-Z0-9_.@%]+/jobs(?:/.*)?$").expect("valid regex")
});

static JOB_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^/[a-zA-Z][a-zA-Z0-9_.@%]+/jobs/{UUID}(?:/.*)?$")).expect("valid regex")
});

static JOBS_STOR_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^/[a-zA-Z][a-zA-Z0-9_\-.@%]+/jobs/{UUID}/stor(?:/.*)?$"
    ))
    .expect("valid regex")
});

static MEDUSA_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/[a-zA-Z][a-zA-Z0-9_.@%]+/medusa(?:/.*)?$").expect("valid regex")
});

/// Canonical root directory forms.  Logins here may start with a digit so
/// that normalized (owner uuid) keys match as well.
static ROOT_PATHS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^/[a-zA-Z0-9_\-.@%]+/?$",
        r"^/[a-zA-Z0-9_\-.@%]+/public/?$",
        r"^/[a-zA-Z0-9_\-.@%]+/stor/?$",
        r"^/[a-zA-Z0-9_\-.@%]+/jobs/?$",
        r"^/[a-zA-Z0-9_\-.@%]+/jobs/[\w-]+/stor/?$",
        r"^/[a-zA-Z0-9_\-.@%]+/reports/?$",
    ]
    .iter()
    .map(|re| Regex::new(re).expect("valid regex"))
    .collect()
});

/// Top-level namespace category of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Public,
    Storage,
    Jobs,
    JobsStorage,
    Reports,
    MedusaSession,
    None,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Public => "public",
            Region::Storage => "stor",
            Region::Jobs => "jobs",
            Region::JobsStorage => "jobs-stor",
            Region::Reports => "reports",
            Region::MedusaSession => "medusa",
            Region::None => "none",
        }
    }
}

/// Region and structural flags of one request, computed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub region: Region,
    pub is_root_directory: bool,
    pub is_read_only: bool,
    pub is_restricted_write: bool,
    pub is_conditional: bool,
}

/// Classify a request by method, path and headers.
pub fn classify(method: &Method, path: &str, headers: &HeaderMap) -> Classification {
    Classification {
        region: region_of(path),
        is_root_directory: is_root_directory(path),
        is_read_only: is_read_only(method),
        is_restricted_write: is_restricted_write(method, path),
        is_conditional: headers.contains_key("if-match") || headers.contains_key("if-none-match"),
    }
}

/// Namespace region of a path.
pub fn region_of(path: &str) -> Region {
    if PUBLIC_PATH.is_match(path) {
        Region::Public
    } else if STOR_PATH.is_match(path) {
        Region::Storage
    } else if JOBS_STOR_PATH.is_match(path) {
        Region::JobsStorage
    } else if JOBS_ROOT_PATH.is_match(path) {
        Region::Jobs
    } else if REPORTS_PATH.is_match(path) {
        Region::Reports
    } else if MEDUSA_PATH.is_match(path) {
        Region::MedusaSession
    } else {
        Region::None
    }
}

/// Whether `path` is an account or category root directory.
pub fn is_root_directory(path: &str) -> bool {
    ROOT_PATHS.iter().any(|re| re.is_match(path))
}

/// Whether `path` lies under a specific job (`/<login>/jobs/<uuid>...`).
pub fn is_job_path(path: &str) -> bool {
    JOB_PATH.is_match(path)
}

/// Safe retrieval methods.
pub fn is_read_only(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS
}

/// PUTs into job output or report trees, which only operators may write.
pub fn is_restricted_write(method: &Method, path: &str) -> bool {
    *method == Method::PUT && (JOB_PATH.is_match(path) || REPORTS_PATH.is_match(path))
}

/// Login segment of a request path.
pub fn login_from_path(path: &str) -> Option<&str> {
    LOGIN_PATH
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = "0b4a3c8e-1f2d-4e5f-8a9b-0c1d2e3f4a5b";

    #[test]
    fn test_root_directory_forms() {
        for path in [
            "/alice".to_string(),
            "/alice/".to_string(),
            "/alice/public".to_string(),
            "/alice/public/".to_string(),
            "/alice/stor".to_string(),
            "/alice/stor/".to_string(),
            "/alice/jobs".to_string(),
            "/alice/jobs/".to_string(),
            format!("/alice/jobs/{JOB}/stor"),
            format!("/alice/jobs/{JOB}/stor/"),
            "/alice/reports".to_string(),
            "/alice/reports/".to_string(),
        ] {
            assert!(is_root_directory(&path), "{path} should be a root");
        }
    }

    #[test]
    fn test_non_root_paths() {
        for path in [
            "/",
            "/alice/stor/dir",
            "/alice/public/file.txt",
            "/alice/storage",
            "/alice/jobs/x/y",
            "/alice/reports/usage",
            "/alice/medusa",
        ] {
            assert!(!is_root_directory(path), "{path} should not be a root");
        }
    }

    #[test]
    fn test_normalized_owner_key_is_root() {
        assert!(is_root_directory(
            "/930896af-bf8c-48d4-885c-6573a94b1853/stor"
        ));
    }

    #[test]
    fn test_regions() {
        assert_eq!(region_of("/alice/public"), Region::Public);
        assert_eq!(region_of("/alice/public/a/b"), Region::Public);
        assert_eq!(region_of("/alice/stor/a"), Region::Storage);
        assert_eq!(region_of("/alice/jobs"), Region::Jobs);
        assert_eq!(region_of(&format!("/alice/jobs/{JOB}")), Region::Jobs);
        assert_eq!(
            region_of(&format!("/alice/jobs/{JOB}/stor/out.txt")),
            Region::JobsStorage
        );
        assert_eq!(region_of("/alice/reports/usage"), Region::Reports);
        assert_eq!(region_of("/alice/medusa/session"), Region::MedusaSession);
        assert_eq!(region_of("/alice/other"), Region::None);
    }

    #[test]
    fn test_regions_are_anchored_on_segments() {
        assert_eq!(region_of("/alice/storage"), Region::None);
        assert_eq!(region_of("/alice/publicity"), Region::None);
        assert_eq!(region_of("/alice/jobsearch"), Region::None);
        assert_eq!(region_of("/alice/medusae"), Region::None);
    }

    #[test]
    fn test_restricted_write() {
        let job_out = format!("/alice/jobs/{JOB}/stor/out");
        assert!(is_restricted_write(&Method::PUT, &job_out));
        assert!(is_restricted_write(&Method::PUT, "/alice/reports/x"));
        assert!(!is_restricted_write(&Method::GET, &job_out));
        assert!(!is_restricted_write(&Method::PUT, "/alice/stor/x"));
    }

    #[test]
    fn test_classify_flags() {
        let mut headers = HeaderMap::new();
        headers.insert("if-match", "\"abc\"".parse().unwrap());
        let c = classify(&Method::GET, "/alice/stor/", &headers);
        assert_eq!(c.region, Region::Storage);
        assert!(c.is_root_directory);
        assert!(c.is_read_only);
        assert!(!c.is_restricted_write);
        assert!(c.is_conditional);

        let c = classify(&Method::PUT, "/alice/stor/a", &HeaderMap::new());
        assert!(!c.is_read_only);
        assert!(!c.is_conditional);
    }

    #[test]
    fn test_login_from_path() {
        assert_eq!(login_from_path("/alice/stor/x"), Some("alice"));
        assert_eq!(login_from_path("/alice"), Some("alice"));
        assert_eq!(login_from_path("/"), None);
        assert_eq!(login_from_path("/9lives/stor"), None);
    }
}
