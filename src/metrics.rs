//! Prometheus metrics for treegate.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a Tower-compatible middleware for
//! HTTP RED metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

use crate::path::{login_from_path, region_of, Region};

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "treegate_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "treegate_http_request_duration_seconds";

/// Metadata records fetched during resolution (counter). Labels: role.
pub const METADATA_FETCHES_TOTAL: &str = "treegate_metadata_fetches_total";

/// Directory listings served (counter). Labels: sort.
pub const LISTINGS_TOTAL: &str = "treegate_listings_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    })
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        METADATA_FETCHES_TOTAL,
        "Metadata records fetched, by entry or parent role"
    );
    describe_counter!(LISTINGS_TOTAL, "Directory listings served");
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation to avoid feedback loops.
/// Must be the outermost layer so it captures the full request lifecycle.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize an actual request path to a low-cardinality metric label.
///
/// Examples:
/// - `/health` -> `/health`
/// - `/alice` -> `/{login}`
/// - `/alice/stor/a/b` -> `/{login}/stor`
/// - `/alice/jobs/<uuid>/stor/x` -> `/{login}/jobs-stor`
/// - `/alice/unknown` -> `/{login}/other`
fn normalize_path(path: &str) -> String {
    match path {
        "/" | "/health" | "/metrics" => path.to_string(),
        _ => {
            if login_from_path(path).is_none() {
                return "/other".to_string();
            }
            let rest = path.trim_start_matches('/');
            if !rest.trim_end_matches('/').contains('/') {
                return "/{login}".to_string();
            }
            match region_of(path) {
                Region::None => "/{login}/other".to_string(),
                region => format!("/{{login}}/{}", region.as_str()),
            }
        }
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [("content-type", "text/plain; version=0.0.4")],
            String::new(),
        ),
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_fixed() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/metrics"), "/metrics");
    }

    #[test]
    fn test_normalize_path_login() {
        assert_eq!(normalize_path("/alice"), "/{login}");
        assert_eq!(normalize_path("/alice/"), "/{login}");
    }

    #[test]
    fn test_normalize_path_regions() {
        assert_eq!(normalize_path("/alice/stor/a/b.txt"), "/{login}/stor");
        assert_eq!(normalize_path("/alice/public"), "/{login}/public");
        assert_eq!(normalize_path("/alice/reports/x"), "/{login}/reports");
        assert_eq!(
            normalize_path("/alice/jobs/0b4a3c8e-1f2d-4e5f-8a9b-0c1d2e3f4a5b/stor/o"),
            "/{login}/jobs-stor"
        );
        assert_eq!(normalize_path("/alice/elsewhere"), "/{login}/other");
    }
}
