//! Axum router construction and request entry.
//!
//! The [`app`] function wires the namespace catch-all route and the
//! infrastructure endpoints and returns a ready-to-serve [`axum::Router`].
//!
//! Every namespace request goes through the same steps before a handler
//! sees it: owner lookup from the login segment, caller identification
//! from the upstream-authenticated headers, context construction, and
//! metadata resolution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Extension, RawQuery, State},
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use percent_encoding::percent_decode_str;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::context::{Caller, RequestContext};
use crate::errors::{generate_request_id, GatewayError};
use crate::handlers;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::path::login_from_path;
use crate::resolve::{resolve, ResolvedRequest};
use crate::AppState;

/// Login of the account the upstream authenticator verified.
pub const AUTHENTICATED_ACCOUNT: &str = "x-authenticated-account";

/// Login of the authenticated sub-user, when the caller is one.
pub const AUTHENTICATED_USER: &str = "x-authenticated-user";

/// Correlation id of the request being served.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Build the axum [`Router`].
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let mut router: Router<Arc<AppState>> = Router::new();
    if state.config.observability.health_check {
        router = router.route("/health", get(health_check));
    }
    if state.config.observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .route(
            "/*path",
            get(handle_get)
                .head(handle_head)
                .put(handle_put)
                .delete(handle_delete),
        )
        .with_state(state.clone())
        // common_headers_middleware is innermost: it assigns the request id
        // handlers read.
        .layer(middleware::from_fn_with_state(
            state,
            common_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        // metrics_middleware is outer (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
        .layer(DefaultBodyLimit::disable())
}

// -- Common headers middleware -----------------------------------------------

/// Middleware that assigns the request id and adds the common response
/// headers to every response:
/// - `x-request-id`: the incoming id if one was sent, else a fresh uuid
/// - `date`: RFC 7231 formatted timestamp
/// - `server`, `x-server-name`
/// - `x-response-time`: milliseconds spent serving the request
async fn common_headers_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert("x-request-id", value);
    }
    if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(std::time::SystemTime::now())) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("treegate"));
    if let Ok(value) = HeaderValue::from_str(&state.config.server.name) {
        headers.insert("x-server-name", value);
    }
    headers.insert(
        "x-response-time",
        HeaderValue::from(start.elapsed().as_millis() as u64),
    );

    response
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

// -- Query parameter parsing helper ------------------------------------------

/// Parse raw query string into a HashMap.
fn parse_query(raw: Option<String>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(qs) = raw {
        for part in qs.split('&') {
            if let Some((k, v)) = part.split_once('=') {
                let decoded_k = percent_decode_str(k).decode_utf8_lossy().into_owned();
                let decoded_v = percent_decode_str(&v.replace('+', " "))
                    .decode_utf8_lossy()
                    .into_owned();
                map.insert(decoded_k, decoded_v);
            } else if !part.is_empty() {
                // Flags without value (e.g. `?dir`, `?obj`).
                let decoded = percent_decode_str(part).decode_utf8_lossy().into_owned();
                map.insert(decoded, String::new());
            }
        }
    }
    map
}

// -- Request entry -----------------------------------------------------------

/// The caller named by the upstream authentication headers.
async fn authenticated_caller(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Caller, GatewayError> {
    let Some(login) = headers
        .get(AUTHENTICATED_ACCOUNT)
        .and_then(|v| v.to_str().ok())
    else {
        return Ok(Caller::anonymous());
    };

    let account = state
        .identity
        .get_account(login)
        .await
        .map_err(GatewayError::Upstream)?
        .ok_or_else(|| GatewayError::AccessDenied {
            message: format!("{login} is not a known account"),
        })?;

    let user = match headers.get(AUTHENTICATED_USER).and_then(|v| v.to_str().ok()) {
        None => None,
        Some(user_login) => Some(
            state
                .identity
                .get_user(&account.uuid, user_login)
                .await
                .map_err(GatewayError::Upstream)?
                .ok_or_else(|| GatewayError::AccessDenied {
                    message: format!("{login}/{user_login} is not a known user"),
                })?,
        ),
    };
    let active_roles = user
        .as_ref()
        .map(|u| u.default_roles.clone())
        .unwrap_or_default();

    Ok(Caller {
        account: Some(account),
        user,
        active_roles,
    })
}

/// Identify owner and caller, build the context and resolve metadata.
async fn prepare(
    state: &AppState,
    request_id: String,
    method: Method,
    uri: &Uri,
    raw_query: Option<String>,
    headers: HeaderMap,
) -> Result<ResolvedRequest, GatewayError> {
    let path = percent_decode_str(uri.path())
        .decode_utf8_lossy()
        .into_owned();
    let login = login_from_path(&path).ok_or_else(|| GatewayError::InvalidPath {
        path: path.clone(),
    })?;

    let owner = state
        .identity
        .get_account(login)
        .await
        .map_err(GatewayError::Upstream)?
        .ok_or_else(|| GatewayError::AccountNotFound {
            login: login.to_string(),
        })?;
    let caller = authenticated_caller(state, &headers).await?;
    debug!(
        %method,
        path = %path,
        owner = %owner.uuid,
        caller = ?caller.account.as_ref().map(|a| a.login.as_str()),
        req_id = %request_id,
        "request entered"
    );

    let ctx = RequestContext::new(
        request_id,
        method,
        &path,
        headers,
        parse_query(raw_query),
        owner,
        caller,
    )?;
    resolve(ctx, state.metadata.as_ref(), state.identity.as_ref()).await
}

async fn handle_get(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    uri: Uri,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let req = prepare(&state, request_id, Method::GET, &uri, raw_query, headers).await?;
    handlers::get_entry(state, req).await
}

async fn handle_head(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    uri: Uri,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let req = prepare(&state, request_id, Method::HEAD, &uri, raw_query, headers).await?;
    handlers::head_entry(req).await
}

async fn handle_put(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    uri: Uri,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let req = prepare(&state, request_id, Method::PUT, &uri, raw_query, headers).await?;
    handlers::put_entry(state, req, body).await
}

async fn handle_delete(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    uri: Uri,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let req = prepare(&state, request_id, Method::DELETE, &uri, raw_query, headers).await?;
    handlers::delete_entry(state, req).await
}
