//! Middleware for API routes.

use axum::{
    body::Body,
    http::{Request, Uri},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::metrics::{
    normalize_path, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION,
};

/// Metrics middleware that tracks HTTP request duration and counts.
///
/// This middleware records:
/// - Request duration (histogram)
/// - Request count (counter)
/// - Requests in flight (gauge)
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Header a fronting proxy sets to the path prefix the API is mounted under.
pub const SCRIPT_NAME_HEADER: &str = "x-script-name";

/// Strip the `X-Script-Name` prefix from the request path so the API can be
/// served below a proxy location such as `/music`.
pub async fn reverse_proxy(mut request: Request<Body>, next: Next) -> Response {
    let stripped = request
        .headers()
        .get(SCRIPT_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|prefix| strip_script_name(request.uri(), prefix));
    if let Some(uri) = stripped {
        *request.uri_mut() = uri;
    }
    next.run(request).await
}

/// `uri` without the leading `prefix`, keeping the query. `None` when the
/// path is not below `prefix`.
pub(crate) fn strip_script_name(uri: &Uri, prefix: &str) -> Option<Uri> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return None;
    }
    let rest = uri.path().strip_prefix(prefix)?;
    let path = match rest {
        "" => "/",
        rest if rest.starts_with('/') => rest,
        _ => return None,
    };
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().ok()?);
    Uri::from_parts(parts).ok()
}
