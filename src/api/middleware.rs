//! Request logging middleware

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};

use crate::metrics::{HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL};

/// Log every routed request before and after the handler runs
///
/// Install with `route_layer` so the matched route is known; it is used as
/// the metrics label to keep label cardinality bounded.
///
/// # Usage
/// ```ignore
/// let app = Router::new()
///     .route("/", get(root))
///     .route_layer(axum::middleware::from_fn(log_requests));
/// ```
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| path.clone());

    tracing::info!(%method, %path, "request received");
    let started = Instant::now();

    let response = next.run(request).await;

    let elapsed = started.elapsed();
    let status = response.status();
    tracing::info!(
        %method,
        %path,
        status = status.as_u16(),
        duration_ms = elapsed.as_millis() as u64,
        "request complete"
    );

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), endpoint.as_str(), status.as_str()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method.as_str(), endpoint.as_str()])
        .observe(elapsed.as_secs_f64());

    response
}
