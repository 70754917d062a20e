//! Per-request counters and latency histograms

use axum::{extract::MatchedPath, extract::Request, middleware::Next, response::Response};
use docvault_common::metrics::RequestMetrics;

/// Record method, route template and status of every request
pub async fn track_requests(request: Request, next: Next) -> Response {
    // Route templates keep tenant ids out of metric labels
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let tracker = RequestMetrics::start(request.method().as_str(), &endpoint);

    let response = next.run(request).await;
    tracker.finish(response.status().as_u16());
    response
}
