//! Request tracing

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use std::time::Duration;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::trace::TraceLayer;
use tracing::info_span;

/// Wraps the router in a request span with status-classified completion logs.
pub fn with_request_tracing<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &Request<Body>| {
                info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            })
            .on_response(|response: &Response<_>, latency: Duration, _span: &tracing::Span| {
                let status = response.status();
                let latency_ms = latency.as_millis();

                if status.is_server_error() {
                    tracing::error!(status = status.as_u16(), latency_ms, "server error response");
                } else if status.is_client_error() {
                    tracing::warn!(status = status.as_u16(), latency_ms, "client error response");
                } else {
                    tracing::info!(status = status.as_u16(), latency_ms, "request completed");
                }
            })
            .on_failure(
                |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                    tracing::error!(latency_ms = latency.as_millis(), error = ?error, "request failed");
                },
            ),
    )
}
