//! Span builder helpers for relay instrumentation.

/// Create the top-level span for one relayed request.
///
/// Usage: `let span = relay_request_span!(request_id, target_url);`
///
/// Fields recorded once the upstream answers (or fails):
/// - `status`: status code sent back to the caller
/// - `latency_ms`: milliseconds from outbound send to body fully read
/// - `body_bytes`: size of the relayed body
#[macro_export]
macro_rules! relay_request_span {
    ($request_id:expr, $target:expr) => {
        tracing::info_span!(
            "relay_request",
            request_id = %$request_id,
            target = %$target,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            body_bytes = tracing::field::Empty,
        )
    };
}

/// Create a span for the outbound fetch to the upstream server.
#[macro_export]
macro_rules! upstream_fetch_span {
    ($url:expr, $redirect:expr) => {
        tracing::debug_span!(
            "upstream_fetch",
            url = %$url,
            redirect = %$redirect,
            upstream_status = tracing::field::Empty,
        )
    };
}
