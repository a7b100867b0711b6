//! Throwaway HTTP servers for tests.

use std::net::SocketAddr;

use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION, USER_AGENT};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Starts with a zip signature and carries bytes that are not valid UTF-8.
pub const EPUB_BYTES: &[u8] = b"PK\x03\x04\x14\x00\x00\x00\xff\xfe\x00mimetypeapplication/epub+zip";

/// Aborts the server task when the test drops it.
pub struct ServerGuard(JoinHandle<()>);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Serve `app` on an ephemeral loopback port.
pub async fn serve(app: Router) -> (SocketAddr, ServerGuard) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, ServerGuard(task))
}

/// A fake third-party origin:
/// - `/redirect-me` answers 307 to `/file.epub`
/// - `/file.epub` serves [`EPUB_BYTES`] as an attachment
/// - `/user-agent` echoes the request's User-Agent
/// - `/teapot` answers 418 with a text body
pub async fn spawn_upstream() -> (SocketAddr, ServerGuard) {
    let app = Router::new()
        .route(
            "/redirect-me",
            get(|| async { (StatusCode::TEMPORARY_REDIRECT, [(LOCATION, "/file.epub")]) }),
        )
        .route(
            "/file.epub",
            get(|| async {
                (
                    [
                        (CONTENT_TYPE, "application/epub+zip"),
                        (CONTENT_DISPOSITION, "attachment; filename=\"book.epub\""),
                    ],
                    Bytes::from_static(EPUB_BYTES),
                )
            }),
        )
        .route(
            "/user-agent",
            get(|headers: HeaderMap| async move {
                headers
                    .get(USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            }),
        )
        .route(
            "/teapot",
            get(|| async { (StatusCode::IM_A_TEAPOT, "short and stout").into_response() }),
        );

    serve(app).await
}

/// An address nothing is listening on.
pub async fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
