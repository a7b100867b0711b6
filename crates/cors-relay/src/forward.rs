//! The relay itself: fetch one target URL and hand its response back.
//!
//! The handler works on explicit values. [`RelayQuery`] comes in,
//! [`ClientResponse`] goes out, and the network sits behind the [`Fetch`]
//! seam so the relay rules can be exercised without a socket.
//!
//! Relay rules:
//! - status is copied verbatim, 3xx included (redirects are captured, not followed)
//! - headers are copied except `content-encoding` and connection-level headers
//! - the body is opaque bytes
//! - the CORS headers from [`crate::cors`] always win

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, USER_AGENT};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::config::UpstreamConfig;
use crate::cors::apply_cors_headers;
use crate::error::RelayError;
use crate::stats::RelayStats;

/// Desktop Chrome identity; some hosts refuse or degrade non-browser clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Upper bound on hops when redirects are followed.
const MAX_REDIRECTS: usize = 10;

/// Upstream headers that are never relayed.
///
/// `content-encoding` goes because the HTTP client has already decoded the
/// body. The rest describe the upstream connection, not the resource.
const STRIPPED_HEADERS: &[&str] = &[
    "content-encoding",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
];

/// How the outbound request treats 3xx answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectPolicy {
    /// Return the 3xx response (with its `Location`) to the caller.
    #[default]
    Manual,
    /// Follow up to ten hops and return the final response.
    Follow,
}

impl fmt::Display for RedirectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedirectPolicy::Manual => f.write_str("manual"),
            RedirectPolicy::Follow => f.write_str("follow"),
        }
    }
}

/// Decoded inbound query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayQuery {
    pub url: Option<String>,
}

/// One outbound fetch.
#[derive(Debug, Clone)]
pub struct TargetRequest {
    pub url: Url,
    pub user_agent: Option<HeaderValue>,
    pub redirect: RedirectPolicy,
}

/// What the upstream answered, body fully read.
#[derive(Debug, Clone)]
pub struct TargetResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// What the caller receives.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ClientResponse {
    /// Relay an upstream response: filter its headers, stamp CORS, keep
    /// status and body untouched.
    pub fn relay(upstream: TargetResponse) -> Self {
        let mut headers = HeaderMap::with_capacity(upstream.headers.len() + 4);
        for (name, value) in upstream.headers.iter() {
            if is_stripped(name) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        apply_cors_headers(&mut headers);

        Self {
            status: upstream.status,
            headers,
            body: upstream.body,
        }
    }

    /// Plain-text error answer. CORS headers are included so browser code
    /// can read the message.
    pub fn from_error(err: &RelayError) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        apply_cors_headers(&mut headers);

        Self {
            status: err.status(),
            headers,
            body: Bytes::from(err.client_message()),
        }
    }

    /// Answer to a CORS preflight (`OPTIONS`).
    pub fn preflight() -> Self {
        let mut headers = HeaderMap::new();
        apply_cors_headers(&mut headers);

        Self {
            status: StatusCode::NO_CONTENT,
            headers,
            body: Bytes::new(),
        }
    }
}

impl IntoResponse for ClientResponse {
    fn into_response(self) -> Response {
        // Built by hand so no default content-type sneaks in when the
        // upstream sent none.
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

fn is_stripped(name: &HeaderName) -> bool {
    // HeaderName is always lowercase.
    STRIPPED_HEADERS.contains(&name.as_str())
}

/// Outbound transport seam.
pub trait Fetch {
    fn fetch(
        &self,
        request: &TargetRequest,
    ) -> impl Future<Output = Result<TargetResponse, RelayError>> + Send;
}

/// reqwest-backed [`Fetch`]. One client per redirect policy, since reqwest
/// fixes the policy at client build time.
#[derive(Clone)]
pub struct HttpFetcher {
    manual: reqwest::Client,
    follow: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let manual = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let follow = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;

        Ok(Self { manual, follow })
    }

    fn client(&self, policy: RedirectPolicy) -> &reqwest::Client {
        match policy {
            RedirectPolicy::Manual => &self.manual,
            RedirectPolicy::Follow => &self.follow,
        }
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &TargetRequest) -> Result<TargetResponse, RelayError> {
        let span = relay_tracing::upstream_fetch_span!(request.url, request.redirect);

        async {
            let mut builder = self.client(request.redirect).get(request.url.clone());
            if let Some(ref user_agent) = request.user_agent {
                builder = builder.header(USER_AGENT, user_agent.clone());
            }

            let upstream = builder.send().await?;
            let status = upstream.status();
            tracing::Span::current().record("upstream_status", status.as_u16());

            let headers = upstream.headers().clone();
            let body = upstream.bytes().await?;

            Ok::<_, RelayError>(TargetResponse {
                status,
                headers,
                body,
            })
        }
        .instrument(span)
        .await
    }
}

/// Validates the query, fetches the target, and builds the caller's response.
pub struct Forwarder<F> {
    fetcher: F,
    user_agent: Option<HeaderValue>,
    redirect: RedirectPolicy,
    stats: RelayStats,
}

impl<F: Fetch> Forwarder<F> {
    /// An empty `user_agent` in the config disables the header.
    pub fn new(
        fetcher: F,
        config: &UpstreamConfig,
        stats: RelayStats,
    ) -> Result<Self, axum::http::header::InvalidHeaderValue> {
        let user_agent = if config.user_agent.is_empty() {
            None
        } else {
            Some(HeaderValue::from_str(&config.user_agent)?)
        };

        Ok(Self {
            fetcher,
            user_agent,
            redirect: config.redirect,
            stats,
        })
    }

    /// Handle one relay request. Never fails: every error becomes a 400 or
    /// 500 [`ClientResponse`].
    pub async fn handle(&self, query: RelayQuery) -> ClientResponse {
        self.stats.inc_requests();

        let Some(raw_url) = query.url.filter(|url| !url.is_empty()) else {
            self.stats.inc_rejected();
            tracing::debug!("Rejecting relay request without a url parameter");
            return ClientResponse::from_error(&RelayError::MissingUrl);
        };

        let request_id = Uuid::new_v4();
        let span = relay_tracing::relay_request_span!(request_id, raw_url);

        async {
            let start = Instant::now();
            let span = tracing::Span::current();

            match self.relay(&raw_url).await {
                Ok(response) => {
                    let latency = start.elapsed().as_millis() as u64;
                    let body_bytes = response.body.len() as u64;
                    span.record("status", response.status.as_u16());
                    span.record("latency_ms", latency);
                    span.record("body_bytes", body_bytes);
                    self.stats.add_bytes_relayed(body_bytes);

                    tracing::info!(
                        status = response.status.as_u16(),
                        latency_ms = latency,
                        body_bytes,
                        "Relay complete"
                    );
                    response
                }
                Err(e) => {
                    let response = ClientResponse::from_error(&e);
                    span.record("status", response.status.as_u16());
                    span.record("latency_ms", start.elapsed().as_millis() as u64);
                    self.stats.inc_upstream_failures();

                    tracing::error!(error = %e, "Relay failed");
                    response
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn relay(&self, raw_url: &str) -> Result<ClientResponse, RelayError> {
        let request = self.target_request(raw_url)?;
        let upstream = self.fetcher.fetch(&request).await?;
        Ok(ClientResponse::relay(upstream))
    }

    fn target_request(&self, raw_url: &str) -> Result<TargetRequest, RelayError> {
        Ok(TargetRequest {
            url: Url::parse(raw_url)?,
            user_agent: self.user_agent.clone(),
            redirect: self.redirect,
        })
    }
}
