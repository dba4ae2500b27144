//! C7 — streaming reverse proxy. Forwards an inbound request to a
//! project's upstream, stripping hop-by-hop headers, without buffering
//! either body to memory.

use axum::body::Body;
use axum::extract::Request;
use axum::http::HeaderMap;
use axum::response::Response;
use std::time::Duration;
use thiserror::Error;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
];

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream_unreachable: {0}")]
    UpstreamUnreachable(String),
}

pub struct StreamingProxy {
    client: reqwest::Client,
    timeout: Duration,
}

impl StreamingProxy {
    pub fn new(client: reqwest::Client, timeout_secs: u64) -> Self {
        Self { client, timeout: Duration::from_secs(timeout_secs) }
    }

    /// `forward(inbound_request, upstream_base_url)`. The path tail and
    /// query string of `inbound_request` are appended to
    /// `upstream_base_url` with its trailing slash trimmed.
    pub async fn forward(&self, request: Request, upstream_base_url: &str) -> Result<Response, ProxyError> {
        let method = request.method().clone();
        let uri = request.uri().clone();
        let headers = request.headers().clone();
        let body = request.into_body();

        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(uri.path());
        let url = format!("{}{}", trim_trailing_slash(upstream_base_url), path_and_query);

        let outbound_method =
            reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET);

        let mut outbound = self
            .client
            .request(outbound_method, &url)
            .timeout(self.timeout)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()));

        for (name, value) in headers.iter() {
            if is_hop_by_hop(name) {
                continue;
            }
            outbound = outbound.header(name, value);
        }

        let upstream_response = outbound
            .send()
            .await
            .map_err(|err| ProxyError::UpstreamUnreachable(err.to_string()))?;

        let status = upstream_response.status();
        let upstream_headers = upstream_response.headers().clone();
        let body_stream = upstream_response.bytes_stream();

        let mut response_headers = HeaderMap::new();
        for (name, value) in upstream_headers.iter() {
            if is_hop_by_hop(name) {
                continue;
            }
            response_headers.insert(name.clone(), value.clone());
        }

        let mut response = Response::builder()
            .status(status.as_u16())
            .body(Body::from_stream(body_stream))
            .expect("status and streamed body always build a valid response");
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

fn is_hop_by_hop(name: &reqwest::header::HeaderName) -> bool {
    HOP_BY_HOP.iter().any(|candidate| name.as_str().eq_ignore_ascii_case(candidate))
}

fn trim_trailing_slash(base: &str) -> &str {
    base.strip_suffix('/').unwrap_or(base)
}

/// Canonical endpoint for analytics/counters: numeric segments become
/// `:id`, empty segments are dropped, the result always has a leading `/`.
pub fn normalize_path(raw_path: &str) -> String {
    let segments: Vec<&str> = raw_path.split('/').filter(|segment| !segment.is_empty()).collect();
    if segments.is_empty() {
        return "/".to_string();
    }
    let normalized: Vec<String> = segments
        .into_iter()
        .map(|segment| {
            if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
                ":id".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect();
    format!("/{}", normalized.join("/"))
}
